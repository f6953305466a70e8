//! Sulpher: the Cypher-subset query language over the rserv graph overlay.
//!
//! The pipeline is lex → parse → plan → execute. The lexer produces spanned
//! tokens, the parser builds the [`ast::Query`], the planner picks a seed
//! variable, and the executor drives BFS/DFS pattern matching against a
//! [`GraphView`] with predicate pushdown, aggregation, and ORDER BY/LIMIT.

pub mod aggregate;
pub mod ast;
pub mod canonical;
pub mod exec;
pub mod lex;
pub mod parse;
pub mod plan;
pub mod span;
pub mod view;

pub use ast::Query;
pub use canonical::canonicalize;
pub use exec::{execute, ExecOptions, ExecStats};
pub use parse::parse_query;
pub use view::{GraphView, MemoryGraphView};
