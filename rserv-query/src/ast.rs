//! Sulpher abstract syntax tree.

use serde_json::Value;
use std::fmt;

/// Traversal algorithm declared at the head of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Breadth-first pattern extension (default)
    #[default]
    Bfs,
    /// Depth-first pattern extension
    Dfs,
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Traversal algorithm
    pub algorithm: Algorithm,
    /// MATCH clauses in order, each with its optional WHERE
    pub clauses: Vec<MatchClause>,
    /// Optional WITH projection between the clauses and RETURN
    pub with: Option<Vec<Projection>>,
    /// RETURN projection
    pub returns: Vec<Projection>,
    /// Optional ORDER BY over the final result set
    pub order_by: Option<OrderBy>,
    /// Optional LIMIT over the final result set
    pub limit: Option<usize>,
}

/// `MATCH <pattern> [WHERE <expr>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    /// The path pattern
    pub pattern: PathPattern,
    /// The WHERE predicate, if present
    pub filter: Option<Expr>,
}

/// A linear path: a start element and `-[..]->` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    /// First element
    pub start: NodePattern,
    /// Each further hop: the edge spec and the element it lands on
    pub steps: Vec<(EdgePattern, NodePattern)>,
}

impl PathPattern {
    /// Elements in pattern order.
    pub fn elements(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.steps.iter().map(|(_, n)| n))
    }
}

/// `(var:Type {field: literal, ...})`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    /// Variable name; anonymous elements get a fresh internal name
    pub var: String,
    /// Declared node type, if any
    pub label: Option<String>,
    /// Literal property constraints
    pub props: Vec<(String, Value)>,
}

/// `-[var:L1|L2 *n..m {..}]->`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    /// Optional edge variable (bindable but payload-free)
    pub var: Option<String>,
    /// Accepted labels; empty matches any label
    pub labels: Vec<String>,
    /// Variable-length range `*n..m`; `None` is a single hop
    pub range: Option<EdgeRange>,
    /// Property constraints; edges carry no properties, so a non-empty
    /// spec matches nothing
    pub props: Vec<(String, Value)>,
}

/// Bounds of a variable-length edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeRange {
    /// Minimum hops (0 allowed: the seed itself)
    pub min: usize,
    /// Maximum hops; `None` is bounded only by `max_depth`
    pub max: Option<usize>,
}

/// Boolean predicate over bound variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Conjunction
    And(Box<Expr>, Box<Expr>),
    /// Disjunction
    Or(Box<Expr>, Box<Expr>),
    /// Negation
    Not(Box<Expr>),
    /// `var.field <op> literal`
    Cmp {
        /// Variable holding the node
        var: String,
        /// Property name
        field: String,
        /// Comparison operator
        op: CmpOp,
        /// Literal to compare against
        value: Value,
    },
    /// Property-exists: bare `var.field`
    Exists {
        /// Variable holding the node
        var: String,
        /// Property name
        field: String,
    },
    /// `(var)-[:L]->()` as a predicate; under NOT this expresses
    /// "var has no outbound L"
    HasEdge {
        /// Variable holding the node
        var: String,
        /// Accepted labels; empty matches any label
        labels: Vec<String>,
    },
}

impl Expr {
    /// Variables this expression reads.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Expr::Not(inner) => inner.collect_variables(out),
            Expr::Cmp { var, .. } | Expr::Exists { var, .. } | Expr::HasEdge { var, .. } => {
                out.push(var)
            }
        }
    }

    /// Split a top-level AND tree into its conjuncts for pushdown.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(a, b) => {
                let mut out = a.conjuncts();
                out.extend(b.conjuncts());
                out
            }
            other => vec![other],
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// One projected column in WITH or RETURN.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Whole node: the document's non-reference fields
    Var(String),
    /// One property: `var.field`
    Field {
        /// Variable holding the node
        var: String,
        /// Property name
        field: String,
    },
    /// Aggregate over the grouped rows
    Agg {
        /// Aggregate function
        func: AggFunc,
        /// Argument
        arg: AggArg,
    },
}

impl Projection {
    /// The column name this projection produces, as spelled in the query.
    pub fn column_name(&self) -> String {
        match self {
            Projection::Var(v) => v.clone(),
            Projection::Field { var, field } => format!("{var}.{field}"),
            Projection::Agg { func, arg } => format!("{func}({arg})"),
        }
    }

    /// The variable this projection reads, if any.
    pub fn variable(&self) -> &str {
        match self {
            Projection::Var(v) => v,
            Projection::Field { var, .. } => var,
            Projection::Agg { arg, .. } => match arg {
                AggArg::Var(v) => v,
                AggArg::Field { var, .. } => var,
            },
        }
    }

    /// Is this an aggregate column?
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Projection::Agg { .. })
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    /// Count of non-null values
    Count,
    /// Numeric sum
    Sum,
    /// Numeric mean
    Avg,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Row-level dedup on the argument
    Distinct,
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggFunc::Count => "COUNT",
            AggFunc::Sum => "SUM",
            AggFunc::Avg => "AVG",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Distinct => "DISTINCT",
        };
        f.write_str(s)
    }
}

/// Aggregate argument: a variable or a property.
#[derive(Debug, Clone, PartialEq)]
pub enum AggArg {
    /// Whole binding; COUNT counts bound rows
    Var(String),
    /// One property
    Field {
        /// Variable holding the node
        var: String,
        /// Property name
        field: String,
    },
}

impl fmt::Display for AggArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggArg::Var(v) => f.write_str(v),
            AggArg::Field { var, field } => write!(f, "{var}.{field}"),
        }
    }
}

/// `ORDER BY <projection> [ASC|DESC]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Sort key
    pub key: Projection,
    /// Descending order
    pub desc: bool,
}
