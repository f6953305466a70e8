//! Recursive descent parser for Sulpher queries.
//!
//! ```text
//! Query    := [BFS|DFS] (MATCH Pattern [WHERE Expr])+ [WITH Proj,..]
//!             RETURN Proj,.. [ORDER BY Proj [ASC|DESC]] [LIMIT Int]
//! Pattern  := Element ('-' EdgeSpec '->' Element)*
//! Element  := '(' [Var] [':' Type] [Props] ')'
//! EdgeSpec := '[' [Var] [':' Label ('|' Label)*] ['*' [Int] ['..' Int]] [Props] ']'
//! ```

use crate::ast::*;
use crate::lex::{Lexer, Token, TokenKind};
use crate::parse::stream::TokenStream;
use rserv_core::error::{Error, Result};
use serde_json::Value;

/// Parse a query string into its AST.
pub fn parse_query(source: &str) -> Result<Query> {
    let tokens = Lexer::new(source).tokenize();

    // Surface lex failures as syntax errors before parsing
    if let Some(bad) = tokens
        .iter()
        .find(|t| matches!(t.kind, TokenKind::Error(_)))
    {
        let TokenKind::Error(msg) = &bad.kind else {
            unreachable!()
        };
        return Err(Error::QuerySyntax {
            message: msg.clone(),
            token: bad.text(source),
            column: bad.span.column(source),
        });
    }

    Parser::new(source, tokens).parse()
}

struct Parser<'a> {
    stream: TokenStream<'a>,
    anon_counter: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            stream: TokenStream::new(source, tokens),
            anon_counter: 0,
        }
    }

    fn parse(mut self) -> Result<Query> {
        let algorithm = if self.stream.match_token(&TokenKind::KwBfs) {
            Algorithm::Bfs
        } else if self.stream.match_token(&TokenKind::KwDfs) {
            Algorithm::Dfs
        } else {
            Algorithm::default()
        };

        let mut clauses = Vec::new();
        self.stream.expect(&TokenKind::KwMatch, "MATCH")?;
        loop {
            let pattern = self.parse_pattern()?;
            let filter = if self.stream.match_token(&TokenKind::KwWhere) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            clauses.push(MatchClause { pattern, filter });
            if !self.stream.match_token(&TokenKind::KwMatch) {
                break;
            }
        }

        let with = if self.stream.match_token(&TokenKind::KwWith) {
            let projections = self.parse_projections()?;
            // Aggregates are defined at RETURN time only; nested-aggregate
            // forms are rejected outright.
            if projections.iter().any(Projection::is_aggregate) {
                return Err(self
                    .stream
                    .error("aggregation is not allowed in WITH"));
            }
            Some(projections)
        } else {
            None
        };

        self.stream.expect(&TokenKind::KwReturn, "RETURN")?;
        let returns = self.parse_projections()?;

        let order_by = if self.stream.match_token(&TokenKind::KwOrder) {
            self.stream.expect(&TokenKind::KwBy, "BY")?;
            let key = self.parse_projection()?;
            let desc = if self.stream.match_token(&TokenKind::KwDesc) {
                true
            } else {
                self.stream.match_token(&TokenKind::KwAsc);
                false
            };
            Some(OrderBy { key, desc })
        } else {
            None
        };

        let limit = if self.stream.match_token(&TokenKind::KwLimit) {
            let token = self.stream.expect(&TokenKind::Int(0), "a limit count")?;
            let TokenKind::Int(n) = token.kind else {
                unreachable!()
            };
            if n < 0 {
                return Err(self.stream.error("LIMIT must not be negative"));
            }
            Some(n as usize)
        } else {
            None
        };

        if !self.stream.is_eof() {
            return Err(self.stream.error("unexpected input after query"));
        }

        Ok(Query {
            algorithm,
            clauses,
            with,
            returns,
            order_by,
            limit,
        })
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    fn parse_pattern(&mut self) -> Result<PathPattern> {
        let start = self.parse_element()?;
        let mut steps = Vec::new();
        while self.stream.match_token(&TokenKind::Minus) {
            self.stream.expect(&TokenKind::LBracket, "'['")?;
            let edge = self.parse_edge_spec()?;
            self.stream.expect(&TokenKind::RBracket, "']'")?;
            self.stream.expect(&TokenKind::Arrow, "'->'")?;
            let node = self.parse_element()?;
            steps.push((edge, node));
        }
        Ok(PathPattern { start, steps })
    }

    fn parse_element(&mut self) -> Result<NodePattern> {
        self.stream.expect(&TokenKind::LParen, "'('")?;

        let var = match self.stream.peek().kind.as_word() {
            Some(word) => {
                let word = word.to_string();
                self.stream.advance();
                word
            }
            None => self.fresh_anon(),
        };

        let label = if self.stream.match_token(&TokenKind::Colon) {
            Some(self.stream.expect_word("a node type")?)
        } else {
            None
        };

        let props = if self.stream.check(&TokenKind::LBrace) {
            self.parse_props()?
        } else {
            Vec::new()
        };

        self.stream.expect(&TokenKind::RParen, "')'")?;
        Ok(NodePattern { var, label, props })
    }

    fn parse_edge_spec(&mut self) -> Result<EdgePattern> {
        let mut var = None;
        let mut labels = Vec::new();

        // `[r:L]`, `[:L]`, or bare `[r]`
        if self.stream.peek().kind.as_word().is_some()
            && self.stream.peek_n(1).kind == TokenKind::Colon
        {
            var = Some(self.stream.expect_word("an edge variable")?);
            self.stream.advance(); // ':'
            labels = self.parse_labels()?;
        } else if self.stream.match_token(&TokenKind::Colon) {
            labels = self.parse_labels()?;
        } else if self.stream.peek().kind.as_word().is_some() {
            var = Some(self.stream.expect_word("an edge variable")?);
        }

        let range = if self.stream.match_token(&TokenKind::Star) {
            Some(self.parse_range()?)
        } else {
            None
        };

        let props = if self.stream.check(&TokenKind::LBrace) {
            self.parse_props()?
        } else {
            Vec::new()
        };

        Ok(EdgePattern {
            var,
            labels,
            range,
            props,
        })
    }

    fn parse_labels(&mut self) -> Result<Vec<String>> {
        let mut labels = vec![self.stream.expect_word("an edge label")?];
        while self.stream.match_token(&TokenKind::Pipe) {
            labels.push(self.stream.expect_word("an edge label")?);
        }
        Ok(labels)
    }

    /// `'*' [Int] ['..' Int]`: `*` is any length, `*n` exactly n,
    /// `*n..m` between n and m.
    fn parse_range(&mut self) -> Result<EdgeRange> {
        let min = if self.stream.check(&TokenKind::Int(0)) {
            let token = self.stream.advance();
            let TokenKind::Int(n) = token.kind else {
                unreachable!()
            };
            if n < 0 {
                return Err(self.stream.error("range bounds must not be negative"));
            }
            Some(n as usize)
        } else {
            None
        };

        let max = if self.stream.match_token(&TokenKind::DotDot) {
            let token = self.stream.expect(&TokenKind::Int(0), "a range upper bound")?;
            let TokenKind::Int(n) = token.kind else {
                unreachable!()
            };
            if n < 0 {
                return Err(self.stream.error("range bounds must not be negative"));
            }
            Some(n as usize)
        } else {
            // `*n` with no `..` is an exact length
            min
        };

        Ok(EdgeRange {
            min: min.unwrap_or(1),
            max,
        })
    }

    fn parse_props(&mut self) -> Result<Vec<(String, Value)>> {
        self.stream.expect(&TokenKind::LBrace, "'{'")?;
        let mut props = Vec::new();
        if !self.stream.check(&TokenKind::RBrace) {
            loop {
                let field = self.stream.expect_word("a property name")?;
                self.stream.expect(&TokenKind::Colon, "':'")?;
                let value = self.parse_literal()?;
                props.push((field, value));
                if !self.stream.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.stream.expect(&TokenKind::RBrace, "'}'")?;
        Ok(props)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let negative = self.stream.match_token(&TokenKind::Minus);
        let token = self.stream.advance();
        let value = match token.kind {
            TokenKind::Int(n) => Value::from(if negative { -n } else { n }),
            TokenKind::Float(f) => Value::from(if negative { -f } else { f }),
            TokenKind::Str(s) if !negative => Value::String(s),
            TokenKind::KwTrue if !negative => Value::Bool(true),
            TokenKind::KwFalse if !negative => Value::Bool(false),
            TokenKind::KwNull if !negative => Value::Null,
            _ => return Err(self.stream.error("expected a literal value")),
        };
        Ok(value)
    }

    fn fresh_anon(&mut self) -> String {
        let name = format!("${}", self.anon_counter);
        self.anon_counter += 1;
        name
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.stream.match_token(&TokenKind::KwOr) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.stream.match_token(&TokenKind::KwAnd) {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.stream.match_token(&TokenKind::KwNot) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        if self.stream.check(&TokenKind::LParen) {
            // Either a pattern predicate `(x)-[:L]->()` or a grouped
            // expression; try the pattern first and backtrack.
            let saved = self.stream.position();
            match self.parse_edge_predicate() {
                Ok(expr) => return Ok(expr),
                Err(_) => self.stream.restore(saved),
            }
            self.stream.advance(); // '('
            let inner = self.parse_expr()?;
            self.stream.expect(&TokenKind::RParen, "')'")?;
            return Ok(inner);
        }

        self.parse_comparison()
    }

    /// `(x)-[:L|M]->()` as a boolean predicate on `x`.
    fn parse_edge_predicate(&mut self) -> Result<Expr> {
        self.stream.expect(&TokenKind::LParen, "'('")?;
        let var = self.stream.expect_word("a variable")?;
        self.stream.expect(&TokenKind::RParen, "')'")?;
        self.stream.expect(&TokenKind::Minus, "'-'")?;
        self.stream.expect(&TokenKind::LBracket, "'['")?;
        let labels = if self.stream.match_token(&TokenKind::Colon) {
            self.parse_labels()?
        } else {
            Vec::new()
        };
        self.stream.expect(&TokenKind::RBracket, "']'")?;
        self.stream.expect(&TokenKind::Arrow, "'->'")?;
        self.stream.expect(&TokenKind::LParen, "'('")?;
        // Target element is ignored; allow `()` or `(y)`
        if self.stream.peek().kind.as_word().is_some() {
            self.stream.advance();
        }
        self.stream.expect(&TokenKind::RParen, "')'")?;
        Ok(Expr::HasEdge { var, labels })
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let var = self.stream.expect_word("a variable")?;
        self.stream.expect(&TokenKind::Dot, "'.'")?;
        let field = self.stream.expect_word("a property name")?;

        let op = match self.stream.peek().kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::Ne => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::Ge,
            // Bare `var.field` is a property-exists check
            _ => return Ok(Expr::Exists { var, field }),
        };
        self.stream.advance();
        let value = self.parse_literal()?;
        Ok(Expr::Cmp {
            var,
            field,
            op,
            value,
        })
    }

    // =========================================================================
    // Projections
    // =========================================================================

    fn parse_projections(&mut self) -> Result<Vec<Projection>> {
        let mut projections = vec![self.parse_projection()?];
        while self.stream.match_token(&TokenKind::Comma) {
            projections.push(self.parse_projection()?);
        }
        Ok(projections)
    }

    fn parse_projection(&mut self) -> Result<Projection> {
        let func = match self.stream.peek().kind {
            TokenKind::KwCount => Some(AggFunc::Count),
            TokenKind::KwSum => Some(AggFunc::Sum),
            TokenKind::KwAvg => Some(AggFunc::Avg),
            TokenKind::KwMin => Some(AggFunc::Min),
            TokenKind::KwMax => Some(AggFunc::Max),
            TokenKind::KwDistinct => Some(AggFunc::Distinct),
            _ => None,
        };

        // Aggregate keywords double as field names; only treat them as a
        // function when a '(' follows.
        if let Some(func) = func {
            if self.stream.peek_n(1).kind == TokenKind::LParen {
                self.stream.advance();
                self.stream.advance();
                let var = self.stream.expect_word("a variable")?;
                let arg = if self.stream.match_token(&TokenKind::Dot) {
                    let field = self.stream.expect_word("a property name")?;
                    AggArg::Field { var, field }
                } else {
                    AggArg::Var(var)
                };
                self.stream.expect(&TokenKind::RParen, "')'")?;
                return Ok(Projection::Agg { func, arg });
            }
        }

        let var = self.stream.expect_word("a variable")?;
        if self.stream.match_token(&TokenKind::Dot) {
            let field = self.stream.expect_word("a property name")?;
            Ok(Projection::Field { var, field })
        } else {
            Ok(Projection::Var(var))
        }
    }
}
