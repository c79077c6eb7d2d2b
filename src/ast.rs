// ABOUTME: Expression tree produced by the parser and consumed by the compiler

use crate::lexer::Token;
use std::fmt;

/// One node of the expression tree. Atom payloads are decoded and
/// owned, so expressions synthesized by macro expansion need no
/// backing source text; their token is the macro call's token and all
/// diagnostics inside expanded code point at the call site.
#[derive(Debug, Clone)]
pub struct Expr<'src> {
    pub token: Token<'src>,
    pub quoted: bool,
    pub kind: ExprKind<'src>,
}

#[derive(Debug, Clone)]
pub enum ExprKind<'src> {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    List(Vec<Expr<'src>>),
    Vector(Vec<Expr<'src>>),
    /// Interleaved key/value pairs; both sides always have the same length.
    Map {
        keys: Vec<Expr<'src>>,
        values: Vec<Expr<'src>>,
    },
}

impl<'src> Expr<'src> {
    pub fn new(token: Token<'src>, kind: ExprKind<'src>) -> Self {
        Expr {
            token,
            quoted: false,
            kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ExprKind::Int(_) => "int literal",
            ExprKind::Float(_) => "float literal",
            ExprKind::Str(_) => "string literal",
            ExprKind::Ident(_) => "identifier",
            ExprKind::List(_) => "list",
            ExprKind::Vector(_) => "vector",
            ExprKind::Map { .. } => "map",
        }
    }

    /// The callee name when this expression can head a call. Strings
    /// are admitted because macro-built syntax names its callees with
    /// interned strings.
    pub fn head_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) | ExprKind::Str(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "'")?;
        }
        match &self.kind {
            ExprKind::Int(i) => write!(f, "{}", i),
            ExprKind::Float(x) => write!(f, "{}", x),
            ExprKind::Str(s) => write!(f, "\"{}\"", s),
            ExprKind::Ident(s) => write!(f, "{}", s),
            ExprKind::List(items) => write_seq(f, items, "(", ")"),
            ExprKind::Vector(items) => write_seq(f, items, "[", "]"),
            ExprKind::Map { keys, values } => {
                write!(f, "{{")?;
                for (i, (k, v)) in keys.iter().zip(values.iter()).enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Expr<'_>], open: &str, close: &str) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Location, TokenKind};

    fn dummy_token(value: &str) -> Token<'_> {
        Token {
            kind: TokenKind::Ident,
            value,
            location: Location::start("test"),
        }
    }

    fn ident(name: &str) -> Expr<'static> {
        Expr::new(dummy_token(""), ExprKind::Ident(name.to_string()))
    }

    fn int(i: i64) -> Expr<'static> {
        Expr::new(dummy_token(""), ExprKind::Int(i))
    }

    #[test]
    fn test_display_nested_list() {
        let expr = Expr::new(
            dummy_token(""),
            ExprKind::List(vec![
                ident("+"),
                int(1),
                Expr::new(dummy_token(""), ExprKind::List(vec![ident("*"), int(2), int(3)])),
            ]),
        );
        assert_eq!(expr.to_string(), "(+ 1 (* 2 3))");
    }

    #[test]
    fn test_display_vector_and_map() {
        let vector = Expr::new(dummy_token(""), ExprKind::Vector(vec![int(1), int(2)]));
        assert_eq!(vector.to_string(), "[1 2]");

        let map = Expr::new(
            dummy_token(""),
            ExprKind::Map {
                keys: vec![Expr::new(dummy_token(""), ExprKind::Str("a".to_string()))],
                values: vec![int(1)],
            },
        );
        assert_eq!(map.to_string(), "{\"a\" 1}");
    }

    #[test]
    fn test_display_quoted() {
        let mut expr = ident("x");
        expr.quoted = true;
        assert_eq!(expr.to_string(), "'x");
    }

    #[test]
    fn test_head_name() {
        assert_eq!(ident("print").head_name(), Some("print"));
        let as_string = Expr::new(dummy_token(""), ExprKind::Str("+".to_string()));
        assert_eq!(as_string.head_name(), Some("+"));
        assert_eq!(int(1).head_name(), None);
    }
}
