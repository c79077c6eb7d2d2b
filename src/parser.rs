// ABOUTME: Recursive-descent parser turning the token stream into expressions

use crate::ast::{Expr, ExprKind};
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    cur: Option<Token<'src>>,
}

impl<'src> Parser<'src> {
    pub fn new(mut lexer: Lexer<'src>) -> Self {
        let cur = lexer.next_token();
        Parser { lexer, cur }
    }

    /// Consume the current token and pull the next one from the lexer.
    fn advance(&mut self) -> Option<Token<'src>> {
        std::mem::replace(&mut self.cur, self.lexer.next_token())
    }

    /// Parse one top-level expression; `Ok(None)` at end of input.
    pub fn next_expr(&mut self) -> Result<Option<Expr<'src>>, ParseError> {
        let Some(token) = self.cur.clone() else {
            return Ok(None);
        };

        let expr = match token.kind {
            TokenKind::IntLit => {
                self.advance();
                // Literals too wide for an int fall back to a float.
                let kind = match token.value.parse::<i64>() {
                    Ok(i) => ExprKind::Int(i),
                    Err(_) => ExprKind::Float(token.value.parse().unwrap_or(f64::INFINITY)),
                };
                Expr::new(token, kind)
            }
            TokenKind::FloatLit => {
                self.advance();
                let value = token.value.parse().unwrap_or(f64::NAN);
                Expr::new(token, ExprKind::Float(value))
            }
            TokenKind::StrLit => {
                self.advance();
                let kind = ExprKind::Str(token.value.to_string());
                Expr::new(token, kind)
            }
            TokenKind::Ident => {
                self.advance();
                let kind = ExprKind::Ident(token.value.to_string());
                Expr::new(token, kind)
            }
            TokenKind::Quote => {
                self.advance();
                match self.next_expr()? {
                    Some(mut inner) => {
                        inner.quoted = true;
                        inner
                    }
                    None => {
                        return Err(ParseError::UnmatchedDelimiter {
                            what: "quote",
                            text: token.value.to_string(),
                            location: token.location,
                        })
                    }
                }
            }
            TokenKind::LParen => {
                self.advance();
                let items = self.parse_until(TokenKind::RParen, "list", &token)?;
                Expr::new(token, ExprKind::List(items))
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_until(TokenKind::RBracket, "vector", &token)?;
                Expr::new(token, ExprKind::Vector(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let (keys, values) = self.parse_map(&token)?;
                Expr::new(token, ExprKind::Map { keys, values })
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                return Err(ParseError::UnexpectedToken {
                    token: token.value.to_string(),
                    location: token.location,
                })
            }
            TokenKind::StrLitUnclosed => {
                return Err(ParseError::UnmatchedDelimiter {
                    what: "string",
                    text: token.value.to_string(),
                    location: token.location,
                })
            }
            TokenKind::Illegal => {
                return Err(ParseError::IllegalChar {
                    text: token.value.to_string(),
                    location: token.location,
                })
            }
        };

        Ok(Some(expr))
    }

    /// Parse every top-level expression in order.
    pub fn program(&mut self) -> Result<Vec<Expr<'src>>, ParseError> {
        let mut exprs = Vec::new();
        while let Some(expr) = self.next_expr()? {
            exprs.push(expr);
        }
        Ok(exprs)
    }

    fn parse_until(
        &mut self,
        closing: TokenKind,
        what: &'static str,
        start: &Token<'src>,
    ) -> Result<Vec<Expr<'src>>, ParseError> {
        let mut items = Vec::new();
        loop {
            match &self.cur {
                Some(token) if token.kind == closing => {
                    self.advance();
                    return Ok(items);
                }
                Some(_) => items.push(self.expect_expr(what, start)?),
                None => {
                    return Err(ParseError::UnmatchedDelimiter {
                        what,
                        text: start.value.to_string(),
                        location: start.location.clone(),
                    })
                }
            }
        }
    }

    fn parse_map(
        &mut self,
        start: &Token<'src>,
    ) -> Result<(Vec<Expr<'src>>, Vec<Expr<'src>>), ParseError> {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        loop {
            match &self.cur {
                Some(token) if token.kind == TokenKind::RBrace => {
                    self.advance();
                    return Ok((keys, values));
                }
                Some(_) => {
                    keys.push(self.expect_expr("map", start)?);
                    // A closing brace in value position leaves the
                    // literal with an odd child and is rejected here.
                    values.push(self.expect_expr("map", start)?);
                }
                None => {
                    return Err(ParseError::UnmatchedDelimiter {
                        what: "map",
                        text: start.value.to_string(),
                        location: start.location.clone(),
                    })
                }
            }
        }
    }

    fn expect_expr(
        &mut self,
        what: &'static str,
        start: &Token<'src>,
    ) -> Result<Expr<'src>, ParseError> {
        match self.next_expr()? {
            Some(expr) => Ok(expr),
            None => Err(ParseError::UnmatchedDelimiter {
                what,
                text: start.value.to_string(),
                location: start.location.clone(),
            }),
        }
    }
}

/// Convenience for parsing a whole buffer in one call.
pub fn parse_program<'src>(
    source: &'src str,
    filename: &str,
) -> Result<Vec<Expr<'src>>, ParseError> {
    Parser::new(Lexer::new(source, filename)).program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Expr<'_> {
        Parser::new(Lexer::new(source, "test"))
            .next_expr()
            .expect("parse failed")
            .expect("no expression")
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::new(Lexer::new(source, "test"))
            .program()
            .expect_err("expected a parse error")
    }

    #[test]
    fn test_parse_atoms() {
        assert!(matches!(parse_one("42").kind, ExprKind::Int(42)));
        assert!(matches!(parse_one("2.5").kind, ExprKind::Float(f) if (f - 2.5).abs() < 1e-9));
        assert!(matches!(parse_one("\"hi\"").kind, ExprKind::Str(ref s) if s == "hi"));
        assert!(matches!(parse_one("foo").kind, ExprKind::Ident(ref s) if s == "foo"));
    }

    #[test]
    fn test_parse_list_shapes() {
        let expr = parse_one("(+ 1 (f 2) 3)");
        let ExprKind::List(items) = &expr.kind else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 4);
        assert!(matches!(items[2].kind, ExprKind::List(_)));

        let empty = parse_one("()");
        assert!(matches!(&empty.kind, ExprKind::List(items) if items.is_empty()));
    }

    #[test]
    fn test_parse_vector_and_map() {
        let vector = parse_one("[1 2 3]");
        assert!(matches!(&vector.kind, ExprKind::Vector(items) if items.len() == 3));

        let map = parse_one("{\"a\" 1 \"b\" 2}");
        let ExprKind::Map { keys, values } = &map.kind else {
            panic!("expected map");
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_quote_sets_flag() {
        let expr = parse_one("'(1 2)");
        assert!(expr.quoted);
        assert!(matches!(&expr.kind, ExprKind::List(items) if items.len() == 2));

        let sym = parse_one("'x");
        assert!(sym.quoted);
        assert!(matches!(sym.kind, ExprKind::Ident(_)));
    }

    #[test]
    fn test_program_returns_all_forms() {
        let program = parse_program("(a) (b) 3", "test").expect("parse failed");
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_unterminated_list_points_at_open_paren() {
        let err = parse_err("(+ 1 2");
        match err {
            ParseError::UnmatchedDelimiter {
                what,
                ref text,
                ref location,
            } => {
                assert_eq!(what, "list");
                assert_eq!(text, "(");
                assert_eq!((location.row, location.col), (1, 1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains(":1:1: unterminated list literal"));
    }

    #[test]
    fn test_unterminated_vector_and_map() {
        assert!(matches!(
            parse_err("[123 12.3"),
            ParseError::UnmatchedDelimiter { what: "vector", .. }
        ));
        assert!(matches!(
            parse_err("{\"pair\" 123"),
            ParseError::UnmatchedDelimiter { what: "map", .. }
        ));
    }

    #[test]
    fn test_unclosed_string() {
        assert!(matches!(
            parse_err("\"open"),
            ParseError::UnmatchedDelimiter { what: "string", .. }
        ));
    }

    #[test]
    fn test_unexpected_closing_delimiter() {
        assert!(matches!(parse_err(")"), ParseError::UnexpectedToken { .. }));
        let err = parse_err("(1 })");
        assert!(matches!(err, ParseError::UnexpectedToken { ref token, .. } if token == "}"));
    }

    #[test]
    fn test_odd_map_literal_rejected() {
        let err = parse_err("{\"a\" 1 \"b\"}");
        assert!(matches!(err, ParseError::UnexpectedToken { ref token, .. } if token == "}"));
    }

    #[test]
    fn test_nested_error_location() {
        let err = parse_err("(outer [1 2");
        match err {
            ParseError::UnmatchedDelimiter { what, location, .. } => {
                assert_eq!(what, "vector");
                assert_eq!((location.row, location.col), (1, 8));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
