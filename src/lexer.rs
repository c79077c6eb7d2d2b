// ABOUTME: Lexer turning source bytes into located tokens

use std::fmt;
use std::rc::Rc;

/// A position in a source buffer. Rows and columns are 1-based and a
/// tab advances the column by four.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub filename: Rc<str>,
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub fn start(filename: &str) -> Self {
        Location {
            filename: Rc::from(filename),
            row: 1,
            col: 1,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Quote,
    Ident,
    IntLit,
    FloatLit,
    StrLit,
    StrLitUnclosed,
    Illegal,
}

/// A lexed unit. `value` borrows from the source buffer; for string
/// literals it is the content between the quotes, for unclosed string
/// literals it includes the opening quote.
#[derive(Debug, Clone)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub value: &'src str,
    pub location: Location,
}

pub struct Lexer<'src> {
    source: &'src str,
    pos: usize,
    row: usize,
    col: usize,
    filename: Rc<str>,
}

/// Identifier bytes run until whitespace or a parenthesis. Brackets
/// and braces do NOT terminate an identifier, so `x]` is one token.
fn is_ident_byte(b: u8) -> bool {
    !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')') && !b.is_ascii_control()
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, filename: &str) -> Self {
        Lexer {
            source,
            pos: 0,
            row: 1,
            col: 1,
            filename: Rc::from(filename),
        }
    }

    fn bytes(&self) -> &'src [u8] {
        self.source.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    fn location(&self) -> Location {
        Location {
            filename: self.filename.clone(),
            row: self.row,
            col: self.col,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' => self.advance(),
                b'\t' => {
                    self.pos += 1;
                    self.col += 4;
                }
                b'\n' => {
                    self.pos += 1;
                    self.row += 1;
                    self.col = 1;
                }
                b';' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token<'src> {
        let location = self.location();
        let value = &self.source[self.pos..self.pos + 1];
        self.advance();
        Token {
            kind,
            value,
            location,
        }
    }

    fn lex_string(&mut self) -> Token<'src> {
        let location = self.location();
        let open = self.pos;
        self.advance(); // opening quote
        let start = self.pos;

        while let Some(b) = self.peek() {
            if b == b'"' {
                let value = &self.source[start..self.pos];
                self.advance(); // closing quote
                return Token {
                    kind: TokenKind::StrLit,
                    value,
                    location,
                };
            }
            self.advance();
        }

        Token {
            kind: TokenKind::StrLitUnclosed,
            value: &self.source[open..],
            location,
        }
    }

    fn lex_number(&mut self) -> Token<'src> {
        let location = self.location();
        let start = self.pos;
        let mut kind = TokenKind::IntLit;

        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && kind == TokenKind::IntLit {
                kind = TokenKind::FloatLit;
                self.advance();
            } else {
                break;
            }
        }

        Token {
            kind,
            value: &self.source[start..self.pos],
            location,
        }
    }

    fn lex_ident(&mut self) -> Token<'src> {
        let location = self.location();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !is_ident_byte(b) {
                break;
            }
            self.advance();
        }

        Token {
            kind: TokenKind::Ident,
            value: &self.source[start..self.pos],
            location,
        }
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token<'src>> {
        self.skip_whitespace_and_comments();
        let b = self.peek()?;

        let token = match b {
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'\'' => self.single(TokenKind::Quote),
            b'"' => self.lex_string(),
            _ if b.is_ascii_digit() => self.lex_number(),
            _ if is_ident_byte(b) => self.lex_ident(),
            _ => self.single(TokenKind::Illegal),
        };

        Some(token)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
