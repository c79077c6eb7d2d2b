// ABOUTME: Rustyline helper: sprig syntax colors and bracket-aware multi-line input

use rustyline::completion::Completer;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::Helper;
use std::borrow::Cow;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_PARENS: &str = "\x1b[1;34m"; // Bold blue
const COLOR_SPECIAL_FORM: &str = "\x1b[1;35m"; // Bold magenta
const COLOR_NUMBER: &str = "\x1b[33m"; // Yellow
const COLOR_STRING: &str = "\x1b[32m"; // Green
const COLOR_COMMENT: &str = "\x1b[90m"; // Gray

const SPECIAL_FORMS: &[&str] = &[
    "var", "let", "proc", "lambda", "macro", "if", "true", "false", "nil",
];

/// REPL helper: colors input as it is typed and keeps reading lines
/// until every opening delimiter is matched.
pub struct SprigHelper;

impl SprigHelper {
    pub fn new() -> Self {
        SprigHelper
    }
}

impl Default for SprigHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Helper for SprigHelper {}

impl Completer for SprigHelper {
    type Candidate = String;
}

impl Hinter for SprigHelper {
    type Hint = String;
}

impl Validator for SprigHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if open_delimiters(ctx.input()) > 0 {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

impl Highlighter for SprigHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let highlighted = highlight_line(line);
        if highlighted == line {
            Cow::Borrowed(line)
        } else {
            Cow::Owned(highlighted)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

/// Count delimiters that are still open at the end of the input,
/// ignoring ones inside strings or comments. Stray closers count
/// as zero so the parser gets to report them.
fn open_delimiters(input: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    let mut in_comment = false;

    for b in input.bytes() {
        if in_comment {
            if b == b'\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b';' => in_comment = true,
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
    }

    // An unterminated string keeps the form open as well.
    if in_string {
        depth += 1;
    }
    depth.max(0)
}

fn highlight_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b';' => {
                out.push_str(COLOR_COMMENT);
                out.push_str(&line[i..]);
                out.push_str(COLOR_RESET);
                return out;
            }
            b'"' => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i < bytes.len() {
                    i += 1;
                }
                out.push_str(COLOR_STRING);
                out.push_str(&line[start..i]);
                out.push_str(COLOR_RESET);
            }
            b'(' | b')' | b'[' | b']' | b'{' | b'}' => {
                out.push_str(COLOR_PARENS);
                out.push(b as char);
                out.push_str(COLOR_RESET);
                i += 1;
            }
            _ if b.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                out.push_str(COLOR_NUMBER);
                out.push_str(&line[start..i]);
                out.push_str(COLOR_RESET);
            }
            _ if !b.is_ascii_whitespace() => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'"' | b';')
                {
                    i += 1;
                }
                let word = &line[start..i];
                if SPECIAL_FORMS.contains(&word) {
                    out.push_str(COLOR_SPECIAL_FORM);
                    out.push_str(word);
                    out.push_str(COLOR_RESET);
                } else {
                    out.push_str(word);
                }
            }
            _ => {
                out.push(b as char);
                i += 1;
            }
        }
    }

    out
}
