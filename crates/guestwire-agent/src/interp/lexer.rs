//! Tokenizer for guest source.
//!
//! Produces an indentation-aware token stream: `Newline` ends a logical
//! line, `Indent`/`Dedent` bracket nested blocks. Line breaks inside
//! brackets and after a trailing backslash do not end the line.

use crate::error::{GuestError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

const OPERATORS: &[&str] = &[
    "//=", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "//", "->", "+", "-", "*", "/", "%",
    "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline) | Some(Tok::Indent) | Some(Tok::Dedent)
        )
    }

    fn run(&mut self) -> Result<()> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }

            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 && !self.last_is_newline() {
                        self.push(Tok::Newline);
                    }
                    self.line += 1;
                    at_line_start = true;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '"' | '\'' => self.string(None)?,
                'r' | 'R' if matches!(self.peek_at(1), Some('"' | '\'')) => {
                    self.pos += 1;
                    self.string(Some('r'))?;
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    self.number()?
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_')
                    {
                        self.pos += 1;
                    }
                    let name: String = self.chars[start..self.pos].iter().collect();
                    self.push(Tok::Name(name));
                }
                _ => self.operator()?,
            }
        }

        if !self.last_is_newline() {
            self.push(Tok::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(())
    }

    /// Measure the indentation of a new line and emit block tokens.
    /// Returns `true` if the line is blank and was consumed.
    fn indentation(&mut self) -> Result<bool> {
        let mut width = 0;
        let mut i = self.pos;
        while let Some(&c) = self.chars.get(i) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            i += 1;
        }

        match self.chars.get(i) {
            None | Some('\n') | Some('#') => {
                while self.chars.get(i).is_some_and(|&c| c != '\n') {
                    i += 1;
                }
                self.pos = i;
                if self.chars.get(i).is_some() {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            _ => {}
        }

        self.pos = i;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last() != Some(&width) {
                return Err(GuestError::syntax_error(
                    self.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(false)
    }

    fn string(&mut self, prefix: Option<char>) -> Result<()> {
        let raw = prefix == Some('r');
        let quote = self.peek().unwrap_or('"');
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let start_line = self.line;
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(GuestError::syntax_error(
                    start_line,
                    "unterminated string literal",
                ));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(GuestError::syntax_error(
                        start_line,
                        "unterminated string literal",
                    ));
                }
                self.line += 1;
            }
            if c == '\\' && !raw {
                let escaped = self.peek_at(1).ok_or_else(|| {
                    GuestError::syntax_error(start_line, "unterminated string literal")
                })?;
                self.pos += 2;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => self.line += 1,
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }

        // Adjacent literals concatenate.
        if let Some(Token {
            tok: Tok::Str(prev),
            ..
        }) = self.tokens.last_mut()
        {
            prev.push_str(&out);
        } else {
            self.tokens.push(Token {
                tok: Tok::Str(out),
                line: start_line,
            });
        }
        Ok(())
    }

    fn number(&mut self) -> Result<()> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[start + 2..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let n = i64::from_str_radix(&digits, 16)
                .map_err(|_| GuestError::syntax_error(self.line, "invalid hexadecimal literal"))?;
            self.push(Tok::Int(n));
            return Ok(());
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let tok = if is_float {
            text.parse()
                .map(Tok::Float)
                .map_err(|_| GuestError::syntax_error(self.line, "invalid decimal literal"))?
        } else {
            text.parse()
                .map(Tok::Int)
                .map_err(|_| GuestError::syntax_error(self.line, "integer literal too large"))?
        };
        self.push(tok);
        Ok(())
    }

    fn operator(&mut self) -> Result<()> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                self.pos += len;
                match *op {
                    "(" | "[" | "{" => self.depth += 1,
                    ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.push(Tok::Op(*op));
                return Ok(());
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(GuestError::syntax_error(
            self.line,
            format!("invalid character '{c}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    fn name(s: &str) -> Tok {
        Tok::Name(s.to_string())
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(
            toks("1 + 2.5"),
            vec![Tok::Int(1), Tok::Op("+"), Tok::Float(2.5), Tok::Newline, Tok::Eof]
        );
    }

    #[test]
    fn test_blocks() {
        let source = "if x:\n    y = 1\n\n    # comment\nz\n";
        assert_eq!(
            toks(source),
            vec![
                name("if"),
                name("x"),
                Tok::Op(":"),
                Tok::Newline,
                Tok::Indent,
                name("y"),
                Tok::Op("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Dedent,
                name("z"),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let source = "f(1,\n  2)\n";
        assert_eq!(
            toks(source),
            vec![
                name("f"),
                Tok::Op("("),
                Tok::Int(1),
                Tok::Op(","),
                Tok::Int(2),
                Tok::Op(")"),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(toks(r#"'a\nb'"#)[0], Tok::Str("a\nb".into()));
        assert_eq!(toks(r#"r'a\nb'"#)[0], Tok::Str("a\\nb".into()));
        assert_eq!(toks("\"\"\"doc\nmore\"\"\"")[0], Tok::Str("doc\nmore".into()));
        assert_eq!(toks("'a' 'b'")[0], Tok::Str("ab".into()));
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            toks("a //= 2"),
            vec![name("a"), Tok::Op("//="), Tok::Int(2), Tok::Newline, Tok::Eof]
        );
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    a\n  b\n").unwrap_err();
        assert!(err.to_string().contains("unindent"));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("'abc").is_err());
    }

    #[test]
    fn test_trailing_dedents() {
        let tokens = toks("def f():\n    return 1");
        let tail: Vec<Tok> = tokens[tokens.len() - 3..].to_vec();
        assert_eq!(tail, vec![Tok::Newline, Tok::Dedent, Tok::Eof]);
    }
}
