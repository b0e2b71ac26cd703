//! Splitting source text into tokens and classifying them.
use std::iter::Enumerate;
use std::str::Split;

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("Unmatched `}}` at line {line}, column {column}.")]
    UnmatchedClose { line: usize, column: usize },
    #[error("{open} block(s) left unclosed at the end of the input.")]
    Unclosed { open: usize },
    #[error("Expected exactly one block, found {found} value(s).")]
    NotABlock { found: usize },
}

/// A single whitespace-delimited word of the source, with its position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// 1-based line number.
    pub line: usize,
    /// 1-based byte column within the line.
    pub column: usize,
}

/// Iterator over the tokens of a source text.
///
/// The source is split on `\n` (a trailing `\r` is dropped), and every line
/// on single spaces, so consecutive spaces produce empty tokens. A trailing
/// newline therefore ends the source with one empty token.
#[derive(Clone, Debug)]
pub struct Tokens<'a> {
    lines: Enumerate<Split<'a, char>>,
    words: Option<(usize, Split<'a, char>)>,
    column: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            if let Some((line, words)) = &mut self.words {
                if let Some(text) = words.next() {
                    let token = Token { text, line: *line, column: self.column };
                    self.column += text.len() + 1;
                    return Some(token);
                }
            }
            let (index, line) = self.lines.next()?;
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.words = Some((index + 1, line.split(' ')));
            self.column = 1;
        }
    }
}

pub fn tokenize(source: &str) -> Tokens<'_> {
    Tokens { lines: source.split('\n').enumerate(), words: None, column: 1 }
}

/// What a single token means to the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Empty,
    Open,
    Close,
    Value(Value),
}

pub fn classify(token: &str) -> TokenKind {
    match token {
        "" => TokenKind::Empty,
        "{" => TokenKind::Open,
        "}" => TokenKind::Close,
        // A lone slash is division, not an empty symbol.
        "/" => TokenKind::Value(Value::operator(token)),
        _ => TokenKind::Value(if let Some(n) = parse_number(token) {
            Value::Number(n)
        } else if let Some(name) = token.strip_prefix('/') {
            Value::symbol(name)
        } else {
            Value::operator(token)
        }),
    }
}

/// Parses a decimal number literal.
///
/// Only tokens that start with a digit or a dot (after an optional sign) are
/// considered, so words like `inf` or `nan` remain operators.
pub fn parse_number(token: &str) -> Option<f64> {
    let unsigned = token.strip_prefix(['+', '-']).unwrap_or(token);
    match unsigned.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' => token.parse().ok(),
        _ => None,
    }
}

/// Parses the textual form of values without evaluating anything.
///
/// Blocks are captured as data, which is the inverse of how values are
/// displayed.
pub fn parse_values(text: &str) -> Result<Vec<Value>, ParserError> {
    let mut values = Vec::new();
    let mut open: Vec<Vec<Value>> = Vec::new();
    for token in tokenize(text) {
        let value = match classify(token.text) {
            TokenKind::Empty => continue,
            TokenKind::Open => {
                open.push(Vec::new());
                continue;
            }
            TokenKind::Close => {
                let body = open.pop().ok_or(ParserError::UnmatchedClose {
                    line: token.line,
                    column: token.column,
                })?;
                Value::block(body)
            }
            TokenKind::Value(value) => value,
        };
        open.last_mut().unwrap_or(&mut values).push(value);
    }

    if !open.is_empty() {
        return Err(ParserError::Unclosed { open: open.len() });
    }
    Ok(values)
}

/// Parses the textual form of a single block, returning its captured values.
pub fn parse_block(text: &str) -> Result<Vec<Value>, ParserError> {
    let mut values = parse_values(text)?;
    match (values.pop(), values.is_empty()) {
        (Some(Value::Block(body)), true) => Ok(body.to_vec()),
        (last, _) => Err(ParserError::NotABlock { found: values.len() + usize::from(last.is_some()) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        tokenize(source).map(|t| t.text).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(texts(""), [""]);
        assert_eq!(texts("3 4 +"), ["3", "4", "+"]);
        assert_eq!(texts("3  4"), ["3", "", "4"]);
        assert_eq!(texts("/x 10 def\nx"), ["/x", "10", "def", "x"]);
        assert_eq!(texts("1\r\n2"), ["1", "2"]);
        assert_eq!(texts("1\n"), ["1", ""]);
        assert_eq!(texts("1\n\n2"), ["1", "", "2"]);
    }

    #[test]
    fn test_token_positions() {
        let tokens: Vec<_> = tokenize("1 2\n  foo").collect();
        assert_eq!(tokens[0], Token { text: "1", line: 1, column: 1 });
        assert_eq!(tokens[1], Token { text: "2", line: 1, column: 3 });
        assert_eq!(tokens[4], Token { text: "foo", line: 2, column: 3 });
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), TokenKind::Empty);
        assert_eq!(classify("{"), TokenKind::Open);
        assert_eq!(classify("}"), TokenKind::Close);
        assert_eq!(classify("10"), TokenKind::Value(Value::Number(10.0)));
        assert_eq!(classify("-2.5"), TokenKind::Value(Value::Number(-2.5)));
        assert_eq!(classify(".5"), TokenKind::Value(Value::Number(0.5)));
        assert_eq!(classify("1e3"), TokenKind::Value(Value::Number(1000.0)));
        assert_eq!(classify("/x"), TokenKind::Value(Value::symbol("x")));
        assert_eq!(classify("/"), TokenKind::Value(Value::operator("/")));
        assert_eq!(classify("x"), TokenKind::Value(Value::operator("x")));
        assert_eq!(classify("-"), TokenKind::Value(Value::operator("-")));
        assert_eq!(classify("inf"), TokenKind::Value(Value::operator("inf")));
        assert_eq!(classify("nan"), TokenKind::Value(Value::operator("nan")));
        // Malformed numbers are operators too.
        assert_eq!(classify("1x"), TokenKind::Value(Value::operator("1x")));
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(
            parse_values("1 /x { y { 2 } }").unwrap(),
            vec![
                Value::Number(1.0),
                Value::symbol("x"),
                Value::block(vec![Value::operator("y"), Value::block(vec![Value::Number(2.0)])]),
            ]
        );
        assert_eq!(parse_values("1 }"), Err(ParserError::UnmatchedClose { line: 1, column: 3 }));
        assert_eq!(parse_values("{ {"), Err(ParserError::Unclosed { open: 2 }));
    }

    #[test]
    fn test_block_round_trip() {
        let block = Value::block(vec![
            Value::operator("x"),
            Value::block(vec![Value::Number(20.0), Value::block(vec![])]),
            Value::symbol("y"),
            Value::Number(-0.25),
            Value::operator("+"),
        ]);
        let Value::Block(body) = &block else { unreachable!() };
        assert_eq!(parse_block(&block.to_string()).unwrap(), body.to_vec());
    }

    #[test]
    fn test_parse_block_rejects_non_blocks() {
        assert_eq!(parse_block("1"), Err(ParserError::NotABlock { found: 1 }));
        assert_eq!(parse_block(""), Err(ParserError::NotABlock { found: 0 }));
        assert_eq!(parse_block("{ } { }"), Err(ParserError::NotABlock { found: 2 }));
    }
}
