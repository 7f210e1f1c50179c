//! Data-only literal parser for the `meta_info` payload
//!
//! Crawlers emit `meta_info` either as JSON text or as a Python `repr` of a dict. Both are parsed
//! here into a `serde_json::Value` without evaluating anything: only dicts, lists, tuples,
//! strings, numbers, booleans and null are understood.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Containers nested deeper than this are rejected
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unknown name '{0}'")]
    UnknownName(String),

    #[error("dictionary key at offset {offset} is not a string")]
    NonStringKey { offset: usize },

    #[error("trailing content at offset {offset}")]
    TrailingContent { offset: usize },

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Parse JSON or a Python literal into a JSON value
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let mut parser = LiteralParser::new(text);
    let value = parser.value(0)?;
    parser.skip_whitespace();
    match parser.peek() {
        None => Ok(value),
        Some(_) => Err(LiteralError::TrailingContent {
            offset: parser.offset(),
        }),
    }
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<char, LiteralError> {
        let ch = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(found) => LiteralError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }

        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.dict(depth),
            Some('[') => self.sequence(']', depth).map(|(items, _)| Value::Array(items)),
            Some('(') => self.parenthesized(depth),
            Some(quote @ ('\'' | '"')) => self.string(quote).map(Value::String),
            Some(ch) if ch == '-' || ch == '+' || ch == '.' || ch.is_ascii_digit() => self.number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.name(),
            _ => Err(self.unexpected()),
        }
    }

    fn dict(&mut self, depth: usize) -> Result<Value, LiteralError> {
        self.pos += 1; // {
        let mut map = Map::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key_offset = self.pos;
            let key = match self.value(depth + 1)? {
                Value::String(key) => key,
                _ => return Err(LiteralError::NonStringKey { offset: key_offset }),
            };

            self.skip_whitespace();
            if self.bump()? != ':' {
                self.pos -= 1;
                return Err(self.unexpected());
            }

            let value = self.value(depth + 1)?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump()? {
                ',' => continue,
                '}' => return Ok(Value::Object(map)),
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                },
            }
        }
    }

    /// Comma-separated values up to `close`; also reports whether any comma was seen
    fn sequence(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool), LiteralError> {
        self.pos += 1; // [ or (
        let mut items = Vec::new();
        let mut saw_comma = false;

        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, saw_comma));
            }

            items.push(self.value(depth + 1)?);

            self.skip_whitespace();
            match self.bump()? {
                ',' => saw_comma = true,
                ch if ch == close => return Ok((items, saw_comma)),
                _ => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                },
            }
        }
    }

    /// A tuple, or a single grouped value when there is no comma
    fn parenthesized(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let start = self.pos;
        let (mut items, saw_comma) = self.sequence(')', depth)?;
        match (items.len(), saw_comma) {
            (0, _) | (_, true) => Ok(Value::Array(items)),
            (1, false) => Ok(items.remove(0)),
            _ => Err(LiteralError::UnexpectedChar {
                found: '(',
                offset: start,
            }),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        self.pos += 1; // opening quote
        let mut out = String::new();

        loop {
            let ch = self.bump()?;
            match ch {
                c if c == quote => return Ok(out),
                '\n' => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                },
                '\\' => self.escape(&mut out)?,
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let offset = self.pos - 1;
        match self.bump()? {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            '/' => out.push('/'),
            '\n' => {},
            'x' => out.push(self.hex_escape(2, offset)?),
            'u' => out.push(self.hex_escape(4, offset)?),
            'U' => out.push(self.hex_escape(8, offset)?),
            // Unknown escapes keep their backslash.
            other => {
                out.push('\\');
                out.push(other);
            },
        }
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize, offset: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(LiteralError::InvalidEscape { offset });
        }

        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16)
            .map_err(|_| LiteralError::InvalidEscape { offset })?;
        self.pos = end;
        char::from_u32(code).ok_or(LiteralError::InvalidEscape { offset })
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            let exponent_sign = (ch == '-' || ch == '+')
                && self.pos > start
                && matches!(self.chars[self.pos - 1], 'e' | 'E');
            let leading_sign = (ch == '-' || ch == '+') && self.pos == start;
            let numeric = ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '_');
            if numeric || exponent_sign || leading_sign {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw: String = self.chars[start..self.pos].iter().collect();
        let text = raw.replace('_', "");
        let invalid = || LiteralError::InvalidNumber(raw.clone());

        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let is_float = text.contains(['.', 'e', 'E']);
        if !is_float {
            let unsigned = text.trim_start_matches(['+', '-']);
            // Python 3 rejects leading zeros on non-zero integers.
            if unsigned.len() > 1 && unsigned.starts_with('0') {
                return Err(invalid());
            }
            let text = text.trim_start_matches('+');
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Value::Number(n.into()));
            }
            if let Ok(n) = text.parse::<u64>() {
                return Ok(Value::Number(n.into()));
            }
        }

        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid)
    }

    fn name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }

        let name: String = self.chars[start..self.pos].iter().collect();
        match name.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(LiteralError::UnknownName(name)),
        }
    }
}
