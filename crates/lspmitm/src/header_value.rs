//! One-pass parser for structured header values.
//!
//! Implements the subset of the RFC 7230 field-value grammar needed to read
//! `Content-Type`: tokens, optional whitespace, quoted strings with escape
//! pairs, and `name=value` parameter lists.

use thiserror::Error;

use crate::ascii::{is_horizontal_whitespace, is_tchar, is_vchar};

/// Parse failure inside a header value, with the byte offset of the first
/// offending position.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("malformed header value at byte {at}")]
pub struct HeaderValueError {
    pub at: usize,
}

/// Cursor over a header value. Values reaching this parser were accumulated
/// by the framer and therefore contain only visible ASCII and horizontal
/// whitespace.
pub struct HeaderValueParser<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> HeaderValueParser<'a> {
    pub fn new(value: &'a str) -> Self {
        Self {
            bytes: value.as_bytes(),
            index: 0,
        }
    }

    pub fn finished(&self) -> bool {
        self.index == self.bytes.len()
    }

    fn fail<T>(&self, at: usize) -> Result<T, HeaderValueError> {
        Err(HeaderValueError { at })
    }

    /// Consumes exactly `expected`.
    pub fn expect(&mut self, expected: u8) -> Result<(), HeaderValueError> {
        match self.bytes.get(self.index) {
            Some(&b) if b == expected => {
                self.index += 1;
                Ok(())
            }
            _ => self.fail(self.index),
        }
    }

    /// Consumes one or more tchars.
    pub fn token(&mut self) -> Result<String, HeaderValueError> {
        let start = self.index;
        while self.index < self.bytes.len() && is_tchar(self.bytes[self.index]) {
            self.index += 1;
        }
        if self.index == start {
            return self.fail(start);
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.index]).into_owned())
    }

    /// Consumes zero or more horizontal-whitespace bytes.
    pub fn optional_whitespace(&mut self) {
        while self.index < self.bytes.len() && is_horizontal_whitespace(self.bytes[self.index]) {
            self.index += 1;
        }
    }

    /// `quoted-string` or `token`.
    pub fn param_value(&mut self) -> Result<String, HeaderValueError> {
        match self.bytes.get(self.index) {
            Some(b'"') => self.quoted_string(),
            Some(_) => self.token(),
            None => self.fail(self.index),
        }
    }

    /// DQUOTE *( qdtext / quoted-pair ) DQUOTE, returning the unescaped
    /// content.
    pub fn quoted_string(&mut self) -> Result<String, HeaderValueError> {
        self.expect(b'"')?;
        let mut result = String::new();
        loop {
            let Some(&b) = self.bytes.get(self.index) else {
                return self.fail(self.index);
            };
            match b {
                b'"' => {
                    self.index += 1;
                    return Ok(result);
                }
                b'\\' => {
                    self.index += 1;
                    let Some(&escaped) = self.bytes.get(self.index) else {
                        return self.fail(self.index);
                    };
                    if !is_horizontal_whitespace(escaped) && !is_vchar(escaped) {
                        return self.fail(self.index);
                    }
                    result.push(escaped as char);
                    self.index += 1;
                }
                _ if is_horizontal_whitespace(b)
                    || b == 0x21
                    || (0x23..=0x5B).contains(&b)
                    || (0x5D..=0x7E).contains(&b) =>
                {
                    result.push(b as char);
                    self.index += 1;
                }
                _ => return self.fail(self.index),
            }
        }
    }
}

/// Parsed `Content-Type` value: `type "/" subtype` plus ordered parameters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ContentType {
    pub kind: String,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Parses `token "/" token ( OWS ";" OWS token "=" param-value )*`.
    pub fn parse(value: &str) -> Result<Self, HeaderValueError> {
        let mut parser = HeaderValueParser::new(value);

        let kind = parser.token()?;
        parser.expect(b'/')?;
        let subtype = parser.token()?;

        let mut parameters = Vec::new();
        while !parser.finished() {
            parser.optional_whitespace();
            parser.expect(b';')?;
            parser.optional_whitespace();
            let name = parser.token()?;
            parser.expect(b'=')?;
            let value = parser.param_value()?;
            parameters.push((name, value));
        }

        Ok(Self {
            kind,
            subtype,
            parameters,
        })
    }

    /// The `charset` parameter, if declared.
    pub fn charset(&self) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.as_str())
    }
}
