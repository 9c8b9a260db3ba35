//! Parser for the textual filter grammar.
//!
//! ```text
//! filter := "(" body ")"
//! body   := "&" filter+ | "|" filter+ | "!" filter
//!         | key "?" | key op value
//! op     := "=" | "<" | ">" | "<=" | ">=" | "~"
//! ```
//!
//! Inside `value`, a backslash makes the next character literal. Nesting
//! deeper than [`MAX_FILTER_DEPTH`] is rejected while parsing.

use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, MAX_FILTER_DEPTH};

/// Parse a filter string such as `(&(bitrate>4)(title~jazz))`.
pub fn parse_filter(input: &str) -> QueryResult<Filter> {
    let mut parser = Parser {
        chars: input.char_indices().collect(),
        pos: 0,
        len: input.len(),
        depth: 0,
    };
    parser.skip_ws();
    let filter = parser.filter()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing characters after filter"));
    }
    Ok(filter)
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
    len: usize,
    /// Filters currently open, counting the one being parsed.
    depth: usize,
}

impl Parser {
    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(o, _)| *o).unwrap_or(self.len)
    }

    fn error(&self, reason: &str) -> QueryError {
        QueryError::FilterSyntax {
            offset: self.offset(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expect(&mut self, want: char) -> QueryResult<()> {
        match self.peek() {
            Some(c) if c == want => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(&format!("expected '{want}'"))),
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn filter(&mut self) -> QueryResult<Filter> {
        self.depth += 1;
        if self.depth > MAX_FILTER_DEPTH {
            return Err(QueryError::FilterTooDeep {
                depth: self.depth,
                max: MAX_FILTER_DEPTH,
            });
        }
        let filter = self.nested();
        self.depth -= 1;
        filter
    }

    fn nested(&mut self) -> QueryResult<Filter> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Filter::Not(Box::new(self.filter()?))
            }
            _ => self.comparison()?,
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> QueryResult<Vec<Filter>> {
        let mut parts = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            parts.push(self.filter()?);
            self.skip_ws();
        }
        if parts.is_empty() {
            return Err(self.error("expected at least one nested filter"));
        }
        Ok(parts)
    }

    fn comparison(&mut self) -> QueryResult<Filter> {
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '?' | '(' | ')' | '\\') {
                break;
            }
            key.push(c);
            self.pos += 1;
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("expected attribute key"));
        }

        let op = match self.peek() {
            Some(c @ ('=' | '<' | '>' | '~' | '?')) => c,
            _ => return Err(self.error("expected operator")),
        };
        self.pos += 1;
        if op == '?' {
            return Ok(Filter::Exists(key));
        }
        let or_equal = matches!(op, '<' | '>') && self.peek() == Some('=');
        if or_equal {
            self.pos += 1;
        }

        let value = self.value()?;
        Ok(match (op, or_equal) {
            ('<', false) => Filter::Lt(key, value),
            ('<', true) => Filter::Le(key, value),
            ('>', false) => Filter::Gt(key, value),
            ('>', true) => Filter::Ge(key, value),
            ('~', _) => Filter::Approx(key, value),
            _ => Filter::Eq(key, value),
        })
    }

    fn value(&mut self) -> QueryResult<String> {
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => return Ok(value),
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    match self.bump() {
                        Some(c) => value.push(c),
                        None => return Err(self.error("dangling escape")),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
