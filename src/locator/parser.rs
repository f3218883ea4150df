//! Locator parser
//!
//! Parses serialized locator strings into structured [`Locator`] values.
//!
//! Grammar:
//! ```text
//! locator = "loc(" "/" chapter "/" paragraph ":" offset ")"
//! chapter = number
//! paragraph = number
//! offset = number
//! ```

use thiserror::Error;

use super::types::Locator;

/// Locator parsing errors
#[derive(Debug, Error)]
pub enum LocatorParseError {
    #[error("Empty locator string")]
    Empty,

    #[error("Locator must start with 'loc('")]
    MissingPrefix,

    #[error("Locator must end with ')'")]
    MissingClosingParen,

    #[error("Expected number at position {0}")]
    ExpectedNumber(usize),

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Trailing characters after ')' at position {0}")]
    TrailingInput(usize),
}

/// Parser state
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn expect(&mut self, expected: char) -> Result<(), LocatorParseError> {
        match self.peek() {
            Some(ch) if ch == expected => {
                self.pos += ch.len_utf8();
                Ok(())
            }
            Some(ch) => Err(LocatorParseError::UnexpectedChar(ch, self.pos)),
            None => Err(LocatorParseError::MissingClosingParen),
        }
    }

    fn skip_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Parse a sequence of digits as u32
    fn parse_number(&mut self) -> Result<u32, LocatorParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(LocatorParseError::ExpectedNumber(start));
        }

        self.input[start..self.pos]
            .parse()
            .map_err(|_| LocatorParseError::ExpectedNumber(start))
    }
}

/// Parse a locator string
pub fn parse(input: &str) -> Result<Locator, LocatorParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LocatorParseError::Empty);
    }

    let mut parser = Parser::new(input);
    if !parser.skip_str("loc(") {
        return Err(LocatorParseError::MissingPrefix);
    }

    parser.expect('/')?;
    let chapter = parser.parse_number()?;
    parser.expect('/')?;
    let paragraph = parser.parse_number()?;
    parser.expect(':')?;
    let offset = parser.parse_number()?;
    parser.expect(')')?;

    if !parser.at_end() {
        return Err(LocatorParseError::TrailingInput(parser.pos));
    }

    Ok(Locator {
        chapter,
        paragraph,
        offset,
    })
}
