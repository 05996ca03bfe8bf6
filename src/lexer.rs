//! Byte scanner for the PDF object grammar.
//!
//! Turns a region of bytes into a flat [`Token`] sequence. Scanning stops at
//! the keywords `endobj`, `startxref` or `stream`; for `stream` the single
//! end-of-line after the keyword is consumed and the payload start recorded.
//!
//! Rules:
//! - whitespace ends the current token
//! - `(` opens a literal string; nested parentheses are balanced and a
//!   backslash escapes the next byte unconditionally
//! - `/` starts a name
//! - two consecutive identical angle brackets form `<<` / `>>`; a single `<`
//!   opens a hex string running to the next `>`
//! - `[ ] { }` are single-byte tokens
//! - `%` starts a comment running to the end of the line

use crate::error::{Error, Result};
use crate::object::Token;

/// Why scanning stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `endobj` keyword
    EndObj,
    /// `startxref` keyword
    StartXref,
    /// `stream` keyword; payload begins at `data_start`
    Stream {
        /// Offset of the first payload byte
        data_start: usize,
    },
    /// Buffer exhausted
    EndOfInput,
}

/// Result of scanning one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    /// Tokens before the terminator (the terminator keyword is not included)
    pub tokens: Vec<Token>,
    /// Why scanning stopped
    pub terminator: Terminator,
    /// Offset just past the terminator keyword
    pub end: usize,
}

/// PDF whitespace characters (ISO 32000 7.2.2).
#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

/// Scan from `start` until a terminator keyword or the end of `buf`.
pub fn scan(buf: &[u8], start: usize) -> Result<Scan> {
    if start >= buf.len() {
        return Err(Error::malformed(start, "scan offset beyond end of buffer"));
    }
    Scanner::new(buf, start, true).run()
}

/// Tokenize all of `buf`, treating terminator keywords as ordinary words.
pub fn tokenize(buf: &[u8]) -> Result<Vec<Token>> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    Ok(Scanner::new(buf, 0, false).run()?.tokens)
}

struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    pending: Vec<u8>,
    pending_name: bool,
    stop_on_keywords: bool,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8], start: usize, stop_on_keywords: bool) -> Self {
        Self {
            buf,
            pos: start,
            tokens: Vec::new(),
            pending: Vec::new(),
            pending_name: false,
            stop_on_keywords,
        }
    }

    fn run(mut self) -> Result<Scan> {
        while self.pos < self.buf.len() {
            let b = self.buf[self.pos];

            if is_whitespace(b) || is_delimiter(b) {
                if let Some(terminator) = self.flush() {
                    return Ok(self.finish(terminator));
                }
            }

            match b {
                _ if is_whitespace(b) => self.pos += 1,
                b'%' => self.skip_comment(),
                b'(' => self.literal_string()?,
                b'/' => {
                    self.pending_name = true;
                    self.pos += 1;
                },
                b'<' => {
                    if self.peek(1) == Some(b'<') {
                        self.tokens.push(Token::DictStart);
                        self.pos += 2;
                    } else {
                        self.hex_string()?;
                    }
                },
                b'>' => {
                    if self.peek(1) == Some(b'>') {
                        self.tokens.push(Token::DictEnd);
                        self.pos += 2;
                    } else {
                        log::trace!("Stray '>' at byte {}", self.pos);
                        self.pos += 1;
                    }
                },
                b'[' => self.single(Token::ArrayStart),
                b']' => self.single(Token::ArrayEnd),
                b'{' => self.single(Token::BraceOpen),
                b'}' => self.single(Token::BraceClose),
                b')' => {
                    log::trace!("Stray ')' at byte {}", self.pos);
                    self.pos += 1;
                },
                _ => {
                    self.pending.push(b);
                    self.pos += 1;
                },
            }
        }

        match self.flush() {
            Some(terminator) => Ok(self.finish(terminator)),
            None => Ok(Scan {
                tokens: self.tokens,
                terminator: Terminator::EndOfInput,
                end: self.buf.len(),
            }),
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.buf.get(self.pos + ahead).copied()
    }

    fn single(&mut self, token: Token) {
        self.tokens.push(token);
        self.pos += 1;
    }

    /// Emit the pending name or word. Returns a terminator when the word was
    /// a stop keyword.
    fn flush(&mut self) -> Option<Terminator> {
        if self.pending_name {
            let name = String::from_utf8_lossy(&self.pending).into_owned();
            self.tokens.push(Token::Name(name));
            self.pending.clear();
            self.pending_name = false;
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }

        let word = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();

        if self.stop_on_keywords {
            let stop = match word.as_str() {
                "endobj" => Some(Terminator::EndObj),
                "startxref" => Some(Terminator::StartXref),
                "stream" => Some(Terminator::Stream { data_start: 0 }),
                _ => None,
            };
            if stop.is_some() {
                return stop;
            }
        }
        self.tokens.push(Token::Word(word));
        None
    }

    fn finish(mut self, terminator: Terminator) -> Scan {
        let terminator = match terminator {
            Terminator::Stream { .. } => {
                // Exactly one end-of-line separates `stream` from its payload
                match (self.peek(0), self.peek(1)) {
                    (Some(b'\r'), Some(b'\n')) => self.pos += 2,
                    (Some(b'\n'), _) | (Some(b'\r'), _) => self.pos += 1,
                    _ => {},
                }
                Terminator::Stream {
                    data_start: self.pos,
                }
            },
            other => other,
        };
        Scan {
            tokens: self.tokens,
            terminator,
            end: self.pos,
        }
    }

    fn skip_comment(&mut self) {
        while self.pos < self.buf.len() && !matches!(self.buf[self.pos], b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn literal_string(&mut self) -> Result<()> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < self.buf.len() {
            match self.buf[i] {
                b'\\' => {
                    i += 2;
                    continue;
                },
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.tokens
                            .push(Token::LiteralString(self.buf[start + 1..i].to_vec()));
                        self.pos = i + 1;
                        return Ok(());
                    }
                },
                _ => {},
            }
            i += 1;
        }
        Err(Error::malformed(start, "unterminated literal string"))
    }

    fn hex_string(&mut self) -> Result<()> {
        let start = self.pos;
        match self.buf[start + 1..].iter().position(|&b| b == b'>') {
            Some(len) => {
                self.tokens
                    .push(Token::HexString(self.buf[start + 1..start + 1 + len].to_vec()));
                self.pos = start + len + 2;
                Ok(())
            },
            None => Err(Error::malformed(start, "unterminated hex string")),
        }
    }
}

/// PDF delimiter characters.
#[inline]
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}
