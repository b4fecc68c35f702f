//! Pack expressions evaluated inside `\#...#` terminal escapes.
//!
//! ```text
//! expr   := term ('+' term)*
//! term   := atom ('*' int)*
//! atom   := string | packer '(' int ')' | '(' expr ')'
//! packer := p8 | p16 | p32 | p64
//! int    := '-'? (decimal | 0x hex)
//! ```
//!
//! Strings take single or double quotes (an optional `b` prefix is
//! accepted) and understand `\\`, `\'`, `\"`, `\n`, `\r`, `\t`, `\0` and
//! `\xHH`. Packers emit little-endian integers; negative values are
//! stored in two's complement.
//!
//! # Examples
//!
//! ```
//! use unified_io::codec::expr;
//! use unified_io::Encoding;
//!
//! let bytes = expr::eval("'A' * 4 + p32(0xdeadbeef)", Encoding::Utf8).unwrap();
//! assert_eq!(bytes, b"AAAA\xef\xbe\xad\xde");
//! ```

use crate::core::Encoding;
use crate::error::{Error, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Upper bound on the size of an evaluated expression.
const MAX_OUTPUT: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Str(Vec<u8>),
    Int(i128),
    Ident(String),
    Plus,
    Star,
    Open,
    Close,
}

fn error(message: impl Into<String>) -> Error {
    Error::InvalidArgument(format!("expression: {}", message.into()))
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    encoding: Encoding,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, encoding: Encoding) -> Self {
        Self {
            chars: src.chars().peekable(),
            encoding,
        }
    }

    fn tokens(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '+' => {
                    self.chars.next();
                    tokens.push(Token::Plus);
                }
                '*' => {
                    self.chars.next();
                    tokens.push(Token::Star);
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::Open);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::Close);
                }
                '\'' | '"' => {
                    self.chars.next();
                    tokens.push(Token::Str(self.string(c)?));
                }
                '-' | '0'..='9' => tokens.push(Token::Int(self.int()?)),
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let ident = self.ident();
                    match (ident.as_str(), self.chars.peek()) {
                        ("b", Some(&quote @ ('\'' | '"'))) => {
                            self.chars.next();
                            tokens.push(Token::Str(self.string(quote)?));
                        }
                        _ => tokens.push(Token::Ident(ident)),
                    }
                }
                other => return Err(error(format!("unexpected character {other:?}"))),
            }
        }
        Ok(tokens)
    }

    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            ident.push(c);
            self.chars.next();
        }
        ident
    }

    fn int(&mut self) -> Result<i128> {
        let negative = self.chars.next_if_eq(&'-').is_some();
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            digits.push(c);
            self.chars.next();
        }
        let digits = digits.replace('_', "");
        let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => i128::from_str_radix(hex, 16),
            None => digits.parse(),
        }
        .map_err(|_| error(format!("invalid integer {digits:?}")))?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn string(&mut self, quote: char) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut plain = String::new();
        loop {
            let c = self.chars.next().ok_or_else(|| error("unterminated string"))?;
            if c == quote {
                break;
            }
            if c != '\\' {
                plain.push(c);
                continue;
            }
            let escaped = self.chars.next().ok_or_else(|| error("unterminated string"))?;
            let byte = match escaped {
                'n' => b'\n',
                'r' => b'\r',
                't' => b'\t',
                '0' => 0,
                'x' => {
                    let hex: String = self.chars.by_ref().take(2).collect();
                    u8::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 2)
                        .ok_or_else(|| error(format!("invalid escape \\x{hex}")))?
                }
                '\\' | '\'' | '"' => {
                    plain.push(escaped);
                    continue;
                }
                other => return Err(error(format!("unknown escape \\{other}"))),
            };
            out.extend_from_slice(&self.encoding.encode(&std::mem::take(&mut plain))?);
            out.push(byte);
        }
        out.extend_from_slice(&self.encoding.encode(&plain)?);
        Ok(out)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.bump() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(error(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    fn expr(&mut self) -> Result<Vec<u8>> {
        let mut out = self.term()?;
        while self.peek() == Some(&Token::Plus) {
            self.pos += 1;
            out.extend(self.term()?);
            check_size(out.len())?;
        }
        Ok(out)
    }

    fn term(&mut self) -> Result<Vec<u8>> {
        let mut out = self.atom()?;
        while self.peek() == Some(&Token::Star) {
            self.pos += 1;
            let count = match self.bump() {
                Some(Token::Int(n)) => usize::try_from(n).map_err(|_| error("negative repeat count"))?,
                other => return Err(error(format!("expected repeat count, found {other:?}"))),
            };
            check_size(out.len().saturating_mul(count))?;
            out = out.repeat(count);
        }
        Ok(out)
    }

    fn atom(&mut self) -> Result<Vec<u8>> {
        match self.bump() {
            Some(Token::Str(bytes)) => Ok(bytes),
            Some(Token::Open) => {
                let inner = self.expr()?;
                self.expect(&Token::Close)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let width = match name.as_str() {
                    "p8" => 1,
                    "p16" => 2,
                    "p32" => 4,
                    "p64" => 8,
                    _ => return Err(error(format!("unknown function {name:?}"))),
                };
                self.expect(&Token::Open)?;
                let value = match self.bump() {
                    Some(Token::Int(value)) => value,
                    other => return Err(error(format!("expected integer, found {other:?}"))),
                };
                self.expect(&Token::Close)?;
                pack(value, width)
            }
            Some(Token::Int(_)) => Err(error("an integer is not bytes; use a packer")),
            other => Err(error(format!("unexpected {other:?}"))),
        }
    }
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_OUTPUT {
        return Err(error(format!("result exceeds {MAX_OUTPUT} bytes")));
    }
    Ok(())
}

/// Packs `value` into `width` little-endian bytes, accepting both the
/// signed and the unsigned range of that width.
fn pack(value: i128, width: usize) -> Result<Vec<u8>> {
    let bits = width * 8;
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << bits) - 1;
    if value < min || value > max {
        return Err(error(format!("{value} does not fit in {bits} bits")));
    }
    let bytes = value.to_le_bytes();
    Ok(bytes[..width].to_vec())
}

/// Evaluates `src`, encoding string literals with `encoding`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for malformed expressions.
pub fn eval(src: &str, encoding: Encoding) -> Result<Vec<u8>> {
    let tokens = Lexer::new(src, encoding).tokens()?;
    if tokens.is_empty() {
        return Err(error("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let out = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(error(format!("trailing {token:?}")));
    }
    Ok(out)
}
