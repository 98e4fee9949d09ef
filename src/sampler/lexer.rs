//! Tokenizer for the sampler expression language.
//!
//! Produces a flat token stream; all errors are reported as
//! [`BcsvError::Expression`] with a byte position so the parser can hand
//! the message through to `CompileResult`.

use crate::error::{BcsvError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Decimal or `0x` hexadecimal integer literal.
    Int(i64),
    Float(f64),
    /// Single- or double-quoted string literal.
    Str(String),
    /// Identifier: `X`, `true`, `false`, column names are quoted instead.
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    OrOr,
    AndAnd,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    Caret,
    Amp,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Tilde);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    tokens.push(Token::Pipe);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    tokens.push(Token::Amp);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(BcsvError::expression(format!(
                        "unexpected '=' at position {i}; did you mean '=='?"
                    )));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => match bytes.get(i + 1) {
                Some(&b'=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                Some(&b'<') => {
                    tokens.push(Token::Shl);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => match bytes.get(i + 1) {
                Some(&b'=') => {
                    tokens.push(Token::Ge);
                    i += 2;
                }
                Some(&b'>') => {
                    tokens.push(Token::Shr);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            },
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                let mut j = i + 1;
                loop {
                    match bytes.get(j).map(|&b| b as char) {
                        None => {
                            return Err(BcsvError::expression(format!(
                                "unterminated string starting at position {i}"
                            )))
                        }
                        Some('\\') => {
                            match bytes.get(j + 1).map(|&b| b as char) {
                                Some(e @ ('\\' | '\'' | '"')) => s.push(e),
                                _ => {
                                    return Err(BcsvError::expression(format!(
                                        "bad escape in string at position {j}"
                                    )))
                                }
                            }
                            j += 2;
                        }
                        Some(q) if q == quote => {
                            j += 1;
                            break;
                        }
                        Some(_) => {
                            // multi-byte UTF-8 is copied verbatim
                            let ch_len = utf8_len(bytes[j]);
                            s.push_str(&src[j..j + ch_len]);
                            j += ch_len;
                        }
                    }
                }
                tokens.push(Token::Str(s));
                i = j;
            }
            '0'..='9' => {
                let (token, consumed) = lex_number(&src[i..], i)?;
                tokens.push(token);
                i += consumed;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(src[start..i].to_string()));
            }
            other => {
                return Err(BcsvError::expression(format!(
                    "unexpected character '{other}' at position {i}"
                )))
            }
        }
    }
    Ok(tokens)
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b & 0x80 == 0 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        _ => 4,
    }
}

fn lex_number(rest: &str, at: usize) -> Result<(Token, usize)> {
    let bytes = rest.as_bytes();
    if rest.starts_with("0x") || rest.starts_with("0X") {
        let mut j = 2;
        while j < bytes.len() && bytes[j].is_ascii_hexdigit() {
            j += 1;
        }
        if j == 2 {
            return Err(BcsvError::expression(format!(
                "hex literal with no digits at position {at}"
            )));
        }
        let value = i64::from_str_radix(&rest[2..j], 16)
            .map_err(|_| BcsvError::expression(format!("hex literal too large at position {at}")))?;
        return Ok((Token::Int(value), j));
    }

    let mut j = 0;
    let mut is_float = false;
    while j < bytes.len() && bytes[j].is_ascii_digit() {
        j += 1;
    }
    if j < bytes.len() && bytes[j] == b'.' {
        is_float = true;
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
    }
    if j < bytes.len() && (bytes[j] == b'e' || bytes[j] == b'E') {
        let mut k = j + 1;
        if k < bytes.len() && (bytes[k] == b'+' || bytes[k] == b'-') {
            k += 1;
        }
        if k < bytes.len() && bytes[k].is_ascii_digit() {
            is_float = true;
            j = k;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
        }
    }

    let text = &rest[..j];
    if is_float {
        let value: f64 = text
            .parse()
            .map_err(|_| BcsvError::expression(format!("bad float literal at position {at}")))?;
        Ok((Token::Float(value), j))
    } else {
        let value: i64 = text
            .parse()
            .map_err(|_| BcsvError::expression(format!("integer literal too large at position {at}")))?;
        Ok((Token::Int(value), j))
    }
}
