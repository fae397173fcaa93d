use crate::error::{DlError, Result};

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A quoted string with escapes resolved.
    Str(String),
    /// A numeric literal, kept as written (sign, `0x`, `0b`, fraction, exponent).
    Number(String),
    /// A bare word: member names, enum values, `true`, `max`, `inf`, `-inf`.
    Ident(String),
    /// End of input
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::LBrace => "'{'".into(),
            Token::RBrace => "'}'".into(),
            Token::LBracket => "'['".into(),
            Token::RBracket => "']'".into(),
            Token::Colon => "':'".into(),
            Token::Comma => "','".into(),
            Token::Str(s) => format!("string {:?}", s),
            Token::Number(n) => format!("number {}", n),
            Token::Ident(i) => format!("'{}'", i),
            Token::Eof => "end of input".into(),
        }
    }
}

/// A token with its source location.
#[derive(Debug, Clone)]
pub struct Located {
    pub token: Token,
    pub line: usize,
}

/// Tokenizer for the JSON-like text formats.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn current_line(&self) -> usize {
        self.line
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_byte_at(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            match (self.peek_byte(), self.peek_byte_at(1)) {
                (Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n'), _) => {
                    self.advance();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.advance() {
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let line = self.line;
                    self.pos += 2;
                    loop {
                        match self.advance() {
                            Some(b'*') if self.peek_byte() == Some(b'/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(DlError::text(line, "unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        if self.peek_byte() == Some(b'-') {
            self.advance();
        }
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos;
        if matches!(self.peek_byte(), Some(b'-') | Some(b'+')) {
            self.advance();
        }
        let hex = self.peek_byte() == Some(b'0')
            && matches!(self.peek_byte_at(1), Some(b'x') | Some(b'X'));
        while let Some(b) = self.peek_byte() {
            let exponent_sign = !hex
                && (b == b'-' || b == b'+')
                && matches!(self.input.get(self.pos - 1), Some(b'e') | Some(b'E'));
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || exponent_sign {
                self.advance();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_string(&mut self) -> Result<String> {
        let line = self.line;
        self.advance(); // opening quote
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.advance() {
                None => return Err(DlError::text(line, "unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => {
                    let esc = self
                        .advance()
                        .ok_or_else(|| DlError::text(line, "unterminated string"))?;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let c = self.read_unicode_escape()?;
                            let mut tmp = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                        }
                        other => {
                            return Err(DlError::text(
                                self.line,
                                format!("invalid escape '\\{}'", other as char),
                            ))
                        }
                    }
                }
                Some(b) => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| DlError::text(line, "string is not valid UTF-8"))
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let mut v = 0u32;
        for _ in 0..4 {
            let b = self
                .advance()
                .ok_or_else(|| DlError::text(self.line, "truncated \\u escape"))?;
            let d = (b as char)
                .to_digit(16)
                .ok_or_else(|| DlError::text(self.line, "invalid \\u escape"))?;
            v = v * 16 + d;
        }
        Ok(v)
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let hi = self.read_hex4()?;
        let code = if (0xD800..0xDC00).contains(&hi) {
            if self.advance() != Some(b'\\') || self.advance() != Some(b'u') {
                return Err(DlError::text(self.line, "unpaired surrogate in \\u escape"));
            }
            let lo = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&lo) {
                return Err(DlError::text(self.line, "unpaired surrogate in \\u escape"));
            }
            0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
        } else {
            hi
        };
        char::from_u32(code).ok_or_else(|| DlError::text(self.line, "invalid \\u escape"))
    }

    /// Read the next token.
    pub fn next_token(&mut self) -> Result<Located> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;

        let token = match self.peek_byte() {
            None => return Ok(Located { token: Token::Eof, line }),
            Some(b'{') => Token::LBrace,
            Some(b'}') => Token::RBrace,
            Some(b'[') => Token::LBracket,
            Some(b']') => Token::RBracket,
            Some(b':') => Token::Colon,
            Some(b',') => Token::Comma,
            Some(b'"') => {
                let s = self.read_string()?;
                return Ok(Located { token: Token::Str(s), line });
            }
            Some(b'-') if self.peek_byte_at(1).is_some_and(|b| b.is_ascii_alphabetic()) => {
                let word = self.read_word();
                return Ok(Located { token: Token::Ident(word), line });
            }
            Some(b) if b.is_ascii_digit() || b == b'-' || b == b'+' => {
                let num = self.read_number();
                return Ok(Located { token: Token::Number(num), line });
            }
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
                let word = self.read_word();
                return Ok(Located { token: Token::Ident(word), line });
            }
            Some(b) => {
                return Err(DlError::text(line, format!("unexpected character '{}'", b as char)));
            }
        };
        self.advance();
        Ok(Located { token, line })
    }

    /// Peek at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Located> {
        let saved_pos = self.pos;
        let saved_line = self.line;
        let tok = self.next_token();
        self.pos = saved_pos;
        self.line = saved_line;
        tok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lex = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lex.next_token().unwrap().token;
            if tok == Token::Eof {
                return out;
            }
            out.push(tok);
        }
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            tokens(r#"{ "a" : [1, -2.5e-3], b: x }"#),
            vec![
                Token::LBrace,
                Token::Str("a".into()),
                Token::Colon,
                Token::LBracket,
                Token::Number("1".into()),
                Token::Comma,
                Token::Number("-2.5e-3".into()),
                Token::RBracket,
                Token::Comma,
                Token::Ident("b".into()),
                Token::Colon,
                Token::Ident("x".into()),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("// line\n{ /* block\n comment */ }"),
            vec![Token::LBrace, Token::RBrace]
        );
        let mut lex = Lexer::new("/* open");
        assert!(lex.next_token().is_err());
    }

    #[test]
    fn test_special_words() {
        assert_eq!(
            tokens("inf -inf nan 0x1F 0b101"),
            vec![
                Token::Ident("inf".into()),
                Token::Ident("-inf".into()),
                Token::Ident("nan".into()),
                Token::Number("0x1F".into()),
                Token::Number("0b101".into()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a\"b\\c\n\u00e9\ud83d\ude00""#),
            vec![Token::Str("a\"b\\c\n\u{e9}\u{1F600}".into())]
        );
        let mut lex = Lexer::new(r#""bad \q""#);
        assert!(lex.next_token().is_err());
    }

    #[test]
    fn test_line_tracking() {
        let mut lex = Lexer::new("a\nb\n\nc");
        assert_eq!(lex.next_token().unwrap().line, 1);
        assert_eq!(lex.next_token().unwrap().line, 2);
        assert_eq!(lex.next_token().unwrap().line, 4);
    }
}
