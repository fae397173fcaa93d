use crate::error::{DlError, Result};
use super::ast::*;
use super::lexer::{Lexer, Token};

/// Maximum nesting of objects and arrays.
const MAX_NESTING: usize = 256;

/// Parse a whole document: exactly one value followed by end of input.
pub fn parse_document(input: &str) -> Result<Node> {
    let mut lexer = Lexer::new(input);
    let node = parse_value(&mut lexer, 0)?;
    let tok = lexer.next_token()?;
    if tok.token != Token::Eof {
        return Err(DlError::text(
            tok.line,
            format!("expected end of input, found {}", tok.token.describe()),
        ));
    }
    Ok(node)
}

fn parse_value(lexer: &mut Lexer, depth: usize) -> Result<Node> {
    if depth > MAX_NESTING {
        return Err(DlError::text(lexer.current_line(), "nesting too deep"));
    }
    let tok = lexer.next_token()?;
    let line = tok.line;
    let kind = match tok.token {
        Token::LBrace => NodeKind::Map(parse_entries(lexer, depth)?),
        Token::LBracket => NodeKind::List(parse_items(lexer, depth)?),
        Token::Str(s) => NodeKind::Str(s),
        Token::Number(n) => NodeKind::Number(n),
        Token::Ident(i) => NodeKind::Ident(i),
        other => {
            return Err(DlError::text(
                line,
                format!("expected a value, found {}", other.describe()),
            ))
        }
    };
    Ok(Node { kind, line })
}

fn parse_entries(lexer: &mut Lexer, depth: usize) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    if lexer.peek_token()?.token == Token::RBrace {
        lexer.next_token()?;
        return Ok(entries);
    }
    loop {
        let (key, line) = expect_key(lexer)?;
        expect_token(lexer, Token::Colon)?;
        let value = parse_value(lexer, depth + 1)?;
        entries.push(Entry { key, line, value });

        let tok = lexer.next_token()?;
        match tok.token {
            Token::Comma => continue,
            Token::RBrace => return Ok(entries),
            other => {
                return Err(DlError::text(
                    tok.line,
                    format!("expected ',' or '}}', found {}", other.describe()),
                ))
            }
        }
    }
}

fn parse_items(lexer: &mut Lexer, depth: usize) -> Result<Vec<Node>> {
    let mut items = Vec::new();
    if lexer.peek_token()?.token == Token::RBracket {
        lexer.next_token()?;
        return Ok(items);
    }
    loop {
        items.push(parse_value(lexer, depth + 1)?);
        let tok = lexer.next_token()?;
        match tok.token {
            Token::Comma => continue,
            Token::RBracket => return Ok(items),
            other => {
                return Err(DlError::text(
                    tok.line,
                    format!("expected ',' or ']', found {}", other.describe()),
                ))
            }
        }
    }
}

// --- Helpers ---

fn expect_key(lexer: &mut Lexer) -> Result<(String, usize)> {
    let tok = lexer.next_token()?;
    match tok.token {
        Token::Str(s) | Token::Ident(s) => Ok((s, tok.line)),
        other => Err(DlError::text(
            tok.line,
            format!("expected a key, found {}", other.describe()),
        )),
    }
}

fn expect_token(lexer: &mut Lexer, expected: Token) -> Result<()> {
    let tok = lexer.next_token()?;
    if tok.token == expected {
        Ok(())
    } else {
        Err(DlError::text(
            tok.line,
            format!("expected {}, found {}", expected.describe(), tok.token.describe()),
        ))
    }
}
