//! Statement splitter: groups the flat token stream into a tree of
//! statements before any real parsing happens.
//!
//! Each element of the output is either a simple statement (the tokens
//! preceding a `;`), a control-flow header (`if`/`for`/`while` through its
//! matching `)`), a bare `do`/`else` keyword promoted to its own
//! statement, or a nested block produced by `{ ... }`.

use crate::error::ParseError;
use crate::token::{Token, TokenKind};

/// One element of a statement tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A run of tokens forming one statement or control-flow header.
    Stmt(Vec<Token>),
    /// A `{ ... }` block of nested segments.
    Block(Vec<Segment>),
}

/// Does `statement` open like a function definition header
/// (`type ident (`)? Used to decide whether a `{` closes a pending header
/// or is a stray block opener.
fn is_function_header(statement: &[Token]) -> bool {
    statement.len() >= 3
        && statement[0].kind.is_decl_keyword()
        && matches!(statement[1].kind, TokenKind::Ident(_))
        && statement[2].kind == TokenKind::LParen
}

/// Split a token stream into nested statement lists.
///
/// Linear scan with a stack of open blocks; a parenthesis depth counter is
/// active only while consuming an `if`/`for`/`while` header, so the
/// semicolons inside a `for` header stay part of it.
pub fn split_statements(tokens: &[Token]) -> Result<Vec<Segment>, ParseError> {
    let mut stack: Vec<Vec<Segment>> = vec![Vec::new()];
    let mut statement: Vec<Token> = Vec::new();
    let mut header_depth: Option<usize> = None;

    for (index, token) in tokens.iter().enumerate() {
        if let Some(depth) = header_depth {
            statement.push(token.clone());
            match token.kind {
                TokenKind::LParen => header_depth = Some(depth + 1),
                TokenKind::RParen => {
                    if depth == 1 {
                        stack.last_mut().unwrap().push(Segment::Stmt(statement));
                        statement = Vec::new();
                        header_depth = None;
                    } else {
                        header_depth = Some(depth - 1);
                    }
                }
                _ => {}
            }
            continue;
        }

        match token.kind {
            TokenKind::Semicolon => {
                stack.last_mut().unwrap().push(Segment::Stmt(statement));
                statement = Vec::new();
            }
            TokenKind::LBrace => {
                if is_function_header(&statement) {
                    // The pending tokens are a function header; close them
                    // as their own statement before opening the body.
                    stack.last_mut().unwrap().push(Segment::Stmt(statement));
                    statement = Vec::new();
                } else if !statement.is_empty() {
                    return Err(ParseError::at("expected ';' before '{'", token));
                }
                stack.push(Vec::new());
            }
            TokenKind::RBrace => {
                if !statement.is_empty() {
                    return Err(ParseError::at("expected ';' before '}'", token));
                }
                if stack.len() == 1 {
                    return Err(ParseError::at("unexpected '}'", token));
                }
                let block = stack.pop().unwrap();
                stack.last_mut().unwrap().push(Segment::Block(block));
            }
            TokenKind::If | TokenKind::For | TokenKind::While => {
                if !statement.is_empty() {
                    return Err(ParseError::at(
                        format!("expected ';' before '{}'", token.kind),
                        token,
                    ));
                }
                match tokens.get(index + 1) {
                    Some(next) if next.kind == TokenKind::LParen => {}
                    Some(next) => {
                        return Err(ParseError::at(
                            format!("expected '(' after '{}'", token.kind),
                            next,
                        ));
                    }
                    None => {
                        return Err(ParseError::at("unexpected end of file", token));
                    }
                }
                statement.push(token.clone());
                header_depth = Some(0);
            }
            TokenKind::Do | TokenKind::Else => {
                if !statement.is_empty() {
                    return Err(ParseError::at(
                        format!("expected ';' before '{}'", token.kind),
                        token,
                    ));
                }
                stack
                    .last_mut()
                    .unwrap()
                    .push(Segment::Stmt(vec![token.clone()]));
            }
            _ => statement.push(token.clone()),
        }
    }

    if let Some(last) = tokens.last() {
        if stack.len() != 1 || header_depth.is_some() {
            return Err(ParseError::at("unexpected end of file", last));
        }
        if !statement.is_empty() {
            return Err(ParseError::at("expected ';'", last));
        }
    }
    Ok(stack.pop().unwrap())
}
