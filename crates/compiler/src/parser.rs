//! Parser: nested statement lists in, typed AST out.
//!
//! Statement parsing classifies each segment by its first token;
//! expression parsing is precedence climbing over the flat token run of
//! one statement. Two tokens are rewritten in place during the scan the
//! same way the splitter never sees them: a `(` directly following an
//! identifier becomes the function-application operator, and a `-` in
//! prefix position becomes additive negation.
//!
//! Operator nodes are created with a provisional type tag and *promoted*
//! once their operands are parsed: the `(operator, operand type)` pair is
//! looked up in the promotion table and the node is retagged with the
//! concrete result type, or parsing fails when the combination is
//! unsupported.

use crate::ast::{
    Ast, BinaryOp, NodeId, NodeKind, RESULT_SLOT, RETURN_ADDRESS_SLOT, UnaryOp, promote_binary,
};
use crate::error::ParseError;
use crate::splitter::{Segment, split_statements};
use crate::token::{Token, TokenKind};
use fc_core::ScalarType;
use std::collections::HashMap;

/// Parse a token stream into a typed tree rooted at the global block.
pub fn parse(tokens: &[Token]) -> Result<Ast, ParseError> {
    let segments = split_statements(tokens)?;
    let mut ast = Ast::new();
    let root = ast.root();
    parse_block(&mut ast, &segments, root)?;
    Ok(ast)
}

fn scalar_type(token: &Token) -> Result<ScalarType, ParseError> {
    match token.kind {
        TokenKind::Int => Ok(ScalarType::Int),
        TokenKind::Char => Ok(ScalarType::Char),
        TokenKind::Float => Ok(ScalarType::Float),
        _ => Err(ParseError::at("invalid variable type", token)),
    }
}

fn return_type(token: &Token) -> Result<Option<ScalarType>, ParseError> {
    match token.kind {
        TokenKind::Void => Ok(None),
        TokenKind::Int => Ok(Some(ScalarType::Int)),
        TokenKind::Char => Ok(Some(ScalarType::Char)),
        TokenKind::Float => Ok(Some(ScalarType::Float)),
        _ => Err(ParseError::at("invalid function return type", token)),
    }
}

/// Split at commas that are not nested inside parentheses. Interior empty
/// chunks are preserved (they are syntax errors for the caller to report);
/// a trailing empty chunk is dropped.
fn split_at_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::Apply => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                parts.push(&tokens[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// Split at every semicolon, keeping empty parts (used for `for` headers,
/// which must have exactly three).
fn split_at_semicolons(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Semicolon {
            parts.push(&tokens[start..index]);
            start = index + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

fn parse_block(ast: &mut Ast, segments: &[Segment], parent: NodeId) -> Result<(), ParseError> {
    let mut skip = 0;
    for (index, segment) in segments.iter().enumerate() {
        if skip > 0 {
            skip -= 1;
            continue;
        }
        match segment {
            Segment::Block(inner) => {
                let block = ast.add_node(
                    parent,
                    NodeKind::Block {
                        symbols: HashMap::new(),
                    },
                );
                parse_block(ast, inner, block)?;
            }
            Segment::Stmt(tokens) => {
                if tokens.is_empty() {
                    continue;
                }
                skip = parse_statement(ast, tokens, segments, index, parent)?;
            }
        }
    }
    Ok(())
}

/// Parse one statement. Returns how many of the *following* segments it
/// consumed (control-flow bodies, else branches).
fn parse_statement(
    ast: &mut Ast,
    tokens: &[Token],
    segments: &[Segment],
    index: usize,
    parent: NodeId,
) -> Result<usize, ParseError> {
    let first = &tokens[0];
    match first.kind {
        TokenKind::Int | TokenKind::Char | TokenKind::Float | TokenKind::Void => {
            let is_function = tokens.len() >= 3
                && matches!(tokens[1].kind, TokenKind::Ident(_))
                && tokens[2].kind == TokenKind::LParen;
            if is_function {
                let body = match segments.get(index + 1) {
                    Some(Segment::Block(body)) => body,
                    Some(Segment::Stmt(_)) => {
                        return Err(ParseError::at("block expected", first));
                    }
                    None => return Err(ParseError::at("unexpected end of file", first)),
                };
                parse_function(ast, tokens, body, parent)?;
                Ok(1)
            } else {
                parse_variable_decl(ast, tokens, parent)?;
                Ok(0)
            }
        }
        TokenKind::If => parse_if(ast, tokens, segments, index, parent),
        TokenKind::While => parse_while(ast, tokens, segments, index, parent),
        TokenKind::For => parse_for(ast, tokens, segments, index, parent),
        TokenKind::Return => {
            parse_return(ast, tokens, parent)?;
            Ok(0)
        }
        TokenKind::Else => Err(ParseError::at("'else' without a matching 'if'", first)),
        TokenKind::Do => Err(ParseError::at("'do' loops are not supported", first)),
        _ => {
            // Expression statement: evaluate for side effects, then
            // release whatever the expression left on the stack.
            let discard = ast.add_node(parent, NodeKind::Discard);
            expression(ast, tokens.to_vec(), discard)?;
            Ok(0)
        }
    }
}

fn parse_function(
    ast: &mut Ast,
    header: &[Token],
    body: &[Segment],
    parent: NodeId,
) -> Result<(), ParseError> {
    if parent != ast.root() {
        return Err(ParseError::at("functions must be defined globally", &header[0]));
    }
    let ret = return_type(&header[0])?;
    let TokenKind::Ident(name) = &header[1].kind else {
        return Err(ParseError::at("identifier expected", &header[1]));
    };
    let name = name.clone();
    let last = header.last().unwrap();
    if last.kind != TokenKind::RParen {
        return Err(ParseError::at("')' expected", last));
    }

    let func = ast.add_node(
        parent,
        NodeKind::Function {
            name: name.clone(),
            ret,
            params: Vec::new(),
            symbols: HashMap::new(),
            return_slot: None,
            result_slot: None,
        },
    );
    // Register the name before the body parses so the function can call
    // itself.
    ast.add_symbol(parent, &name, func)
        .map_err(|message| ParseError::at(message, &header[1]))?;

    // Hidden frame slots: the return address, and a result slot for
    // non-void functions. They live in the symbol table only.
    let return_slot = ast.add_hidden(
        func,
        NodeKind::VarDef {
            name: RETURN_ADDRESS_SLOT.to_string(),
            ty: ScalarType::Int,
            offset: 0,
        },
    );
    ast.add_symbol(func, RETURN_ADDRESS_SLOT, return_slot)
        .map_err(|message| ParseError::at(message, &header[1]))?;
    let result_slot = match ret {
        Some(ty) => {
            let slot = ast.add_hidden(
                func,
                NodeKind::VarDef {
                    name: RESULT_SLOT.to_string(),
                    ty,
                    offset: 0,
                },
            );
            ast.add_symbol(func, RESULT_SLOT, slot)
                .map_err(|message| ParseError::at(message, &header[1]))?;
            Some(slot)
        }
        None => None,
    };

    let mut params = Vec::new();
    for decl in split_at_commas(&header[3..header.len() - 1]) {
        let [ty_token, name_token] = decl else {
            let at = decl.first().unwrap_or(&header[2]);
            return Err(ParseError::at("invalid parameter syntax", at));
        };
        let ty = scalar_type(ty_token)?;
        let TokenKind::Ident(param_name) = &name_token.kind else {
            return Err(ParseError::at("identifier expected", name_token));
        };
        let param_name = param_name.clone();
        let param = ast.add_hidden(
            func,
            NodeKind::VarDef {
                name: param_name.clone(),
                ty,
                offset: 0,
            },
        );
        ast.add_symbol(func, &param_name, param)
            .map_err(|message| ParseError::at(message, name_token))?;
        params.push(param);
    }

    if name == "main" {
        if ret.is_some() {
            return Err(ParseError::at("'main' function must be void", &header[0]));
        }
        if !params.is_empty() {
            return Err(ParseError::at(
                "'main' function may not have arguments",
                &header[3],
            ));
        }
    }

    if let NodeKind::Function {
        params: slots,
        return_slot: ra,
        result_slot: res,
        ..
    } = &mut ast.node_mut(func).kind
    {
        *slots = params;
        *ra = Some(return_slot);
        *res = result_slot;
    }

    parse_block(ast, body, func)
}

fn parse_variable_decl(
    ast: &mut Ast,
    tokens: &[Token],
    parent: NodeId,
) -> Result<(), ParseError> {
    let ty = scalar_type(&tokens[0])?;
    if tokens.len() < 2 {
        return Err(ParseError::at("identifier expected", &tokens[0]));
    }
    for decl in split_at_commas(&tokens[1..]) {
        let Some(first) = decl.first() else {
            return Err(ParseError::at("identifier expected", &tokens[0]));
        };
        let TokenKind::Ident(name) = &first.kind else {
            return Err(ParseError::at("identifier expected", first));
        };
        let name = name.clone();
        let var = ast.add_node(
            parent,
            NodeKind::VarDef {
                name: name.clone(),
                ty,
                offset: 0,
            },
        );
        ast.add_symbol(parent, &name, var)
            .map_err(|message| ParseError::at(message, first))?;
        if decl.len() > 1 {
            if decl[1].kind != TokenKind::Assign {
                return Err(ParseError::at("'=' or ',' expected", &decl[1]));
            }
            if decl.len() < 3 {
                return Err(ParseError::at("expression expected", &decl[1]));
            }
            expression(ast, decl[2..].to_vec(), var)?;
        }
    }
    Ok(())
}

/// Attach the segment at `at` as a branch/body block under `parent`. A
/// bare statement is treated as a one-statement block.
fn attach_branch(
    ast: &mut Ast,
    segments: &[Segment],
    at: usize,
    parent: NodeId,
    context: &Token,
) -> Result<(), ParseError> {
    let segment = segments
        .get(at)
        .ok_or_else(|| ParseError::at("statement expected", context))?;
    let block = ast.add_node(
        parent,
        NodeKind::Block {
            symbols: HashMap::new(),
        },
    );
    match segment {
        Segment::Block(inner) => parse_block(ast, inner, block),
        Segment::Stmt(_) => parse_block(ast, std::slice::from_ref(segment), block),
    }
}

fn parse_if(
    ast: &mut Ast,
    tokens: &[Token],
    segments: &[Segment],
    index: usize,
    parent: NodeId,
) -> Result<usize, ParseError> {
    let node = ast.add_node(parent, NodeKind::If);
    expression(ast, tokens[1..].to_vec(), node)?;
    attach_branch(ast, segments, index + 1, node, &tokens[0])?;
    // A following `[else]` statement binds its successor as the else
    // branch of this if.
    if let Some(Segment::Stmt(next)) = segments.get(index + 2) {
        if matches!(next.first().map(|t| &t.kind), Some(TokenKind::Else)) {
            attach_branch(ast, segments, index + 3, node, &next[0])?;
            return Ok(3);
        }
    }
    Ok(1)
}

fn parse_while(
    ast: &mut Ast,
    tokens: &[Token],
    segments: &[Segment],
    index: usize,
    parent: NodeId,
) -> Result<usize, ParseError> {
    let node = ast.add_node(parent, NodeKind::While);
    expression(ast, tokens[1..].to_vec(), node)?;
    attach_branch(ast, segments, index + 1, node, &tokens[0])?;
    Ok(1)
}

/// `for (init; cond; step) body` desugars to
/// `{ init; while (cond) { body; step; } }`.
fn parse_for(
    ast: &mut Ast,
    tokens: &[Token],
    segments: &[Segment],
    index: usize,
    parent: NodeId,
) -> Result<usize, ParseError> {
    let header = &tokens[2..tokens.len() - 1];
    let parts = split_at_semicolons(header);
    let [init, cond, step] = parts.as_slice() else {
        return Err(ParseError::at(
            "'for' header must have three ';'-separated parts",
            &tokens[0],
        ));
    };

    let outer = ast.add_node(
        parent,
        NodeKind::Block {
            symbols: HashMap::new(),
        },
    );
    if !init.is_empty() {
        let init_segment = [Segment::Stmt(init.to_vec())];
        parse_block(ast, &init_segment, outer)?;
    }

    let node = ast.add_node(outer, NodeKind::While);
    if cond.is_empty() {
        return Err(ParseError::at("expression expected in 'for' condition", &tokens[0]));
    }
    expression(ast, cond.to_vec(), node)?;

    let body = ast.add_node(
        node,
        NodeKind::Block {
            symbols: HashMap::new(),
        },
    );
    let body_segment = segments
        .get(index + 1)
        .ok_or_else(|| ParseError::at("statement expected", &tokens[0]))?;
    match body_segment {
        Segment::Block(inner) => parse_block(ast, inner, body)?,
        Segment::Stmt(_) => parse_block(ast, std::slice::from_ref(body_segment), body)?,
    }
    // The step expression runs after the user body on every iteration.
    if !step.is_empty() {
        let step_segment = [Segment::Stmt(step.to_vec())];
        parse_block(ast, &step_segment, body)?;
    }
    Ok(1)
}

fn parse_return(ast: &mut Ast, tokens: &[Token], parent: NodeId) -> Result<(), ParseError> {
    let function = ast
        .enclosing_function(parent)
        .ok_or_else(|| ParseError::at("'return' outside a function", &tokens[0]))?;
    let node = ast.add_node(parent, NodeKind::Return { function });
    if tokens.len() > 1 {
        expression(ast, tokens[1..].to_vec(), node)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Expression parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum Assoc {
    Left,
    Right,
}

/// Base precedence and associativity, lowest first. Parenthesis nesting
/// adds 1000 per level on top.
fn precedence(kind: &TokenKind) -> Option<(usize, Assoc)> {
    use TokenKind::*;
    let entry = match kind {
        Comma => (0, Assoc::Left),
        Backtick => (1, Assoc::Right),
        Assign | AddAssign | SubAssign | MulAssign | DivAssign | ModAssign | BandAssign
        | BorAssign | XorAssign | ShlAssign | ShrAssign => (2, Assoc::Right),
        Lor => (3, Assoc::Left),
        Land => (4, Assoc::Left),
        Bor => (5, Assoc::Left),
        Xor => (6, Assoc::Left),
        Band => (7, Assoc::Left),
        Eq | Neq => (8, Assoc::Left),
        Gt | Gte | Lt | Lte => (9, Assoc::Left),
        Shl | Shr => (10, Assoc::Left),
        Add | Sub => (11, Assoc::Left),
        Mul | Div | Mod => (12, Assoc::Left),
        Bnot | Lnot | Negate => (13, Assoc::Right),
        Apply => (14, Assoc::Left),
        _ => return None,
    };
    Some(entry)
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Add => BinaryOp::Add,
        TokenKind::Sub => BinaryOp::Sub,
        TokenKind::Mul => BinaryOp::Mul,
        TokenKind::Div => BinaryOp::Div,
        TokenKind::Mod => BinaryOp::Mod,
        TokenKind::Band => BinaryOp::Band,
        TokenKind::Bor => BinaryOp::Bor,
        TokenKind::Xor => BinaryOp::Xor,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Land => BinaryOp::Land,
        TokenKind::Lor => BinaryOp::Lor,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Neq => BinaryOp::Neq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Gte => BinaryOp::Gte,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Lte => BinaryOp::Lte,
        _ => return None,
    };
    Some(op)
}

fn compound_op(kind: &TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::AddAssign => BinaryOp::Add,
        TokenKind::SubAssign => BinaryOp::Sub,
        TokenKind::MulAssign => BinaryOp::Mul,
        TokenKind::DivAssign => BinaryOp::Div,
        TokenKind::ModAssign => BinaryOp::Mod,
        TokenKind::BandAssign => BinaryOp::Band,
        TokenKind::BorAssign => BinaryOp::Bor,
        TokenKind::XorAssign => BinaryOp::Xor,
        TokenKind::ShlAssign => BinaryOp::Shl,
        TokenKind::ShrAssign => BinaryOp::Shr,
        _ => return None,
    };
    Some(op)
}

fn unary_op(kind: &TokenKind) -> Option<UnaryOp> {
    let op = match kind {
        TokenKind::Backtick => UnaryOp::Backtick,
        TokenKind::Bnot => UnaryOp::Bnot,
        TokenKind::Lnot => UnaryOp::Lnot,
        TokenKind::Negate => UnaryOp::Neg,
        _ => return None,
    };
    Some(op)
}

/// Parse one expression from a flat token run and attach it to `parent`.
///
/// The scan finds the lowest-precedence operator (rightmost on ties for
/// left-associative levels, leftmost for right-associative ones) and
/// splits there; parenthesized groups are pushed out of reach by the
/// depth weight.
fn expression(
    ast: &mut Ast,
    mut tokens: Vec<Token>,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    let Some(first) = tokens.first() else {
        return Err(ParseError::new("expression expected", 0, 0));
    };
    let first = first.clone();

    let mut depth = 0usize;
    let mut best: Option<(usize, usize)> = None;
    let mut prev_is_ident = false;
    let mut prev_is_operand = false;

    for index in 0..tokens.len() {
        if tokens[index].kind == TokenKind::LParen {
            if prev_is_ident {
                // Function application binds the identifier to its
                // argument list.
                tokens[index].kind = TokenKind::Apply;
            } else {
                depth += 1;
                prev_is_ident = false;
                prev_is_operand = false;
                continue;
            }
        } else if tokens[index].kind == TokenKind::RParen {
            if depth == 0 {
                return Err(ParseError::at("unexpected ')'", &tokens[index]));
            }
            depth -= 1;
            prev_is_ident = false;
            prev_is_operand = true;
            continue;
        } else if tokens[index].kind == TokenKind::Sub && !prev_is_operand {
            // Prefix position: this minus negates, it does not subtract.
            tokens[index].kind = TokenKind::Negate;
        }

        let kind = &tokens[index].kind;
        if let Some((base, assoc)) = precedence(kind) {
            if *kind == TokenKind::Apply {
                depth += 1;
            }
            let prec = base + 1000 * depth;
            let better = match (best, assoc) {
                (None, _) => true,
                (Some((current, _)), Assoc::Left) => prec <= current,
                (Some((current, _)), Assoc::Right) => prec < current,
            };
            if better {
                best = Some((prec, index));
            }
            prev_is_ident = false;
            prev_is_operand = false;
        } else {
            match kind {
                TokenKind::Ident(_) => {
                    prev_is_ident = true;
                    prev_is_operand = true;
                }
                TokenKind::IntConst(_) | TokenKind::CharConst(_) | TokenKind::FloatConst(_) => {
                    prev_is_ident = false;
                    prev_is_operand = true;
                }
                _ => {
                    return Err(ParseError::at(
                        format!("illegal or unsupported token '{}'", kind),
                        &tokens[index],
                    ));
                }
            }
        }
    }

    if depth != 0 {
        return Err(ParseError::at("')' expected", tokens.last().unwrap()));
    }

    match best {
        None => leaf(ast, &tokens, parent, &first),
        Some((prec, index)) if prec < 1000 => split_at_operator(ast, tokens, index, parent),
        Some(_) => {
            // Every operator is parenthesized: the fragment is either a
            // whole function call or a wrapped expression.
            if tokens.len() >= 2
                && matches!(tokens[0].kind, TokenKind::Ident(_))
                && tokens[1].kind == TokenKind::Apply
            {
                function_call(ast, &tokens, parent)
            } else if tokens[0].kind == TokenKind::LParen
                && tokens.last().unwrap().kind == TokenKind::RParen
            {
                expression(ast, tokens[1..tokens.len() - 1].to_vec(), parent)
            } else {
                Err(ParseError::at("invalid syntax", &tokens[0]))
            }
        }
    }
}

/// An operator-free fragment: a constant, a variable reference, or a
/// parenthesized subexpression.
fn leaf(
    ast: &mut Ast,
    tokens: &[Token],
    parent: NodeId,
    context: &Token,
) -> Result<NodeId, ParseError> {
    if tokens.len() == 1 {
        return match &tokens[0].kind {
            TokenKind::Ident(name) => variable_ref(ast, &tokens[0], &name.clone(), parent),
            TokenKind::IntConst(v) => Ok(ast.add_node(parent, NodeKind::IntConst(*v))),
            TokenKind::CharConst(v) => Ok(ast.add_node(parent, NodeKind::CharConst(*v))),
            TokenKind::FloatConst(v) => Ok(ast.add_node(parent, NodeKind::FloatConst(*v))),
            _ => Err(ParseError::at("identifier or constant expected", &tokens[0])),
        };
    }
    if tokens.len() >= 2
        && tokens[0].kind == TokenKind::LParen
        && tokens.last().unwrap().kind == TokenKind::RParen
    {
        if tokens.len() == 2 {
            return Err(ParseError::at("expression expected", &tokens[0]));
        }
        return expression(ast, tokens[1..tokens.len() - 1].to_vec(), parent);
    }
    Err(ParseError::at("operator expected", context))
}

fn variable_ref(
    ast: &mut Ast,
    token: &Token,
    name: &str,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    let def = ast.lookup(parent, name).ok_or_else(|| {
        ParseError::at(format!("undefined identifier '{}'", name), token)
    })?;
    match ast.node(def).kind {
        NodeKind::VarDef { ty, .. } => Ok(ast.add_node(parent, NodeKind::VarRef { def, ty })),
        _ => Err(ParseError::at("variable expected", token)),
    }
}

fn split_at_operator(
    ast: &mut Ast,
    tokens: Vec<Token>,
    index: usize,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    let kind = tokens[index].kind.clone();

    if kind == TokenKind::Comma {
        return comma(ast, tokens, index, parent);
    }
    if kind == TokenKind::Assign {
        return assignment(ast, tokens, index, None, parent);
    }
    if let Some(op) = compound_op(&kind) {
        return assignment(ast, tokens, index, Some(op), parent);
    }
    if let Some(op) = unary_op(&kind) {
        return unary(ast, tokens, index, op, parent);
    }
    if let Some(op) = binary_op(&kind) {
        return binary(ast, tokens, index, op, parent);
    }
    Err(ParseError::at("operator expected", &tokens[index]))
}

fn comma(
    ast: &mut Ast,
    tokens: Vec<Token>,
    index: usize,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    if index == 0 || index + 1 >= tokens.len() {
        return Err(ParseError::at("expression expected", &tokens[index]));
    }
    let node = ast.add_node(
        parent,
        NodeKind::Comma {
            ty: ScalarType::Int,
        },
    );
    expression(ast, tokens[..index].to_vec(), node)?;
    let right = expression(ast, tokens[index + 1..].to_vec(), node)?;
    // The comma keeps only its right operand: that is the type of the
    // whole expression.
    let ty = ast
        .expr_type(right)
        .ok_or_else(|| ParseError::at("expression expected for ','", &tokens[index]))?;
    ast.set_kind(node, NodeKind::Comma { ty });
    Ok(node)
}

fn assignment(
    ast: &mut Ast,
    tokens: Vec<Token>,
    index: usize,
    compound: Option<BinaryOp>,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    if index != 1 || !matches!(tokens[0].kind, TokenKind::Ident(_)) {
        let at = if index == 0 { index } else { index - 1 };
        return Err(ParseError::at("variable expected", &tokens[at]));
    }
    if index + 1 >= tokens.len() {
        return Err(ParseError::at("expression expected", &tokens[index]));
    }
    let TokenKind::Ident(name) = tokens[0].kind.clone() else {
        unreachable!()
    };

    let node = ast.add_node(
        parent,
        NodeKind::Assign {
            ty: ScalarType::Int,
        },
    );
    let target = variable_ref(ast, &tokens[0], &name, node)?;
    let ty = ast.expr_type(target).expect("variable references are typed");

    match compound {
        None => {
            expression(ast, tokens[index + 1..].to_vec(), node)?;
        }
        Some(op) => {
            // Desugar `x op= e` to `x = x op e`, parsing `e` once.
            let operation = ast.add_node(node, NodeKind::Binary { op, ty });
            variable_ref(ast, &tokens[0], &name, operation)?;
            expression(ast, tokens[index + 1..].to_vec(), operation)?;
            let result = promote_binary(op, ty).ok_or_else(|| {
                ParseError::at(
                    format!("'{}' is not defined for {} expressions", op, ty),
                    &tokens[index],
                )
            })?;
            ast.set_kind(operation, NodeKind::Binary { op, ty: result });
        }
    }

    // The assignment takes the type of its target; a mismatched
    // right-hand side is rejected by validation.
    ast.set_kind(node, NodeKind::Assign { ty });
    Ok(node)
}

fn unary(
    ast: &mut Ast,
    tokens: Vec<Token>,
    index: usize,
    op: UnaryOp,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    if index != 0 {
        return Err(ParseError::at(
            format!("unexpected token before '{}'", op),
            &tokens[0],
        ));
    }
    if tokens.len() < 2 {
        return Err(ParseError::at("expression expected", &tokens[index]));
    }
    let node = ast.add_node(
        parent,
        NodeKind::Unary {
            op,
            ty: ScalarType::Int,
        },
    );
    let operand = expression(ast, tokens[1..].to_vec(), node)?;
    let operand_ty = ast
        .expr_type(operand)
        .ok_or_else(|| ParseError::at(format!("expression expected for '{}'", op), &tokens[0]))?;
    let ty = crate::ast::promote_unary(op, operand_ty).ok_or_else(|| {
        ParseError::at(
            format!("'{}' is not defined for {} expressions", op, operand_ty),
            &tokens[0],
        )
    })?;
    ast.set_kind(node, NodeKind::Unary { op, ty });
    Ok(node)
}

fn binary(
    ast: &mut Ast,
    tokens: Vec<Token>,
    index: usize,
    op: BinaryOp,
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    if index == 0 {
        return Err(ParseError::at(
            "no left value for binary operator",
            &tokens[index],
        ));
    }
    if index + 1 >= tokens.len() {
        return Err(ParseError::at("expression expected", &tokens[index]));
    }
    let node = ast.add_node(
        parent,
        NodeKind::Binary {
            op,
            ty: ScalarType::Int,
        },
    );
    let left = expression(ast, tokens[..index].to_vec(), node)?;
    expression(ast, tokens[index + 1..].to_vec(), node)?;

    // Promotion: the operand type of the first child selects the typed
    // variant; validation asserts the second child is consistent.
    let operand_ty = ast
        .expr_type(left)
        .ok_or_else(|| ParseError::at(format!("expression expected for '{}'", op), &tokens[index]))?;
    let ty = promote_binary(op, operand_ty).ok_or_else(|| {
        ParseError::at(
            format!("'{}' is not defined for {} expressions", op, operand_ty),
            &tokens[index],
        )
    })?;
    ast.set_kind(node, NodeKind::Binary { op, ty });
    Ok(node)
}

fn function_call(
    ast: &mut Ast,
    tokens: &[Token],
    parent: NodeId,
) -> Result<NodeId, ParseError> {
    let TokenKind::Ident(name) = &tokens[0].kind else {
        return Err(ParseError::at("identifier expected", &tokens[0]));
    };
    let name = name.clone();
    let def = ast.lookup(parent, &name).ok_or_else(|| {
        ParseError::at(format!("undefined identifier '{}'", name), &tokens[0])
    })?;
    let ret = match &ast.node(def).kind {
        NodeKind::Function { ret, .. } => *ret,
        _ => return Err(ParseError::at("function expected", &tokens[0])),
    };
    let last = tokens.last().unwrap();
    if last.kind != TokenKind::RParen {
        return Err(ParseError::at("')' expected", last));
    }

    let node = ast.add_node(parent, NodeKind::Call { def, ret });
    for chunk in split_at_commas(&tokens[2..tokens.len() - 1]) {
        if chunk.is_empty() {
            return Err(ParseError::at("expression expected", &tokens[1]));
        }
        expression(ast, chunk.to_vec(), node)?;
    }
    Ok(node)
}
