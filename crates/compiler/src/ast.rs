//! The typed abstract syntax tree.
//!
//! Nodes live in an arena owned by [`Ast`] and refer to each other through
//! [`NodeId`] handles: children are owned links, the parent link is a plain
//! back-handle used for scope walking. Two orthogonal concerns replace the
//! deep class lattice of a classic OO rendering: a structural [`NodeKind`]
//! and a [`ScalarType`] tag on expression kinds. Operator nodes are
//! `(op kind, type tag)` pairs; the parser fixes the tag through the
//! promotion lookup in [`promote_unary`]/[`promote_binary`] once the
//! operands are known.
//!
//! Lifecycle: the parser builds the tree, [`Ast::validate`] checks it
//! bottom-up and assigns the hidden frame offsets of every function, and
//! code generation lowers it. Nothing mutates the tree after generation.

use crate::error::CompileError;
use fc_core::ScalarType;
use std::collections::HashMap;
use std::fmt;

pub type NodeId = usize;

/// Name of the hidden slot holding a callee's return address.
pub const RETURN_ADDRESS_SLOT: &str = "__return_address__";
/// Name of the hidden slot a non-void callee writes its result into.
pub const RESULT_SLOT: &str = "__result__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// The print-and-return backtick operator.
    Backtick,
    /// Bitwise negation `~`.
    Bnot,
    /// Logical negation `!`.
    Lnot,
    /// Additive negation (prefix `-`).
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Band,
    Bor,
    Xor,
    Shl,
    Shr,
    Land,
    Lor,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnaryOp::Backtick => "`",
            UnaryOp::Bnot => "~",
            UnaryOp::Lnot => "!",
            UnaryOp::Neg => "-",
        };
        write!(f, "{}", text)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Band => "&",
            BinaryOp::Bor => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Land => "&&",
            BinaryOp::Lor => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
        };
        write!(f, "{}", text)
    }
}

/// Result type of a unary operator applied to an operand of the given
/// type, or `None` when the combination is unsupported.
pub fn promote_unary(op: UnaryOp, operand: ScalarType) -> Option<ScalarType> {
    match op {
        UnaryOp::Backtick | UnaryOp::Neg => Some(operand),
        UnaryOp::Bnot => {
            matches!(operand, ScalarType::Int | ScalarType::Char).then_some(operand)
        }
        UnaryOp::Lnot => Some(ScalarType::Char),
    }
}

/// Result type of a binary operator whose operands both have the given
/// type, or `None` when the combination is unsupported.
pub fn promote_binary(op: BinaryOp, operand: ScalarType) -> Option<ScalarType> {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div => Some(operand),
        Mod | Band | Bor | Xor | Shl | Shr => {
            matches!(operand, ScalarType::Int | ScalarType::Char).then_some(operand)
        }
        // Comparisons and logicals are boolean-by-convention chars.
        Land | Lor | Eq | Neq | Gt | Gte | Lt | Lte => Some(ScalarType::Char),
    }
}

#[derive(Debug)]
pub enum NodeKind {
    /// The unique root. Its symbol table holds functions and globals.
    Global { symbols: HashMap<String, NodeId> },
    /// A `{ ... }` scope.
    Block { symbols: HashMap<String, NodeId> },
    /// A function definition. `params` and the hidden slots are in the
    /// symbol table but not in `children`, so they are never lowered as
    /// body statements.
    Function {
        name: String,
        ret: Option<ScalarType>,
        params: Vec<NodeId>,
        symbols: HashMap<String, NodeId>,
        return_slot: Option<NodeId>,
        result_slot: Option<NodeId>,
    },
    /// A variable definition. `offset` is assigned during lowering: the
    /// absolute arena offset for globals, the frame offset for locals and
    /// the (negative) frame offsets of the hidden function slots.
    VarDef {
        name: String,
        ty: ScalarType,
        offset: i64,
    },
    /// A use of a variable in expression or assignment-target position.
    VarRef { def: NodeId, ty: ScalarType },
    IntConst(i32),
    CharConst(u8),
    FloatConst(f32),
    /// A promoted unary operator; `ty` is the result type.
    Unary { op: UnaryOp, ty: ScalarType },
    /// A promoted binary operator; `ty` is the result type, the operand
    /// type is the (asserted-consistent) type of the children.
    Binary { op: BinaryOp, ty: ScalarType },
    /// `lhs = rhs`; children are `[VarRef, expression]` and the value of
    /// the whole expression is the new value of the variable.
    Assign { ty: ScalarType },
    /// `lhs, rhs`; evaluates and discards the left operand, keeps the
    /// right.
    Comma { ty: ScalarType },
    /// A function call; an expression when `ret` is `Some`, a bare
    /// statement child of a `Discard` otherwise.
    Call { def: NodeId, ret: Option<ScalarType> },
    If,
    While,
    Return { function: NodeId },
    /// Expression statement: evaluate the child for its side effects and
    /// release its stack slot.
    Discard,
}

#[derive(Debug)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// The arena. Slot 0 is always the global block.
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Global {
                    symbols: HashMap::new(),
                },
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Append a new node as the last child of `parent`.
    pub fn add_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Create a node linked to `parent` without appending it to the child
    /// list. Used for function parameters and the hidden call slots, which
    /// are reachable through symbol tables only.
    pub fn add_hidden(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id].kind = kind;
    }

    fn symbols(&self, id: NodeId) -> Option<&HashMap<String, NodeId>> {
        match &self.nodes[id].kind {
            NodeKind::Global { symbols }
            | NodeKind::Block { symbols }
            | NodeKind::Function { symbols, .. } => Some(symbols),
            _ => None,
        }
    }

    /// Register `def` under `name` in the symbol table of `scope`.
    pub fn add_symbol(
        &mut self,
        scope: NodeId,
        name: &str,
        def: NodeId,
    ) -> Result<(), String> {
        let symbols = match &mut self.nodes[scope].kind {
            NodeKind::Global { symbols }
            | NodeKind::Block { symbols }
            | NodeKind::Function { symbols, .. } => symbols,
            _ => return Err("symbols may only be defined inside a block".into()),
        };
        if symbols.contains_key(name) {
            return Err(format!("duplicate identifier '{}'", name));
        }
        symbols.insert(name.to_string(), def);
        Ok(())
    }

    /// Resolve `name` from the scope enclosing `from`, walking the parent
    /// chain outward to the global block.
    pub fn lookup(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(symbols) = self.symbols(id) {
                if let Some(&def) = symbols.get(name) {
                    return Some(def);
                }
            }
            current = self.nodes[id].parent;
        }
        None
    }

    /// The function definition enclosing `from`, if any.
    pub fn enclosing_function(&self, from: NodeId) -> Option<NodeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if matches!(self.nodes[id].kind, NodeKind::Function { .. }) {
                return Some(id);
            }
            current = self.nodes[id].parent;
        }
        None
    }

    /// The scalar type of an expression node, or `None` for statements and
    /// void calls.
    pub fn expr_type(&self, id: NodeId) -> Option<ScalarType> {
        match &self.nodes[id].kind {
            NodeKind::IntConst(_) => Some(ScalarType::Int),
            NodeKind::CharConst(_) => Some(ScalarType::Char),
            NodeKind::FloatConst(_) => Some(ScalarType::Float),
            NodeKind::VarRef { ty, .. }
            | NodeKind::Unary { ty, .. }
            | NodeKind::Binary { ty, .. }
            | NodeKind::Assign { ty }
            | NodeKind::Comma { ty } => Some(*ty),
            NodeKind::Call { ret, .. } => *ret,
            _ => None,
        }
    }

    /// The declared type of a `VarDef`.
    pub fn var_type(&self, def: NodeId) -> Option<ScalarType> {
        match &self.nodes[def].kind {
            NodeKind::VarDef { ty, .. } => Some(*ty),
            _ => None,
        }
    }

    pub(crate) fn set_offset(&mut self, def: NodeId, offset: i64) {
        if let NodeKind::VarDef { offset: slot, .. } = &mut self.nodes[def].kind {
            *slot = offset;
        }
    }

    /// Check the whole tree bottom-up and assign every function's hidden
    /// frame offsets (return-address slot at -4, arguments below it, the
    /// result slot below those).
    pub fn validate(&mut self) -> Result<(), CompileError> {
        self.validate_node(self.root())
    }

    fn semantic(message: String) -> CompileError {
        CompileError::Semantic(message)
    }

    fn validate_node(&mut self, id: NodeId) -> Result<(), CompileError> {
        let children = self.nodes[id].children.clone();
        match &self.nodes[id].kind {
            NodeKind::Global { symbols } => {
                match symbols.get("main") {
                    None => {
                        return Err(Self::semantic("no 'main' function defined".into()));
                    }
                    Some(&main) => match &self.nodes[main].kind {
                        NodeKind::Function { ret: None, params, .. } if params.is_empty() => {}
                        NodeKind::Function { .. } => {
                            return Err(Self::semantic(
                                "'main' must be a void function without arguments".into(),
                            ));
                        }
                        _ => {
                            return Err(Self::semantic(
                                "global 'main' symbol must be a function".into(),
                            ));
                        }
                    },
                }
                for &child in &children {
                    if !matches!(
                        self.nodes[child].kind,
                        NodeKind::VarDef { .. } | NodeKind::Function { .. }
                    ) {
                        return Err(Self::semantic(
                            "statements are not allowed in global scope".into(),
                        ));
                    }
                }
            }
            NodeKind::Block { .. } => {
                for &child in &children {
                    if self.expr_type(child).is_some() {
                        return Err(Self::semantic("statement expected".into()));
                    }
                }
            }
            NodeKind::Function {
                ret,
                params,
                return_slot,
                result_slot,
                ..
            } => {
                let ret = *ret;
                let params = params.clone();
                let return_slot = *return_slot;
                let result_slot = *result_slot;

                let mut offset = -(ScalarType::Int.size() as i64);
                if let Some(slot) = return_slot {
                    self.set_offset(slot, offset);
                }
                for &param in params.iter().rev() {
                    let ty = self
                        .var_type(param)
                        .ok_or_else(|| Self::semantic("parser error: malformed parameter".into()))?;
                    offset -= ty.size() as i64;
                    self.set_offset(param, offset);
                }
                if let Some(slot) = result_slot {
                    let ty = ret.ok_or_else(|| {
                        Self::semantic("parser error: result slot on a void function".into())
                    })?;
                    offset -= ty.size() as i64;
                    self.set_offset(slot, offset);
                }

                for &child in &children {
                    if self.expr_type(child).is_some() {
                        return Err(Self::semantic("statement expected".into()));
                    }
                }
            }
            NodeKind::VarDef { ty, .. } => {
                let ty = *ty;
                if children.len() > 1 {
                    return Err(Self::semantic("parser error: malformed definition".into()));
                }
                if let Some(&init) = children.first() {
                    if self.expr_type(init) != Some(ty) {
                        return Err(Self::semantic(format!("{} expression expected", ty)));
                    }
                }
            }
            NodeKind::VarRef { def, ty } => {
                let (def, ty) = (*def, *ty);
                if !children.is_empty() {
                    return Err(Self::semantic("parser error: variable reference".into()));
                }
                if self.var_type(def) != Some(ty) {
                    return Err(Self::semantic(format!("{} expression expected", ty)));
                }
            }
            NodeKind::IntConst(_) | NodeKind::CharConst(_) | NodeKind::FloatConst(_) => {
                if !children.is_empty() {
                    return Err(Self::semantic("parser error: constant".into()));
                }
            }
            NodeKind::Unary { op, ty } => {
                let (op, ty) = (*op, *ty);
                if children.len() != 1 {
                    return Err(Self::semantic("parser error: unary operator".into()));
                }
                let operand = self
                    .expr_type(children[0])
                    .ok_or_else(|| Self::semantic(format!("expression expected for '{}'", op)))?;
                if promote_unary(op, operand) != Some(ty) {
                    return Err(Self::semantic(format!(
                        "'{}' is not defined for {} expressions",
                        op, operand
                    )));
                }
            }
            NodeKind::Binary { op, ty } => {
                let (op, ty) = (*op, *ty);
                if children.len() != 2 {
                    return Err(Self::semantic("parser error: binary operator".into()));
                }
                let left = self
                    .expr_type(children[0])
                    .ok_or_else(|| Self::semantic(format!("expression expected for '{}'", op)))?;
                let right = self
                    .expr_type(children[1])
                    .ok_or_else(|| Self::semantic(format!("expression expected for '{}'", op)))?;
                if left != right {
                    return Err(Self::semantic(format!(
                        "operand type mismatch for '{}': {} and {}",
                        op, left, right
                    )));
                }
                if promote_binary(op, left) != Some(ty) {
                    return Err(Self::semantic(format!(
                        "'{}' is not defined for {} expressions",
                        op, left
                    )));
                }
            }
            NodeKind::Assign { ty } => {
                let ty = *ty;
                if children.len() != 2 {
                    return Err(Self::semantic("parser error: assignment".into()));
                }
                if !matches!(self.nodes[children[0]].kind, NodeKind::VarRef { .. }) {
                    return Err(Self::semantic("variable expected".into()));
                }
                if self.expr_type(children[0]) != Some(ty)
                    || self.expr_type(children[1]) != Some(ty)
                {
                    return Err(Self::semantic(format!("{} expression expected", ty)));
                }
            }
            NodeKind::Comma { ty } => {
                let ty = *ty;
                if children.len() != 2 {
                    return Err(Self::semantic("parser error: comma operator".into()));
                }
                if self.expr_type(children[0]).is_none() {
                    return Err(Self::semantic("expression expected for ','".into()));
                }
                if self.expr_type(children[1]) != Some(ty) {
                    return Err(Self::semantic("expression expected for ','".into()));
                }
            }
            NodeKind::Call { def, ret } => {
                let (def, ret) = (*def, *ret);
                let NodeKind::Function {
                    name,
                    ret: def_ret,
                    params,
                    ..
                } = &self.nodes[def].kind
                else {
                    return Err(Self::semantic("function expected".into()));
                };
                let name = name.clone();
                let params = params.clone();
                if *def_ret != ret {
                    return Err(Self::semantic(format!("function '{}' changed type", name)));
                }
                if children.len() != params.len() {
                    return Err(Self::semantic(format!(
                        "function '{}' expects {} argument(s), got {}",
                        name,
                        params.len(),
                        children.len()
                    )));
                }
                for (index, (&arg, &param)) in children.iter().zip(params.iter()).enumerate()
                {
                    let expected = self.var_type(param);
                    if self.expr_type(arg) != expected {
                        return Err(Self::semantic(format!(
                            "{} expression expected for argument {} of '{}'",
                            expected.map(|t| t.to_string()).unwrap_or_default(),
                            index + 1,
                            name
                        )));
                    }
                }
            }
            NodeKind::If => {
                if children.len() < 2 || children.len() > 3 {
                    return Err(Self::semantic("parser error: conditional".into()));
                }
                if self.expr_type(children[0]) != Some(ScalarType::Char) {
                    return Err(Self::semantic(
                        "char expression expected in 'if' condition".into(),
                    ));
                }
            }
            NodeKind::While => {
                if children.len() != 2 {
                    return Err(Self::semantic("parser error: loop".into()));
                }
                if self.expr_type(children[0]) != Some(ScalarType::Char) {
                    return Err(Self::semantic(
                        "char expression expected in 'while' condition".into(),
                    ));
                }
            }
            NodeKind::Return { function } => {
                let function = *function;
                let NodeKind::Function { ret, .. } = &self.nodes[function].kind else {
                    return Err(Self::semantic("parser error: return".into()));
                };
                match (*ret, children.len()) {
                    (None, 0) => {}
                    (None, _) => {
                        return Err(Self::semantic(
                            "this function does not have a return value".into(),
                        ));
                    }
                    (Some(ty), 1) => {
                        if self.expr_type(children[0]) != Some(ty) {
                            return Err(Self::semantic(format!("{} expression expected", ty)));
                        }
                    }
                    (Some(_), _) => {
                        return Err(Self::semantic("expression expected after 'return'".into()));
                    }
                }
            }
            NodeKind::Discard => {
                if children.len() != 1 {
                    return Err(Self::semantic("parser error: expression statement".into()));
                }
                let child = children[0];
                let is_void_call =
                    matches!(self.nodes[child].kind, NodeKind::Call { ret: None, .. });
                if self.expr_type(child).is_none() && !is_void_call {
                    return Err(Self::semantic("expression expected".into()));
                }
            }
        }

        for child in children {
            self.validate_node(child)?;
        }
        Ok(())
    }
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}
