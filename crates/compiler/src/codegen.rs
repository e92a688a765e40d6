//! Lowering the validated AST to bytecode.
//!
//! Every node contributes a fragment through `gen_node(sp) -> sp'` with a
//! fixed stack contract: expressions leave exactly their scalar size on
//! the stack, statements are stack-neutral, and blocks release whatever
//! their children allocated so `sp' == sp`.
//!
//! Function bodies are generated at frame-relative `sp = 0`, so a local's
//! recorded offset is its distance from the frame base; at each use site
//! the emitted address is `offset - sp`, a negative value the VM resolves
//! against the runtime stack pointer. Globals record absolute arena
//! offsets instead.
//!
//! The global block lays out, in order: each global initializer, each
//! function body behind a `jmpr` skip (`main` behind the `loadi __exit__`
//! seed instead), the trailing `release 4` that pops the seed on `main`'s
//! fall-through path, and the final release of the globals. Call and jump
//! targets are emitted symbolically and rewritten by [`resolve`].

use crate::ast::{Ast, BinaryOp, NodeId, NodeKind, UnaryOp};
use crate::error::CompileError;
use fc_core::{Instr, Operand, ScalarType};
use std::collections::HashMap;

/// Link name of the graceful-exit path seeded into `main`'s return slot.
const EXIT_SYMBOL: &str = "__exit__";

/// Lower a validated tree to linked bytecode.
pub fn generate(ast: &mut Ast) -> Result<Vec<Instr>, CompileError> {
    let root = ast.root();
    let mut code = Vec::new();
    let mut link: HashMap<String, i32> = HashMap::new();
    let mut sp = 0i64;

    for child in ast.node(root).children.clone() {
        match &ast.node(child).kind {
            NodeKind::Function { name, .. } => {
                let name = name.clone();
                let mut body = Vec::new();
                gen_node(ast, child, 0, &mut body)?;
                if name != "main" {
                    // Implicit epilogue: a body that runs off its end
                    // still returns to the caller. Dead when every path
                    // ends in an explicit return.
                    body.push(Instr::Popip);
                }
                if name == "main" {
                    // Seed the return-address slot: a `return` from main
                    // (or its fall-through) ends up on the exit path.
                    code.push(Instr::Loadi(Operand::sym(EXIT_SYMBOL)));
                } else {
                    // Skip over the body during normal execution.
                    code.push(Instr::Jmpr(body.len() as i32));
                }
                link.insert(name, code.len() as i32);
                code.append(&mut body);
            }
            _ => {
                // Global variable definitions: initializers run at program
                // start in declaration order.
                sp = gen_node(ast, child, sp, &mut code)?;
            }
        }
    }

    // main's fall-through path lands here with the exit seed still on the
    // stack; a `return` from main pops it itself and resumes just past
    // this release.
    code.push(Instr::Release(ScalarType::Int.size()));
    link.insert(EXIT_SYMBOL.to_string(), code.len() as i32);
    if sp != 0 {
        code.push(Instr::Release(sp as u32));
    }

    resolve(&mut code, &link)?;
    Ok(code)
}

/// Final linker sweep: rewrite every symbolic `loadi`/`jmp`/`jmp0`/`jmp1`
/// operand to its code index. Unresolved names are fatal.
pub fn resolve(code: &mut [Instr], link: &HashMap<String, i32>) -> Result<(), CompileError> {
    for instr in code.iter_mut() {
        let operand = match instr {
            Instr::Loadi(op) | Instr::Jmp(op) | Instr::Jmp0(op) | Instr::Jmp1(op) => op,
            _ => continue,
        };
        if let Operand::Sym(name) = operand {
            let target = *link.get(name.as_str()).ok_or_else(|| {
                CompileError::Semantic(format!("undefined reference '{}'", name))
            })?;
            *operand = Operand::Imm(target);
        }
    }
    Ok(())
}

fn internal(message: &str) -> CompileError {
    CompileError::Semantic(format!("code generator error: {}", message))
}

/// Is `def` a global variable definition (direct child of the root)?
fn is_global(ast: &Ast, def: NodeId) -> bool {
    ast.node(def).parent == Some(ast.root())
}

/// The address to emit for a use of `def` with the code generator's stack
/// pointer at `sp`: absolute for globals, top-relative for locals.
fn var_addr(ast: &Ast, def: NodeId, sp: i64) -> Result<i64, CompileError> {
    let NodeKind::VarDef { offset, .. } = ast.node(def).kind else {
        return Err(internal("variable definition expected"));
    };
    if is_global(ast, def) {
        Ok(offset)
    } else {
        Ok(offset - sp)
    }
}

fn push_instr(ty: ScalarType, addr: i64) -> Instr {
    match ty {
        ScalarType::Int => Instr::Pushi(addr as i32),
        ScalarType::Float => Instr::Pushf(addr as i32),
        ScalarType::Char => Instr::Pushc(addr as i32),
    }
}

fn pop_instr(ty: ScalarType, addr: i64) -> Instr {
    match ty {
        ScalarType::Int => Instr::Popi(addr as i32),
        ScalarType::Float => Instr::Popf(addr as i32),
        ScalarType::Char => Instr::Popc(addr as i32),
    }
}

/// Opcode for a promoted unary operator.
fn unary_instr(op: UnaryOp, operand: ScalarType) -> Option<Instr> {
    use ScalarType::*;
    let instr = match (op, operand) {
        (UnaryOp::Backtick, Int) => Instr::Printi,
        (UnaryOp::Backtick, Char) => Instr::Printc,
        (UnaryOp::Backtick, Float) => Instr::Printf,
        (UnaryOp::Bnot, Int) => Instr::Bnoti,
        (UnaryOp::Bnot, Char) => Instr::Bnotc,
        (UnaryOp::Lnot, Int) => Instr::Lnoti,
        (UnaryOp::Lnot, Char) => Instr::Lnotc,
        (UnaryOp::Lnot, Float) => Instr::Lnotf,
        (UnaryOp::Neg, Int) => Instr::Negi,
        (UnaryOp::Neg, Char) => Instr::Negc,
        (UnaryOp::Neg, Float) => Instr::Negf,
        (UnaryOp::Bnot, Float) => return None,
    };
    Some(instr)
}

/// Opcode for a promoted binary operator.
fn binary_instr(op: BinaryOp, operand: ScalarType) -> Option<Instr> {
    use BinaryOp::*;
    use ScalarType::*;
    let instr = match (op, operand) {
        (Add, Int) => Instr::Addi,
        (Add, Char) => Instr::Addc,
        (Add, Float) => Instr::Addf,
        (Sub, Int) => Instr::Subi,
        (Sub, Char) => Instr::Subc,
        (Sub, Float) => Instr::Subf,
        (Mul, Int) => Instr::Muli,
        (Mul, Char) => Instr::Mulc,
        (Mul, Float) => Instr::Mulf,
        (Div, Int) => Instr::Divi,
        (Div, Char) => Instr::Divc,
        (Div, Float) => Instr::Divf,
        (Mod, Int) => Instr::Modi,
        (Mod, Char) => Instr::Modc,
        (Band, Int) => Instr::Bandi,
        (Band, Char) => Instr::Bandc,
        (Bor, Int) => Instr::Bori,
        (Bor, Char) => Instr::Borc,
        (Xor, Int) => Instr::Xori,
        (Xor, Char) => Instr::Xorc,
        (Shl, Int) => Instr::Shli,
        (Shl, Char) => Instr::Shlc,
        (Shr, Int) => Instr::Shri,
        (Shr, Char) => Instr::Shrc,
        (Land, Int) => Instr::Landi,
        (Land, Char) => Instr::Landc,
        (Land, Float) => Instr::Landf,
        (Lor, Int) => Instr::Lori,
        (Lor, Char) => Instr::Lorc,
        (Lor, Float) => Instr::Lorf,
        (Eq, Int) => Instr::Eqi,
        (Eq, Char) => Instr::Eqc,
        (Eq, Float) => Instr::Eqf,
        (Neq, Int) => Instr::Neqi,
        (Neq, Char) => Instr::Neqc,
        (Neq, Float) => Instr::Neqf,
        (Gt, Int) => Instr::Gti,
        (Gt, Char) => Instr::Gtc,
        (Gt, Float) => Instr::Gtf,
        (Gte, Int) => Instr::Gtei,
        (Gte, Char) => Instr::Gtec,
        (Gte, Float) => Instr::Gtef,
        (Lt, Int) => Instr::Lti,
        (Lt, Char) => Instr::Ltc,
        (Lt, Float) => Instr::Ltf,
        (Lte, Int) => Instr::Ltei,
        (Lte, Char) => Instr::Ltec,
        (Lte, Float) => Instr::Ltef,
        (Mod | Band | Bor | Xor | Shl | Shr, Float) => return None,
    };
    Some(instr)
}

/// Emit the fragment for one node, returning the stack pointer after it.
fn gen_node(
    ast: &mut Ast,
    id: NodeId,
    sp: i64,
    out: &mut Vec<Instr>,
) -> Result<i64, CompileError> {
    let children = ast.node(id).children.clone();
    match &ast.node(id).kind {
        NodeKind::Global { .. } => Err(internal("nested global block")),

        NodeKind::Block { .. } | NodeKind::Function { .. } => {
            let entry = sp;
            let mut sp = entry;
            for child in children {
                sp = gen_node(ast, child, sp, out)?;
            }
            if sp != entry {
                out.push(Instr::Release((sp - entry) as u32));
            }
            Ok(entry)
        }

        NodeKind::VarDef { ty, .. } => {
            let ty = *ty;
            ast.set_offset(id, sp);
            match children.first() {
                Some(&init) => gen_node(ast, init, sp, out),
                None => {
                    out.push(Instr::Alloc(ty.size()));
                    Ok(sp + ty.size() as i64)
                }
            }
        }

        NodeKind::VarRef { def, ty } => {
            let (def, ty) = (*def, *ty);
            let addr = var_addr(ast, def, sp)?;
            out.push(push_instr(ty, addr));
            Ok(sp + ty.size() as i64)
        }

        NodeKind::IntConst(v) => {
            out.push(Instr::Loadi(Operand::Imm(*v)));
            Ok(sp + 4)
        }
        NodeKind::CharConst(v) => {
            out.push(Instr::Loadc(*v));
            Ok(sp + 1)
        }
        NodeKind::FloatConst(v) => {
            out.push(Instr::Loadf(*v));
            Ok(sp + 4)
        }

        NodeKind::Unary { op, ty } => {
            let (op, ty) = (*op, *ty);
            let operand = ast
                .expr_type(children[0])
                .ok_or_else(|| internal("untyped operand"))?;
            gen_node(ast, children[0], sp, out)?;
            out.push(unary_instr(op, operand).ok_or_else(|| internal("unpromoted operator"))?);
            Ok(sp + ty.size() as i64)
        }

        NodeKind::Binary { op, ty } => {
            let (op, ty) = (*op, *ty);
            let operand = ast
                .expr_type(children[0])
                .ok_or_else(|| internal("untyped operand"))?;
            let sp_left = gen_node(ast, children[0], sp, out)?;
            gen_node(ast, children[1], sp_left, out)?;
            out.push(binary_instr(op, operand).ok_or_else(|| internal("unpromoted operator"))?);
            Ok(sp + ty.size() as i64)
        }

        NodeKind::Assign { ty } => {
            let ty = *ty;
            let NodeKind::VarRef { def, .. } = ast.node(children[0]).kind else {
                return Err(internal("assignment target"));
            };
            let size = ty.size() as i64;
            // Evaluate the right-hand side, pop it into the variable, then
            // push the value back: the value of an assignment is the new
            // value of the variable.
            let sp_rhs = gen_node(ast, children[1], sp, out)?;
            out.push(pop_instr(ty, var_addr(ast, def, sp_rhs)?));
            out.push(push_instr(ty, var_addr(ast, def, sp_rhs - size)?));
            Ok(sp + size)
        }

        NodeKind::Comma { .. } => {
            let left_size = ast
                .expr_type(children[0])
                .ok_or_else(|| internal("untyped operand"))?
                .size();
            gen_node(ast, children[0], sp, out)?;
            out.push(Instr::Release(left_size));
            gen_node(ast, children[1], sp, out)
        }

        NodeKind::Call { def, ret } => {
            let (def, ret) = (*def, *ret);
            let NodeKind::Function { name, .. } = &ast.node(def).kind else {
                return Err(internal("call target"));
            };
            let name = name.clone();
            let ret_size = ret.map(|t| t.size() as i64).unwrap_or(0);
            if ret_size > 0 {
                out.push(Instr::Alloc(ret_size as u32));
            }
            let mut arg_sp = sp + ret_size;
            for arg in children {
                arg_sp = gen_node(ast, arg, arg_sp, out)?;
            }
            let args_total = arg_sp - sp - ret_size;
            // loadi 2; puship; addi leaves the index of the release below
            // as the return address, then control transfers to the callee.
            out.push(Instr::Loadi(Operand::Imm(2)));
            out.push(Instr::Puship);
            out.push(Instr::Addi);
            out.push(Instr::Jmp(Operand::Sym(name)));
            out.push(Instr::Release(args_total as u32));
            Ok(sp + ret_size)
        }

        NodeKind::If => {
            let mut cond = Vec::new();
            gen_node(ast, children[0], sp, &mut cond)?;
            let mut then_code = Vec::new();
            gen_node(ast, children[1], sp, &mut then_code)?;
            let else_code = if children.len() == 3 {
                let mut code = Vec::new();
                gen_node(ast, children[2], sp, &mut code)?;
                Some(code)
            } else {
                None
            };
            if let Some(else_code) = &else_code {
                // The then branch hops over the else branch.
                then_code.push(Instr::Jmpr(else_code.len() as i32));
            }
            cond.push(Instr::Jmp0r(then_code.len() as i32));
            out.extend(cond);
            out.extend(then_code);
            if let Some(else_code) = else_code {
                out.extend(else_code);
            }
            Ok(sp)
        }

        NodeKind::While => {
            let mut cond = Vec::new();
            gen_node(ast, children[0], sp, &mut cond)?;
            let mut body = Vec::new();
            gen_node(ast, children[1], sp, &mut body)?;
            // Jump back to re-evaluate the condition; the offset counts
            // the body, the condition and both branch instructions.
            body.push(Instr::Jmpr(-((body.len() + cond.len() + 2) as i32)));
            cond.push(Instr::Jmp0r(body.len() as i32));
            out.extend(cond);
            out.extend(body);
            Ok(sp)
        }

        NodeKind::Return { function } => {
            let function = *function;
            let NodeKind::Function { ret, result_slot, .. } = &ast.node(function).kind else {
                return Err(internal("return outside a function"));
            };
            let (ret, result_slot) = (*ret, *result_slot);
            if let (Some(ty), Some(slot)) = (ret, result_slot) {
                let sp_value = gen_node(ast, children[0], sp, out)?;
                out.push(pop_instr(ty, var_addr(ast, slot, sp_value)?));
            }
            // Release this function's locals (the frame base is 0) and
            // resume at the caller's cleanup.
            if sp > 0 {
                out.push(Instr::Release(sp as u32));
            }
            out.push(Instr::Popip);
            Ok(sp)
        }

        NodeKind::Discard => {
            let size = ast
                .expr_type(children[0])
                .map(|t| t.size())
                .unwrap_or(0);
            gen_node(ast, children[0], sp, out)?;
            if size > 0 {
                out.push(Instr::Release(size));
            }
            Ok(sp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser;

    fn compile(source: &str) -> Vec<Instr> {
        let tokens = Lexer::new(source).lex().unwrap();
        let mut ast = parser::parse(&tokens).unwrap();
        ast.validate().unwrap();
        generate(&mut ast).unwrap()
    }

    #[test]
    fn the_linker_rewrites_every_symbol() {
        let code = compile(
            "int add(int a, int b) { return a + b; } \
             void main() { `add(40, 2); }",
        );
        for instr in &code {
            if let Instr::Loadi(op) | Instr::Jmp(op) | Instr::Jmp0(op) | Instr::Jmp1(op) = instr
            {
                assert!(matches!(op, Operand::Imm(_)), "unlinked: {}", instr);
            }
        }
    }

    #[test]
    fn unresolved_references_are_fatal() {
        let mut code = vec![Instr::Jmp(Operand::sym("missing"))];
        let err = resolve(&mut code, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("undefined reference 'missing'"));
    }

    #[test]
    fn call_sites_emit_the_linking_sequence() {
        let code = compile(
            "int two() { return 2; } \
             void main() { `two(); }",
        );
        let at = code
            .iter()
            .position(|i| matches!(i, Instr::Puship))
            .expect("no call emitted");
        assert_eq!(code[at - 1], Instr::Loadi(Operand::Imm(2)));
        assert_eq!(code[at + 1], Instr::Addi);
        assert!(matches!(code[at + 2], Instr::Jmp(Operand::Imm(_))));
        // Zero arguments still release their (empty) slot.
        assert_eq!(code[at + 3], Instr::Release(0));
    }

    #[test]
    fn functions_are_skipped_in_normal_flow_and_main_is_seeded() {
        let code = compile(
            "int two() { return 2; } \
             void main() { }",
        );
        // The first instruction skips over the body of `two`.
        assert!(matches!(code[0], Instr::Jmpr(_)));
        // `main` begins with the exit seed pointing past the release 4.
        let seed = code
            .iter()
            .position(|i| matches!(i, Instr::Loadi(Operand::Imm(t)) if *t as usize == code.len()))
            .expect("no exit seed");
        assert_eq!(code[code.len() - 1], Instr::Release(4));
        assert!(seed > 0);
    }

    #[test]
    fn global_initializers_run_first_and_are_released_last() {
        let code = compile("int g = 5; void main() { }");
        assert_eq!(code[0], Instr::Loadi(Operand::Imm(5)));
        // Trailing: release of the exit seed, then of the globals.
        assert_eq!(code[code.len() - 2], Instr::Release(4));
        assert_eq!(code[code.len() - 1], Instr::Release(4));
    }

    #[test]
    fn uninitialized_variables_allocate_their_size() {
        let code = compile("void main() { char c; `0; }");
        assert!(code.contains(&Instr::Alloc(1)));
    }

    #[test]
    fn blocks_are_stack_neutral() {
        // The inner block must release its local before the outer one.
        let code = compile("void main() { int x; x = 1; { char c; c = 'a'; } }");
        let releases: Vec<u32> = code
            .iter()
            .filter_map(|i| match i {
                Instr::Release(n) => Some(*n),
                _ => None,
            })
            .collect();
        // discarded assignment (4), discarded char assignment (1), inner
        // block local (1), main's local (4), exit seed (4)
        assert_eq!(releases, vec![4, 1, 1, 4, 4]);
    }

    #[test]
    fn locals_are_addressed_relative_to_the_stack_top() {
        let code = compile("void main() { int x; x = 7; `x; }");
        // x lives at frame offset 0; at `x the codegen sp is 4, so the
        // emitted push address is -4 and the assignment pops to -8 after
        // evaluating its right-hand side.
        assert!(code.contains(&Instr::Popi(-8)));
        assert!(code.contains(&Instr::Pushi(-4)));
    }

    #[test]
    fn globals_are_addressed_absolutely() {
        let code = compile("int g = 1; void main() { `g; }");
        assert!(code.contains(&Instr::Pushi(0)));
    }

    #[test]
    fn if_without_else_jumps_over_the_then_branch() {
        let code = compile("void main() { if (1 < 2) `1; }");
        let at = code
            .iter()
            .position(|i| matches!(i, Instr::Jmp0r(_)))
            .expect("no conditional branch");
        let Instr::Jmp0r(off) = code[at] else { unreachable!() };
        // then branch: loadi, printi, release
        assert_eq!(off, 3);
    }

    #[test]
    fn while_loops_jump_back_to_the_condition() {
        let code = compile("void main() { int i; i = 0; while (i < 3) i = i + 1; }");
        let back = code
            .iter()
            .filter_map(|i| match i {
                Instr::Jmpr(off) if *off < 0 => Some(*off),
                _ => None,
            })
            .next()
            .expect("no back edge");
        let at = code.iter().position(|i| *i == Instr::Jmpr(back)).unwrap();
        // The back edge lands on the first condition instruction.
        let target = (at as i64 + 1 + back as i64) as usize;
        assert!(matches!(code[target], Instr::Pushi(_)));
    }

    #[test]
    fn comma_discards_the_left_operand() {
        let code = compile("void main() { int x; x = (1, 2); }");
        let at = code
            .iter()
            .position(|i| *i == Instr::Loadi(Operand::Imm(1)))
            .unwrap();
        assert_eq!(code[at + 1], Instr::Release(4));
        assert_eq!(code[at + 2], Instr::Loadi(Operand::Imm(2)));
    }

    #[test]
    fn return_pops_into_the_result_slot_and_releases_locals() {
        let code = compile(
            "int three() { int pad; pad = 0; return 3; } \
             void main() { `three(); }",
        );
        let at = code
            .iter()
            .position(|i| matches!(i, Instr::Popip))
            .expect("no return");
        // Before popip: pop the result into its slot, then release the
        // 4 bytes of locals.
        assert_eq!(code[at - 1], Instr::Release(4));
        // The result slot sits at frame offset -8; sp is 8 when the return
        // value is popped (4 bytes of locals plus the value itself).
        assert_eq!(code[at - 2], Instr::Popi(-16));
    }
}
