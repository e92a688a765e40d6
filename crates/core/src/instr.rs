//! The FullCircle bytecode instruction set.
//!
//! Bytecode is an in-memory `Vec<Instr>`. Branch offsets in the `*r`
//! variants are relative to the instruction after the branch; absolute
//! targets index into the code array. `loadi`, `jmp`, `jmp0` and `jmp1`
//! take an [`Operand`] so the code generator can refer to functions and the
//! exit stub by name; the linker sweep rewrites every symbol to a concrete
//! index before the code reaches the VM.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An immediate that may still be symbolic before the link pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// A concrete immediate (constant or resolved code index).
    Imm(i32),
    /// A named link target, resolved to a code index by the linker.
    Sym(String),
}

impl Operand {
    pub fn sym(name: impl Into<String>) -> Self {
        Operand::Sym(name.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "{}", v),
            Operand::Sym(s) => write!(f, "{}", s),
        }
    }
}

/// One VM instruction.
///
/// Addresses passed to the `push*`/`pop*` family follow the relative
/// addressing convention: a negative address means "current stack pointer
/// plus this offset", a non-negative address is absolute (globals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    Nop,

    // Stack management.
    Alloc(u32),
    Release(u32),
    Loadi(Operand),
    Loadc(u8),
    Loadf(f32),
    Pushi(i32),
    Pushc(i32),
    Pushf(i32),
    Popi(i32),
    Popc(i32),
    Popf(i32),
    Puship,
    Popip,

    // Flow control.
    Jmp(Operand),
    Jmpr(i32),
    Jmp0(Operand),
    Jmp0r(i32),
    Jmp1(Operand),
    Jmp1r(i32),

    // Integer arithmetic.
    Addi,
    Subi,
    Muli,
    Divi,
    Modi,
    Negi,

    // Character arithmetic (modular, 8-bit unsigned).
    Addc,
    Subc,
    Mulc,
    Divc,
    Modc,
    Negc,

    // Floating point arithmetic.
    Addf,
    Subf,
    Mulf,
    Divf,
    Powf,
    Negf,

    // Bitwise (int and char only).
    Bandi,
    Bori,
    Xori,
    Bnoti,
    Shli,
    Shri,
    Bandc,
    Borc,
    Xorc,
    Bnotc,
    Shlc,
    Shrc,

    // Logical (produce char 0/1).
    Landi,
    Lori,
    Lnoti,
    Landc,
    Lorc,
    Lnotc,
    Landf,
    Lorf,
    Lnotf,

    // Comparisons (produce char 0/1).
    Eqi,
    Neqi,
    Gti,
    Gtei,
    Lti,
    Ltei,
    Eqc,
    Neqc,
    Gtc,
    Gtec,
    Ltc,
    Ltec,
    Eqf,
    Neqf,
    Gtf,
    Gtef,
    Ltf,
    Ltef,

    // Conversions.
    Ctoi,
    Ctof,
    Itoc,
    Itof,
    Ftoc,
    Ftoi,

    // Output. Each prints the top-of-stack scalar of its type and leaves
    // the value on the stack.
    Printi,
    Printc,
    Printf,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Nop => write!(f, "nop"),
            Instr::Alloc(n) => write!(f, "alloc {}", n),
            Instr::Release(n) => write!(f, "release {}", n),
            Instr::Loadi(v) => write!(f, "loadi {}", v),
            Instr::Loadc(v) => write!(f, "loadc {}", v),
            Instr::Loadf(v) => write!(f, "loadf {:?}", v),
            Instr::Pushi(a) => write!(f, "pushi {}", a),
            Instr::Pushc(a) => write!(f, "pushc {}", a),
            Instr::Pushf(a) => write!(f, "pushf {}", a),
            Instr::Popi(a) => write!(f, "popi {}", a),
            Instr::Popc(a) => write!(f, "popc {}", a),
            Instr::Popf(a) => write!(f, "popf {}", a),
            Instr::Puship => write!(f, "puship"),
            Instr::Popip => write!(f, "popip"),
            Instr::Jmp(t) => write!(f, "jmp {}", t),
            Instr::Jmpr(o) => write!(f, "jmpr {}", o),
            Instr::Jmp0(t) => write!(f, "jmp0 {}", t),
            Instr::Jmp0r(o) => write!(f, "jmp0r {}", o),
            Instr::Jmp1(t) => write!(f, "jmp1 {}", t),
            Instr::Jmp1r(o) => write!(f, "jmp1r {}", o),
            Instr::Addi => write!(f, "addi"),
            Instr::Subi => write!(f, "subi"),
            Instr::Muli => write!(f, "muli"),
            Instr::Divi => write!(f, "divi"),
            Instr::Modi => write!(f, "modi"),
            Instr::Negi => write!(f, "negi"),
            Instr::Addc => write!(f, "addc"),
            Instr::Subc => write!(f, "subc"),
            Instr::Mulc => write!(f, "mulc"),
            Instr::Divc => write!(f, "divc"),
            Instr::Modc => write!(f, "modc"),
            Instr::Negc => write!(f, "negc"),
            Instr::Addf => write!(f, "addf"),
            Instr::Subf => write!(f, "subf"),
            Instr::Mulf => write!(f, "mulf"),
            Instr::Divf => write!(f, "divf"),
            Instr::Powf => write!(f, "powf"),
            Instr::Negf => write!(f, "negf"),
            Instr::Bandi => write!(f, "bandi"),
            Instr::Bori => write!(f, "bori"),
            Instr::Xori => write!(f, "xori"),
            Instr::Bnoti => write!(f, "bnoti"),
            Instr::Shli => write!(f, "shli"),
            Instr::Shri => write!(f, "shri"),
            Instr::Bandc => write!(f, "bandc"),
            Instr::Borc => write!(f, "borc"),
            Instr::Xorc => write!(f, "xorc"),
            Instr::Bnotc => write!(f, "bnotc"),
            Instr::Shlc => write!(f, "shlc"),
            Instr::Shrc => write!(f, "shrc"),
            Instr::Landi => write!(f, "landi"),
            Instr::Lori => write!(f, "lori"),
            Instr::Lnoti => write!(f, "lnoti"),
            Instr::Landc => write!(f, "landc"),
            Instr::Lorc => write!(f, "lorc"),
            Instr::Lnotc => write!(f, "lnotc"),
            Instr::Landf => write!(f, "landf"),
            Instr::Lorf => write!(f, "lorf"),
            Instr::Lnotf => write!(f, "lnotf"),
            Instr::Eqi => write!(f, "eqi"),
            Instr::Neqi => write!(f, "neqi"),
            Instr::Gti => write!(f, "gti"),
            Instr::Gtei => write!(f, "gtei"),
            Instr::Lti => write!(f, "lti"),
            Instr::Ltei => write!(f, "ltei"),
            Instr::Eqc => write!(f, "eqc"),
            Instr::Neqc => write!(f, "neqc"),
            Instr::Gtc => write!(f, "gtc"),
            Instr::Gtec => write!(f, "gtec"),
            Instr::Ltc => write!(f, "ltc"),
            Instr::Ltec => write!(f, "ltec"),
            Instr::Eqf => write!(f, "eqf"),
            Instr::Neqf => write!(f, "neqf"),
            Instr::Gtf => write!(f, "gtf"),
            Instr::Gtef => write!(f, "gtef"),
            Instr::Ltf => write!(f, "ltf"),
            Instr::Ltef => write!(f, "ltef"),
            Instr::Ctoi => write!(f, "ctoi"),
            Instr::Ctof => write!(f, "ctof"),
            Instr::Itoc => write!(f, "itoc"),
            Instr::Itof => write!(f, "itof"),
            Instr::Ftoc => write!(f, "ftoc"),
            Instr::Ftoi => write!(f, "ftoi"),
            Instr::Printi => write!(f, "printi"),
            Instr::Printc => write!(f, "printc"),
            Instr::Printf => write!(f, "printf"),
        }
    }
}
