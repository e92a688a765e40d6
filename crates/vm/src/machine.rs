//! The stack machine itself.
//!
//! # Memory model
//!
//! The stack is a flat byte arena. `sp` indexes the next free byte, so the
//! occupied range is `[0, sp)`. Scalars are stored little-endian: `int` as a
//! 32-bit two's-complement integer, `float` as an IEEE-754 single, `char`
//! as one unsigned byte. Globals live at the bottom of the arena and are
//! addressed absolutely; locals are addressed relative to the top of the
//! stack with negative addresses (`effective = addr + sp`).
//!
//! # Instruction pointer model
//!
//! `ip` always indexes the next instruction to execute: the step loop
//! fetches, advances `ip`, then executes. Relative branches are therefore
//! offsets from the instruction after the branch, `puship` pushes the
//! advanced `ip`, and `popip` resumes exactly at the popped index. A fetch
//! at `ip == code.len()` is the normal termination signal.
//!
//! # Arithmetic semantics
//!
//! Integer arithmetic wraps (32-bit two's complement); division and modulus
//! truncate toward zero and `i32::MIN / -1` wraps. Character arithmetic is
//! modular mod 256 and `negc` computes `(-a) & 0xFF`. Shift counts are
//! masked to the operand width. Conversions follow Rust `as` casts:
//! float-to-int saturates with NaN mapped to 0, int-to-char truncates.

use crate::error::{Step, VmError};
use fc_core::{Instr, Operand};
use std::io::{self, Write};

/// Stack arena size used when the embedder does not configure one.
pub const DEFAULT_STACK_SIZE: usize = 65536;

/// A virtual machine bound to one bytecode program and one output sink.
///
/// `run` executes to completion; `start`/`step`/`stop` expose the same
/// execution one instruction at a time for debugging.
pub struct Vm<W: Write = io::Stdout> {
    code: Vec<Instr>,
    stack: Vec<u8>,
    sp: usize,
    ip: usize,
    out: W,
}

impl Vm<io::Stdout> {
    /// Create a machine that prints through stdout.
    pub fn new(code: Vec<Instr>) -> Self {
        Vm::with_output(code, io::stdout())
    }
}

impl<W: Write> Vm<W> {
    /// Create a machine that prints through `out`.
    pub fn with_output(code: Vec<Instr>, out: W) -> Self {
        Vm {
            code,
            stack: Vec::new(),
            sp: 0,
            ip: 0,
            out,
        }
    }

    /// Current stack pointer. A gracefully terminated program always ends
    /// with `sp == 0`.
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Current instruction pointer (index of the next instruction).
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Consume the machine and hand back its output sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Execute until termination or fault. The arena is allocated on entry
    /// and released on exit either way.
    pub fn run(&mut self, stack_size: usize) -> Result<(), VmError> {
        self.start(stack_size);
        let result = loop {
            match self.step() {
                Ok(Step::Running) => {}
                Ok(Step::Terminated) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stop();
        result
    }

    /// Allocate a zero-filled arena of `stack_size` bytes and rewind the
    /// machine, ready for stepping.
    pub fn start(&mut self, stack_size: usize) {
        self.stack = vec![0; stack_size];
        self.sp = 0;
        self.ip = 0;
    }

    /// Release the arena after a `start`/`step` debugging session.
    pub fn stop(&mut self) {
        self.stack = Vec::new();
    }

    /// Fetch and execute the next instruction.
    pub fn step(&mut self) -> Result<Step, VmError> {
        if self.ip >= self.code.len() {
            return Ok(Step::Terminated);
        }
        let instr = self.code[self.ip].clone();
        self.ip += 1;
        self.exec(instr)?;
        Ok(Step::Running)
    }

    fn exec(&mut self, instr: Instr) -> Result<(), VmError> {
        match instr {
            Instr::Nop => {}

            // Stack management.
            Instr::Alloc(n) => self.grow(n as usize)?,
            Instr::Release(n) => self.shrink(n as usize)?,
            Instr::Loadi(v) => {
                let v = self.operand(&v)?;
                self.push_i32(v)?;
            }
            Instr::Loadc(v) => self.push_u8(v)?,
            Instr::Loadf(v) => self.push_f32(v)?,
            Instr::Pushi(a) | Instr::Pushf(a) => self.push_from(a, 4)?,
            Instr::Pushc(a) => self.push_from(a, 1)?,
            Instr::Popi(a) | Instr::Popf(a) => self.pop_to(a, 4)?,
            Instr::Popc(a) => self.pop_to(a, 1)?,
            Instr::Puship => self.push_i32(self.ip as i32)?,
            Instr::Popip => {
                let target = self.pop_i32()?;
                self.ip = self.code_index(target)?;
            }

            // Flow control.
            Instr::Jmp(t) => {
                let t = self.operand(&t)?;
                self.ip = self.code_index(t)?;
            }
            Instr::Jmpr(off) => self.ip = self.relative_index(off)?,
            Instr::Jmp0(t) => {
                let flag = self.pop_u8()?;
                let t = self.operand(&t)?;
                let target = self.code_index(t)?;
                if flag == 0 {
                    self.ip = target;
                }
            }
            Instr::Jmp0r(off) => {
                let flag = self.pop_u8()?;
                let target = self.relative_index(off)?;
                if flag == 0 {
                    self.ip = target;
                }
            }
            Instr::Jmp1(t) => {
                let flag = self.pop_u8()?;
                let t = self.operand(&t)?;
                let target = self.code_index(t)?;
                if flag != 0 {
                    self.ip = target;
                }
            }
            Instr::Jmp1r(off) => {
                let flag = self.pop_u8()?;
                let target = self.relative_index(off)?;
                if flag != 0 {
                    self.ip = target;
                }
            }

            // Integer arithmetic.
            Instr::Addi => self.bin_i(|a, b| a.wrapping_add(b))?,
            Instr::Subi => self.bin_i(|a, b| a.wrapping_sub(b))?,
            Instr::Muli => self.bin_i(|a, b| a.wrapping_mul(b))?,
            Instr::Divi => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push_i32(a.wrapping_div(b))?;
            }
            Instr::Modi => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push_i32(a.wrapping_rem(b))?;
            }
            Instr::Negi => self.un_i(|a| a.wrapping_neg())?,

            // Character arithmetic.
            Instr::Addc => self.bin_c(|a, b| a.wrapping_add(b))?,
            Instr::Subc => self.bin_c(|a, b| a.wrapping_sub(b))?,
            Instr::Mulc => self.bin_c(|a, b| a.wrapping_mul(b))?,
            Instr::Divc => {
                let b = self.pop_u8()?;
                let a = self.pop_u8()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push_u8(a / b)?;
            }
            Instr::Modc => {
                let b = self.pop_u8()?;
                let a = self.pop_u8()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push_u8(a % b)?;
            }
            Instr::Negc => self.un_c(|a| a.wrapping_neg())?,

            // Floating point arithmetic.
            Instr::Addf => self.bin_f(|a, b| a + b)?,
            Instr::Subf => self.bin_f(|a, b| a - b)?,
            Instr::Mulf => self.bin_f(|a, b| a * b)?,
            Instr::Divf => self.bin_f(|a, b| a / b)?,
            Instr::Powf => self.bin_f(|a, b| a.powf(b))?,
            Instr::Negf => self.un_f(|a| -a)?,

            // Bitwise.
            Instr::Bandi => self.bin_i(|a, b| a & b)?,
            Instr::Bori => self.bin_i(|a, b| a | b)?,
            Instr::Xori => self.bin_i(|a, b| a ^ b)?,
            Instr::Bnoti => self.un_i(|a| !a)?,
            Instr::Shli => self.bin_i(|a, b| a.wrapping_shl(b as u32))?,
            Instr::Shri => self.bin_i(|a, b| a.wrapping_shr(b as u32))?,
            Instr::Bandc => self.bin_c(|a, b| a & b)?,
            Instr::Borc => self.bin_c(|a, b| a | b)?,
            Instr::Xorc => self.bin_c(|a, b| a ^ b)?,
            Instr::Bnotc => self.un_c(|a| !a)?,
            Instr::Shlc => self.bin_c(|a, b| a.wrapping_shl(b as u32))?,
            Instr::Shrc => self.bin_c(|a, b| a.wrapping_shr(b as u32))?,

            // Logical. Operands are popped eagerly; there is no
            // short-circuit at this level.
            Instr::Landi => self.cmp_i(|a, b| a != 0 && b != 0)?,
            Instr::Lori => self.cmp_i(|a, b| a != 0 || b != 0)?,
            Instr::Lnoti => {
                let a = self.pop_i32()?;
                self.push_u8((a == 0) as u8)?;
            }
            Instr::Landc => self.cmp_c(|a, b| a != 0 && b != 0)?,
            Instr::Lorc => self.cmp_c(|a, b| a != 0 || b != 0)?,
            Instr::Lnotc => {
                let a = self.pop_u8()?;
                self.push_u8((a == 0) as u8)?;
            }
            Instr::Landf => self.cmp_f(|a, b| a != 0.0 && b != 0.0)?,
            Instr::Lorf => self.cmp_f(|a, b| a != 0.0 || b != 0.0)?,
            Instr::Lnotf => {
                let a = self.pop_f32()?;
                self.push_u8((a == 0.0) as u8)?;
            }

            // Comparisons.
            Instr::Eqi => self.cmp_i(|a, b| a == b)?,
            Instr::Neqi => self.cmp_i(|a, b| a != b)?,
            Instr::Gti => self.cmp_i(|a, b| a > b)?,
            Instr::Gtei => self.cmp_i(|a, b| a >= b)?,
            Instr::Lti => self.cmp_i(|a, b| a < b)?,
            Instr::Ltei => self.cmp_i(|a, b| a <= b)?,
            Instr::Eqc => self.cmp_c(|a, b| a == b)?,
            Instr::Neqc => self.cmp_c(|a, b| a != b)?,
            Instr::Gtc => self.cmp_c(|a, b| a > b)?,
            Instr::Gtec => self.cmp_c(|a, b| a >= b)?,
            Instr::Ltc => self.cmp_c(|a, b| a < b)?,
            Instr::Ltec => self.cmp_c(|a, b| a <= b)?,
            Instr::Eqf => self.cmp_f(|a, b| a == b)?,
            Instr::Neqf => self.cmp_f(|a, b| a != b)?,
            Instr::Gtf => self.cmp_f(|a, b| a > b)?,
            Instr::Gtef => self.cmp_f(|a, b| a >= b)?,
            Instr::Ltf => self.cmp_f(|a, b| a < b)?,
            Instr::Ltef => self.cmp_f(|a, b| a <= b)?,

            // Conversions.
            Instr::Ctoi => {
                let a = self.pop_u8()?;
                self.push_i32(a as i32)?;
            }
            Instr::Ctof => {
                let a = self.pop_u8()?;
                self.push_f32(a as f32)?;
            }
            Instr::Itoc => {
                let a = self.pop_i32()?;
                self.push_u8(a as u8)?;
            }
            Instr::Itof => {
                let a = self.pop_i32()?;
                self.push_f32(a as f32)?;
            }
            Instr::Ftoc => {
                let a = self.pop_f32()?;
                self.push_u8(a as u8)?;
            }
            Instr::Ftoi => {
                let a = self.pop_f32()?;
                self.push_i32(a as i32)?;
            }

            // Output.
            Instr::Printi => {
                let a = self.pop_i32()?;
                writeln!(self.out, "{}", a)?;
                self.push_i32(a)?;
            }
            Instr::Printc => {
                let a = self.pop_u8()?;
                writeln!(self.out, "{}", a)?;
                self.push_u8(a)?;
            }
            Instr::Printf => {
                // {:?} keeps a decimal point on round values (4.0, not 4).
                let a = self.pop_f32()?;
                writeln!(self.out, "{:?}", a)?;
                self.push_f32(a)?;
            }
        }
        Ok(())
    }

    /// Resolve a `loadi`/`jmp*` operand. Symbols are the linker's business;
    /// one reaching the VM has no address.
    fn operand(&self, op: &Operand) -> Result<i32, VmError> {
        match op {
            Operand::Imm(v) => Ok(*v),
            Operand::Sym(_) => Err(VmError::SegmentationFault),
        }
    }

    /// Validate an absolute branch target. `code.len()` itself is a valid
    /// target: fetching there terminates the program.
    fn code_index(&self, target: i32) -> Result<usize, VmError> {
        if target < 0 || target as usize > self.code.len() {
            return Err(VmError::SegmentationFault);
        }
        Ok(target as usize)
    }

    /// Validate a branch offset relative to the already-advanced `ip`.
    fn relative_index(&self, off: i32) -> Result<usize, VmError> {
        let target = self.ip as i64 + off as i64;
        if target < 0 || target as usize > self.code.len() {
            return Err(VmError::SegmentationFault);
        }
        Ok(target as usize)
    }

    /// Resolve a `push*`/`pop*` address against the current stack pointer.
    fn effective(&self, addr: i32) -> Result<usize, VmError> {
        let addr = if addr < 0 {
            addr as i64 + self.sp as i64
        } else {
            addr as i64
        };
        if addr < 0 {
            return Err(VmError::SegmentationFault);
        }
        Ok(addr as usize)
    }

    fn grow(&mut self, n: usize) -> Result<(), VmError> {
        if self.sp + n > self.stack.len() {
            return Err(VmError::StackOverflow);
        }
        self.sp += n;
        Ok(())
    }

    fn shrink(&mut self, n: usize) -> Result<(), VmError> {
        if n > self.sp {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= n;
        Ok(())
    }

    /// Copy `size` bytes from an address onto the top of the stack. The
    /// source must lie entirely inside the occupied region.
    fn push_from(&mut self, addr: i32, size: usize) -> Result<(), VmError> {
        let src = self.effective(addr)?;
        if src + size > self.sp {
            return Err(VmError::SegmentationFault);
        }
        self.grow(size)?;
        self.stack.copy_within(src..src + size, self.sp - size);
        Ok(())
    }

    /// Pop `size` bytes off the stack into an address. The address is
    /// resolved against the pre-pop `sp`; the target must lie entirely
    /// inside the region that remains occupied after the pop.
    fn pop_to(&mut self, addr: i32, size: usize) -> Result<(), VmError> {
        let dst = self.effective(addr)?;
        self.shrink(size)?;
        if dst + size > self.sp {
            return Err(VmError::SegmentationFault);
        }
        self.stack.copy_within(self.sp..self.sp + size, dst);
        Ok(())
    }

    fn push_i32(&mut self, v: i32) -> Result<(), VmError> {
        self.grow(4)?;
        self.stack[self.sp - 4..self.sp].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn push_f32(&mut self, v: f32) -> Result<(), VmError> {
        self.grow(4)?;
        self.stack[self.sp - 4..self.sp].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn push_u8(&mut self, v: u8) -> Result<(), VmError> {
        self.grow(1)?;
        self.stack[self.sp - 1] = v;
        Ok(())
    }

    fn pop_i32(&mut self) -> Result<i32, VmError> {
        self.shrink(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.stack[self.sp..self.sp + 4]);
        Ok(i32::from_le_bytes(bytes))
    }

    fn pop_f32(&mut self) -> Result<f32, VmError> {
        self.shrink(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.stack[self.sp..self.sp + 4]);
        Ok(f32::from_le_bytes(bytes))
    }

    fn pop_u8(&mut self) -> Result<u8, VmError> {
        self.shrink(1)?;
        Ok(self.stack[self.sp])
    }

    // Binary operators pop the right operand first: result = left OP right.

    fn bin_i(&mut self, f: impl FnOnce(i32, i32) -> i32) -> Result<(), VmError> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(f(a, b))
    }

    fn bin_c(&mut self, f: impl FnOnce(u8, u8) -> u8) -> Result<(), VmError> {
        let b = self.pop_u8()?;
        let a = self.pop_u8()?;
        self.push_u8(f(a, b))
    }

    fn bin_f(&mut self, f: impl FnOnce(f32, f32) -> f32) -> Result<(), VmError> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_f32(f(a, b))
    }

    fn un_i(&mut self, f: impl FnOnce(i32) -> i32) -> Result<(), VmError> {
        let a = self.pop_i32()?;
        self.push_i32(f(a))
    }

    fn un_c(&mut self, f: impl FnOnce(u8) -> u8) -> Result<(), VmError> {
        let a = self.pop_u8()?;
        self.push_u8(f(a))
    }

    fn un_f(&mut self, f: impl FnOnce(f32) -> f32) -> Result<(), VmError> {
        let a = self.pop_f32()?;
        self.push_f32(f(a))
    }

    fn cmp_i(&mut self, f: impl FnOnce(i32, i32) -> bool) -> Result<(), VmError> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_u8(f(a, b) as u8)
    }

    fn cmp_c(&mut self, f: impl FnOnce(u8, u8) -> bool) -> Result<(), VmError> {
        let b = self.pop_u8()?;
        let a = self.pop_u8()?;
        self.push_u8(f(a, b) as u8)
    }

    fn cmp_f(&mut self, f: impl FnOnce(f32, f32) -> bool) -> Result<(), VmError> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_u8(f(a, b) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_core::Instr::*;

    /// Run `code` against a small arena and return captured output lines.
    fn run_capture(code: Vec<Instr>) -> (Result<(), VmError>, Vec<String>) {
        let mut vm = Vm::with_output(code, Vec::new());
        let result = vm.run(1024);
        let text = String::from_utf8(std::mem::take(&mut vm.out)).unwrap();
        (result, text.lines().map(str::to_string).collect())
    }

    fn imm(v: i32) -> Operand {
        Operand::Imm(v)
    }

    #[test]
    fn empty_program_terminates_immediately() {
        let (result, output) = run_capture(vec![]);
        assert!(result.is_ok());
        assert!(output.is_empty());
    }

    #[test]
    fn int_arithmetic_is_left_op_right() {
        let (_, output) = run_capture(vec![
            Loadi(imm(7)),
            Loadi(imm(2)),
            Subi,
            Printi,
            Release(4),
        ]);
        assert_eq!(output, ["5"]);

        let (_, output) = run_capture(vec![
            Loadi(imm(7)),
            Loadi(imm(2)),
            Divi,
            Printi,
            Release(4),
        ]);
        assert_eq!(output, ["3"]);

        let (_, output) = run_capture(vec![
            Loadi(imm(-7)),
            Loadi(imm(2)),
            Modi,
            Printi,
            Release(4),
        ]);
        // Truncating division: remainder keeps the dividend's sign.
        assert_eq!(output, ["-1"]);
    }

    #[test]
    fn int_arithmetic_wraps() {
        let (result, output) = run_capture(vec![
            Loadi(imm(i32::MAX)),
            Loadi(imm(1)),
            Addi,
            Printi,
            Release(4),
        ]);
        assert!(result.is_ok());
        assert_eq!(output, [i32::MIN.to_string()]);

        let (result, output) = run_capture(vec![
            Loadi(imm(i32::MIN)),
            Loadi(imm(-1)),
            Divi,
            Printi,
            Release(4),
        ]);
        assert!(result.is_ok());
        assert_eq!(output, [i32::MIN.to_string()]);
    }

    #[test]
    fn shifts_mask_the_count() {
        let (_, output) = run_capture(vec![
            Loadi(imm(1)),
            Loadi(imm(3)),
            Shli,
            Printi,
            Release(4),
            Loadi(imm(-16)),
            Loadi(imm(2)),
            Shri,
            Printi,
            Release(4),
        ]);
        // shri is an arithmetic shift.
        assert_eq!(output, ["8", "-4"]);
    }

    #[test]
    fn division_by_zero_faults_at_runtime() {
        let (result, _) = run_capture(vec![Loadi(imm(1)), Loadi(imm(0)), Divi]);
        assert!(matches!(result, Err(VmError::DivisionByZero)));

        let (result, _) = run_capture(vec![Loadc(1), Loadc(0), Modc]);
        assert!(matches!(result, Err(VmError::DivisionByZero)));
    }

    #[test]
    fn float_division_by_zero_is_inf_not_a_fault() {
        let (result, output) = run_capture(vec![
            Loadf(1.0),
            Loadf(0.0),
            Divf,
            Printf,
            Release(4),
        ]);
        assert!(result.is_ok());
        assert_eq!(output, ["inf"]);
    }

    #[test]
    fn float_printing_keeps_a_decimal_point() {
        let (_, output) = run_capture(vec![
            Loadf(1.5),
            Loadf(2.5),
            Addf,
            Printf,
            Release(4),
        ]);
        assert_eq!(output, ["4.0"]);
    }

    #[test]
    fn char_arithmetic_is_modular() {
        let (_, output) = run_capture(vec![
            Loadc(200),
            Loadc(100),
            Addc,
            Printc,
            Release(1),
        ]);
        assert_eq!(output, ["44"]);

        // negc 0 stays 0 ((-a) & 0xFF, not 256 - a).
        let (_, output) = run_capture(vec![Loadc(0), Negc, Printc, Release(1)]);
        assert_eq!(output, ["0"]);

        let (_, output) = run_capture(vec![Loadc(1), Negc, Printc, Release(1)]);
        assert_eq!(output, ["255"]);
    }

    #[test]
    fn comparisons_and_logicals_produce_char_flags() {
        let (_, output) = run_capture(vec![
            Loadi(imm(3)),
            Loadi(imm(5)),
            Lti,
            Printc,
            Release(1),
            Loadf(2.0),
            Loadf(2.0),
            Eqf,
            Printc,
            Release(1),
            Loadi(imm(7)),
            Loadi(imm(0)),
            Landi,
            Printc,
            Release(1),
            Loadf(0.5),
            Lnotf,
            Printc,
            Release(1),
        ]);
        assert_eq!(output, ["1", "1", "0", "0"]);
    }

    #[test]
    fn conversions_round_trip_through_the_expected_casts() {
        let (_, output) = run_capture(vec![
            Loadc(200),
            Ctoi,
            Printi,
            Release(4),
            Loadi(imm(300)),
            Itoc,
            Printc,
            Release(1),
            Loadf(3.9),
            Ftoi,
            Printi,
            Release(4),
            Loadi(imm(2)),
            Itof,
            Printf,
            Release(4),
        ]);
        assert_eq!(output, ["200", "44", "3", "2.0"]);
    }

    #[test]
    fn print_leaves_the_value_on_the_stack() {
        let mut vm = Vm::with_output(vec![Loadi(imm(9)), Printi], Vec::new());
        vm.start(64);
        while let Ok(Step::Running) = vm.step() {}
        assert_eq!(vm.sp(), 4);
    }

    #[test]
    fn alloc_to_exactly_the_limit_succeeds_one_more_overflows() {
        let mut vm = Vm::with_output(vec![Alloc(64)], Vec::new());
        vm.start(64);
        assert!(matches!(vm.step(), Ok(Step::Running)));
        assert_eq!(vm.sp(), 64);

        let mut vm = Vm::with_output(vec![Alloc(1024), Alloc(1)], Vec::new());
        assert!(matches!(vm.run(1024), Err(VmError::StackOverflow)));
    }

    #[test]
    fn pops_on_an_empty_stack_underflow() {
        let (result, _) = run_capture(vec![Addi]);
        assert!(matches!(result, Err(VmError::StackUnderflow)));

        let (result, _) = run_capture(vec![Release(1)]);
        assert!(matches!(result, Err(VmError::StackUnderflow)));

        let (result, _) = run_capture(vec![Popip]);
        assert!(matches!(result, Err(VmError::StackUnderflow)));
    }

    #[test]
    fn out_of_range_branches_fault_without_branching() {
        let (result, _) = run_capture(vec![Jmp(imm(99))]);
        assert!(matches!(result, Err(VmError::SegmentationFault)));

        let (result, _) = run_capture(vec![Jmpr(-2)]);
        assert!(matches!(result, Err(VmError::SegmentationFault)));

        // The target is validated even when the branch is not taken.
        let (result, _) = run_capture(vec![Loadc(1), Jmp0r(99)]);
        assert!(matches!(result, Err(VmError::SegmentationFault)));
    }

    #[test]
    fn jmp_to_code_end_terminates() {
        let (result, output) = run_capture(vec![Jmp(imm(2)), Printi, Nop]);
        assert!(result.is_ok());
        assert!(output.is_empty());
    }

    #[test]
    fn conditional_branches_pop_their_flag() {
        let (_, output) = run_capture(vec![
            Loadi(imm(1)),
            Loadc(0),
            Jmp0r(1),
            Printi, // skipped
            Release(4),
        ]);
        assert!(output.is_empty());

        let (_, output) = run_capture(vec![
            Loadi(imm(1)),
            Loadc(1),
            Jmp0r(1),
            Printi, // flag non-zero: falls through
            Release(4),
        ]);
        assert_eq!(output, ["1"]);
    }

    #[test]
    fn relative_addressing_reads_below_the_top() {
        // [int 42][char pad] then pushi of the int via a negative address.
        let (_, output) = run_capture(vec![
            Loadi(imm(42)),
            Loadc(0),
            Pushi(-5),
            Printi,
            Release(4),
            Release(1),
            Release(4),
        ]);
        assert_eq!(output, ["42"]);
    }

    #[test]
    fn absolute_addressing_reads_the_arena_bottom() {
        let (_, output) = run_capture(vec![
            Loadi(imm(7)),
            Loadi(imm(0)),
            Pushi(0),
            Printi,
            Release(4),
            Release(8),
        ]);
        assert_eq!(output, ["7"]);
    }

    #[test]
    fn reading_past_the_occupied_region_segfaults() {
        let (result, _) = run_capture(vec![Loadc(1), Pushi(-1)]);
        assert!(matches!(result, Err(VmError::SegmentationFault)));

        let (result, _) = run_capture(vec![Loadi(imm(1)), Popi(0)]);
        // The popped slot itself is no longer a valid pop target.
        assert!(matches!(result, Err(VmError::SegmentationFault)));
    }

    #[test]
    fn pop_writes_through_a_relative_address() {
        let (_, output) = run_capture(vec![
            Loadi(imm(1)),
            Loadi(imm(99)),
            Popi(-8), // overwrite the first slot
            Printi,
            Release(4),
        ]);
        assert_eq!(output, ["99"]);
    }

    #[test]
    fn call_sequence_returns_to_the_release() {
        // A hand-assembled call following the calling convention. The
        // callee at 8 copies its argument into the caller's result slot;
        // popip resumes at the release that discards the argument.
        let code = vec![
            Alloc(4),       // 0: result slot at [0,4)
            Loadi(imm(42)), // 1: argument at [4,8)
            Loadi(imm(2)),  // 2
            Puship,         // 3: pushes 4 (the advanced ip)
            Addi,           // 4: return address = 6
            Jmp(imm(8)),    // 5
            Release(4),     // 6: discard the argument on return
            Jmpr(3),        // 7: hop over the callee to 11
            Pushi(-8),      // 8: re-push the argument (sp 12 -> 16)
            Popi(-16),      // 9: write it into the result slot
            Popip,          // 10: resume at 6
            Printi,         // 11
            Release(4),     // 12
        ];
        let (result, output) = run_capture(code);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(output, ["42"]);
    }

    #[test]
    fn unresolved_symbols_have_no_address() {
        let (result, _) = run_capture(vec![Jmp(Operand::sym("missing"))]);
        assert!(matches!(result, Err(VmError::SegmentationFault)));
    }

    #[test]
    fn graceful_termination_leaves_sp_zero() {
        let mut vm = Vm::with_output(
            vec![Loadi(imm(3)), Printi, Release(4)],
            Vec::new(),
        );
        vm.start(64);
        loop {
            match vm.step() {
                Ok(Step::Running) => {}
                Ok(Step::Terminated) => break,
                Err(e) => panic!("fault: {}", e),
            }
        }
        assert_eq!(vm.sp(), 0);
    }
}
