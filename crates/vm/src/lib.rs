//! The FullCircle virtual machine.
//!
//! A strictly single-threaded stack machine: one byte-addressable stack
//! arena, a stack pointer indexing the next free byte, and an instruction
//! pointer indexing the next instruction to execute. The machine owns its
//! arena for the duration of a run and shares nothing across invocations;
//! embedders wanting cancellation simply stop calling [`Vm::step`].

pub mod error;
pub mod machine;

pub use error::{Step, VmError};
pub use machine::{DEFAULT_STACK_SIZE, Vm};

use fc_core::Instr;

/// Execute `code` to completion against a fresh stack arena of `stack_size`
/// bytes, printing through stdout.
pub fn run(code: &[Instr], stack_size: usize) -> Result<(), VmError> {
    Vm::new(code.to_vec()).run(stack_size)
}
