//! Shared foundation for the FullCircle toolchain.
//!
//! The compiler (`fc-compiler`) lowers source programs to a `Vec<Instr>` and
//! the virtual machine (`fc-vm`) executes it; this crate is the contract
//! between the two. It deliberately contains no behavior beyond the
//! instruction set itself: scalar types with their on-stack sizes, the
//! opcode enum, and the symbolic operands the linker resolves.

pub mod instr;
pub mod types;

pub use instr::{Instr, Operand};
pub use types::ScalarType;
