//! Virtual machine error types.

use std::fmt;
use std::io;

/// Result of a single [`crate::Vm::step`].
///
/// Reaching the end of the code array is the normal exit path of a
/// FullCircle program, so it is reported as `Terminated`, not as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Running,
    Terminated,
}

/// A fault raised while executing bytecode. All faults terminate the run.
#[derive(Debug)]
pub enum VmError {
    /// An attempt was made to release or pop more memory than is allocated.
    StackUnderflow,
    /// An attempt was made to allocate beyond the configured stack size.
    StackOverflow,
    /// Integer or character division/modulus with a zero divisor.
    DivisionByZero,
    /// A memory access outside `[0, sp)` or a branch target outside the
    /// code array.
    SegmentationFault,
    /// The output sink failed while executing a print instruction.
    Io(io::Error),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackUnderflow => write!(f, "stack underflow"),
            VmError::StackOverflow => write!(f, "stack overflow"),
            VmError::DivisionByZero => write!(f, "division by zero"),
            VmError::SegmentationFault => write!(f, "segmentation fault"),
            VmError::Io(e) => write!(f, "output error: {}", e),
        }
    }
}

impl std::error::Error for VmError {}

impl From<io::Error> for VmError {
    fn from(e: io::Error) -> Self {
        VmError::Io(e)
    }
}
