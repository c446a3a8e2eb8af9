//! Fatal interpreter errors and the diagnostic that reports them.

use std::fmt;

use bytecode::BytecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    #[error(transparent)]
    Runtime(#[from] runtime::RuntimeError),

    #[error("unsupported instruction {0}")]
    Unsupported(&'static str),

    #[error("value stack overflow")]
    ValueStackOverflow,

    #[error("value stack underflow")]
    ValueStackUnderflow,

    #[error("call stack overflow")]
    CallStackOverflow,

    #[error("call stack underflow")]
    CallStackUnderflow,

    #[error("attempt to divide {lhs} by zero")]
    DivisionByZero { lhs: isize },

    #[error("index {index} is out of bounds for {region} of size {size}")]
    IndexOutOfRange {
        region: &'static str,
        index: isize,
        size: usize,
    },

    #[error("pattern matching failed at {line}:{col}")]
    Failure { line: i32, col: i32 },
}

impl VmError {
    /// Stable kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        use runtime::RuntimeError as Rt;
        match self {
            VmError::Bytecode(_) | VmError::Unsupported(_) => "InvalidBytecode",
            VmError::Runtime(Rt::NotAClosure { .. }) => "NotAClosure",
            VmError::Runtime(Rt::IndexOutOfRange { .. }) => "IndexOutOfRange",
            VmError::Runtime(Rt::NotIndexable { .. }) => "NotIndexable",
            VmError::Runtime(Rt::BadTag { .. }) => "InvalidBytecode",
            VmError::Runtime(Rt::Io(_)) => "IOError",
            VmError::ValueStackOverflow => "ValueStackOverflow",
            VmError::ValueStackUnderflow => "ValueStackUnderflow",
            VmError::CallStackOverflow => "CallStackOverflow",
            VmError::CallStackUnderflow => "CallStackUnderflow",
            VmError::DivisionByZero { .. } => "DivisionByZero",
            VmError::IndexOutOfRange { .. } => "IndexOutOfRange",
            VmError::Failure { .. } => "RuntimeFailure",
        }
    }
}

/// One fatal report: the failing instruction plus machine state.
#[derive(Debug)]
pub struct Diagnostic {
    pub offset: usize,
    pub opcode: u8,
    pub vstack_top: usize,
    pub cstack_depth: usize,
    pub source: VmError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.source.kind(), self.source)?;
        writeln!(f, "\tinstruction offset: {:#010x}", self.offset)?;
        writeln!(f, "\topcode: {:#04x}", self.opcode)?;
        write!(
            f,
            "\tvstack top: {}, cstack depth: {}",
            self.vstack_top, self.cstack_depth
        )
    }
}

impl std::error::Error for Diagnostic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
