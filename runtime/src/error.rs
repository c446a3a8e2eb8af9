use std::io;

use thiserror::Error;

/// Failures raised by the allocation contract and the library builtins.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("expected a closure, found {found}")]
    NotAClosure { found: &'static str },

    #[error("index {index} is out of range for {len} elements")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("cannot index into {found}")]
    NotIndexable { found: &'static str },

    #[error("tag {tag:?} cannot be hashed: {reason}")]
    BadTag { tag: String, reason: &'static str },

    #[error("{0}")]
    Io(#[from] io::Error),
}
