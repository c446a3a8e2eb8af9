use std::io;

use thiserror::Error;

/// Loader failures: the file could not be read, or its header does not
/// describe a well-formed image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Invalid(String),
}

impl ImageError {
    /// Stable kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ImageError::Io(_) => "IOError",
            ImageError::Invalid(_) => "InvalidImage",
        }
    }
}

/// Decoder failures: the cursor stepped outside the code section, or the
/// bytes at the cursor do not form an instruction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("code offset {offset:#010x} is out of bounds for {len} bytes of code")]
    OutOfBounds { offset: usize, len: usize },

    #[error("jump target {target:#010x} is out of bounds for {len} bytes of code")]
    BadJumpTarget { target: i64, len: usize },

    #[error("unknown opcode {opcode:#04x} at {offset:#010x}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("unsupported location kind {kind} at {offset:#010x}")]
    BadLocKind { kind: u8, offset: usize },

    #[error("string offset {offset} is out of bounds for a table of {table_size} bytes")]
    StringOutOfBounds { offset: i64, table_size: usize },

    #[error("string at offset {offset} runs past the end of the string table")]
    UnterminatedString { offset: usize },

    #[error("negative operand count {count} at {offset:#010x}")]
    NegativeCount { count: i32, offset: usize },

    #[error("invalid public symbol index {index} for a table of {count} entries")]
    BadPublicIndex { index: usize, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_error_kinds_name_the_failure_table_rows() {
        let io_err = ImageError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(io_err.kind(), "IOError");
        assert_eq!(ImageError::Invalid("bad".into()).kind(), "InvalidImage");
    }

    #[test]
    fn messages_carry_the_offending_location() {
        let e = BytecodeError::UnknownOpcode { opcode: 0x8F, offset: 3 };
        let text = e.to_string();
        assert!(text.contains("0x8f") && text.contains("0x00000003"), "got: {text}");

        let e = BytecodeError::StringOutOfBounds { offset: 99, table_size: 5 };
        assert!(e.to_string().contains("99"));
    }
}
