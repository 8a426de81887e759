//! Runtime interpreter error implementation

use thiserror::Error;

/// Status an evaluation can fail with. One variant per failure class; the
/// evaluator never retries per opcode, a raised status unwinds the whole
/// call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Status {
    /// Malformed AML: bad name characters, reserved opcode, range overflow,
    /// type violation, control flow outside a loop, and similar.
    #[error("malformed bytecode")]
    BadBytecode,
    /// An allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// Name resolution failed in a context that does not permit unresolved
    /// references.
    #[error("named object not found")]
    NotFound,
    /// A named object was created over an existing name.
    #[error("named object already exists")]
    AlreadyExists,
    /// The code offset ran past the end of the method during opcode fetch.
    #[error("code offset out of bounds")]
    OutOfBounds,
    /// Host-level misuse (e.g. argument count mismatch) or an internal
    /// inconsistency.
    #[error("invalid argument")]
    InvalidArgument,
    /// The opcode has no installed handler.
    #[error("unimplemented opcode")]
    Unimplemented,
}

/// Error returned by [`crate::interpreter::Interpreter::evaluate`]. Carries
/// the status plus the offending opcode when the failure happened while an
/// op was being parsed or executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InterpreterError {
    /// The evaluation failed before any opcode context existed (e.g. an
    /// argument count mismatch).
    #[error("evaluation failed: {0}")]
    Evaluation(Status),
    /// The evaluation failed inside the given opcode.
    #[error("evaluation failed in {name} (0x{code:04X}): {status}")]
    Opcode {
        /// Status the opcode raised.
        status: Status,
        /// 16-bit opcode (extended opcodes carry the `0x5B` prefix in the
        /// high byte).
        code: u16,
        /// Catalog name of the opcode.
        name: &'static str,
    },
}

impl InterpreterError {
    /// The status that terminated the evaluation.
    pub const fn status(&self) -> Status {
        match self {
            Self::Evaluation(status) => *status,
            Self::Opcode { status, .. } => *status,
        }
    }
}

impl From<Status> for InterpreterError {
    fn from(status: Status) -> Self {
        Self::Evaluation(status)
    }
}
