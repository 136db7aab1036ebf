use std::collections::TryReserveError;

use crate::codec::DecodeError;
use crate::opcode::OpCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OffsetMisaligned,
    NotFound,
    AlreadyActive,
    NotActive,
    UnsupportedConstruct,
    Underrun,
    Consistency,
    AllocationFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    OffsetMisaligned {
        offset: u32,
    },
    LineNotFound {
        line: u32,
    },
    OffsetNotFound {
        offset: u32,
    },
    AlreadyActive {
        id: u32,
    },
    NotActive {
        id: u32,
    },
    UnsupportedConstruct {
        offset: u32,
        opcode: OpCode,
    },
    Underrun {
        what: &'static str,
        by: u64,
    },
    Consistency(String),
    Decode(DecodeError),
    AllocationFailure(TryReserveError),
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::OffsetMisaligned { .. } => ErrorKind::OffsetMisaligned,
            PatchError::LineNotFound { .. } | PatchError::OffsetNotFound { .. } => {
                ErrorKind::NotFound
            }
            PatchError::AlreadyActive { .. } => ErrorKind::AlreadyActive,
            PatchError::NotActive { .. } => ErrorKind::NotActive,
            PatchError::UnsupportedConstruct { .. } => ErrorKind::UnsupportedConstruct,
            PatchError::Underrun { .. } => ErrorKind::Underrun,
            PatchError::Consistency(_) | PatchError::Decode(_) => ErrorKind::Consistency,
            PatchError::AllocationFailure(_) => ErrorKind::AllocationFailure,
        }
    }

    pub(crate) fn consistency(message: impl Into<String>) -> Self {
        PatchError::Consistency(message.into())
    }
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::OffsetMisaligned { offset } => {
                write!(f, "no instruction boundary at byte offset {offset}")
            }
            PatchError::LineNotFound { line } => {
                write!(f, "no code is attributed to line {line} or any later line")
            }
            PatchError::OffsetNotFound { offset } => {
                write!(f, "byte offset {offset} is outside the line table")
            }
            PatchError::AlreadyActive { id } => write!(f, "breakpoint {id} is already active"),
            PatchError::NotActive { id } => write!(f, "breakpoint {id} is not active"),
            PatchError::UnsupportedConstruct { offset, opcode } => write!(
                f,
                "function suspends at offset {offset} ({}); resumable functions cannot be instrumented",
                opcode.mnemonic()
            ),
            PatchError::Underrun { what, by } => write!(f, "{what} would underrun by {by}"),
            PatchError::Consistency(message) => write!(f, "inconsistent bytecode: {message}"),
            PatchError::Decode(err) => write!(f, "undecodable bytecode: {err}"),
            PatchError::AllocationFailure(err) => write!(f, "allocation failed: {err}"),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchError::Decode(err) => Some(err),
            PatchError::AllocationFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DecodeError> for PatchError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::AllocationFailure(err) => PatchError::AllocationFailure(err),
            err => PatchError::Decode(err),
        }
    }
}

impl From<TryReserveError> for PatchError {
    fn from(err: TryReserveError) -> Self {
        PatchError::AllocationFailure(err)
    }
}

pub type PatchResult<T> = Result<T, PatchError>;
