use thiserror::Error;

use crate::location::Unwritable;
use crate::op::OpName;
use crate::path::PathError;
use crate::value::ValueKind;

/// Coarse classification of a [`DomeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path text.
    PathSyntax,
    /// An operation met a value (or argument) of the wrong shape.
    TypeMismatch,
    /// The dome cannot honour the call in its current state.
    InvalidState,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomeError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("cannot {op} a value of type {found}")]
    TypeMismatch { op: OpName, found: ValueKind },
    #[error("invalid argument for {op}: {reason}")]
    InvalidArgument { op: OpName, reason: String },
    #[error("length requires a sequence, found {0}")]
    NotSequence(ValueKind),
    #[error("key {key:?} cannot address an element of a sequence")]
    SequenceKey { key: String },
    #[error("index {index} is too far past the end of a sequence of length {len}")]
    IndexTooFar { index: usize, len: usize },
    #[error("there are no snapshots to roll back to")]
    NoSnapshot,
    #[error("cannot {0} a wrapped dome")]
    WrappedDome(&'static str),
    #[error("path {0:?} does not hold a sequence or map")]
    WrapMissing(String),
    #[error("invalid diff entry: {0}")]
    InvalidDiff(String),
    #[error("dome has been destroyed")]
    Destroyed,
}

impl From<Unwritable> for DomeError {
    fn from(err: Unwritable) -> Self {
        match err {
            Unwritable::SequenceKey(chunk) => DomeError::SequenceKey {
                key: chunk.to_string(),
            },
            Unwritable::IndexTooFar { index, len } => DomeError::IndexTooFar { index, len },
        }
    }
}

impl DomeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomeError::Path(_) => ErrorKind::PathSyntax,
            DomeError::TypeMismatch { .. }
            | DomeError::InvalidArgument { .. }
            | DomeError::NotSequence(_)
            | DomeError::SequenceKey { .. }
            | DomeError::IndexTooFar { .. }
            | DomeError::InvalidDiff(_) => ErrorKind::TypeMismatch,
            DomeError::NoSnapshot
            | DomeError::WrappedDome(_)
            | DomeError::WrapMissing(_)
            | DomeError::Destroyed => ErrorKind::InvalidState,
        }
    }

    pub(crate) fn mismatch(op: OpName, found: ValueKind) -> Self {
        DomeError::TypeMismatch { op, found }
    }

    pub(crate) fn argument(op: OpName, reason: impl Into<String>) -> Self {
        DomeError::InvalidArgument {
            op,
            reason: reason.into(),
        }
    }
}
