//! List protocol error types.

use std::fmt;

use miette::Diagnostic;
use open_midrange_record::RecordError;
use thiserror::Error;

use crate::channel::ChannelError;

/// The host call a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Build the list snapshot.
    Open,
    /// Fetch a block of entries.
    GetEntries,
    /// Release the snapshot.
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Open => write!(f, "open"),
            Operation::GetEntries => write!(f, "get-entries"),
            Operation::Close => write!(f, "close"),
        }
    }
}

/// Errors produced by list sessions and enumerators.
#[derive(Debug, Error, Diagnostic)]
pub enum ListError {
    /// A record could not be encoded or decoded.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] RecordError),

    /// The object stayed locked through every retry.
    #[error("{operation} still locked after {attempts} attempts ({})", message_ids.join(", "))]
    #[diagnostic(code(list::lock_timeout))]
    LockTimeout {
        /// Call that kept failing.
        operation: Operation,
        /// Attempts made.
        attempts: u32,
        /// Host message ids from the last attempt.
        message_ids: Vec<String>,
    },

    /// The host and this client disagree about the list.
    #[error("inconsistent list state: {detail}")]
    #[diagnostic(code(list::inconsistent_state))]
    InconsistentListState {
        /// What disagreed.
        detail: String,
    },

    /// Operation on a session that is closed, not yet open, or already used.
    #[error("{operation} attempted on a session that is not open")]
    #[diagnostic(code(list::session_closed))]
    SessionClosed {
        /// Attempted operation.
        operation: Operation,
    },

    /// The channel itself failed.
    #[error("transport failure during {operation}: {source}")]
    #[diagnostic(code(list::transport_failure))]
    TransportFailure {
        /// Call in flight.
        operation: Operation,
        /// Lower-layer error.
        source: ChannelError,
    },

    /// The host rejected the call for a reason other than a lock.
    #[error("host rejected {operation} ({})", message_ids.join(", "))]
    #[diagnostic(code(list::host_failure))]
    HostFailure {
        /// Rejected call.
        operation: Operation,
        /// Host message ids.
        message_ids: Vec<String>,
    },

    /// The list information buffer cannot hold the status header.
    #[error("list information buffer is {available} bytes, status header needs {needed}")]
    #[diagnostic(code(list::status_buffer_too_small))]
    StatusBufferTooSmall {
        /// Header length.
        needed: usize,
        /// Bytes returned.
        available: usize,
    },

    /// `next` called with no entries left.
    #[error("no more list entries")]
    #[diagnostic(code(list::no_such_element))]
    NoSuchElement,

    /// Settings that cannot drive a session.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(list::invalid_configuration))]
    InvalidConfiguration {
        /// What is wrong.
        message: String,
    },
}

/// Failure categories callers report alongside host message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Buffer ended before the record.
    TruncatedRecord,
    /// Value wider than its field.
    FieldTooLong,
    /// Bad packed or zoned bytes.
    MalformedDecimal,
    /// Any other descriptor/data mismatch.
    Codec,
    /// Lock contention outlasted the retry bound.
    LockTimeout,
    /// Host/client protocol disagreement.
    InconsistentListState,
    /// Session misuse.
    SessionClosed,
    /// Lower-layer failure.
    TransportFailure,
    /// Host rejected the call.
    HostFailure,
    /// Bad settings or static buffer sizing.
    Configuration,
    /// Enumerator exhausted.
    NoSuchElement,
}

impl ListError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ListError::Record(RecordError::TruncatedRecord { .. }) => ErrorKind::TruncatedRecord,
            ListError::Record(RecordError::FieldTooLong { .. }) => ErrorKind::FieldTooLong,
            ListError::Record(RecordError::MalformedDecimal { .. }) => ErrorKind::MalformedDecimal,
            ListError::Record(_) => ErrorKind::Codec,
            ListError::LockTimeout { .. } => ErrorKind::LockTimeout,
            ListError::InconsistentListState { .. } => ErrorKind::InconsistentListState,
            ListError::SessionClosed { .. } => ErrorKind::SessionClosed,
            ListError::TransportFailure { .. } => ErrorKind::TransportFailure,
            ListError::HostFailure { .. } => ErrorKind::HostFailure,
            ListError::StatusBufferTooSmall { .. } | ListError::InvalidConfiguration { .. } => {
                ErrorKind::Configuration
            }
            ListError::NoSuchElement => ErrorKind::NoSuchElement,
        }
    }

    /// Host message ids carried by the error, passed through untouched.
    pub fn message_ids(&self) -> &[String] {
        match self {
            ListError::LockTimeout { message_ids, .. } | ListError::HostFailure { message_ids, .. } => {
                message_ids
            }
            _ => &[],
        }
    }

    pub(crate) fn inconsistent(detail: impl Into<String>) -> Self {
        ListError::InconsistentListState {
            detail: detail.into(),
        }
    }
}

/// Result type for list operations.
pub type ListResult<T> = Result<T, ListError>;
