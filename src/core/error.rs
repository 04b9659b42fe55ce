// Copyright 2025 Hyrax Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for Hyrax
//!
//! One error enum is shared by the lock manager and the join engine. Lock
//! acquisition failures are always reported as [`Error::Aborted`]; callers
//! decide whether to resubmit the whole transaction.

use thiserror::Error;

use super::types::JobId;

/// Result type alias for Hyrax operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a lock request was turned into an abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Parking the request would close a cycle in the wait-for graph
    Deadlock,
    /// The request waited longer than the configured wait timeout
    Timeout,
    /// The transaction was already marked aborted
    TransactionAborted,
    /// The job released its locks while this request was parked
    Released,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Deadlock => write!(f, "deadlock"),
            AbortReason::Timeout => write!(f, "lock wait timeout"),
            AbortReason::TransactionAborted => write!(f, "transaction already aborted"),
            AbortReason::Released => write!(f, "locks released while waiting"),
        }
    }
}

/// Main error type for Hyrax
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Lock manager errors
    // =========================================================================
    /// The transaction must be aborted by its owner
    #[error("job {job_id} must abort: {reason}")]
    Aborted { job_id: JobId, reason: AbortReason },

    /// Caller violated the locking protocol
    #[error("invalid lock request: {0}")]
    InvalidLockRequest(String),

    /// Unlock of a resource the job does not hold
    #[error("job {job_id} does not hold a lock on dataset {dataset_id} entity {entity_hash}")]
    LockNotHeld {
        job_id: JobId,
        dataset_id: i32,
        entity_hash: i32,
    },

    // =========================================================================
    // Join engine errors
    // =========================================================================
    /// A single tuple does not fit into the frames available to it
    #[error("tuple of {size} bytes does not fit into a frame budget of {capacity} bytes")]
    TupleTooLarge { size: usize, capacity: usize },

    /// Frame bytes are malformed
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    /// Join configuration is not usable
    #[error("invalid join configuration: {0}")]
    InvalidJoinConfig(String),

    /// Joiner was driven outside of its lifecycle
    #[error("joiner state error: {0}")]
    JoinState(String),

    // =========================================================================
    // Other errors
    // =========================================================================
    /// Operation not supported
    #[error("not supported: {0}")]
    NotSupported(String),

    /// IO error (wrapped)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error for unexpected conditions
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new Aborted error
    pub fn aborted(job_id: JobId, reason: AbortReason) -> Self {
        Error::Aborted { job_id, reason }
    }

    /// Create a new InvalidLockRequest error
    pub fn invalid_lock_request(message: impl Into<String>) -> Self {
        Error::InvalidLockRequest(message.into())
    }

    /// Create a new CorruptFrame error
    pub fn corrupt_frame(message: impl Into<String>) -> Self {
        Error::CorruptFrame(message.into())
    }

    /// Create a new InvalidJoinConfig error
    pub fn invalid_join_config(message: impl Into<String>) -> Self {
        Error::InvalidJoinConfig(message.into())
    }

    /// Create a new JoinState error
    pub fn join_state(message: impl Into<String>) -> Self {
        Error::JoinState(message.into())
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error asks the caller to abort its transaction
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }

    /// Job id carried by an abort, if any
    pub fn aborted_job(&self) -> Option<JobId> {
        match self {
            Error::Aborted { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::aborted(JobId(7), AbortReason::Deadlock);
        assert_eq!(err.to_string(), "job 7 must abort: deadlock");

        let err = Error::TupleTooLarge {
            size: 100,
            capacity: 64,
        };
        assert_eq!(
            err.to_string(),
            "tuple of 100 bytes does not fit into a frame budget of 64 bytes"
        );
    }

    #[test]
    fn test_is_abort() {
        assert!(Error::aborted(JobId(1), AbortReason::Timeout).is_abort());
        assert!(!Error::internal("x").is_abort());
        assert_eq!(
            Error::aborted(JobId(3), AbortReason::Released).aborted_job(),
            Some(JobId(3))
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("gone"));
    }
}
