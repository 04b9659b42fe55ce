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

//! Transaction context handed to the lock manager
//!
//! The context owns the begin/commit/abort boundary. The lock manager only
//! reads the state, forces it to [`TransactionState::Aborted`] when a parked
//! request is released, and sets the timeout flag from the sweeper thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::core::JobId;

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    /// Transaction is running and may request locks
    Active = 0,
    /// Transaction has committed
    Committed = 1,
    /// Transaction has been aborted
    Aborted = 2,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransactionState::Committed,
            2 => TransactionState::Aborted,
            _ => TransactionState::Active,
        }
    }
}

/// Per-transaction state shared between its worker and the lock manager
#[derive(Debug)]
pub struct TransactionContext {
    job_id: JobId,
    state: AtomicU8,
    timeout: AtomicBool,
}

impl TransactionContext {
    /// Create an active transaction context
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            state: AtomicU8::new(TransactionState::Active as u8),
            timeout: AtomicBool::new(false),
        }
    }

    /// Job id used as the lock owner
    #[inline]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Overwrite the state
    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Whether the state is [`TransactionState::Aborted`]
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state() == TransactionState::Aborted
    }

    /// Mark the transaction committed unless it was already aborted
    ///
    /// Returns false when the transaction had been aborted.
    pub fn commit(&self) -> bool {
        self.state
            .compare_exchange(
                TransactionState::Active as u8,
                TransactionState::Committed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the transaction aborted
    pub fn abort(&self) {
        self.set_state(TransactionState::Aborted);
    }

    /// Whether a lock wait of this transaction timed out
    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.timeout.load(Ordering::Acquire)
    }

    /// Set by the timeout sweep when a parked request exceeds the wait timeout
    pub fn set_timeout(&self, timeout: bool) {
        self.timeout.store(timeout, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_active() {
        let txn = TransactionContext::new(JobId(4));
        assert_eq!(txn.job_id(), JobId(4));
        assert_eq!(txn.state(), TransactionState::Active);
        assert!(!txn.is_timeout());
    }

    #[test]
    fn test_commit_after_abort_fails() {
        let txn = TransactionContext::new(JobId(1));
        txn.abort();
        assert!(!txn.commit());
        assert!(txn.is_aborted());

        let txn = TransactionContext::new(JobId(2));
        assert!(txn.commit());
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn test_timeout_flag() {
        let txn = TransactionContext::new(JobId(1));
        txn.set_timeout(true);
        assert!(txn.is_timeout());
    }
}
