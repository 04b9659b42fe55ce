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

//! Periodic lock-wait timeout sweep

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::lock_manager::LockManager;

impl LockManager {
    /// Start a thread that runs [`sweep_for_timeout`](Self::sweep_for_timeout)
    /// every `timeout_sweep_interval`
    ///
    /// Returns a handle that stops the thread when dropped.
    pub fn start_timeout_sweep(self: &Arc<Self>) -> TimeoutSweepHandle {
        let interval = self.config().timeout_sweep_interval();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = Arc::clone(&stop_flag);
        let manager = Arc::clone(self);

        let handle = thread::spawn(move || {
            let check_interval = interval.min(Duration::from_millis(100));
            while !stop_flag_clone.load(Ordering::Acquire) {
                let mut elapsed = Duration::ZERO;
                while elapsed < interval && !stop_flag_clone.load(Ordering::Acquire) {
                    thread::sleep(check_interval);
                    elapsed += check_interval;
                }

                if stop_flag_clone.load(Ordering::Acquire) {
                    break;
                }

                let victims = manager.sweep_for_timeout();
                if victims > 0 {
                    debug!(victims, "timeout sweep");
                }
            }
        });

        TimeoutSweepHandle {
            stop_flag,
            thread: Some(handle),
        }
    }
}

/// Handle for stopping the timeout sweep thread
pub struct TimeoutSweepHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TimeoutSweepHandle {
    /// Stop the sweep thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimeoutSweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AbortReason, DatasetId, Error, JobId, LockMode};
    use crate::storage::LockManagerConfig;
    use crate::txn::TransactionContext;

    #[test]
    fn test_sweeper_times_out_blocked_waiter() {
        let config = LockManagerConfig::compact()
            .with_lock_wait_timeout(Duration::from_millis(50))
            .with_timeout_sweep_interval(Duration::from_millis(10));
        let lm = Arc::new(LockManager::new(config));
        let mut sweeper = lm.start_timeout_sweep();

        let t1 = Arc::new(TransactionContext::new(JobId(1)));
        let t2 = Arc::new(TransactionContext::new(JobId(2)));
        lm.lock(DatasetId(1), 7, LockMode::Exclusive, &t1).unwrap();

        let lm2 = Arc::clone(&lm);
        let t2c = Arc::clone(&t2);
        let blocked = thread::spawn(move || lm2.lock(DatasetId(1), 7, LockMode::Shared, &t2c));
        let result = blocked.join().unwrap();
        assert_eq!(result, Err(Error::aborted(JobId(2), AbortReason::Timeout)));
        assert!(t2.is_timeout());
        assert_eq!(lm.stats().timeout_victims, 1);

        sweeper.stop();
        lm.release_locks(&t2).unwrap();
        lm.release_locks(&t1).unwrap();
        assert_eq!(lm.job_count(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let lm = Arc::new(LockManager::new(LockManagerConfig::compact()));
        let mut sweeper = lm.start_timeout_sweep();
        sweeper.stop();
        sweeper.stop();
    }
}
