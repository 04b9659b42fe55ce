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

//! Runtime configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::core::{Error, Result};

/// Configuration options for the lock manager
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    /// Number of records per slab in every lock table
    /// Default: 1024
    pub slots_per_slab: usize,

    /// How long a slab table must stay under one third utilization before
    /// it shrinks, in milliseconds
    /// Default: 120000 (2 minutes)
    pub shrink_timer_threshold_ms: u64,

    /// Maximum time a request may stay parked before the timeout sweep marks
    /// it as a victim, in milliseconds
    /// Default: 60000 (1 minute)
    pub lock_wait_timeout_ms: u64,

    /// Interval between timeout sweeps, in milliseconds
    /// Default: 10000 (10 seconds)
    pub timeout_sweep_interval_ms: u64,

    /// Whether to run the wait-for graph check before parking a request
    /// Default: true
    pub deadlock_detection: bool,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            slots_per_slab: 1024,
            shrink_timer_threshold_ms: 120_000, // 2 minutes
            lock_wait_timeout_ms: 60_000,       // 1 minute
            timeout_sweep_interval_ms: 10_000,  // 10 seconds
            deadlock_detection: true,
        }
    }
}

impl LockManagerConfig {
    /// Creates a new LockManagerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Small slabs and immediate shrinking, for tests and diagnostics
    pub fn compact() -> Self {
        Self {
            slots_per_slab: 8,
            shrink_timer_threshold_ms: 0,
            lock_wait_timeout_ms: 5_000,
            timeout_sweep_interval_ms: 100,
            deadlock_detection: true,
        }
    }

    /// Builder method to set slab size
    pub fn with_slots_per_slab(mut self, slots: usize) -> Self {
        self.slots_per_slab = slots;
        self
    }

    /// Builder method to set the shrink timer threshold
    pub fn with_shrink_timer_threshold(mut self, threshold: Duration) -> Self {
        self.shrink_timer_threshold_ms = threshold.as_millis() as u64;
        self
    }

    /// Builder method to set the lock wait timeout
    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method to set the timeout sweep interval
    pub fn with_timeout_sweep_interval(mut self, interval: Duration) -> Self {
        self.timeout_sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method to enable/disable deadlock detection
    pub fn with_deadlock_detection(mut self, enabled: bool) -> Self {
        self.deadlock_detection = enabled;
        self
    }

    /// Shrink timer threshold as a Duration
    pub fn shrink_timer_threshold(&self) -> Duration {
        Duration::from_millis(self.shrink_timer_threshold_ms)
    }

    /// Lock wait timeout as a Duration
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Timeout sweep interval as a Duration
    pub fn timeout_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_sweep_interval_ms)
    }
}

/// Configuration options for the join engine
#[derive(Debug, Clone)]
pub struct JoinConfig {
    /// Minimum frame size in bytes; every frame is a multiple of it
    /// Default: 32768 (32KB)
    pub min_frame_size: usize,

    /// Frames of memory granted to one joiner's in-memory state
    /// Default: 32
    pub memory_frames: usize,

    /// Directory for run files
    /// Default: None (system temp directory)
    pub spill_dir: Option<PathBuf>,

    /// Number of time-range partitions (k) for the overlapping partition join
    /// Default: 16
    pub partition_count: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            min_frame_size: 32 * 1024, // 32KB
            memory_frames: 32,
            spill_dir: None,
            partition_count: 16,
        }
    }
}

impl JoinConfig {
    /// Creates a new JoinConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the minimum frame size
    pub fn with_min_frame_size(mut self, bytes: usize) -> Self {
        self.min_frame_size = bytes;
        self
    }

    /// Builder method to set the memory budget in frames
    pub fn with_memory_frames(mut self, frames: usize) -> Self {
        self.memory_frames = frames;
        self
    }

    /// Builder method to set the spill directory
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Builder method to set the partition count
    pub fn with_partition_count(mut self, k: usize) -> Self {
        self.partition_count = k;
        self
    }

    /// Memory budget in bytes
    pub fn memory_bytes(&self) -> usize {
        self.min_frame_size * self.memory_frames
    }

    /// Directory run files are created in
    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Check the settings a joiner depends on
    pub fn validate(&self) -> Result<()> {
        if self.min_frame_size < 64 {
            return Err(Error::invalid_join_config(format!(
                "min_frame_size {} is below 64 bytes",
                self.min_frame_size
            )));
        }
        if self.memory_frames == 0 {
            return Err(Error::invalid_join_config("memory_frames must be positive"));
        }
        if self.partition_count == 0 {
            return Err(Error::invalid_join_config("partition_count must be positive"));
        }
        Ok(())
    }
}

/// Configuration for one runtime instance
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Lock manager settings
    pub lock: LockManagerConfig,

    /// Join engine settings
    pub join: JoinConfig,
}

impl Config {
    /// Creates a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set lock manager config
    pub fn with_lock(mut self, config: LockManagerConfig) -> Self {
        self.lock = config;
        self
    }

    /// Builder method to set join config
    pub fn with_join(mut self, config: JoinConfig) -> Self {
        self.join = config;
        self
    }

    /// Checks both sections
    pub fn validate(&self) -> Result<()> {
        if self.lock.slots_per_slab == 0 {
            return Err(Error::internal("slots_per_slab must be positive"));
        }
        self.join.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_config_default() {
        let config = LockManagerConfig::default();
        assert_eq!(config.slots_per_slab, 1024);
        assert_eq!(config.shrink_timer_threshold_ms, 120_000);
        assert_eq!(config.lock_wait_timeout_ms, 60_000);
        assert_eq!(config.timeout_sweep_interval_ms, 10_000);
        assert!(config.deadlock_detection);
    }

    #[test]
    fn test_lock_config_builder() {
        let config = LockManagerConfig::new()
            .with_slots_per_slab(16)
            .with_shrink_timer_threshold(Duration::from_secs(1))
            .with_lock_wait_timeout(Duration::from_millis(250))
            .with_deadlock_detection(false);

        assert_eq!(config.slots_per_slab, 16);
        assert_eq!(config.shrink_timer_threshold(), Duration::from_secs(1));
        assert_eq!(config.lock_wait_timeout(), Duration::from_millis(250));
        assert!(!config.deadlock_detection);
    }

    #[test]
    fn test_join_config_default() {
        let config = JoinConfig::default();
        assert_eq!(config.min_frame_size, 32 * 1024);
        assert_eq!(config.memory_frames, 32);
        assert_eq!(config.memory_bytes(), 32 * 32 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_join_config_validate() {
        assert!(JoinConfig::new().with_memory_frames(0).validate().is_err());
        assert!(JoinConfig::new().with_min_frame_size(16).validate().is_err());
        assert!(JoinConfig::new().with_partition_count(0).validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_lock(LockManagerConfig::compact())
            .with_join(JoinConfig::new().with_memory_frames(4));
        assert_eq!(config.lock.slots_per_slab, 8);
        assert_eq!(config.join.memory_frames, 4);
        assert!(config.validate().is_ok());

        let config = config.with_lock(LockManagerConfig::new().with_slots_per_slab(0));
        assert!(config.validate().is_err());
        let config = Config::new().with_join(JoinConfig::new().with_partition_count(0));
        assert!(config.validate().is_err());
    }
}
