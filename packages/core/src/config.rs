//! Admission and runtime configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Most candidates admitted from a single drop.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Smallest file admitted from a multi-candidate drop (128 KiB).
pub const DEFAULT_MIN_CANDIDATE_SIZE: u64 = 128 * 1024;

/// Window used to collapse bursts of operation add/remove notifications.
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 250;

/// Configuration surfaced to callers of the admission core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Hard cap on candidates admitted from one batch.
    pub max_batch_size: usize,
    /// Minimum size in bytes for candidates of a multi-candidate batch.
    pub min_candidate_size: u64,
    /// Job throughput cap in bytes per second, 0 means unlimited.
    pub max_bytes_per_sec: u64,
    /// Coalescing window for high-churn notifications.
    pub coalesce_window_ms: u64,
    /// Number of jobs the scheduler keeps running at once.
    pub concurrency: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_candidate_size: DEFAULT_MIN_CANDIDATE_SIZE,
            max_bytes_per_sec: 0,
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            concurrency: 1,
        }
    }
}

impl AdmissionConfig {
    /// Set the batch cap.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the minimum admitted size.
    pub fn with_min_candidate_size(mut self, min_candidate_size: u64) -> Self {
        self.min_candidate_size = min_candidate_size;
        self
    }

    /// Set the throughput cap (0 = unlimited).
    pub fn with_max_bytes_per_sec(mut self, max_bytes_per_sec: u64) -> Self {
        self.max_bytes_per_sec = max_bytes_per_sec;
        self
    }

    /// Set the notification coalescing window.
    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window_ms = window.as_millis() as u64;
        self
    }

    /// Set how many jobs may run at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms.max(1))
    }

    /// Build a config from environment variables, falling back to defaults.
    ///
    /// - `DROPQ_MAX_BATCH_SIZE`
    /// - `DROPQ_MIN_CANDIDATE_SIZE`
    /// - `DROPQ_MAX_BYTES_PER_SEC`
    /// - `DROPQ_COALESCE_WINDOW_MS`
    /// - `DROPQ_CONCURRENCY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = parse_key(&lookup, "DROPQ_MAX_BATCH_SIZE")? {
            cfg.max_batch_size = v;
        }
        if let Some(v) = parse_key(&lookup, "DROPQ_MIN_CANDIDATE_SIZE")? {
            cfg.min_candidate_size = v;
        }
        if let Some(v) = parse_key(&lookup, "DROPQ_MAX_BYTES_PER_SEC")? {
            cfg.max_bytes_per_sec = v;
        }
        if let Some(v) = parse_key(&lookup, "DROPQ_COALESCE_WINDOW_MS")? {
            cfg.coalesce_window_ms = v;
        }
        if let Some(v) = parse_key::<usize>(&lookup, "DROPQ_CONCURRENCY")? {
            cfg.concurrency = v.max(1);
        }

        Ok(cfg)
    }
}

fn parse_key<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
