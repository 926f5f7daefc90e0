//! Byte-rate limiting for engine workers.

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket refilled at `bytes_per_sec`, holding at most one second of
/// budget. A rate of zero disables limiting.
///
/// Callers may overdraw the bucket; the next caller waits off the debt.
#[derive(Debug)]
pub struct ThroughputLimiter {
    bytes_per_sec: u64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    available: f64,
    refilled_at: Instant,
}

impl ThroughputLimiter {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            bucket: Mutex::new(Bucket {
                available: bytes_per_sec as f64,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn is_unlimited(&self) -> bool {
        self.bytes_per_sec == 0
    }

    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    /// Wait until `bytes` may be moved.
    pub async fn acquire(&self, bytes: u64) {
        if let Some(wait) = self.reserve(bytes) {
            tokio::time::sleep(wait).await;
        }
    }

    /// Take `bytes` from the bucket and return how long the caller must wait.
    fn reserve(&self, bytes: u64) -> Option<Duration> {
        if self.is_unlimited() || bytes == 0 {
            return None;
        }
        let rate = self.bytes_per_sec as f64;
        let now = Instant::now();

        let mut bucket = self.bucket.lock();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.available = (bucket.available + elapsed * rate).min(rate);
        bucket.refilled_at = now;
        bucket.available -= bytes as f64;

        (bucket.available < 0.0).then(|| {
            Duration::try_from_secs_f64(-bucket.available / rate).unwrap_or(Duration::MAX)
        })
    }
}
