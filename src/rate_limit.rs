//! Fixed-window request throttle in front of the classification call.
//!
//! Buckets are clock-aligned minutes (`unix_ms / 60_000`). Old buckets are not
//! purged; keys only grow, so a scheduled prune could drop everything below the
//! current key if uptime ever makes that matter.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

pub const DEFAULT_MAX_PER_WINDOW: u32 = 60;
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window_ms: i64,
    buckets: Mutex<HashMap<i64, u32>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_WINDOW, DEFAULT_WINDOW_MS)
    }
}

impl RateLimiter {
    /// `window_ms` <= 0 is treated as 1ms.
    pub fn new(max_per_window: u32, window_ms: i64) -> Self {
        Self {
            max_per_window,
            window_ms: window_ms.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request now.
    pub fn admit(&self) -> bool {
        self.admit_at(Utc::now())
    }

    /// Admit one request at `now`; counts only admitted requests.
    pub fn admit_at(&self, now: DateTime<Utc>) -> bool {
        let key = now.timestamp_millis().div_euclid(self.window_ms);
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let count = buckets.entry(key).or_insert(0);
        if *count >= self.max_per_window {
            return false;
        }
        *count += 1;
        true
    }

    /// Admissions recorded in the window containing `now`.
    pub fn used_at(&self, now: DateTime<Utc>) -> u32 {
        let key = now.timestamp_millis().div_euclid(self.window_ms);
        self.buckets
            .lock()
            .expect("rate limiter mutex poisoned")
            .get(&key)
            .copied()
            .unwrap_or(0)
    }
}
