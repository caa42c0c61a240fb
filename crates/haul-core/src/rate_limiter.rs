//! Global token-bucket rate limiter shared across all transfer workers (§4.B).
//!
//! Workers run on blocking threads (via `spawn_blocking`), so this mirrors
//! `scheduler::budget::GlobalConnectionBudget`'s blocking-safe discipline
//! rather than an async mutex: a plain `std::sync::Mutex` guards the window
//! state, and `acquire` sleeps with `std::thread::sleep`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    start: Instant,
    consumed: u64,
}

/// Shared global rate limiter. Clone is cheap (wraps an `Arc`-free inner
/// `Mutex` behind a reference so all workers observe the same window).
pub struct RateLimiter {
    limit_bps: AtomicU64,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit_bps: u64) -> Self {
        RateLimiter {
            limit_bps: AtomicU64::new(limit_bps),
            window: Mutex::new(Window {
                start: Instant::now(),
                consumed: 0,
            }),
        }
    }

    pub fn limit_bps(&self) -> u64 {
        self.limit_bps.load(Ordering::Relaxed)
    }

    pub fn set_limit_bps(&self, limit: u64) {
        self.limit_bps.store(limit, Ordering::Relaxed);
    }

    /// Chunk size policy from §4.B: rate-proportional when limited, fixed otherwise.
    pub fn chunk_size(&self) -> usize {
        let limit = self.limit_bps();
        if limit == 0 {
            8192
        } else {
            (limit / 4).max(1024) as usize
        }
    }

    /// Blocks the calling (blocking-pool) thread until `n` more bytes fit the
    /// global budget for the current 1-second window.
    pub fn acquire(&self, n: u64) {
        let limit = self.limit_bps();
        if limit == 0 {
            return;
        }

        let mut w = self.window.lock().unwrap();
        let now = Instant::now();
        let mut elapsed = now.duration_since(w.start);
        if elapsed >= Duration::from_secs(1) {
            w.start = now;
            w.consumed = 0;
            elapsed = Duration::ZERO;
        }

        w.consumed += n;
        let expected = Duration::from_secs_f64(w.consumed as f64 / limit as f64);
        let sleep_for = expected.checked_sub(elapsed);

        if w.consumed >= limit {
            w.start = Instant::now();
            w.consumed = 0;
        }
        drop(w);

        if let Some(d) = sleep_for {
            if d > Duration::ZERO {
                std::thread::sleep(d);
            }
        }
    }
}
