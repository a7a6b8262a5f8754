use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Sliding-log rate limiter. `acquire` blocks the calling thread until a
/// slot opens in the rolling window.
pub struct RateLimiter {
    max: usize,
    window: Duration,
    log: Mutex<VecDeque<Instant>>,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        RateLimiter {
            max: max.max(1),
            window,
            log: Mutex::new(VecDeque::new()),
            enabled: true,
        }
    }

    /// A limiter that never blocks, for tests.
    pub fn unlimited() -> Self {
        RateLimiter {
            max: usize::MAX,
            window: Duration::ZERO,
            log: Mutex::new(VecDeque::new()),
            enabled: false,
        }
    }

    /// Block until a request slot is available, then claim it.
    pub fn acquire(&self) {
        if !self.enabled {
            return;
        }

        loop {
            let wait = {
                let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                while log
                    .front()
                    .map(|t| now.duration_since(*t) >= self.window)
                    .unwrap_or(false)
                {
                    log.pop_front();
                }

                if log.len() < self.max {
                    log.push_back(now);
                    None
                } else {
                    log.front()
                        .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                }
            };

            match wait {
                None => return,
                Some(wait) => std::thread::sleep(wait.max(Duration::from_millis(10))),
            }
        }
    }
}

/// Process-wide limiter for the external geolocation API: 45 requests per
/// rolling minute. Injected by default, replaced in tests.
pub static GEO_RATE_LIMITER: Lazy<Arc<RateLimiter>> =
    Lazy::new(|| Arc::new(RateLimiter::new(45, Duration::from_secs(60))));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_blocks() {
        let limiter = RateLimiter::unlimited();
        let started = Instant::now();
        for _ in 0..10_000 {
            limiter.acquire();
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn blocks_when_window_is_full() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        let started = Instant::now();
        limiter.acquire();
        limiter.acquire();
        // third call has to wait for the first slot to age out
        limiter.acquire();
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn slots_free_up_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire();
        std::thread::sleep(Duration::from_millis(60));
        let started = Instant::now();
        limiter.acquire();
        assert!(started.elapsed() < Duration::from_millis(40));
    }
}
