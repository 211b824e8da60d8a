//! Process-wide request limiter
//!
//! Keeps the admission timestamps of the current rolling window. Expired
//! entries are pruned lazily on every check. Check-and-record happens under
//! one lock, so admission is linearizable across concurrent callers.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        info!(
            max_requests = config.max_requests,
            window_secs = config.window.as_secs_f64(),
            "Rate limiter initialized"
        );

        Self {
            window: config.window,
            max_requests: config.max_requests,
            admitted: Mutex::new(VecDeque::with_capacity(config.max_requests)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Try to admit one request now. A denial is a normal outcome.
    pub fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, now: Instant) -> bool {
        // The deque is valid after any panic mid-update, so poisoning is ignored.
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);

        self.prune(&mut admitted, now);

        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            warn!(
                admitted = admitted.len(),
                max_requests = self.max_requests,
                "Rate limit exceeded"
            );
            false
        }
    }

    /// Free slots in the window at `now`, without recording anything.
    pub fn remaining_at(&self, now: Instant) -> usize {
        let mut admitted = self.admitted.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut admitted, now);
        self.max_requests.saturating_sub(admitted.len())
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn limiter(max_requests: usize, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window: Duration::from_secs(window_secs),
            max_requests,
        })
    }

    #[test]
    fn test_admits_exactly_limit_within_window() {
        let limiter = limiter(3, 60);
        let start = Instant::now();

        assert!(limiter.admit_at(start));
        assert!(limiter.admit_at(start + Duration::from_secs(1)));
        assert!(limiter.admit_at(start + Duration::from_secs(2)));
        assert!(!limiter.admit_at(start + Duration::from_secs(3)));
        assert!(!limiter.admit_at(start + Duration::from_secs(59)));
        assert_eq!(limiter.remaining_at(start + Duration::from_secs(59)), 0);
    }

    #[test]
    fn test_admission_resumes_after_window() {
        let limiter = limiter(2, 60);
        let start = Instant::now();

        assert!(limiter.admit_at(start));
        assert!(limiter.admit_at(start + Duration::from_secs(10)));
        assert!(!limiter.admit_at(start + Duration::from_secs(30)));

        // First entry expires at +60s, second at +70s
        assert!(limiter.admit_at(start + Duration::from_secs(60)));
        assert!(!limiter.admit_at(start + Duration::from_secs(61)));
        assert!(limiter.admit_at(start + Duration::from_secs(70)));
    }

    #[test]
    fn test_denials_are_not_recorded() {
        let limiter = limiter(1, 10);
        let start = Instant::now();

        assert!(limiter.admit_at(start));
        for s in 1..10 {
            assert!(!limiter.admit_at(start + Duration::from_secs(s)));
        }
        assert!(limiter.admit_at(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_limit_never_admits() {
        let limiter = limiter(0, 60);
        assert!(!limiter.admit());
    }

    #[test]
    fn test_concurrent_admission_is_linearizable() {
        let limiter = Arc::new(limiter(25, 3600));
        let admitted = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                scope.spawn(move || {
                    for _ in 0..10 {
                        if limiter.admit() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 25);
    }
}
