use std::time::{Duration, Instant};

/// Token gate for log messages emitted from hot paths.
///
/// Grants at most one permit per configured period, independent of how
/// often `allow()` is called. Per-frame latency or clipping reports go
/// through one of these so they cannot flood output.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    last_allowed: Option<Instant>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_allowed: None,
        }
    }

    /// Returns true if a permit is available, consuming it.
    ///
    /// The first call always succeeds; later calls succeed once the
    /// period has elapsed since the last granted permit.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last_allowed {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last_allowed = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_allowed() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow());
    }

    #[test]
    fn second_call_within_period_denied() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow());
        assert!(!limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn zero_period_always_allows() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        assert!(limiter.allow());
        assert!(limiter.allow());
    }

    #[test]
    fn allows_again_after_period() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1));
        assert!(limiter.allow());
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.allow());
    }
}
