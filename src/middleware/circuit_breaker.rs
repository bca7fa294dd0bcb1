use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Breaker position in front of the translation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast until the cool-down elapses
    Open,
    /// A single probe call is let through
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Cool-down before a probe is allowed
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

/// Consecutive-failure breaker.
///
/// Callers that are refused fall back to the source text; the breaker only
/// saves the round trip to a backend that is known to be down. After the
/// cool-down one probe is admitted; its outcome closes or re-opens the
/// circuit. Time is passed in explicitly by the `_at` variants so the state
/// machine is testable without sleeping.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    rejected: u64,
    trips: u64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                rejected: 0,
                trips: 0,
            }),
        }
    }

    pub fn allow_request(&self) -> bool {
        self.allow_request_at(Instant::now())
    }

    pub fn allow_request_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.cool_down)
                    .unwrap_or(true);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    inner.rejected += 1;
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.rejected += 1;
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        inner.opened_at = None;
        inner.state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let trip = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            inner.trips += 1;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            rejected: inner.rejected,
            trips: inner.trips,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub rejected: u64,
    pub trips: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cool_down: Duration::from_secs(10),
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(3);
        let t0 = Instant::now();

        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure_at(t0);
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(!breaker.allow_request_at(t0 + Duration::from_secs(1)));
        assert_eq!(breaker.stats().rejected, 1);
        assert_eq!(breaker.stats().trips, 1);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = breaker(2);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_single_probe_after_cool_down() {
        let breaker = breaker(1);
        let t0 = Instant::now();
        breaker.record_failure_at(t0);

        let later = t0 + Duration::from_secs(11);
        assert!(breaker.allow_request_at(later));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Second caller is refused while the probe is outstanding
        assert!(!breaker.allow_request_at(later));

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request_at(later));
    }

    #[test]
    fn test_failed_probe_reopens() {
        let breaker = breaker(1);
        let t0 = Instant::now();
        breaker.record_failure_at(t0);

        let later = t0 + Duration::from_secs(11);
        assert!(breaker.allow_request_at(later));
        breaker.record_failure_at(later);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request_at(later + Duration::from_secs(5)));
        assert_eq!(breaker.stats().trips, 2);
    }
}
