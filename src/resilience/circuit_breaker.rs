use crate::{Error, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub consecutive_failures: u32,
    pub trips: u64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
struct State {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trips: u64,
}

/// Consecutive-failure breaker for one upstream.
///
/// - Counts consecutive failures; any success resets the count
/// - Opens for `cooldown` once the threshold is reached
/// - After the cooldown the next call is let through as a probe
pub struct CircuitBreaker {
    name: &'static str,
    cfg: CircuitBreakerConfig,
    state: std::sync::Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, cfg: CircuitBreakerConfig) -> Self {
        Self {
            name,
            cfg,
            state: std::sync::Mutex::new(State {
                consecutive_failures: 0,
                open_until: None,
                trips: 0,
            }),
        }
    }

    pub fn allow(&self) -> Result<()> {
        let open = || Error::CircuitOpen {
            operation: self.name.to_string(),
        };
        let mut st = self.state.lock().map_err(|_| open())?;
        if let Some(until) = st.open_until {
            if Instant::now() < until {
                return Err(open());
            }
            // cooldown expired
            st.open_until = None;
            st.consecutive_failures = 0;
        }
        Ok(())
    }

    pub fn on_success(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = 0;
            st.open_until = None;
        }
    }

    pub fn on_failure(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            if st.consecutive_failures >= self.cfg.failure_threshold && st.open_until.is_none() {
                st.open_until = Some(Instant::now() + self.cfg.cooldown);
                st.trips += 1;
                warn!(
                    upstream = self.name,
                    failures = st.consecutive_failures,
                    cooldown_ms = self.cfg.cooldown.as_millis() as u64,
                    "circuit breaker opened"
                );
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.snapshot().open_remaining_ms.is_some()
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let base = CircuitBreakerSnapshot {
            failure_threshold: self.cfg.failure_threshold,
            cooldown_ms: self.cfg.cooldown.as_millis() as u64,
            ..Default::default()
        };
        match self.state.lock() {
            Ok(st) => CircuitBreakerSnapshot {
                consecutive_failures: st.consecutive_failures,
                trips: st.trips,
                open_remaining_ms: st
                    .open_until
                    .filter(|until| *until > now)
                    .map(|until| (until - now).as_millis() as u64),
                ..base
            },
            Err(_) => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "products",
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_cooldown(Duration::from_millis(cooldown_ms)),
        )
    }

    #[test]
    fn config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn success_resets_failures() {
        let cb = breaker(5, 1000);
        cb.on_failure();
        cb.on_failure();
        assert_eq!(cb.snapshot().consecutive_failures, 2);
        cb.on_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn opens_at_threshold() {
        let cb = breaker(3, 100);
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow().is_ok());
        cb.on_failure();
        match cb.allow() {
            Err(Error::CircuitOpen { operation }) => assert_eq!(operation, "products"),
            other => panic!("expected open breaker, got {other:?}"),
        }
        assert!(cb.is_open());
        assert_eq!(cb.snapshot().trips, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_cooldown() {
        let cb = breaker(2, 50);
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow().is_err());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(cb.allow().is_ok());
        assert_eq!(cb.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn thread_safe_counting() {
        use std::sync::Arc;
        use std::thread;

        let cb = Arc::new(breaker(1000, 1000));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || {
                    for _ in 0..5 {
                        cb.on_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.snapshot().consecutive_failures, 50);
    }
}
