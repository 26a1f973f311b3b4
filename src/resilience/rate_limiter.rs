use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub rps: f64,
    pub burst: f64,
    pub tokens: f64,
    /// Estimated wait time until a token is available (ms), if currently empty.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens per second.
    pub rps: f64,
    /// Maximum burst size (tokens).
    pub burst: f64,
}

impl RateLimiterConfig {
    pub fn from_rps(rps: f64) -> Option<Self> {
        if !rps.is_finite() || rps <= 0.0 {
            return None;
        }
        Some(Self {
            rps,
            burst: rps.max(1.0), // default burst: 1 second worth, at least 1
        })
    }

    pub fn with_burst(mut self, burst: f64) -> Self {
        self.burst = burst.max(1.0);
        self
    }
}

#[derive(Debug)]
struct State {
    tokens: f64,
    last: Instant,
}

/// Token bucket in front of the upstream's request quota.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let state = Mutex::new(State {
            tokens: cfg.burst,
            last: Instant::now(),
        });
        Self { cfg, state }
    }

    fn refill_locked(cfg: &RateLimiterConfig, st: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(st.last).as_secs_f64();
        if elapsed > 0.0 {
            st.tokens = (st.tokens + elapsed * cfg.rps).min(cfg.burst);
            st.last = now;
        }
    }

    /// Take a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut st = self.state.lock().await;
        Self::refill_locked(&self.cfg, &mut st);
        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take a token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut st = self.state.lock().await;
                Self::refill_locked(&self.cfg, &mut st);
                if st.tokens >= 1.0 {
                    st.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - st.tokens) / self.cfg.rps)
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut st = self.state.lock().await;
        Self::refill_locked(&self.cfg, &mut st);
        let estimated_wait_ms = if st.tokens >= 1.0 {
            None
        } else {
            Some(((1.0 - st.tokens) / self.cfg.rps * 1000.0).ceil() as u64)
        };
        RateLimiterSnapshot {
            rps: self.cfg.rps,
            burst: self.cfg.burst,
            tokens: st.tokens,
            estimated_wait_ms,
        }
    }
}
