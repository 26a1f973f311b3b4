//! 请求合并模块：对同一查询的并发请求去重，只执行一次上游调用。
//!
//! # Request Coalescing
//!
//! [`RequestCoalescer`] merges concurrent calls for the same normalized query
//! into a single execution:
//!
//! 1. A query that completed within the cooldown window is answered by the
//!    [`CooldownPolicy`] without executing anything.
//! 2. A query with an execution already pending attaches to it and receives
//!    the very same value (or the same shared error).
//! 3. Otherwise the caller becomes the leader: it registers the pending
//!    request, waits out the debounce window so duplicates can attach, then
//!    executes once and fans the outcome out to every waiter.
//!
//! The check-then-create step runs under a single mutex, so "exactly one
//! execution per in-flight query" also holds on a multi-threaded runtime.
//! Dropping the leader before it finishes resolves every waiter with
//! [`Error::Cancelled`](crate::Error::Cancelled).

use crate::query::normalize;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What to answer for a query that completed less than `cooldown` ago.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// Hand back the value the last execution produced.
    #[default]
    ReuseLast,
    /// Answer with `T::default()` (an empty result set) and execute nothing.
    SuppressEmpty,
    /// No cooldown: every non-pending call executes.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    pub debounce: Duration,
    pub cooldown: Duration,
    pub cooldown_policy: CooldownPolicy,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            cooldown: Duration::from_secs(5),
            cooldown_policy: CooldownPolicy::default(),
        }
    }
}

impl CoalescerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_debounce(mut self, d: Duration) -> Self {
        self.debounce = d;
        self
    }
    pub fn with_cooldown(mut self, d: Duration) -> Self {
        self.cooldown = d;
        self
    }
    pub fn with_cooldown_policy(mut self, p: CooldownPolicy) -> Self {
        self.cooldown_policy = p;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CoalescerSnapshot {
    pub pending: usize,
    pub cooling: usize,
    pub executions: u64,
    pub attached: u64,
    pub cooldown_answers: u64,
}

type Outcome<T> = std::result::Result<T, Arc<Error>>;

struct PendingRequest<T> {
    rx: watch::Receiver<Option<Outcome<T>>>,
    started_at: Instant,
    waiters: usize,
}

struct Completed<T> {
    at: Instant,
    value: T,
}

struct State<T> {
    pending: HashMap<String, PendingRequest<T>>,
    recent: HashMap<String, Completed<T>>,
    executions: u64,
    attached: u64,
    cooldown_answers: u64,
}

enum Role<T> {
    Answered(T),
    Waiter(watch::Receiver<Option<Outcome<T>>>),
    Leader(watch::Sender<Option<Outcome<T>>>),
}

/// Deduplicates concurrent executions keyed by normalized query.
pub struct RequestCoalescer<T> {
    config: CoalescerConfig,
    state: Mutex<State<T>>,
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                pending: HashMap::new(),
                recent: HashMap::new(),
                executions: 0,
                attached: 0,
                cooldown_answers: 0,
            }),
        }
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    /// Run `execute` for `raw_query` at most once across all concurrent callers.
    ///
    /// `execute` receives the normalized query.
    pub async fn coalesced<F, Fut>(&self, raw_query: &str, execute: F) -> Result<T>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = normalize(raw_query);

        match self.claim(&key)? {
            Role::Answered(value) => Ok(value),
            Role::Waiter(rx) => Self::wait(key, rx).await,
            Role::Leader(tx) => {
                let mut guard = LeaderGuard {
                    coalescer: self,
                    key: key.clone(),
                    finished: false,
                };
                if !self.config.debounce.is_zero() {
                    tokio::time::sleep(self.config.debounce).await;
                }
                let outcome = execute(key.clone()).await.map_err(Arc::new);
                self.complete(&key, &outcome, tx);
                guard.finished = true;
                outcome.map_err(|cause| Error::Coalesced { query: key, cause })
            }
        }
    }

    /// The atomic check-then-create step.
    fn claim(&self, key: &str) -> Result<Role<T>> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        let st = &mut *guard;
        let now = Instant::now();
        let cooldown = self.config.cooldown;
        st.recent
            .retain(|_, done| now.saturating_duration_since(done.at) < cooldown);

        if self.config.cooldown_policy != CooldownPolicy::Disabled {
            if let Some(done) = st.recent.get(key) {
                let value = match self.config.cooldown_policy {
                    CooldownPolicy::SuppressEmpty => T::default(),
                    _ => done.value.clone(),
                };
                st.cooldown_answers += 1;
                debug!(query = %key, policy = ?self.config.cooldown_policy, "query in cooldown, not executing");
                return Ok(Role::Answered(value));
            }
        }

        if let Some(pending) = st.pending.get_mut(key) {
            pending.waiters += 1;
            let rx = pending.rx.clone();
            st.attached += 1;
            debug!(query = %key, "attached to in-flight request");
            return Ok(Role::Waiter(rx));
        }

        let (tx, rx) = watch::channel(None);
        st.pending.insert(
            key.to_string(),
            PendingRequest {
                rx,
                started_at: now,
                waiters: 1,
            },
        );
        st.executions += 1;
        Ok(Role::Leader(tx))
    }

    fn complete(&self, key: &str, outcome: &Outcome<T>, tx: watch::Sender<Option<Outcome<T>>>) {
        if let Ok(mut guard) = self.state.lock() {
            let st = &mut *guard;
            if let Some(pending) = st.pending.remove(key) {
                debug!(
                    query = %key,
                    waiters = pending.waiters,
                    elapsed_ms = pending.started_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "coalesced request resolved"
                );
            }
            if let Ok(value) = outcome {
                st.recent.insert(
                    key.to_string(),
                    Completed {
                        at: Instant::now(),
                        value: value.clone(),
                    },
                );
            }
        }
        // Waiters hold their own receivers; send fails only if none are left.
        let _ = tx.send(Some(outcome.clone()));
    }

    async fn wait(key: String, mut rx: watch::Receiver<Option<Outcome<T>>>) -> Result<T> {
        let outcome = match rx.wait_for(|v| v.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(cause)) => Err(Error::Coalesced { query: key, cause }),
            None => Err(Error::Cancelled { query: key }),
        }
    }

    fn abandon(&self, key: &str) {
        if let Ok(mut st) = self.state.lock() {
            // Dropping the entry drops the last stored receiver; the leader's
            // sender is dropped with its future, which wakes every waiter.
            if let Some(pending) = st.pending.remove(key) {
                warn!(query = %key, waiters = pending.waiters, "coalesced request cancelled");
            }
        }
    }

    pub fn is_pending(&self, raw_query: &str) -> bool {
        let key = normalize(raw_query);
        self.state
            .lock()
            .map(|st| st.pending.contains_key(&key))
            .unwrap_or(false)
    }

    /// Forget cooldown state, e.g. after a cache invalidation.
    pub fn clear_cooldown(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.recent.clear();
        }
    }

    pub fn snapshot(&self) -> CoalescerSnapshot {
        let now = Instant::now();
        self.state
            .lock()
            .map(|st| CoalescerSnapshot {
                pending: st.pending.len(),
                cooling: st
                    .recent
                    .values()
                    .filter(|d| now.saturating_duration_since(d.at) < self.config.cooldown)
                    .count(),
                executions: st.executions,
                attached: st.attached,
                cooldown_answers: st.cooldown_answers,
            })
            .unwrap_or_default()
    }
}

impl<T> Default for RequestCoalescer<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CoalescerConfig::default())
    }
}

struct LeaderGuard<'a, T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    coalescer: &'a RequestCoalescer<T>,
    key: String,
    finished: bool,
}

impl<T> Drop for LeaderGuard<'_, T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.finished {
            self.coalescer.abandon(&self.key);
        }
    }
}

fn poisoned() -> Error {
    Error::runtime_with_context(
        "request coalescer state poisoned",
        crate::ErrorContext::new().with_source("coalescer"),
    )
}
