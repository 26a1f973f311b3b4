//! 预算模块：按月度上限控制计费调用。
//!
//! # Budget Gate
//!
//! Tracks spend on the metered upstream against a monthly cap. Exceeding the
//! budget is a policy signal, not an error: callers check [`BudgetGate::can_spend`]
//! (or take a [`Reservation`]) and serve local data when the answer is no.
//!
//! ```rust
//! use gift_search::budget::{BudgetConfig, BudgetGate, Money};
//!
//! let gate = BudgetGate::new(
//!     BudgetConfig::new()
//!         .with_monthly_limit(Money::from_dollars(50.0))
//!         .with_cost_per_call(Money::from_dollars(0.10)),
//! );
//! gate.restore_spent(Money::from_dollars(49.95));
//! assert!(!gate.can_spend());
//! ```

mod money;

pub use money::Money;

use crate::utils::unix_now;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub monthly_limit: Money,
    pub cost_per_call: Money,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_limit: Money::from_dollars(50.0),
            cost_per_call: Money::from_dollars(0.10),
        }
    }
}

impl BudgetConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_monthly_limit(mut self, limit: Money) -> Self {
        self.monthly_limit = limit;
        self
    }
    pub fn with_cost_per_call(mut self, cost: Money) -> Self {
        self.cost_per_call = cost;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    pub monthly_limit: Money,
    pub cost_per_call: Money,
    pub spent: Money,
    pub reserved: Money,
    pub remaining: Money,
    pub calls_charged: u64,
    /// Seconds since the Unix epoch when the current period began.
    pub period_started_at: f64,
}

impl BudgetSnapshot {
    pub fn utilization(&self) -> f64 {
        if self.monthly_limit == Money::ZERO {
            1.0
        } else {
            self.spent.micros() as f64 / self.monthly_limit.micros() as f64
        }
    }
}

#[derive(Debug)]
struct BudgetState {
    spent: Money,
    reserved: Money,
    calls_charged: u64,
    period_started_at: f64,
}

/// Spend tracker for the metered upstream.
///
/// `spent` only grows within a billing period and is zeroed by [`reset`](Self::reset).
/// Check-then-charge is available as one atomic step through
/// [`try_reserve`](Self::try_reserve), so concurrent callers cannot overspend.
pub struct BudgetGate {
    config: BudgetConfig,
    state: Mutex<BudgetState>,
}

impl BudgetGate {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BudgetState {
                spent: Money::ZERO,
                reserved: Money::ZERO,
                calls_charged: 0,
                period_started_at: unix_now(),
            }),
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    fn fits(&self, st: &BudgetState) -> bool {
        st.spent + st.reserved + self.config.cost_per_call <= self.config.monthly_limit
    }

    /// `spent + cost_per_call <= monthly_limit`, counting outstanding reservations as spent.
    pub fn can_spend(&self) -> bool {
        self.state.lock().map(|st| self.fits(&st)).unwrap_or(false)
    }

    /// Add one call's cost unconditionally. Callers check [`can_spend`](Self::can_spend) first.
    pub fn charge(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.spent += self.config.cost_per_call;
            st.calls_charged += 1;
            debug!(spent = %st.spent, limit = %self.config.monthly_limit, "budget charged");
        }
    }

    /// Atomically check the budget and hold one call's cost. Returns `None` when
    /// the call would exceed the limit.
    pub fn try_reserve(&self) -> Option<Reservation<'_>> {
        let mut st = self.state.lock().ok()?;
        if !self.fits(&st) {
            debug!(spent = %st.spent, reserved = %st.reserved, limit = %self.config.monthly_limit, "budget denies metered call");
            return None;
        }
        st.reserved += self.config.cost_per_call;
        Some(Reservation {
            gate: self,
            settled: false,
        })
    }

    /// Zero the spend for a new billing period.
    pub fn reset(&self) {
        if let Ok(mut st) = self.state.lock() {
            info!(previous_spent = %st.spent, calls = st.calls_charged, "budget period rolled over");
            st.spent = Money::ZERO;
            st.calls_charged = 0;
            st.period_started_at = unix_now();
        }
    }

    /// Seed `spent` from an external ledger at startup. Never lowers the current spend.
    pub fn restore_spent(&self, spent: Money) {
        if let Ok(mut st) = self.state.lock() {
            if spent > st.spent {
                st.spent = spent;
            }
        }
    }

    pub fn spent(&self) -> Money {
        self.state.lock().map(|st| st.spent).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let (spent, reserved, calls_charged, period_started_at) = self
            .state
            .lock()
            .map(|st| (st.spent, st.reserved, st.calls_charged, st.period_started_at))
            .unwrap_or((Money::ZERO, Money::ZERO, 0, 0.0));
        BudgetSnapshot {
            monthly_limit: self.config.monthly_limit,
            cost_per_call: self.config.cost_per_call,
            spent,
            reserved,
            remaining: self.config.monthly_limit.saturating_sub(spent + reserved),
            calls_charged,
            period_started_at,
        }
    }

    fn settle(&self, commit: bool) {
        if let Ok(mut st) = self.state.lock() {
            st.reserved = st.reserved.saturating_sub(self.config.cost_per_call);
            if commit {
                st.spent += self.config.cost_per_call;
                st.calls_charged += 1;
                debug!(spent = %st.spent, limit = %self.config.monthly_limit, "budget charged");
            }
        }
    }
}

impl Default for BudgetGate {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

/// One call's worth of held budget. [`commit`](Self::commit) turns it into
/// spend; dropping it releases the hold.
#[must_use = "a reservation is released as soon as it is dropped"]
pub struct Reservation<'a> {
    gate: &'a BudgetGate,
    settled: bool,
}

impl Reservation<'_> {
    pub fn commit(mut self) {
        self.settled = true;
        self.gate.settle(true);
    }

    pub fn release(mut self) {
        self.settled = true;
        self.gate.settle(false);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.settle(false);
        }
    }
}
