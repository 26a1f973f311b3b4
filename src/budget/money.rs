//! Fixed-point money.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};

const MICROS_PER_DOLLAR: f64 = 1_000_000.0;

/// An amount in micro-dollars. Integer arithmetic keeps the budget comparison
/// exact (`49.95 + 0.10 > 50.00` must hold without float drift).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_micros(micros: u64) -> Self {
        Money(micros)
    }

    pub const fn from_cents(cents: u64) -> Self {
        Money(cents * 10_000)
    }

    /// Rounds to the nearest micro-dollar; negative and non-finite input is zero.
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() || dollars <= 0.0 {
            return Money::ZERO;
        }
        Money((dollars * MICROS_PER_DOLLAR).round() as u64)
    }

    pub fn micros(&self) -> u64 {
        self.0
    }

    pub fn as_dollars(&self) -> f64 {
        self.0 as f64 / MICROS_PER_DOLLAR
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.as_dollars();
        if dollars != 0.0 && dollars < 0.01 {
            write!(f, "${:.4}", dollars)
        } else {
            write!(f, "${:.2}", dollars)
        }
    }
}

// Config files and persisted snapshots carry plain dollar amounts.
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_dollars())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        if dollars < 0.0 {
            return Err(serde::de::Error::custom("money amounts cannot be negative"));
        }
        Ok(Money::from_dollars(dollars))
    }
}
