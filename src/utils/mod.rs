//! Small shared utilities.

pub mod clock;

pub use clock::{unix_now, Clock, ManualClock, SystemClock};
