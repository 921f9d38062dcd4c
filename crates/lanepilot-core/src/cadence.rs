//! Tick cadence: which ticks think and which only advance the game clock.
//!
//! The loop's tick counter is the single source of truth. Whether a tick
//! asks the policy for a decision is derived from the counter and the
//! think interval alone, never from earlier outcomes: a think tick that
//! fails does not retry off-cadence, it waits for the next multiple.
//!
//! # Design Principles
//!
//! - All counter arithmetic is checked (no silent overflow).
//! - A zero interval is unrepresentable once a [`ThinkInterval`] exists.

use std::num::NonZeroU64;

use lanepilot_types::TickMode;

/// Think interval used when nothing else is configured.
pub const DEFAULT_THINK_INTERVAL: u64 = 10;

/// Errors that can occur during cadence operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CadenceError {
    /// The think interval was zero.
    #[error("invalid think interval {value}: must be a positive integer")]
    InvalidInterval {
        /// The rejected value.
        value: u64,
    },

    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// A validated, strictly positive think interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThinkInterval(NonZeroU64);

impl ThinkInterval {
    /// Validate a raw interval.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInterval`] if `value` is zero.
    pub const fn new(value: u64) -> Result<Self, CadenceError> {
        match NonZeroU64::new(value) {
            Some(v) => Ok(Self(v)),
            None => Err(CadenceError::InvalidInterval { value }),
        }
    }

    /// Return the raw interval.
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl Default for ThinkInterval {
    fn default() -> Self {
        NonZeroU64::new(DEFAULT_THINK_INTERVAL).map_or(Self(NonZeroU64::MIN), Self)
    }
}

impl TryFrom<u64> for ThinkInterval {
    type Error = CadenceError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Decide the mode of a tick.
///
/// `Think` iff `tick % interval == 0`, so tick 0 always thinks.
pub const fn mode(tick: u64, interval: ThinkInterval) -> TickMode {
    if matches!(tick.checked_rem(interval.0.get()), Some(0)) {
        TickMode::Think
    } else {
        TickMode::Continue
    }
}

/// The loop's tick counter paired with its current think interval.
///
/// The counter starts at 0 and advances by one after every loop tick,
/// regardless of mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickClock {
    /// Index of the next tick to run.
    tick: u64,

    /// Current think interval.
    interval: ThinkInterval,
}

impl TickClock {
    /// Create a clock at tick 0.
    pub const fn new(interval: ThinkInterval) -> Self {
        Self { tick: 0, interval }
    }

    /// Create a clock from explicit parts (useful for tests).
    pub const fn from_parts(tick: u64, interval: ThinkInterval) -> Self {
        Self { tick, interval }
    }

    /// Index of the next tick to run.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Current think interval.
    pub const fn interval(&self) -> ThinkInterval {
        self.interval
    }

    /// Change the think interval. Takes effect from the next mode query.
    pub const fn set_interval(&mut self, interval: ThinkInterval) {
        self.interval = interval;
    }

    /// Mode of the tick at the current counter.
    pub const fn mode(&self) -> TickMode {
        mode(self.tick, self.interval)
    }

    /// Advance the counter by one. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::TickOverflow`] if the counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, CadenceError> {
        self.tick = self.tick.checked_add(1).ok_or(CadenceError::TickOverflow)?;
        Ok(self.tick)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new(ThinkInterval::default())
    }
}
