//! [`RetryCounter`] – bounded retries of a retryable outcome.
//!
//! Every orchestrator motion state owns a counter.  A retryable outcome
//! (`moveStuck`) passes through unchanged while the counter is below its
//! maximum, and the counter increments.  Once the maximum is reached the
//! outcome is remapped to the terminal failure (`moveFailed`) and the
//! counter stays where it is.  Owners reset the counter when their scope is
//! freshly entered.
//!
//! # Example
//!
//! ```rust
//! use panelbot_runtime::outcome::Outcome;
//! use panelbot_runtime::retry::RetryCounter;
//!
//! let mut counter = RetryCounter::new(1);
//! assert_eq!(counter.attempt(Outcome::MoveStuck), Outcome::MoveStuck);
//! assert_eq!(counter.count(), 1);
//! assert_eq!(counter.attempt(Outcome::MoveStuck), Outcome::MoveFailed);
//! assert_eq!(counter.count(), 1);
//! ```

/// Outcomes that a [`RetryCounter`] knows how to remap.
pub trait Retryable: Copy {
    /// `true` when repeating the same step may succeed.
    fn is_retryable(self) -> bool;

    /// Terminal outcome substituted once retries are used up.
    fn exhausted(self) -> Self;
}

/// Retry budget of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    count: u32,
    max: u32,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Pass `outcome` through the retry budget.
    pub fn attempt<O: Retryable>(&mut self, outcome: O) -> O {
        if !outcome.is_retryable() {
            return outcome;
        }
        if self.count < self.max {
            self.count += 1;
            outcome
        } else {
            outcome.exhausted()
        }
    }
}
