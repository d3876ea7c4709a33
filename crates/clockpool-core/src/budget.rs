//! Timeout budgeting across sequential waits.

use std::time::Duration;

use tokio::time::Instant;

/// Clock precision a [`WaitBudget`] samples at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Elapsed time quantized to whole milliseconds.
    Coarse,
    /// Full nanosecond resolution.
    Fine,
}

/// Tracks how much of one caller-supplied timeout is left across several
/// sequential waits.
///
/// The remaining budget only ever shrinks: each [`remaining`] call
/// subtracts the time elapsed since the previous sample, saturating at
/// zero. A zero initial timeout stays zero and never samples the clock.
///
/// [`remaining`]: WaitBudget::remaining
#[derive(Debug)]
pub struct WaitBudget {
    precision: Precision,
    remaining: Duration,
    last_sample: Option<Instant>,
}

impl WaitBudget {
    /// [`Precision::Fine`] is selected only when the timeout carries
    /// sub-millisecond components; anything expressed in whole
    /// milliseconds or coarser gets [`Precision::Coarse`].
    pub fn new(timeout: Duration) -> Self {
        let precision = if timeout.subsec_nanos() % 1_000_000 == 0 {
            Precision::Coarse
        } else {
            Precision::Fine
        };
        Self {
            precision,
            remaining: timeout,
            last_sample: None,
        }
    }

    /// The precision selected at construction.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Takes the first clock sample and returns the full budget.
    pub fn start(&mut self) -> Duration {
        if !self.remaining.is_zero() {
            self.last_sample = Some(Instant::now());
        }
        self.remaining
    }

    /// Subtracts the time elapsed since the previous sample and returns
    /// what is left.
    pub fn remaining(&mut self) -> Duration {
        if self.remaining.is_zero() {
            return Duration::ZERO;
        }
        let now = Instant::now();
        let Some(prev) = self.last_sample else {
            // consulted before start(); begin measuring here
            self.last_sample = Some(now);
            return self.remaining;
        };
        let elapsed = self.quantize(now.saturating_duration_since(prev));
        self.remaining = self.remaining.saturating_sub(elapsed);
        self.last_sample = Some(now);
        self.remaining
    }

    /// True once the whole budget has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }

    fn quantize(&self, elapsed: Duration) -> Duration {
        match self.precision {
            Precision::Fine => elapsed,
            Precision::Coarse => Duration::from_millis(elapsed.as_millis() as u64),
        }
    }
}
