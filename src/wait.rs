//! Bounded condition polling.
//!
//! All waiting in the crate funnels through [`until`]: probe once
//! immediately, then on a fixed interval until the condition holds or
//! the deadline passes. Callers decide whether a timeout is an error,
//! so optimistic flows (send verification) and strict flows (response
//! completion) share the same primitive.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::AutomationError;

/// Deadline and probe cadence for one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSpec {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            // A zero interval would spin the select loop.
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }
}

/// Result of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value before the deadline.
    Satisfied { value: T, waited: Duration },
    /// The deadline passed with every probe returning `None`.
    TimedOut { waited: Duration },
}

impl<T> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }

    pub fn waited(&self) -> Duration {
        match self {
            PollOutcome::Satisfied { waited, .. } | PollOutcome::TimedOut { waited } => *waited,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            PollOutcome::Satisfied { value, .. } => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }

    /// Treat a timeout as a hard failure for the named operation.
    pub fn required(self, operation: &'static str) -> Result<T, AutomationError> {
        match self {
            PollOutcome::Satisfied { value, .. } => Ok(value),
            PollOutcome::TimedOut { waited } => Err(AutomationError::Timeout {
                operation,
                elapsed_ms: waited.as_millis() as u64,
            }),
        }
    }
}

/// Polls `probe` until it yields `Some` or the deadline passes.
///
/// The probe runs once right away, then once per interval tick. Probe
/// errors abort the wait immediately.
pub async fn until<T, E, F, Fut>(spec: PollSpec, mut probe: F) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let started = Instant::now();
    let deadline = tokio::time::sleep(spec.timeout);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Ok(PollOutcome::TimedOut { waited: started.elapsed() });
            }
            _ = ticker.tick() => {
                if let Some(value) = probe().await? {
                    return Ok(PollOutcome::Satisfied { value, waited: started.elapsed() });
                }
            }
        }
    }
}
