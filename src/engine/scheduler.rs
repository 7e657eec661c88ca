//! Refresh scheduling and the single-flight guard.
//!
//! The scheduler owns the countdown to the next automatic cycle and the
//! flag that says whether a cycle is running. Anything that wants to start
//! a cycle, timer or user, goes through [`RefreshScheduler::run_guarded`]
//! or checks [`InFlight`] first.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::types::PollInterval;

// ---------------------------------------------------------------------------
// Single-flight flag
// ---------------------------------------------------------------------------

/// Shared "a cycle is running" flag. Cheap to clone; every clone sees the
/// same state.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag. `None` if a cycle already holds it.
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.0.clone()))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the flag when dropped, whether the cycle finished or not.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct RefreshScheduler {
    interval: PollInterval,
    deadline: Option<Instant>,
    in_flight: InFlight,
}

impl RefreshScheduler {
    pub fn new(interval: PollInterval) -> Self {
        let mut scheduler = Self {
            interval,
            deadline: None,
            in_flight: InFlight::new(),
        };
        scheduler.rearm();
        scheduler
    }

    pub fn interval(&self) -> PollInterval {
        self.interval
    }

    /// A handle on the single-flight flag for collaborators that need to
    /// refuse work while a cycle runs.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Change the interval and restart the countdown from now.
    pub fn set_interval(&mut self, interval: PollInterval) {
        self.interval = interval;
        self.rearm();
        info!(poll_interval = %interval, "Refresh interval changed");
    }

    /// Restart the countdown from now. Disarms when polling is off.
    pub fn rearm(&mut self) {
        self.deadline = self.interval.period().map(|p| Instant::now() + p);
        if let Some(left) = self.time_left() {
            debug!(seconds = left.as_secs(), "Countdown armed");
        }
    }

    /// Time until the next automatic cycle, `None` when polling is off.
    pub fn time_left(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Wall-clock time of the next automatic cycle.
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        let left = chrono::Duration::from_std(self.time_left()?).ok()?;
        Some(Utc::now() + left)
    }

    /// Resolves when the countdown expires. Never resolves while polling
    /// is off.
    pub async fn wait_due(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }

    /// Run `cycle` unless another one is in flight. The countdown is
    /// re-armed only once the cycle has settled, and the flag is released
    /// even if the future is dropped early.
    ///
    /// Returns `None` without polling `cycle` when the trigger is dropped.
    pub async fn run_guarded<F: Future>(&mut self, cycle: F) -> Option<F::Output> {
        let guard = match self.in_flight.try_acquire() {
            Some(g) => g,
            None => {
                warn!("Refresh already in flight, trigger dropped");
                return None;
            }
        };

        let output = cycle.await;
        drop(guard);
        self.rearm();
        Some(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
