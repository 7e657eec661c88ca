//! Engine service loop.
//!
//! Owns the pricing engine and the scheduler, and is the only place either
//! is mutated. Timer expiries and user commands are serialised through one
//! `select!` loop; the current state is published on a `watch` channel after
//! every change.

use anyhow::Result;
use futures::FutureExt;
use serde::Deserialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use super::pricing::PricingEngine;
use super::scheduler::{InFlight, RefreshScheduler};
use crate::types::{CycleReport, EngineStatus, GoldwatchError, PollInterval, RatePreference};

/// Reported to collaborators when a cycle fails outside provider handling.
pub const SYNC_ERROR_MESSAGE: &str = "Sync operation encountered an error.";

const COMMAND_BUFFER: usize = 32;

/// Why a command was not applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The input was invalid. Nothing changed.
    #[error("{0}")]
    Rejected(String),

    /// The input was valid but the engine could not apply it, e.g. a store
    /// write failed.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<GoldwatchError>() {
            Some(GoldwatchError::InvalidInput(_)) => CommandError::Rejected(err.to_string()),
            None => CommandError::Failed(format!("{err:#}")),
        }
    }
}

/// Reply channel for commands that can fail.
pub type Reply = oneshot::Sender<Result<(), CommandError>>;

/// Partial preference update. Absent fields are left unchanged; an empty
/// `spot_preference` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferenceUpdate {
    pub rate_preference: Option<RatePreference>,
    pub spot_preference: Option<String>,
    pub unit_quantity: Option<f64>,
    pub poll_interval_ms: Option<u64>,
    pub alerts_enabled: Option<bool>,
}

#[derive(Debug)]
pub enum Command {
    /// Run a cycle now (dropped if one is already in flight).
    Refresh,
    ManualRate { value: f64, reply: Reply },
    UpdatePreferences { update: PreferenceUpdate, reply: Reply },
}

/// What collaborators hold to talk to a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    pub commands: mpsc::Sender<Command>,
    pub status: watch::Receiver<EngineStatus>,
    pub in_flight: InFlight,
}

pub struct EngineService {
    engine: PricingEngine,
    scheduler: RefreshScheduler,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<EngineStatus>,
    last_error: Option<String>,
}

impl EngineService {
    pub fn new(engine: PricingEngine) -> (Self, ServiceHandle) {
        let scheduler = RefreshScheduler::new(engine.preferences().poll_interval);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(engine.status());

        let handle = ServiceHandle {
            commands: cmd_tx,
            status: status_rx,
            in_flight: scheduler.in_flight(),
        };
        let mut service = Self {
            engine,
            scheduler,
            commands: cmd_rx,
            status_tx,
            last_error: None,
        };
        service.publish();
        (service, handle)
    }

    pub fn engine(&self) -> &PricingEngine {
        &self.engine
    }

    /// Run one guarded cycle. Returns `None` if the trigger was dropped or
    /// the cycle failed; a failure is recorded as the sync error and the
    /// service carries on.
    pub async fn refresh(&mut self) -> Option<CycleReport> {
        let cycle = AssertUnwindSafe(self.engine.run_cycle()).catch_unwind();
        let outcome = self.scheduler.run_guarded(cycle).await?;

        let report = match outcome {
            Ok(Ok(report)) => {
                self.last_error = None;
                Some(report)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Refresh cycle failed");
                self.last_error = Some(SYNC_ERROR_MESSAGE.to_string());
                None
            }
            Err(_) => {
                error!("Refresh cycle panicked");
                self.last_error = Some(SYNC_ERROR_MESSAGE.to_string());
                None
            }
        };

        self.publish();
        report
    }

    /// Apply one command.
    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Refresh => {
                self.refresh().await;
            }
            Command::ManualRate { value, reply } => {
                let result = self.engine.set_manual_rate(value);
                self.respond(reply, result);
            }
            Command::UpdatePreferences { update, reply } => {
                let result = self.update_preferences(update);
                self.respond(reply, result);
            }
        }
    }

    fn update_preferences(&mut self, update: PreferenceUpdate) -> Result<()> {
        // Validate the interval up front so a bad request changes nothing.
        let interval = update
            .poll_interval_ms
            .map(PollInterval::from_millis)
            .transpose()?;
        if let Some(q) = update.unit_quantity {
            if !q.is_finite() {
                return Err(GoldwatchError::InvalidInput(format!("unit quantity must be finite, got {q}")).into());
            }
        }

        if let Some(id) = update.spot_preference {
            self.engine.set_spot_preference(Some(id))?;
        }
        if let Some(pref) = update.rate_preference {
            self.engine.set_rate_preference(pref)?;
        }
        if let Some(q) = update.unit_quantity {
            self.engine.set_unit_quantity(q)?;
        }
        if let Some(enabled) = update.alerts_enabled {
            self.engine.set_alerts_enabled(enabled)?;
        }
        if let Some(interval) = interval {
            self.engine.set_poll_interval(interval)?;
            self.scheduler.set_interval(interval);
        }
        Ok(())
    }

    fn respond(&mut self, reply: Reply, result: Result<()>) {
        let reply_value = result.map_err(|e| {
            let err = CommandError::classify(&e);
            match &err {
                CommandError::Rejected(_) => warn!(error = %e, "Command rejected"),
                CommandError::Failed(_) => error!(error = ?e, "Command failed"),
            }
            err
        });
        self.publish();
        // The requester may have given up waiting.
        let _ = reply.send(reply_value);
    }

    fn publish(&mut self) {
        let mut status = self.engine.status();
        status.next_refresh_at = self.scheduler.next_refresh_at();
        status.last_error = self.last_error.clone();
        self.status_tx.send_replace(status);
    }

    /// Run until `shutdown` resolves or every command sender is gone.
    /// Starts with an immediate cycle.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        info!(poll_interval = %self.scheduler.interval(), "Engine service started");
        if let Some(report) = self.refresh().await {
            info!("{report}");
        }

        loop {
            tokio::select! {
                _ = self.scheduler.wait_due() => {
                    if let Some(report) = self.refresh().await {
                        info!("{report}");
                    }
                }
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        info!("All command senders dropped, stopping engine service");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
