//! Periodic signal emitter.
//!
//! One `Emitter` runs per enabled signal kind. Each iteration records the
//! signal, sends the probe, waits a short simulated processing delay, then
//! reports the outcome to the shared `ConnectionStatus` before sleeping for
//! the signal's interval. Every wait races the cancellation token, and a
//! cancelled iteration stops without reporting anything.
//!
//! A failed probe is not an emission failure. The probe has already logged
//! it as a warning; the cycle completes normally and the failure only feeds
//! the status tracker.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    probe::{Probe, ProbeOutcome},
    signal::{Instruments, SignalKind},
    status::ConnectionStatus,
};
use crate::config::settings::Settings;

/// Simulated work between sending the probe and completing the cycle.
pub const PROCESSING_DELAY: Duration = Duration::from_millis(100);

/// Reasons an emission iteration did not run to completion.
#[derive(Debug, Error)]
pub enum EmitError {
    /// Cancellation was observed at a suspension point.
    #[error("emission cancelled")]
    Cancelled,
}

/// Periodic loop for a single signal kind.
pub struct Emitter {
    kind: SignalKind,
    interval: Duration,
    label: String,
    probe: Arc<dyn Probe>,
    status: Arc<ConnectionStatus>,
    instruments: Instruments,
}

impl Emitter {
    pub fn new(
        kind: SignalKind,
        settings: &Settings,
        probe: Arc<dyn Probe>,
        status: Arc<ConnectionStatus>,
        instruments: Instruments,
    ) -> Self {
        Self {
            kind,
            interval: settings.interval_for(kind),
            label: settings.custom_label.clone(),
            probe,
            status,
            instruments,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs until `cancel` fires. Probe failures never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Starting {} emitter (interval: {}s)",
            self.kind,
            self.interval.as_secs()
        );

        while !cancel.is_cancelled() {
            match self.emit_once(&cancel).await {
                Ok(outcome) if outcome.is_failure() => {
                    self.status.record(
                        false,
                        &format!("HTTP request failed ({}): {}", self.kind, outcome),
                    );
                }
                Ok(_) => {
                    self.status
                        .report_recovery(&format!("Connection recovered ({})", self.kind));
                }
                Err(EmitError::Cancelled) => break,
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        debug!("{} emitter stopped", self.kind);
    }

    /// Performs one emission cycle and returns the probe's outcome.
    ///
    /// The cycle completes successfully whatever the probe reports.
    pub async fn emit_once(&self, cancel: &CancellationToken) -> Result<ProbeOutcome, EmitError> {
        let cycle = self.instruments.begin(self.kind, &self.label);

        let outcome = self.probe.send(cancel, Some(self.kind.path())).await;
        if outcome == ProbeOutcome::Cancelled {
            return Err(EmitError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EmitError::Cancelled),
            _ = sleep(PROCESSING_DELAY) => {}
        }

        cycle.complete();
        Ok(outcome)
    }
}
