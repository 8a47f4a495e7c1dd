//! Telemetry service: owns the shared state and supervises the emitters.

use std::{collections::HashMap, future::Future, sync::Arc};

use thiserror::Error;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    emitter::Emitter,
    probe::Probe,
    signal::{Instruments, SignalKind},
    status::ConnectionStatus,
};
use crate::config::settings::Settings;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// An emitter task panicked or was aborted outside of cancellation.
    #[error("{kind} emitter terminated unexpectedly: {reason}")]
    EmitterFailed { kind: SignalKind, reason: String },
}

/// Runs one emitter per enabled signal against a shared status tracker and probe.
pub struct TelemetryService {
    settings: Arc<Settings>,
    probe: Arc<dyn Probe>,
    status: Arc<ConnectionStatus>,
    instruments: Instruments,
}

impl TelemetryService {
    /// Creates the service. Constructing the status tracker logs the
    /// initial connection attempt.
    pub fn new(settings: Arc<Settings>, probe: Arc<dyn Probe>) -> Self {
        let status = Arc::new(ConnectionStatus::new(settings.endpoint.clone()));
        Self {
            settings,
            probe,
            status,
            instruments: Instruments::from_global(),
        }
    }

    pub fn status(&self) -> &Arc<ConnectionStatus> {
        &self.status
    }

    /// Starts the enabled emitters and waits for all of them to stop.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::EmitterFailed` for the first emitter task that
    /// panics. The remaining emitters are cancelled before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServiceError> {
        info!(
            "Starting telemetry service with endpoint: {}",
            self.settings.endpoint
        );

        let signals = self.settings.enabled_signals();
        if signals.is_empty() {
            warn!("All signals are disabled, nothing will be emitted");
        }

        let mut tasks = JoinSet::new();
        let mut kinds: HashMap<Id, SignalKind> = HashMap::with_capacity(signals.len());
        for kind in signals {
            let emitter = Emitter::new(
                kind,
                &self.settings,
                self.probe.clone(),
                self.status.clone(),
                self.instruments.clone(),
            );
            let handle = tasks.spawn(emitter.run(cancel.clone()));
            kinds.insert(handle.id(), kind);
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    if let Some(kind) = kinds.get(&id) {
                        debug!("{} emitter task finished", kind);
                    }
                }
                Err(e) => {
                    let kind = kinds[&e.id()];
                    error!(error = %e, "{} emitter task failed, stopping remaining emitters", kind);
                    cancel.cancel();
                    failure.get_or_insert(ServiceError::EmitterFailed {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Runs the emitters until `shutdown` resolves, then cancels them and
    /// waits for them to exit.
    ///
    /// Keeps waiting for `shutdown` even when no emitter is running, so the
    /// process stays up with every signal disabled.
    ///
    /// # Errors
    ///
    /// Returns the error of `run` as soon as an emitter task fails.
    pub async fn run_until<F>(&self, cancel: CancellationToken, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()>,
    {
        let run = self.run(cancel.clone());
        tokio::pin!(run);
        tokio::pin!(shutdown);

        tokio::select! {
            result = &mut run => match result {
                Ok(()) => {
                    info!("No emitter is running, waiting for shutdown signal");
                    shutdown.await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            _ = &mut shutdown => {
                cancel.cancel();
                run.await
            }
        }
    }

    /// Cancels all emitters and records the final status.
    pub fn stop(&self, cancel: &CancellationToken) {
        cancel.cancel();
        self.status.record(false, "Service stopped");
    }
}
