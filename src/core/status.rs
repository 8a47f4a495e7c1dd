//! Connection status tracking with hysteresis-based logging.
//!
//! Every emitter reports the outcome of its iteration here. To keep the log
//! stream readable under a sustained outage (or a sustained healthy link), a
//! report only produces a log line when the state flipped since the last
//! logged report, or when the last log is at least `RELOG_INTERVAL` old.

use std::fmt;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{error, info};

/// Minimum time between two logs reporting the same state.
pub const RELOG_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Last known state of the link to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl LinkState {
    pub fn from_success(success: bool) -> Self {
        if success {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Connected => "Connected",
            LinkState::Disconnected => "Disconnected",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct StatusInner {
    state: LinkState,
    last_logged: Instant,
}

/// Shared connection status tracker.
///
/// The state and the timestamp of the last log are updated together under
/// one lock, so concurrent reports from different emitters cannot both pass
/// the hysteresis check for the same transition.
#[derive(Debug)]
pub struct ConnectionStatus {
    endpoint: String,
    inner: Mutex<StatusInner>,
}

impl ConnectionStatus {
    /// Creates a tracker in the `Connected` state and logs the initial attempt.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let status = Self {
            endpoint: endpoint.into(),
            inner: Mutex::new(StatusInner {
                state: LinkState::Connected,
                last_logged: Instant::now(),
            }),
        };
        status.log(LinkState::Connected, "Initial connection attempt");
        status
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Reports an outcome. Returns `true` if it was logged.
    pub fn record(&self, success: bool, message: &str) -> bool {
        let mut inner = self.inner.lock();
        self.record_locked(&mut inner, LinkState::from_success(success), message)
    }

    /// Reports a success only if the last known state is a failure.
    ///
    /// Returns `true` if the recovery was logged.
    pub fn report_recovery(&self, message: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_connected() {
            return false;
        }
        self.record_locked(&mut inner, LinkState::Connected, message)
    }

    fn record_locked(&self, inner: &mut StatusInner, state: LinkState, message: &str) -> bool {
        let now = Instant::now();
        let should_log =
            state != inner.state || now.duration_since(inner.last_logged) >= RELOG_INTERVAL;
        if !should_log {
            return false;
        }

        self.log(state, message);
        inner.state = state;
        inner.last_logged = now;
        true
    }

    fn log(&self, state: LinkState, message: &str) {
        match state {
            LinkState::Connected => info!(
                endpoint = %self.endpoint,
                "Successfully connected to OpenTelemetry collector at {}. {}",
                self.endpoint,
                message
            ),
            LinkState::Disconnected => error!(
                endpoint = %self.endpoint,
                "Failed to connect to OpenTelemetry collector at {}. {}",
                self.endpoint,
                message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::*;

    const ENDPOINT: &str = "http://collector:4317";

    fn count_lines(lines: &[&str], needle: &str) -> usize {
        lines.iter().filter(|line| line.contains(needle)).count()
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn logs_initial_attempt_on_construction() {
        let status = ConnectionStatus::new(ENDPOINT);
        assert_eq!(status.state(), LinkState::Connected);
        assert_eq!(status.endpoint(), ENDPOINT);
        assert!(logs_contain(
            "Successfully connected to OpenTelemetry collector at http://collector:4317. Initial connection attempt"
        ));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn repeated_failures_log_once_then_recovery_logs_immediately() {
        let status = ConnectionStatus::new(ENDPOINT);

        assert!(status.record(false, "Error (logs): refused"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!status.record(false, "Error (logs): refused"));
        assert!(!status.is_connected());

        assert!(status.record(true, "Connection recovered (logs)"));
        assert!(status.is_connected());

        logs_assert(|lines: &[&str]| {
            match count_lines(lines, "Failed to connect to OpenTelemetry collector") {
                1 => {}
                n => return Err(format!("expected one failure log, got {n}")),
            }
            match count_lines(lines, "Connection recovered (logs)") {
                1 => Ok(()),
                n => Err(format!("expected one recovery log, got {n}")),
            }
        });
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn unchanged_state_is_relogged_after_five_minutes() {
        let status = ConnectionStatus::new(ENDPOINT);

        assert!(!status.record(true, "still fine"));
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(!status.record(true, "still fine"));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(status.record(true, "still fine"));
        assert!(!status.record(true, "still fine"));

        logs_assert(|lines: &[&str]| match count_lines(lines, "still fine") {
            1 => Ok(()),
            n => Err(format!("expected exactly one relog, got {n}")),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_failure_is_relogged_after_five_minutes() {
        let status = ConnectionStatus::new(ENDPOINT);

        assert!(status.record(false, "down"));
        tokio::time::advance(RELOG_INTERVAL - Duration::from_secs(1)).await;
        assert!(!status.record(false, "down"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(status.record(false, "down"));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_is_ignored_while_connected() {
        let status = ConnectionStatus::new(ENDPOINT);
        tokio::time::advance(RELOG_INTERVAL * 2).await;

        assert!(!status.report_recovery("Connection recovered (traces)"));

        assert!(status.record(false, "Error (traces): timeout"));
        assert!(status.report_recovery("Connection recovered (traces)"));
        assert!(!status.report_recovery("Connection recovered (traces)"));
        assert!(status.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_produce_a_single_transition() {
        let status = Arc::new(ConnectionStatus::new(ENDPOINT));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let status = status.clone();
                tokio::spawn(async move { status.record(false, &format!("Error ({i})")) })
            })
            .collect();

        let mut logged = 0;
        for handle in handles {
            if handle.await.unwrap() {
                logged += 1;
            }
        }

        assert_eq!(logged, 1);
        assert_eq!(status.state(), LinkState::Disconnected);
    }

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::Connected.to_string(), "Connected");
        assert_eq!(LinkState::from_success(false), LinkState::Disconnected);
        assert!(!LinkState::Disconnected.is_connected());
    }
}
