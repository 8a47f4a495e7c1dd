//! Raw HTTP probe sent alongside each emission.
//!
//! When the export protocol is `http`, every emission cycle also POSTs an
//! empty body to `{endpoint}/v1/{signal}` carrying the configured extra
//! headers. This is a demonstration of header propagation, not an OTLP
//! payload. The probe never fails loudly: transport errors and cancellation
//! are logged as warnings and reported through `ProbeOutcome`.

use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, StatusCode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::settings::{HttpHeaders, Settings};

/// Upper bound on a single probe request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Protocol is not `http`; nothing was sent.
    Skipped,
    /// The collector answered with a 2xx status.
    Delivered(StatusCode),
    /// The collector answered with a non-2xx status.
    Rejected(StatusCode),
    /// The request could not be completed.
    Failed(String),
    /// The cancellation token fired while the request was in flight.
    Cancelled,
}

impl ProbeOutcome {
    /// True for outcomes the emitter reports to the status tracker as a failed connection.
    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Rejected(_) | ProbeOutcome::Failed(_))
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Skipped => write!(f, "skipped"),
            ProbeOutcome::Delivered(status) => write!(f, "delivered ({status})"),
            ProbeOutcome::Rejected(status) => write!(f, "rejected with status code {status}"),
            ProbeOutcome::Failed(reason) => write!(f, "{reason}"),
            ProbeOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Transport used by emitters to send their per-cycle probe.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Sends one probe to `path` (relative to the endpoint).
    async fn send(&self, cancel: &CancellationToken, path: Option<&str>) -> ProbeOutcome;
}

/// reqwest-backed probe sharing one connection pool across all emitters.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    settings: Arc<Settings>,
    headers: HeaderMap,
}

impl HttpProbe {
    /// Builds the probe and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns the underlying `reqwest::Error` if the client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(settings: Arc<Settings>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: Client, settings: Arc<Settings>) -> Self {
        let headers = build_header_map(&settings.http_headers);
        Self {
            client,
            settings,
            headers,
        }
    }

    /// Target URL for a probe to `path`.
    pub fn target_url(&self, path: Option<&str>) -> String {
        let base = self.settings.endpoint.trim_end_matches('/');
        match path {
            Some(path) => format!("{base}{path}"),
            None => base.to_string(),
        }
    }

    async fn post(&self, url: &str) -> ProbeOutcome {
        match self
            .client
            .post(url)
            .headers(self.headers.clone())
            .body(reqwest::Body::from(""))
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!(
                        "[HTTP] Request to {} succeeded with status code {}",
                        url, status
                    );
                    ProbeOutcome::Delivered(status)
                } else {
                    warn!("[HTTP] Request to {} failed with status code {}", url, status);
                    ProbeOutcome::Rejected(status)
                }
            }
            Err(e) => {
                warn!(error = %e, "[HTTP] Request to {} failed with exception", url);
                ProbeOutcome::Failed(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn send(&self, cancel: &CancellationToken, path: Option<&str>) -> ProbeOutcome {
        if !self.settings.uses_http_probe() {
            return ProbeOutcome::Skipped;
        }

        let url = self.target_url(path);
        info!("[HTTP] Sending POST request to {}", url);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("[HTTP] Request to {} was cancelled", url);
                ProbeOutcome::Cancelled
            }
            outcome = self.post(&url) => outcome,
        }
    }
}

/// Converts configured headers into a `HeaderMap` with one value per name.
///
/// Names or values that are not valid HTTP are skipped with a warning.
fn build_header_map(headers: &HttpHeaders) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping HTTP header with invalid name {:?}: {}", name, e);
                continue;
            }
        };
        let value = match HeaderValue::from_str(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping value of HTTP header {}: {}", name, e);
                continue;
            }
        };
        map.insert(name, value);
    }
    debug!("Probe will attach {} extra header(s)", map.len());
    map
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{extract::State, http::HeaderMap as AxumHeaders, routing::post, Router};
    use tracing_test::traced_test;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(String, AxumHeaders)>>>,
    }

    async fn spawn_collector(status: axum::http::StatusCode) -> (String, Captured) {
        let captured = Captured::default();
        let state = captured.clone();
        let app = Router::new()
            .route(
                "/v1/:signal",
                post(
                    move |State(state): State<Captured>,
                          uri: axum::http::Uri,
                          headers: AxumHeaders| async move {
                        state
                            .requests
                            .lock()
                            .unwrap()
                            .push((uri.path().to_string(), headers));
                        status
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    fn local_probe(settings: Arc<Settings>) -> HttpProbe {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpProbe::with_client(client, settings)
    }

    fn http_settings(endpoint: &str, headers: &str) -> Arc<Settings> {
        Arc::new(Settings {
            endpoint: endpoint.to_string(),
            export_protocol: "http".into(),
            http_headers: HttpHeaders::parse(headers),
            ..Default::default()
        })
    }

    #[test]
    fn target_url_strips_trailing_slashes() {
        let probe = HttpProbe::with_client(Client::new(), http_settings("http://c:4318//", ""));
        assert_eq!(probe.target_url(Some("/v1/logs")), "http://c:4318/v1/logs");
        assert_eq!(probe.target_url(None), "http://c:4318");
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let map = build_header_map(&HttpHeaders::parse("bad name=1,x-ok=2,x-bad=a\nb"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x-ok").unwrap(), "2");
    }

    #[tokio::test]
    async fn non_http_protocol_never_touches_the_network() {
        // Port 9 on a reserved address: any real attempt would fail, not skip.
        let settings = Arc::new(Settings {
            endpoint: "http://192.0.2.1:9".into(),
            export_protocol: "protobuf".into(),
            ..Default::default()
        });
        let probe = HttpProbe::new(settings).unwrap();

        let outcome = probe
            .send(&CancellationToken::new(), Some("/v1/traces"))
            .await;
        assert_eq!(outcome, ProbeOutcome::Skipped);
    }

    #[tokio::test]
    async fn posts_once_per_send_with_one_value_per_header() {
        let (endpoint, captured) = spawn_collector(axum::http::StatusCode::OK).await;
        let probe = local_probe(http_settings(
            &format!("{endpoint}/"),
            "x-tenant=a, Authorization = Bearer t ,X-Tenant=b",
        ));

        let outcome = probe
            .send(&CancellationToken::new(), Some("/v1/metrics"))
            .await;
        assert_eq!(outcome, ProbeOutcome::Delivered(StatusCode::OK));

        let requests = captured.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (path, headers) = &requests[0];
        assert_eq!(path, "/v1/metrics");
        let tenant: Vec<_> = headers.get_all("x-tenant").iter().collect();
        assert_eq!(tenant, vec!["b"]);
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
    }

    #[tokio::test]
    #[traced_test]
    async fn non_success_status_is_reported_as_rejected() {
        let (endpoint, _) = spawn_collector(axum::http::StatusCode::SERVICE_UNAVAILABLE).await;
        let probe = local_probe(http_settings(&endpoint, ""));

        let outcome = probe.send(&CancellationToken::new(), Some("/v1/logs")).await;

        assert_eq!(
            outcome,
            ProbeOutcome::Rejected(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert!(outcome.is_failure());
        assert!(logs_contain("failed with status code 503"));
    }

    #[tokio::test]
    #[traced_test]
    async fn connection_refused_is_contained() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = local_probe(http_settings(&format!("http://{addr}"), ""));
        let outcome = probe.send(&CancellationToken::new(), Some("/v1/logs")).await;

        assert!(matches!(outcome, ProbeOutcome::Failed(_)));
        assert!(logs_contain("failed with exception"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_the_request() {
        let (endpoint, captured) = spawn_collector(axum::http::StatusCode::OK).await;
        let probe = local_probe(http_settings(&endpoint, ""));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = probe.send(&cancel, Some("/v1/logs")).await;

        assert_eq!(outcome, ProbeOutcome::Cancelled);
        assert!(!outcome.is_failure());
        assert!(captured.requests.lock().unwrap().is_empty());
    }
}
