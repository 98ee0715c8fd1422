//! Protocol-specific reachability checks.
//!
//! A probe never fails outward: whatever goes wrong, including a panic in the
//! executor, comes back as a down [`CheckResult`] carrying the reason.
use chrono::Utc;
use futures::FutureExt;
use rand::random;
use reqwest::Method;
use std::any::Any;
use std::error::Error as StdError;
use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use surge_ping::{ICMP, PingIdentifier, PingSequence};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::models::CheckResult;
use super::target::{DEFAULT_EXPECT_STATUS, DEFAULT_HTTP_METHOD, ProbeKind, Target};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Hard cap on a probe beyond its own timeout, so the per-protocol error wins
/// whenever it fires in time.
const OVERRUN_SLACK: Duration = Duration::from_millis(250);

const PING_PAYLOAD: [u8; 56] = [0; 56];

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{0}")]
    Request(String),
    #[error("status code {actual}, expected {expected}")]
    UnexpectedStatus { actual: u16, expected: u16 },
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("dial tcp {addr}: {source}")]
    Dial {
        addr: String,
        source: std::io::Error,
    },
    #[error("dial tcp {addr}: i/o timeout after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },
    #[error("lookup {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("ping {host}: {reason}")]
    Ping { host: String, reason: String },
    #[error("ICMP probe unimplemented: {0}")]
    IcmpUnimplemented(String),
    #[error("unknown monitor type")]
    UnknownType,
    #[error("probe panicked: {0}")]
    Panicked(String),
    #[error("probe timed out after {0:?}")]
    TimedOut(Duration),
}

enum IcmpSupport {
    Disabled,
    Unavailable(String),
    Ready {
        v4: surge_ping::Client,
        v6: Option<surge_ping::Client>,
    },
}

/// Runs one check against a [`Target`], bounded by a fixed timeout.
pub struct Prober {
    http: reqwest::Client,
    timeout: Duration,
    icmp: IcmpSupport,
}

impl Prober {
    /// Builds a prober. With `icmp_enabled`, this opens ICMP sockets and so
    /// must be called from within a tokio runtime.
    pub fn new(timeout: Duration, icmp_enabled: bool) -> Self {
        let icmp = if icmp_enabled {
            open_icmp_sockets()
        } else {
            IcmpSupport::Disabled
        };
        Self {
            http: reqwest::Client::new(),
            timeout,
            icmp,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn check(&self, target: &Target) -> CheckResult {
        self.run(&target.name, self.execute(&target.kind)).await
    }

    /// Times `probe` and turns its outcome into a [`CheckResult`]. A panic or
    /// an overrun past the timeout becomes a down result.
    async fn run<F>(&self, name: &str, probe: F) -> CheckResult
    where
        F: Future<Output = Result<(), ProbeError>>,
    {
        let timestamp = Utc::now();
        let started = Instant::now();

        let guarded = AssertUnwindSafe(probe).catch_unwind();
        let outcome = match tokio::time::timeout(self.timeout + OVERRUN_SLACK, guarded).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(ProbeError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(ProbeError::TimedOut(self.timeout)),
        };
        let latency = started.elapsed();

        match outcome {
            Ok(()) => CheckResult::up(name, timestamp, latency),
            Err(e) => {
                debug!(monitor = %name, error = %e, "Probe failed.");
                CheckResult::down(name, timestamp, latency, e.to_string())
            }
        }
    }

    async fn execute(&self, kind: &ProbeKind) -> Result<(), ProbeError> {
        match kind {
            ProbeKind::Http {
                url,
                method,
                expect_status,
            } => self.check_http(url, method, *expect_status).await,
            ProbeKind::Tcp { host, port } => self.check_tcp(host, *port).await,
            ProbeKind::Icmp { host } => self.check_icmp(host).await,
            ProbeKind::Unknown { url: Some(url) } => {
                self.check_http(url, DEFAULT_HTTP_METHOD, DEFAULT_EXPECT_STATUS)
                    .await
            }
            ProbeKind::Unknown { url: None } => Err(ProbeError::UnknownType),
        }
    }

    async fn check_http(&self, url: &str, method: &str, expected: u16) -> Result<(), ProbeError> {
        let method = Method::from_bytes(method.trim().to_uppercase().as_bytes())
            .map_err(|_| ProbeError::InvalidMethod(method.to_string()))?;

        let response = self
            .http
            .request(method, url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProbeError::Request(describe_request_error(&e, self.timeout)))?;

        let actual = response.status().as_u16();
        if actual != expected {
            return Err(ProbeError::UnexpectedStatus { actual, expected });
        }
        Ok(())
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<(), ProbeError> {
        let addr = join_host_port(host, port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(source)) => Err(ProbeError::Dial { addr, source }),
            Err(_) => Err(ProbeError::DialTimeout {
                addr,
                timeout: self.timeout,
            }),
        }
    }

    async fn check_icmp(&self, host: &str) -> Result<(), ProbeError> {
        let (v4, v6) = match &self.icmp {
            IcmpSupport::Disabled => {
                return Err(ProbeError::IcmpUnimplemented(
                    "ICMP probing is disabled (set global.icmp = true to enable)".to_string(),
                ));
            }
            IcmpSupport::Unavailable(reason) => {
                return Err(ProbeError::IcmpUnimplemented(reason.clone()));
            }
            IcmpSupport::Ready { v4, v6 } => (v4, v6),
        };

        let deadline = tokio::time::Instant::now() + self.timeout;
        let ip = self.resolve(host, deadline).await?;
        let client = match ip {
            IpAddr::V4(_) => v4,
            IpAddr::V6(_) => v6.as_ref().ok_or_else(|| {
                ProbeError::IcmpUnimplemented("no ICMPv6 socket available".to_string())
            })?,
        };

        let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
        pinger.timeout(deadline.saturating_duration_since(tokio::time::Instant::now()));
        pinger
            .ping(PingSequence(0), &PING_PAYLOAD)
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Ping {
                host: host.to_string(),
                reason: e.to_string(),
            })
    }

    /// Resolves `host`, giving up at `deadline` so the lookup and the ping
    /// share one timeout.
    async fn resolve(
        &self,
        host: &str,
        deadline: tokio::time::Instant,
    ) -> Result<IpAddr, ProbeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let resolve_error = |reason: String| ProbeError::Resolve {
            host: host.to_string(),
            reason,
        };
        let mut addrs = tokio::time::timeout_at(deadline, tokio::net::lookup_host((host, 0)))
            .await
            .map_err(|_| resolve_error("timed out".to_string()))?
            .map_err(|e| resolve_error(e.to_string()))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| resolve_error("no addresses found".to_string()))
    }
}

fn open_icmp_sockets() -> IcmpSupport {
    let v4 = match surge_ping::Client::new(&surge_ping::Config::default()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Cannot open ICMP socket; ICMP monitors will report as down.");
            return IcmpSupport::Unavailable(format!("cannot open ICMP socket: {e}"));
        }
    };
    let v6 = surge_ping::Client::new(&surge_ping::Config::builder().kind(ICMP::V6).build())
        .map_err(|e| debug!(error = %e, "ICMPv6 socket unavailable."))
        .ok();
    IcmpSupport::Ready { v4, v6 }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// reqwest's top-level message omits the cause, so walk the source chain.
fn describe_request_error(e: &reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        return format!("request timed out after {timeout:?}");
    }
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU16, Ordering};
    use tokio::net::TcpListener;

    async fn serve_status(status: Arc<AtomicU16>) -> SocketAddr {
        let app = Router::new().route(
            "/health",
            get(move || {
                let status = Arc::clone(&status);
                async move {
                    StatusCode::from_u16(status.load(Ordering::SeqCst))
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_http_status_decides_success() {
        let status = Arc::new(AtomicU16::new(200));
        let addr = serve_status(Arc::clone(&status)).await;
        let prober = Prober::new(Duration::from_secs(5), false);
        let target = Target::new("svc", ProbeKind::http(format!("http://{addr}/health")));

        let up = prober.check(&target).await;
        assert!(up.success);
        assert_eq!(up.error, None);
        assert_eq!(up.target, "svc");

        status.store(503, Ordering::SeqCst);
        let down = prober.check(&target).await;
        assert!(!down.success);
        assert_eq!(
            down.error.as_deref(),
            Some("status code 503, expected 200")
        );
    }

    #[tokio::test]
    async fn test_http_custom_expected_status_and_method() {
        let status = Arc::new(AtomicU16::new(204));
        let addr = serve_status(status).await;
        let prober = Prober::new(Duration::from_secs(5), false);

        let ok = Target::new(
            "nocontent",
            ProbeKind::Http {
                url: format!("http://{addr}/health"),
                method: "get".to_string(),
                expect_status: 204,
            },
        );
        assert!(prober.check(&ok).await.success);

        let bad_method = Target::new(
            "bad",
            ProbeKind::Http {
                url: format!("http://{addr}/health"),
                method: "NOT A METHOD".to_string(),
                expect_status: 204,
            },
        );
        let result = prober.check(&bad_method).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_http_connection_refused_is_down() {
        let port = closed_port().await;
        let prober = Prober::new(Duration::from_secs(5), false);
        let target = Target::new("gone", ProbeKind::http(format!("http://127.0.0.1:{port}/")));

        let result = prober.check(&target).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_unresponsive_endpoint_fails_within_timeout() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(300);
        let prober = Prober::new(timeout, false);
        let target = Target::new("hang", ProbeKind::http(format!("http://{addr}/")));

        let started = Instant::now();
        let result = prober.check(&target).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(started.elapsed() < timeout + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_tcp_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let prober = Prober::new(Duration::from_secs(5), false);

        let up = prober
            .check(&Target::new(
                "db",
                ProbeKind::Tcp { host: "127.0.0.1".into(), port: open },
            ))
            .await;
        assert!(up.success);
        drop(listener);

        let port = closed_port().await;
        let started = Instant::now();
        let down = prober
            .check(&Target::new(
                "db",
                ProbeKind::Tcp { host: "127.0.0.1".into(), port },
            ))
            .await;
        assert!(!down.success);
        let error = down.error.unwrap();
        assert!(error.starts_with(&format!("dial tcp 127.0.0.1:{port}")));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_icmp_disabled_reports_unimplemented() {
        let prober = Prober::new(DEFAULT_PROBE_TIMEOUT, false);
        let result = prober
            .check(&Target::new("dns", ProbeKind::Icmp { host: "8.8.8.8".into() }))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unimplemented"));
    }

    #[tokio::test]
    async fn test_unknown_kind_without_url_fails_explicitly() {
        let prober = Prober::new(DEFAULT_PROBE_TIMEOUT, false);
        let result = prober
            .check(&Target::new("mystery", ProbeKind::Unknown { url: None }))
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("unknown monitor type"));
    }

    #[tokio::test]
    async fn test_unknown_kind_with_url_probes_http() {
        let addr = serve_status(Arc::new(AtomicU16::new(200))).await;
        let prober = Prober::new(Duration::from_secs(5), false);
        let result = prober
            .check(&Target::new(
                "implicit",
                ProbeKind::Unknown { url: Some(format!("http://{addr}/health")) },
            ))
            .await;
        assert!(result.success);
    }

    async fn explode() -> Result<(), ProbeError> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_panicking_executor_is_reported_down() {
        let prober = Prober::new(Duration::from_secs(1), false);
        let result = prober.run("boom", explode()).await;
        assert!(!result.success);
        assert_eq!(result.target, "boom");
        assert_eq!(result.error.as_deref(), Some("probe panicked: kaboom"));
    }

    #[tokio::test]
    async fn test_stalled_executor_is_cut_off_at_timeout() {
        let timeout = Duration::from_millis(200);
        let prober = Prober::new(timeout, false);

        let started = Instant::now();
        let result = prober
            .run("stall", std::future::pending::<Result<(), ProbeError>>())
            .await;
        let elapsed = started.elapsed();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("probe timed out after"));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_icmp_lookup_shares_the_check_deadline() {
        let prober = Prober::new(Duration::from_secs(5), false);
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
        // A literal address needs no lookup, whatever the deadline.
        assert_eq!(
            prober.resolve("127.0.0.1", deadline).await.unwrap(),
            IpAddr::from([127, 0, 0, 1])
        );
        let _ = prober.resolve("localhost", deadline).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_join_host_port_brackets_ipv6() {
        assert_eq!(join_host_port("example.com", 80), "example.com:80");
        assert_eq!(join_host_port("::1", 22), "[::1]:22");
        assert_eq!(join_host_port("[::1]", 22), "[::1]:22");
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload = std::panic::catch_unwind(|| panic!("kaboom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "kaboom 1");
        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
