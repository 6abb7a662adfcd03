//! Health-check logic and per-target result tracking.

use std::time::Duration;

use tracing::{debug, warn};

use cloudperf_core::{HealthCheckConfig, parse_duration};
use cloudperf_router::TargetHealth;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// The target answered 2xx.
    Healthy,
    /// The target answered with any other status.
    Unhealthy,
    /// Connection, handshake or timeout failure.
    Failed,
}

/// Consecutive check results for one target.
#[derive(Debug)]
pub struct HealthTracker {
    status: TargetHealth,
    consecutive_failures: u32,
    consecutive_successes: u32,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
    current_backoff: Duration,
    base_interval: Duration,
}

impl HealthTracker {
    pub fn new(config: &HealthCheckConfig) -> Self {
        let interval = parse_duration(&config.interval).unwrap_or(Duration::from_secs(5));
        Self::with_thresholds(config.unhealthy_threshold.max(1), 1, interval)
    }

    pub fn with_thresholds(unhealthy_threshold: u32, healthy_threshold: u32, interval: Duration) -> Self {
        Self {
            status: TargetHealth::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            unhealthy_threshold,
            healthy_threshold,
            current_backoff: interval,
            base_interval: interval,
        }
    }

    /// Record a check result and return the resulting status.
    pub fn record(&mut self, result: CheckResult) -> TargetHealth {
        match result {
            CheckResult::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;
                self.current_backoff = self.base_interval;

                if self.consecutive_successes >= self.healthy_threshold {
                    if self.status != TargetHealth::Healthy {
                        debug!(successes = self.consecutive_successes, "target healthy");
                    }
                    self.status = TargetHealth::Healthy;
                }
            }
            CheckResult::Unhealthy | CheckResult::Failed => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
                self.current_backoff = self.current_backoff.saturating_mul(2).min(MAX_BACKOFF);

                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != TargetHealth::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "target marked unhealthy"
                        );
                    }
                    self.status = TargetHealth::Unhealthy;
                }
            }
        }
        self.status
    }

    pub fn status(&self) -> TargetHealth {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next check.
    pub fn next_interval(&self) -> Duration {
        self.current_backoff
    }
}

/// GET `path` on `address` and classify the answer.
pub async fn http_check(address: &str, path: &str, timeout: Duration) -> CheckResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "check connection failed");
                return CheckResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "check handshake failed");
                return CheckResult::Failed;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "cloudperf-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "check request invalid");
                return CheckResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => CheckResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "check non-2xx");
                CheckResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "check request failed");
                CheckResult::Failed
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%uri, "check timed out");
        CheckResult::Failed
    })
}
