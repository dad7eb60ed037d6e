//! HTTP liveness probe.

use crate::config::CheckerConfig;
use crate::types::LivenessOutcome;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Liveness probe trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe a URL. Never fails; transport errors classify as down.
    async fn probe(&self, url: &str) -> LivenessOutcome;
}

/// Liveness probe backed by a single HTTP GET
pub struct HttpLivenessProbe {
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpLivenessProbe {
    /// Create a new HTTP liveness probe
    pub fn new(config: &CheckerConfig) -> common::Result<Self> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(5)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .redirect(redirect)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(common::Error::http)?;

        Ok(Self {
            timeout_duration: config.http_timeout,
            client,
        })
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn probe(&self, url: &str) -> LivenessOutcome {
        let start = Instant::now();

        // send() resolves once the response headers are in
        match timeout(self.timeout_duration, self.client.get(url).send()).await {
            Ok(Ok(response)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let status_code = response.status().as_u16();
                let outcome = LivenessOutcome::received(status_code, elapsed_ms);

                if status_code == 200 {
                    debug!(url, status = status_code, duration_ms = elapsed_ms, "Liveness probe up");
                } else {
                    warn!(url, status = status_code, duration_ms = elapsed_ms, "Liveness probe down: unexpected status code");
                }
                outcome
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "Liveness probe failed");
                LivenessOutcome::unreachable()
            }
            Err(_) => {
                warn!(url, "Liveness probe timed out");
                LivenessOutcome::unreachable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection, forever
    async fn serve(status_line: &'static str, extra_headers: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\n{}Content-Length: 2\r\nConnection: close\r\n\r\nok",
                        status_line, extra_headers
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/", addr)
    }

    fn probe_with_timeout(timeout: Duration) -> HttpLivenessProbe {
        let config = CheckerConfig {
            http_timeout: timeout,
            ..CheckerConfig::default()
        };
        HttpLivenessProbe::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_is_up() {
        let url = serve("200 OK", "").await;
        let outcome = probe_with_timeout(Duration::from_secs(2)).probe(&url).await;

        assert_eq!(outcome.status, SiteStatus::Up);
        assert!(outcome.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_error_response_is_down_with_latency() {
        for status_line in ["404 Not Found", "500 Internal Server Error", "204 No Content"] {
            let url = serve(status_line, "").await;
            let outcome = probe_with_timeout(Duration::from_secs(2)).probe(&url).await;

            assert_eq!(outcome.status, SiteStatus::Down, "{status_line}");
            assert!(outcome.response_time_ms.is_some(), "{status_line}");
        }
    }

    #[tokio::test]
    async fn test_redirect_is_down_with_latency() {
        let url = serve("301 Moved Permanently", "Location: http://127.0.0.1:1/\r\n").await;
        let outcome = probe_with_timeout(Duration::from_secs(2)).probe(&url).await;

        assert_eq!(outcome.status, SiteStatus::Down);
        assert!(outcome.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_connection_refused_is_down_without_latency() {
        let outcome = probe_with_timeout(Duration::from_millis(500))
            .probe("http://127.0.0.1:1/")
            .await;

        assert_eq!(outcome, LivenessOutcome::unreachable());
    }

    #[tokio::test]
    async fn test_malformed_url_is_down() {
        let probe = probe_with_timeout(Duration::from_millis(500));
        assert_eq!(probe.probe("").await, LivenessOutcome::unreachable());
        assert_eq!(probe.probe("not a url").await, LivenessOutcome::unreachable());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let start = Instant::now();
        let outcome = probe_with_timeout(Duration::from_millis(200))
            .probe(&format!("http://{}/", addr))
            .await;

        assert_eq!(outcome, LivenessOutcome::unreachable());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
