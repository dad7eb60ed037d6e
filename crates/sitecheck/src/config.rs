//! Probe and batch configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the three probes of a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Timeout for the liveness GET, up to response headers
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    /// Timeout for TCP connect plus TLS handshake
    #[serde(with = "humantime_serde")]
    pub tls_timeout: Duration,

    /// Timeout for each WHOIS connect, write and read
    #[serde(with = "humantime_serde")]
    pub whois_timeout: Duration,

    /// Upper bound on any single probe, WHOIS referrals included
    #[serde(with = "humantime_serde")]
    pub probe_deadline: Duration,

    /// Follow redirects before classifying the final status code
    pub follow_redirects: bool,

    /// User-Agent sent with the liveness GET
    pub user_agent: String,

    /// Port used for certificate inspection
    pub tls_port: u16,

    /// Fixed WHOIS server; when unset the server is found through IANA
    pub whois_server: Option<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            tls_timeout: Duration::from_secs(10),
            whois_timeout: Duration::from_secs(10),
            probe_deadline: Duration::from_secs(30),
            follow_redirects: false,
            user_agent: concat!("sitewatch/", env!("CARGO_PKG_VERSION")).to_string(),
            tls_port: 443,
            whois_server: None,
        }
    }
}

/// Batch fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of sites checked at once
    pub concurrency: usize,

    /// Deadline for the whole batch, queueing for a concurrency slot included.
    ///
    /// Sites are started in input order, so when the deadline is shorter than
    /// `sites / concurrency` times the slowest check, the same trailing sites
    /// are reported down on every run.
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            deadline: Some(Duration::from_secs(120)),
        }
    }
}
