//! Site check types and structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracked site identifier
pub type SiteId = u64;

/// Liveness classification of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// Responded with exactly HTTP 200
    Up,
    /// Anything else
    Down,
}

impl SiteStatus {
    /// Lowercase label, as used in serialized output and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Up => "up",
            SiteStatus::Down => "down",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessOutcome {
    pub status: SiteStatus,

    /// Time until response headers arrived; absent when no response was received
    pub response_time_ms: Option<u64>,
}

impl LivenessOutcome {
    /// A response was received with the given status code
    pub fn received(status_code: u16, response_time_ms: u64) -> Self {
        Self {
            status: if status_code == 200 {
                SiteStatus::Up
            } else {
                SiteStatus::Down
            },
            response_time_ms: Some(response_time_ms),
        }
    }

    /// No response was received at all
    pub fn unreachable() -> Self {
        Self {
            status: SiteStatus::Down,
            response_time_ms: None,
        }
    }
}

/// Leaf certificate facts as observed during a TLS handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Whether the presented chain verified against the trust roots
    pub chain_verified: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Certificate fields of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateStatus {
    pub expired: bool,
    pub expiry_date: DateTime<Utc>,
    pub days_remaining: i64,
}

/// Domain registration fields of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainStatus {
    pub expiry_date: DateTime<Utc>,
    pub expired: bool,
}

/// Result of checking one URL.
///
/// Every field except `status` is optional; an absent value means the
/// corresponding probe could not determine it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub status: SiteStatus,
    pub response_time_ms: Option<u64>,
    pub ssl_expired: Option<bool>,
    pub ssl_expiry_date: Option<DateTime<Utc>>,
    pub ssl_days_remaining: Option<i64>,
    pub domain_expiry_date: Option<DateTime<Utc>>,
    pub domain_expired: Option<bool>,
}

impl CheckResult {
    /// Compose a result from the independently obtained probe outcomes
    pub fn compose(
        liveness: LivenessOutcome,
        certificate: Option<CertificateStatus>,
        domain: Option<DomainStatus>,
    ) -> Self {
        Self {
            status: liveness.status,
            response_time_ms: liveness.response_time_ms,
            ssl_expired: certificate.map(|c| c.expired),
            ssl_expiry_date: certificate.map(|c| c.expiry_date),
            ssl_days_remaining: certificate.map(|c| c.days_remaining),
            domain_expiry_date: domain.map(|d| d.expiry_date),
            domain_expired: domain.map(|d| d.expired),
        }
    }

    /// `down` with every other field unknown
    pub fn unreachable() -> Self {
        Self::compose(LivenessOutcome::unreachable(), None, None)
    }

    /// Check if the site was classified up
    pub fn is_up(&self) -> bool {
        self.status == SiteStatus::Up
    }

    /// Amount this result adds to a site's uptime counter
    pub fn uptime_increment(&self) -> u64 {
        u64::from(self.is_up())
    }
}

/// A site to check: identifier plus URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTarget {
    pub id: SiteId,
    pub url: String,
}

/// A tracked website and the state of its most recent check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSite {
    pub id: SiteId,
    pub name: String,
    pub url: String,

    /// Absent until the first check
    pub status: Option<SiteStatus>,
    pub response_time_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub ssl_expired: Option<bool>,
    pub ssl_expiry_date: Option<DateTime<Utc>>,
    pub domain_expiry_date: Option<DateTime<Utc>>,

    /// Number of checks that classified the site as up
    pub uptime_counter: u64,
}

impl TrackedSite {
    /// Create a site that has never been checked
    pub fn new(id: SiteId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            status: None,
            response_time_ms: None,
            last_checked_at: None,
            ssl_expired: None,
            ssl_expiry_date: None,
            domain_expiry_date: None,
            uptime_counter: 0,
        }
    }

    /// Target used to check this site
    pub fn target(&self) -> SiteTarget {
        SiteTarget {
            id: self.id,
            url: self.url.clone(),
        }
    }

    /// Merge the result of one check call into this site.
    ///
    /// Must be called exactly once per check; the uptime counter grows by
    /// one only when the result is up.
    pub fn apply(&mut self, result: &CheckResult, checked_at: DateTime<Utc>) {
        self.status = Some(result.status);
        self.response_time_ms = result.response_time_ms;
        self.last_checked_at = Some(checked_at);
        self.ssl_expired = result.ssl_expired;
        self.ssl_expiry_date = result.ssl_expiry_date;
        self.domain_expiry_date = result.domain_expiry_date;
        self.uptime_counter = self.uptime_counter.saturating_add(result.uptime_increment());
    }
}

/// Result for one site of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCheck {
    pub id: SiteId,
    pub result: CheckResult,
}

/// Results of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per input site, in input order
    pub results: Vec<SiteCheck>,

    /// Total uptime increment across all results
    pub uptime_delta: u64,

    /// Sites cut off by the batch deadline
    pub timed_out: usize,

    /// Sites whose check task faulted
    pub faulted: usize,

    /// IDs of the sites cut off by the batch deadline
    pub cut_off: Vec<SiteId>,
}

impl BatchReport {
    /// Look up the result for a site
    pub fn get(&self, id: SiteId) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.id == id).map(|r| &r.result)
    }
}
