//! Website check engine for sitewatch.
//!
//! One check of a URL runs three independent probes:
//! - an HTTP GET liveness probe (up only on exactly `200`)
//! - a TLS certificate inspection on the host's TLS port
//! - a WHOIS registration lookup for the host's expiry date
//!
//! Their outcomes are merged into a single [`CheckResult`]. A probe that
//! fails, times out or panics leaves only its own fields unknown.
//! [`BatchRunner`] fans checks out across many sites with a concurrency cap
//! and an optional batch deadline, and always returns one result per site.
//!
//! The engine never persists anything. Callers merge each result into their
//! own [`TrackedSite`] with [`TrackedSite::apply`].
//!
//! # Example
//!
//! ```no_run
//! use sitecheck::{BatchConfig, BatchRunner, CheckerConfig, SiteChecker, TrackedSite};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let checker = Arc::new(SiteChecker::new(&CheckerConfig::default())?);
//!
//! let result = checker.check("https://example.com/").await;
//! println!("{} in {:?}ms", result.status, result.response_time_ms);
//!
//! let sites = vec![
//!     TrackedSite::new(1, "example", "https://example.com/"),
//!     TrackedSite::new(2, "rust", "https://www.rust-lang.org/"),
//! ];
//! let report = BatchRunner::new(checker, &BatchConfig::default())
//!     .check_all(&sites)
//!     .await;
//! assert_eq!(report.results.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod domain;
pub mod liveness;
pub mod orchestrator;
pub mod target;
pub mod types;
pub mod whois;

pub use batch::BatchRunner;
pub use certificate::{CertificateFetcher, CertificateInspector, TlsCertificateFetcher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BatchConfig, CheckerConfig};
pub use domain::DomainInspector;
pub use liveness::{HttpLivenessProbe, LivenessProbe};
pub use orchestrator::SiteChecker;
pub use types::{
    BatchReport, CheckResult, LivenessOutcome, PeerCertificate, SiteCheck, SiteId, SiteStatus,
    SiteTarget, TrackedSite,
};
pub use whois::{RegistrationLookup, WhoisClient, WhoisRecord};
