//! Single-site check: liveness, certificate and registration probes composed
//! into one [`CheckResult`].

use crate::certificate::{CertificateFetcher, CertificateInspector, TlsCertificateFetcher};
use crate::clock::{Clock, SystemClock};
use crate::config::CheckerConfig;
use crate::domain::DomainInspector;
use crate::liveness::{HttpLivenessProbe, LivenessProbe};
use crate::target;
use crate::types::{CheckResult, LivenessOutcome};
use crate::whois::{RegistrationLookup, WhoisClient};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

/// Checks one URL at a time.
///
/// The three probes run concurrently and each one's failure, timeout or
/// panic only blanks its own fields of the result.
pub struct SiteChecker {
    liveness: Arc<dyn LivenessProbe>,
    certificates: CertificateInspector,
    domains: DomainInspector,
    probe_deadline: Duration,
}

impl SiteChecker {
    /// Create a checker with network-backed probes and the system clock
    pub fn new(config: &CheckerConfig) -> common::Result<Self> {
        Ok(Self::from_parts(
            Arc::new(HttpLivenessProbe::new(config)?),
            Arc::new(TlsCertificateFetcher::new(config)),
            Arc::new(WhoisClient::new(config)),
            Arc::new(SystemClock),
            config.probe_deadline,
        ))
    }

    /// Create a checker from explicit probes
    pub fn from_parts(
        liveness: Arc<dyn LivenessProbe>,
        certificates: Arc<dyn CertificateFetcher>,
        registrations: Arc<dyn RegistrationLookup>,
        clock: Arc<dyn Clock>,
        probe_deadline: Duration,
    ) -> Self {
        Self {
            liveness,
            certificates: CertificateInspector::new(certificates, clock.clone()),
            domains: DomainInspector::new(registrations, clock),
            probe_deadline,
        }
    }

    /// Check a URL. Always returns a complete result.
    #[instrument(skip(self))]
    pub async fn check(&self, url: &str) -> CheckResult {
        let host = target::hostname(url);
        if host.is_none() {
            warn!(url, "No hostname in URL; certificate and domain checks skipped");
        }

        let (liveness, certificate, domain) = tokio::join!(
            self.guarded("liveness", url, async {
                Ok::<_, common::Error>(self.liveness.probe(url).await)
            }),
            async {
                match host.as_deref() {
                    Some(host) => {
                        self.guarded("certificate", url, self.certificates.inspect(host))
                            .await
                    }
                    None => None,
                }
            },
            async {
                match host.as_deref() {
                    Some(host) => self
                        .guarded("domain", url, self.domains.inspect(host))
                        .await
                        .flatten(),
                    None => None,
                }
            },
        );

        let result = CheckResult::compose(
            liveness.unwrap_or_else(LivenessOutcome::unreachable),
            certificate,
            domain,
        );

        info!(
            url,
            status = %result.status,
            response_time_ms = ?result.response_time_ms,
            ssl_days_remaining = ?result.ssl_days_remaining,
            domain_expired = ?result.domain_expired,
            "Site checked"
        );
        result
    }

    /// Run one probe, turning its error, timeout or panic into `None`
    async fn guarded<T>(
        &self,
        probe: &'static str,
        url: &str,
        fut: impl Future<Output = common::Result<T>>,
    ) -> Option<T> {
        match timeout(self.probe_deadline, AssertUnwindSafe(fut).catch_unwind()).await {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(e))) => {
                warn!(url, probe, error = %e, timed_out = e.is_timeout(), "Probe failed");
                None
            }
            Ok(Err(_)) => {
                error!(url, probe, "Probe panicked");
                None
            }
            Err(_) => {
                warn!(url, probe, deadline_ms = self.probe_deadline.as_millis() as u64, "Probe exceeded deadline");
                None
            }
        }
    }
}
