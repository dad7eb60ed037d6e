//! Fake probes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sitecheck::{
    BatchConfig, BatchRunner, CertificateFetcher, LivenessOutcome, LivenessProbe, ManualClock,
    PeerCertificate, RegistrationLookup, SiteChecker, WhoisRecord,
};
use sitewatch_server::{MetricsRegistry, SiteRegistry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

/// Up unless the URL contains "down"; a queued script overrides that
#[derive(Default)]
pub struct FakeLiveness {
    script: Mutex<VecDeque<bool>>,
    delay: Duration,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeLiveness {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue the up/down outcomes of the next probes
    pub fn script(&self, outcomes: &[bool]) {
        self.script.lock().unwrap().extend(outcomes);
    }
}

#[async_trait]
impl LivenessProbe for FakeLiveness {
    async fn probe(&self, url: &str) -> LivenessOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().pop_front();
        let up = scripted.unwrap_or(!url.contains("down"));
        if up {
            LivenessOutcome::received(200, 15)
        } else {
            LivenessOutcome::received(503, 15)
        }
    }
}

/// Valid certificate expiring 30 days from [`now`]
pub struct FakeCertificate;

#[async_trait]
impl CertificateFetcher for FakeCertificate {
    async fn fetch(&self, _host: &str) -> common::Result<PeerCertificate> {
        Ok(PeerCertificate {
            chain_verified: true,
            not_before: now() - chrono::Duration::days(60),
            not_after: now() + chrono::Duration::days(30),
        })
    }
}

/// Registration expiring 2030-01-01
pub struct FakeRegistration;

#[async_trait]
impl RegistrationLookup for FakeRegistration {
    async fn lookup(&self, _domain: &str) -> common::Result<WhoisRecord> {
        Ok(WhoisRecord::parse("Registry Expiry Date: 2030-01-01T00:00:00Z\n"))
    }
}

pub fn registry_with(
    liveness: Arc<FakeLiveness>,
    metrics: Option<Arc<MetricsRegistry>>,
) -> SiteRegistry {
    let clock = Arc::new(ManualClock::new(now()));
    let checker = SiteChecker::from_parts(
        liveness,
        Arc::new(FakeCertificate),
        Arc::new(FakeRegistration),
        clock.clone(),
        Duration::from_secs(5),
    );
    let runner = BatchRunner::new(
        Arc::new(checker),
        &BatchConfig {
            concurrency: 4,
            deadline: Some(Duration::from_secs(10)),
        },
    );
    SiteRegistry::with_clock(runner, clock, metrics)
}
