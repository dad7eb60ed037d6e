//! Concurrent checks across many sites.

use crate::config::BatchConfig;
use crate::orchestrator::SiteChecker;
use crate::types::{BatchReport, CheckResult, SiteCheck, SiteId, SiteTarget, TrackedSite};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// Runs a [`SiteChecker`] over a list of sites with bounded concurrency
pub struct BatchRunner {
    checker: Arc<SiteChecker>,
    concurrency: usize,
    deadline: Option<Duration>,
}

impl BatchRunner {
    /// Create a new batch runner
    pub fn new(checker: Arc<SiteChecker>, config: &BatchConfig) -> Self {
        Self {
            checker,
            concurrency: config.concurrency.max(1),
            deadline: config.deadline,
        }
    }

    /// Checker used for each site
    pub fn checker(&self) -> &Arc<SiteChecker> {
        &self.checker
    }

    /// Check every tracked site
    pub async fn check_all(&self, sites: &[TrackedSite]) -> BatchReport {
        self.check_targets(sites.iter().map(TrackedSite::target).collect())
            .await
    }

    /// Check every target; the report has exactly one entry per target.
    ///
    /// Sites whose check faults, or that are still running when the batch
    /// deadline passes, are reported down with every other field unknown.
    pub async fn check_targets(&self, targets: Vec<SiteTarget>) -> BatchReport {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        debug!(
            total = targets.len(),
            concurrency = self.concurrency,
            "Starting batch"
        );

        for (index, target) in targets.iter().enumerate() {
            let checker = self.checker.clone();
            let semaphore = semaphore.clone();
            let url = target.url.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };
                let outcome = AssertUnwindSafe(checker.check(&url)).catch_unwind().await;
                (index, outcome.ok())
            });
        }

        let mut slots: Vec<Option<CheckResult>> = vec![None; targets.len()];
        let mut faulted = vec![false; targets.len()];
        let deadline = self.deadline.map(|d| started + d);

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(remaining = tasks.len(), "Batch deadline reached; aborting remaining checks");
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match next {
                None => break,
                Some(Ok((index, Some(result)))) => slots[index] = Some(result),
                Some(Ok((index, None))) => {
                    faulted[index] = true;
                    error!(id = targets[index].id, url = %targets[index].url, "Site check faulted");
                }
                // Panics are caught inside the task, so this is an abort
                Some(Err(e)) => {
                    error!(error = %e, "Site check task failed");
                }
            }
        }

        let cut_off: Vec<SiteId> = targets
            .iter()
            .zip(slots.iter().zip(&faulted))
            .filter(|(_, (slot, fault))| slot.is_none() && !**fault)
            .map(|(target, _)| target.id)
            .collect();
        if !cut_off.is_empty() {
            warn!(ids = ?cut_off, "Sites cut off by batch deadline");
        }
        let timed_out = cut_off.len();
        let faulted = faulted.iter().filter(|f| **f).count();

        let results: Vec<SiteCheck> = targets
            .iter()
            .zip(slots)
            .map(|(target, slot)| SiteCheck {
                id: target.id,
                result: slot.unwrap_or_else(CheckResult::unreachable),
            })
            .collect();
        let uptime_delta = results.iter().map(|r| r.result.uptime_increment()).sum();

        info!(
            total = results.len(),
            up = uptime_delta,
            timed_out,
            faulted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );

        BatchReport {
            results,
            uptime_delta,
            timed_out,
            faulted,
            cut_off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateFetcher;
    use crate::clock::SystemClock;
    use crate::liveness::LivenessProbe;
    use crate::types::{LivenessOutcome, PeerCertificate, SiteStatus};
    use crate::whois::{RegistrationLookup, WhoisRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Up unless the URL says otherwise; tracks peak concurrency
    #[derive(Default)]
    struct ScriptedLiveness {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LivenessProbe for ScriptedLiveness {
        async fn probe(&self, url: &str) -> LivenessOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if url.contains("panic") {
                panic!("liveness fault for {url}");
            }
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if url.contains("down") || !url.starts_with("http") {
                return LivenessOutcome::unreachable();
            }
            LivenessOutcome::received(200, 20)
        }
    }

    struct NoCertificate;

    #[async_trait]
    impl CertificateFetcher for NoCertificate {
        async fn fetch(&self, host: &str) -> common::Result<PeerCertificate> {
            Err(common::Error::tls(format!("no TLS listener on {}", host)))
        }
    }

    struct NoRegistration;

    #[async_trait]
    impl RegistrationLookup for NoRegistration {
        async fn lookup(&self, _domain: &str) -> common::Result<WhoisRecord> {
            Ok(WhoisRecord::default())
        }
    }

    fn runner(liveness: Arc<ScriptedLiveness>, config: BatchConfig) -> BatchRunner {
        let checker = SiteChecker::from_parts(
            liveness,
            Arc::new(NoCertificate),
            Arc::new(NoRegistration),
            Arc::new(SystemClock),
            Duration::from_secs(60),
        );
        BatchRunner::new(Arc::new(checker), &config)
    }

    fn sites(urls: &[&str]) -> Vec<TrackedSite> {
        urls.iter()
            .enumerate()
            .map(|(i, url)| TrackedSite::new(i as u64 + 1, format!("site {}", i + 1), *url))
            .collect()
    }

    #[tokio::test]
    async fn test_malformed_site_does_not_affect_others() {
        let runner = runner(Arc::default(), BatchConfig::default());
        let sites = sites(&[
            "https://one.example",
            "https://two.example",
            "::not a url::",
            "https://four.example",
            "https://down.example",
        ]);

        let report = runner.check_all(&sites).await;

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.get(1).unwrap().status, SiteStatus::Up);
        assert_eq!(report.get(2).unwrap().status, SiteStatus::Up);
        assert_eq!(*report.get(3).unwrap(), CheckResult::unreachable());
        assert_eq!(report.get(4).unwrap().status, SiteStatus::Up);
        assert_eq!(report.get(5).unwrap().status, SiteStatus::Down);
        assert_eq!(report.uptime_delta, 3);
    }

    #[tokio::test]
    async fn test_empty_url_is_still_reported() {
        let runner = runner(Arc::default(), BatchConfig::default());
        let report = runner.check_all(&sites(&["", "https://ok.example"])).await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(*report.get(1).unwrap(), CheckResult::unreachable());
        assert!(report.get(2).unwrap().is_up());
    }

    #[tokio::test]
    async fn test_panicking_site_is_isolated() {
        let runner = runner(Arc::default(), BatchConfig::default());
        let report = runner
            .check_all(&sites(&["https://a.example", "https://panic.example", "https://c.example"]))
            .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.get(1).unwrap().is_up());
        assert!(report.get(3).unwrap().is_up());
        assert_eq!(report.uptime_delta, 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let liveness = Arc::new(ScriptedLiveness::default());
        let config = BatchConfig {
            concurrency: 3,
            deadline: None,
        };
        let runner = runner(liveness.clone(), config);
        let urls: Vec<String> = (0..12).map(|i| format!("https://s{}.example", i)).collect();
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();

        let report = runner.check_all(&sites(&urls)).await;

        assert_eq!(report.results.len(), 12);
        assert_eq!(report.uptime_delta, 12);
        assert!(liveness.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_marks_unfinished_sites_down() {
        let config = BatchConfig {
            concurrency: 4,
            deadline: Some(Duration::from_millis(300)),
        };
        let runner = runner(Arc::default(), config);
        let started = Instant::now();

        let report = runner
            .check_all(&sites(&["https://fast.example", "https://slow.example"]))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.get(1).unwrap().is_up());
        assert_eq!(*report.get(2).unwrap(), CheckResult::unreachable());
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.faulted, 0);
        assert_eq!(report.cut_off, vec![2]);
    }

    #[tokio::test]
    async fn test_deadline_cuts_off_queued_tail() {
        // One slot and a deadline shorter than the queue: later sites never start
        let liveness = Arc::new(ScriptedLiveness::default());
        let config = BatchConfig {
            concurrency: 1,
            deadline: Some(Duration::from_millis(150)),
        };
        let runner = runner(liveness.clone(), config);
        let urls: Vec<String> = (0..12).map(|i| format!("https://s{}.example", i)).collect();
        let urls: Vec<&str> = urls.iter().map(String::as_str).collect();

        let report = runner.check_all(&sites(&urls)).await;

        assert_eq!(report.results.len(), 12);
        assert!(report.get(1).unwrap().is_up());
        assert!(report.cut_off.contains(&12));
        assert_eq!(report.timed_out, report.cut_off.len());
        assert_eq!(report.uptime_delta as usize, 12 - report.cut_off.len());
        for id in &report.cut_off {
            assert_eq!(*report.get(*id).unwrap(), CheckResult::unreachable());
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let runner = runner(Arc::default(), BatchConfig::default());
        let report = runner.check_all(&[]).await;

        assert!(report.results.is_empty());
        assert_eq!(report.uptime_delta, 0);
    }
}
