//! In-memory table of tracked sites and the activity log.
//!
//! Each site has a check lock, held from the start of a check until its result
//! is merged, so concurrent checks of one site serialize and every check adds
//! to the uptime counter exactly once. Readers only touch the site's snapshot,
//! which is write-locked just long enough to merge a result.

use crate::config::validate_site_url;
use crate::metrics::MetricsRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use sitecheck::{BatchReport, BatchRunner, CheckResult, Clock, SiteId, SystemClock, TrackedSite};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as CheckLock, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Registry error types
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Site {0} is already tracked")]
    AlreadyTracked(SiteId),

    #[error("Site {0} not found")]
    NotFound(SiteId),

    #[error("Invalid site URL: {0}")]
    InvalidUrl(String),
}

/// One line of the activity log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub time: DateTime<Utc>,
    pub action: String,
    pub user: String,
}

/// One tracked site
struct SiteEntry {
    check: CheckLock<()>,
    snapshot: RwLock<TrackedSite>,
}

impl SiteEntry {
    fn new(site: TrackedSite) -> Arc<Self> {
        Arc::new(Self {
            check: CheckLock::new(()),
            snapshot: RwLock::new(site),
        })
    }

    /// Merge a result into the snapshot and return the updated site
    async fn apply(&self, result: &CheckResult, checked_at: DateTime<Utc>) -> TrackedSite {
        let mut site = self.snapshot.write().await;
        site.apply(result, checked_at);
        site.clone()
    }
}

/// Tracked sites keyed by ID
pub struct SiteRegistry {
    sites: DashMap<SiteId, Arc<SiteEntry>>,
    activity: Mutex<Vec<ActivityEntry>>,
    runner: BatchRunner,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SiteRegistry {
    /// Create an empty registry
    pub fn new(runner: BatchRunner, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self::with_clock(runner, Arc::new(SystemClock), metrics)
    }

    /// Create an empty registry stamping checks and log entries with `clock`
    pub fn with_clock(
        runner: BatchRunner,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            sites: DashMap::new(),
            activity: Mutex::new(Vec::new()),
            runner,
            clock,
            metrics,
        }
    }

    /// Track a site without checking it
    pub fn track(&self, site: TrackedSite) -> Result<(), RegistryError> {
        validate_site_url(&site.url).map_err(|_| RegistryError::InvalidUrl(site.url.clone()))?;

        match self.sites.entry(site.id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyTracked(site.id)),
            Entry::Vacant(slot) => {
                debug!(id = site.id, url = %site.url, "Tracking site");
                slot.insert(SiteEntry::new(site));
                self.update_site_count();
                Ok(())
            }
        }
    }

    /// Check a new site and start tracking it.
    ///
    /// The site starts with an uptime counter of 1 if the first check found
    /// it up, otherwise 0.
    #[instrument(skip(self))]
    pub async fn add_site(
        &self,
        id: SiteId,
        name: &str,
        url: &str,
        actor: &str,
    ) -> Result<TrackedSite, RegistryError> {
        validate_site_url(url).map_err(|_| RegistryError::InvalidUrl(url.to_string()))?;
        if self.sites.contains_key(&id) {
            return Err(RegistryError::AlreadyTracked(id));
        }

        let result = self.runner.checker().check(url).await;
        let mut site = TrackedSite::new(id, name, url);
        site.apply(&result, self.clock.now());

        match self.sites.entry(id) {
            Entry::Occupied(_) => return Err(RegistryError::AlreadyTracked(id)),
            Entry::Vacant(slot) => {
                slot.insert(SiteEntry::new(site.clone()));
            }
        }

        self.record(&site, &result);
        self.log(format!("Add website {}", site.name), actor);
        self.update_site_count();
        info!(id, status = %result.status, "Site added");
        Ok(site)
    }

    /// Check one tracked site and merge the result
    #[instrument(skip(self))]
    pub async fn check_site(&self, id: SiteId, actor: &str) -> Result<TrackedSite, RegistryError> {
        let entry = self.entry(id).ok_or(RegistryError::NotFound(id))?;
        let _check = entry.check.lock().await;

        let url = entry.snapshot.read().await.url.clone();
        let result = self.runner.checker().check(&url).await;
        let site = entry.apply(&result, self.clock.now()).await;

        self.record(&site, &result);
        self.log(format!("Check website {}", site.name), actor);
        Ok(site)
    }

    /// Check every tracked site as one batch
    #[instrument(skip(self))]
    pub async fn check_all(&self, actor: &str) -> BatchReport {
        let started = Instant::now();
        let entries = self.entries_by_id();

        // Check locks taken in ID order so concurrent batches cannot deadlock
        let mut checks = Vec::with_capacity(entries.len());
        let mut targets = Vec::with_capacity(entries.len());
        for entry in &entries {
            checks.push(entry.check.lock().await);
            targets.push(entry.snapshot.read().await.target());
        }

        let report = self.runner.check_targets(targets).await;
        let checked_at = self.clock.now();

        // Results come back in target order
        for (entry, check) in entries.iter().zip(&report.results) {
            let site = entry.apply(&check.result, checked_at).await;
            self.record(&site, &check.result);
            self.log(format!("Check website {}", site.name), actor);
        }
        drop(checks);

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(started.elapsed(), report.timed_out + report.faulted);
        }
        report
    }

    /// Snapshot of every tracked site, ordered by ID
    pub async fn sites(&self) -> Vec<TrackedSite> {
        let mut sites = Vec::with_capacity(self.sites.len());
        for entry in self.entries_by_id() {
            sites.push(entry.snapshot.read().await.clone());
        }
        sites
    }

    /// Snapshot of one tracked site
    pub async fn site(&self, id: SiteId) -> Option<TrackedSite> {
        let entry = self.entry(id)?;
        let site = entry.snapshot.read().await.clone();
        Some(site)
    }

    /// Activity log, oldest first
    pub fn logs(&self) -> Vec<ActivityEntry> {
        self.activity
            .lock()
            .map(|log| log.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of tracked sites
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    fn entry(&self, id: SiteId) -> Option<Arc<SiteEntry>> {
        self.sites.get(&id).map(|entry| entry.value().clone())
    }

    fn entries_by_id(&self) -> Vec<Arc<SiteEntry>> {
        let mut entries: Vec<(SiteId, Arc<SiteEntry>)> = self
            .sites
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    fn log(&self, action: String, actor: &str) {
        let entry = ActivityEntry {
            time: self.clock.now(),
            action,
            user: actor.to_string(),
        };
        match self.activity.lock() {
            Ok(mut log) => log.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    fn record(&self, site: &TrackedSite, result: &CheckResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record_check(site.id, result, site.uptime_counter);
        }
    }

    fn update_site_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.update_site_count(self.sites.len());
        }
    }
}
