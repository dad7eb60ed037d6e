//! Prometheus metrics for the sitewatch server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use sitecheck::{CheckResult, SiteId};
use std::time::Duration;

/// Labels for per-site metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SiteLabels {
    /// Site ID
    pub site: String,
}

/// Labels for check result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    /// Site ID
    pub site: String,
    /// Classification (up, down)
    pub status: String,
}

/// Metrics registry with all sitewatch metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    // Per-site metrics
    checks_total: Family<CheckLabels, Counter>,
    response_time_seconds: Family<SiteLabels, Histogram>,
    ssl_days_remaining: Family<SiteLabels, Gauge>,
    uptime_checks: Family<SiteLabels, Gauge>,

    // System-wide metrics
    sites_tracked: Gauge,
    batch_duration_seconds: Histogram,
    batch_sites_lost_total: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "sitewatch_checks",
            "Total site checks performed",
            checks_total.clone(),
        );

        // 1ms to ~16s
        let response_time_seconds = Family::<SiteLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 15))
        });
        registry.register(
            "sitewatch_response_time_seconds",
            "Liveness response time in seconds",
            response_time_seconds.clone(),
        );

        let ssl_days_remaining = Family::<SiteLabels, Gauge>::default();
        registry.register(
            "sitewatch_ssl_days_remaining",
            "Whole days until the certificate expires",
            ssl_days_remaining.clone(),
        );

        let uptime_checks = Family::<SiteLabels, Gauge>::default();
        registry.register(
            "sitewatch_uptime_checks",
            "Checks that classified the site as up",
            uptime_checks.clone(),
        );

        let sites_tracked = Gauge::default();
        registry.register(
            "sitewatch_sites_tracked",
            "Number of tracked sites",
            sites_tracked.clone(),
        );

        // 100ms to ~7min
        let batch_duration_seconds = Histogram::new(exponential_buckets(0.1, 2.0, 13));
        registry.register(
            "sitewatch_batch_duration_seconds",
            "Duration of a check of every tracked site",
            batch_duration_seconds.clone(),
        );

        let batch_sites_lost_total = Counter::default();
        registry.register(
            "sitewatch_batch_sites_lost",
            "Sites reported down because their check faulted or missed the batch deadline",
            batch_sites_lost_total.clone(),
        );

        Self {
            registry,
            checks_total,
            response_time_seconds,
            ssl_days_remaining,
            uptime_checks,
            sites_tracked,
            batch_duration_seconds,
            batch_sites_lost_total,
        }
    }

    /// Record the outcome of one site check
    pub fn record_check(&self, site: SiteId, result: &CheckResult, uptime_counter: u64) {
        let site = site.to_string();
        let site_labels = SiteLabels { site: site.clone() };

        self.checks_total
            .get_or_create(&CheckLabels {
                site,
                status: result.status.as_str().to_string(),
            })
            .inc();

        if let Some(ms) = result.response_time_ms {
            self.response_time_seconds
                .get_or_create(&site_labels)
                .observe(Duration::from_millis(ms).as_secs_f64());
        }

        match result.ssl_days_remaining {
            Some(days) => {
                self.ssl_days_remaining.get_or_create(&site_labels).set(days);
            }
            None => {
                self.ssl_days_remaining.remove(&site_labels);
            }
        }

        self.uptime_checks
            .get_or_create(&site_labels)
            .set(i64::try_from(uptime_counter).unwrap_or(i64::MAX));
    }

    /// Update the number of tracked sites
    pub fn update_site_count(&self, count: usize) {
        self.sites_tracked.set(count as i64);
    }

    /// Record a completed batch
    pub fn record_batch(&self, duration: Duration, lost: usize) {
        self.batch_duration_seconds.observe(duration.as_secs_f64());
        self.batch_sites_lost_total.inc_by(lost as u64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
