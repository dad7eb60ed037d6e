//! Periodic check of every tracked site.

use crate::config::ScheduleSettings;
use crate::registry::SiteRegistry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Actor recorded in the activity log for scheduled checks
pub const SCHEDULER_ACTOR: &str = "scheduler";

/// Runs [`SiteRegistry::check_all`] on a fixed interval
pub struct Scheduler {
    registry: Arc<SiteRegistry>,
    interval: Duration,
    run_on_start: bool,
    runs: Arc<AtomicU64>,
    stop_signal: Arc<Notify>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(registry: Arc<SiteRegistry>, settings: &ScheduleSettings) -> Self {
        Self {
            registry,
            interval: settings.interval,
            run_on_start: settings.run_on_start,
            runs: Arc::new(AtomicU64::new(0)),
            stop_signal: Arc::new(Notify::new()),
        }
    }

    /// Start the check loop
    pub fn start(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let period = self.interval;
        let run_on_start = self.run_on_start;
        let runs = self.runs.clone();
        let stop_signal = self.stop_signal.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // A batch longer than the interval delays the next one
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !run_on_start {
                ticker.tick().await; // Skip first immediate tick
            }

            info!(interval_secs = period.as_secs(), "Scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = registry.check_all(SCHEDULER_ACTOR).await;
                        let run = runs.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(
                            run,
                            sites = report.results.len(),
                            up = report.uptime_delta,
                            "Scheduled check complete"
                        );
                    }
                    _ = stop_signal.notified() => {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the check loop after the batch in flight, if any
    pub fn stop(&self) {
        self.stop_signal.notify_one();
    }

    /// Number of completed scheduled batches
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}
