//! Main sitewatch server implementation.

use crate::config::Config;
use crate::http_server::{AppState, StatusServer};
use crate::metrics::MetricsRegistry;
use crate::registry::SiteRegistry;
use crate::scheduler::Scheduler;
use sitecheck::{BatchRunner, SiteChecker};
use std::sync::Arc;
use tracing::{info, warn};

/// Sitewatch server
pub struct SitewatchServer {
    config: Config,
}

impl SitewatchServer {
    /// Create a new sitewatch server
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the registry and seed it with the configured sites
    pub fn build_registry(
        config: &Config,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> common::Result<Arc<SiteRegistry>> {
        let checker = Arc::new(SiteChecker::new(&config.checker)?);
        let runner = BatchRunner::new(checker, &config.batch);
        let registry = SiteRegistry::new(runner, metrics);

        for seed in &config.sites {
            registry
                .track(seed.to_tracked_site())
                .map_err(common::Error::config)?;
        }
        info!(sites = registry.len(), "Site registry ready");

        Ok(Arc::new(registry))
    }

    /// Run until interrupted
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting sitewatch server");

        let metrics = Arc::new(MetricsRegistry::new());
        let registry = Self::build_registry(&self.config, Some(metrics.clone()))?;

        let scheduler = Scheduler::new(registry.clone(), &self.config.schedule);
        let scheduler_handle = if self.config.schedule.enabled {
            Some(scheduler.start())
        } else {
            info!("Scheduled checks disabled");
            None
        };

        let server = StatusServer::new(
            AppState {
                metrics,
                registry,
            },
            self.config.server.listen_addr.clone(),
        );
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.run().await {
                warn!(error = %e, "Status server error");
            }
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
            _ = server_handle => {
                info!("Status server completed");
            }
        }

        if let Some(handle) = scheduler_handle {
            scheduler.stop();
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task failed");
            }
        }

        info!("Sitewatch server stopped");
        Ok(())
    }
}
