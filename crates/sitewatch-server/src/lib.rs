//! Sitewatch server
//!
//! Tracks a set of websites, checks them on a schedule with the `sitecheck`
//! engine and exposes their state over HTTP.
//!
//! # Components
//!
//! - **SiteRegistry**: tracked sites, per-site check serialization and the
//!   activity log
//! - **Scheduler**: periodic batch check of every tracked site
//! - **StatusServer**: `/metrics`, `/sites` and `/logs` endpoints

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod server;

pub use config::{Config, ConfigError};
pub use http_server::{AppState, StatusServer};
pub use metrics::MetricsRegistry;
pub use registry::{ActivityEntry, RegistryError, SiteRegistry};
pub use scheduler::Scheduler;
pub use server::SitewatchServer;
