//! Common utilities and types shared across sitewatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
