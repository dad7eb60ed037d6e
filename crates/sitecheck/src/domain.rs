//! Domain registration expiry inspection.

use crate::clock::Clock;
use crate::target::registration_name;
use crate::types::DomainStatus;
use crate::whois::{RegistrationLookup, WhoisRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Expiry field names, highest priority first
pub const EXPIRY_FIELDS: [&str; 4] = [
    "expDate",
    "Registrar Registration Expiration Date",
    "Registry Expiry Date",
    "Expiration Date",
];

const DATE_TIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%Y.%m.%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%b %d %Y",
];

/// Derives registration expiry fields for a host
pub struct DomainInspector {
    lookup: Arc<dyn RegistrationLookup>,
    clock: Arc<dyn Clock>,
}

impl DomainInspector {
    pub fn new(lookup: Arc<dyn RegistrationLookup>, clock: Arc<dyn Clock>) -> Self {
        Self { lookup, clock }
    }

    /// Inspect the registration of `host`.
    ///
    /// `Ok(None)` when the lookup succeeded but carried no usable expiry date.
    pub async fn inspect(&self, host: &str) -> common::Result<Option<DomainStatus>> {
        let record = self.lookup.lookup(registration_name(host)).await?;
        let status = evaluate(&record, self.clock.now());
        if status.is_none() {
            debug!(host, fields = record.len(), "No recognised expiry field");
        }
        Ok(status)
    }
}

/// Expiry fields from `record` as seen at `now`
pub fn evaluate(record: &WhoisRecord, now: DateTime<Utc>) -> Option<DomainStatus> {
    let raw = EXPIRY_FIELDS.iter().find_map(|field| record.get(field))?;
    let expiry_date = parse_date(raw)?;

    Some(DomainStatus {
        expiry_date,
        expired: expiry_date < now,
    })
}

/// Parse the date formats registries commonly use
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw
        .trim()
        .trim_end_matches(" (UTC)")
        .trim_end_matches(" UTC")
        .trim_end_matches(" GMT")
        .trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cleaned, fmt) {
            return Some(dt.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(cleaned, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }

    None
}
