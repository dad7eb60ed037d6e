//! WHOIS client and response parsing.

use crate::config::CheckerConfig;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

const WHOIS_PORT: u16 = 43;
const IANA_WHOIS_SERVER: &str = "whois.iana.org";
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;
const MAX_REFERRAL_DEPTH: u8 = 3;

static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 ./_()-]*?)\s*:\s*(.*?)\s*$").expect("valid regex")
});

/// Parsed WHOIS response: `key: value` lines in the order they appeared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhoisRecord {
    fields: Vec<(String, String)>,
}

impl WhoisRecord {
    /// Parse a raw WHOIS response
    pub fn parse(raw: &str) -> Self {
        let mut record = Self::default();
        record.extend(raw);
        record
    }

    /// Append the fields of another raw response
    pub fn extend(&mut self, raw: &str) {
        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
                continue;
            }
            let Some(caps) = FIELD_LINE.captures(line) else {
                continue;
            };
            let value = caps[2].trim();
            if value.is_empty() {
                continue;
            }
            self.fields.push((caps[1].to_string(), value.to_string()));
        }
    }

    /// First value whose key matches `name`.
    ///
    /// Keys match ignoring case, whitespace and punctuation, so `expDate`
    /// finds `Exp date:` and `Registry Expiry Date` finds `registry expiry date:`.
    pub fn get(&self, name: &str) -> Option<&str> {
        let wanted = normalize_key(name);
        self.fields
            .iter()
            .find(|(key, _)| normalize_key(key) == wanted)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Registration data lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationLookup: Send + Sync {
    /// Fetch registration data for `domain`
    async fn lookup(&self, domain: &str) -> common::Result<WhoisRecord>;
}

/// WHOIS over TCP port 43
#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
    server: Option<String>,
    port: u16,
}

impl WhoisClient {
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            timeout: config.whois_timeout,
            server: config.whois_server.clone(),
            port: WHOIS_PORT,
        }
    }

    /// Use a non-standard port for every server queried
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Authoritative server for the TLD of `domain`, as referred by IANA
    async fn registry_server(&self, domain: &str) -> common::Result<String> {
        let tld = domain
            .rsplit('.')
            .next()
            .filter(|tld| !tld.is_empty())
            .ok_or_else(|| common::Error::invalid_target(domain))?;

        let response = WhoisRecord::parse(&self.query_server(IANA_WHOIS_SERVER, tld).await?);
        let server = response
            .get("refer")
            .or_else(|| response.get("whois"))
            .map(|s| s.to_ascii_lowercase());

        server.ok_or_else(|| common::Error::whois(format!("No WHOIS server for TLD {}", tld)))
    }

    async fn query_server(&self, server: &str, query: &str) -> common::Result<String> {
        let mut stream = timeout(self.timeout, TcpStream::connect((server, self.port)))
            .await
            .map_err(|_| common::Error::timeout(format!("Connection to {}", server)))??;

        timeout(self.timeout, stream.write_all(format!("{}\r\n", query).as_bytes()))
            .await
            .map_err(|_| common::Error::timeout(format!("Write to {}", server)))??;

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match timeout(self.timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.len() > MAX_RESPONSE_SIZE {
                        return Err(common::Error::whois("Response too large"));
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                // Some servers never close; keep what arrived
                Err(_) if !response.is_empty() => break,
                Err(_) => return Err(common::Error::timeout(format!("Read from {}", server))),
            }
        }

        Ok(decode(response))
    }
}

/// UTF-8, falling back to Latin-1
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[async_trait]
impl RegistrationLookup for WhoisClient {
    #[instrument(skip(self))]
    async fn lookup(&self, domain: &str) -> common::Result<WhoisRecord> {
        let mut server = match &self.server {
            Some(server) => server.clone(),
            None => self.registry_server(domain).await?,
        };

        let mut visited = HashSet::new();
        let mut record = WhoisRecord::default();

        for depth in 0..MAX_REFERRAL_DEPTH {
            visited.insert(server.clone());
            debug!(server = %server, depth, "Querying WHOIS server");

            let raw = match self.query_server(&server, domain).await {
                Ok(raw) => raw,
                // Registry data is enough when a registrar server misbehaves
                Err(e) if !record.is_empty() => {
                    warn!(server = %server, error = %e, "WHOIS referral failed");
                    break;
                }
                Err(e) => return Err(e),
            };

            let response = WhoisRecord::parse(&raw);
            let referral = response
                .get("Registrar WHOIS Server")
                .map(|s| s.trim_start_matches("whois://").to_ascii_lowercase())
                .filter(|s| s.contains('.') && !visited.contains(s));
            record.fields.extend(response.fields);

            match referral {
                Some(next) => server = next,
                None => break,
            }
        }

        if record.is_empty() {
            return Err(common::Error::whois(format!("Empty response for {}", domain)));
        }
        Ok(record)
    }
}
