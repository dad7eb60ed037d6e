//! TLS certificate inspection.
//!
//! A [`CertificateFetcher`] performs the handshake and reports what the peer
//! presented; the [`CertificateInspector`] turns that into expiry fields
//! relative to the injected clock.

use crate::clock::Clock;
use crate::config::CheckerConfig;
use crate::types::{CertificateStatus, PeerCertificate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Source of the leaf certificate a host presents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    /// Handshake with `host` and describe its leaf certificate
    async fn fetch(&self, host: &str) -> common::Result<PeerCertificate>;
}

/// Fetches certificates over a real TLS handshake using rustls
pub struct TlsCertificateFetcher {
    port: u16,
    timeout_duration: Duration,
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TlsCertificateFetcher {
    /// Create a fetcher trusting the Mozilla root set
    pub fn new(config: &CheckerConfig) -> Self {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        Self {
            port: config.tls_port,
            timeout_duration: config.tls_timeout,
            roots: Arc::new(roots),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    fn client_config(&self) -> common::Result<(Arc<ClientConfig>, Arc<RecordingVerifier>)> {
        let webpki = WebPkiServerVerifier::builder_with_provider(
            self.roots.clone(),
            self.provider.clone(),
        )
        .build()
        .map_err(common::Error::tls)?;

        let verifier = Arc::new(RecordingVerifier {
            inner: webpki,
            chain_verified: AtomicBool::new(false),
        });

        let config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(common::Error::tls)?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_no_client_auth();

        Ok((Arc::new(config), verifier))
    }

    async fn handshake(&self, host: &str) -> common::Result<PeerCertificate> {
        let (config, verifier) = self.client_config()?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| common::Error::invalid_target(format!("{}: {}", host, e)))?;

        let stream = TcpStream::connect((host, self.port)).await?;
        let tls = TlsConnector::from(config)
            .connect(server_name, stream)
            .await
            .map_err(common::Error::tls)?;

        let leaf = tls
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or_else(|| common::Error::certificate("No certificate presented"))?;

        let (not_before, not_after) = validity_window(leaf.as_ref())?;

        Ok(PeerCertificate {
            chain_verified: verifier.chain_verified.load(Ordering::SeqCst),
            not_before,
            not_after,
        })
    }
}

#[async_trait]
impl CertificateFetcher for TlsCertificateFetcher {
    async fn fetch(&self, host: &str) -> common::Result<PeerCertificate> {
        match timeout(self.timeout_duration, self.handshake(host)).await {
            Ok(result) => result,
            Err(_) => Err(common::Error::timeout(format!(
                "TLS handshake with {}:{}",
                host, self.port
            ))),
        }
    }
}

/// Read the validity window out of a DER certificate
fn validity_window(der: &[u8]) -> common::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(common::Error::certificate)?;
    let validity = cert.validity();

    let to_utc = |ts: i64| {
        DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| common::Error::certificate("Validity date out of range"))
    };

    Ok((
        to_utc(validity.not_before.timestamp())?,
        to_utc(validity.not_after.timestamp())?,
    ))
}

/// Verifier that records the WebPKI verdict and lets the handshake proceed,
/// so expired or untrusted certificates can still be inspected.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    chain_verified: AtomicBool,
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict =
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);
        if let Err(ref e) = verdict {
            debug!(server = ?server_name, error = %e, "Certificate chain did not verify");
        }
        self.chain_verified.store(verdict.is_ok(), Ordering::SeqCst);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Derives certificate expiry fields for a host
pub struct CertificateInspector {
    fetcher: Arc<dyn CertificateFetcher>,
    clock: Arc<dyn Clock>,
}

impl CertificateInspector {
    pub fn new(fetcher: Arc<dyn CertificateFetcher>, clock: Arc<dyn Clock>) -> Self {
        Self { fetcher, clock }
    }

    /// Inspect the certificate served by `host`
    pub async fn inspect(&self, host: &str) -> common::Result<CertificateStatus> {
        let cert = self.fetcher.fetch(host).await?;
        Ok(evaluate(&cert, self.clock.now()))
    }
}

/// Expiry fields for `cert` as seen at `now`.
///
/// The expiry date is `now` plus the whole days remaining, so it is only
/// accurate to the day.
pub fn evaluate(cert: &PeerCertificate, now: DateTime<Utc>) -> CertificateStatus {
    let days_remaining = (cert.not_after - now).num_days();
    let in_window = cert.not_before <= now && now <= cert.not_after;

    CertificateStatus {
        expired: !(cert.chain_verified && in_window),
        expiry_date: now + chrono::Duration::days(days_remaining),
        days_remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn cert(chain_verified: bool, from_days: i64, until: chrono::Duration) -> PeerCertificate {
        PeerCertificate {
            chain_verified,
            not_before: now() + chrono::Duration::days(from_days),
            not_after: now() + until,
        }
    }

    #[test]
    fn test_valid_certificate() {
        let status = evaluate(
            &cert(true, -30, chrono::Duration::days(45) + chrono::Duration::hours(3)),
            now(),
        );

        assert!(!status.expired);
        assert_eq!(status.days_remaining, 45);
        assert_eq!(status.expiry_date, now() + chrono::Duration::days(45));
    }

    #[test]
    fn test_expired_certificate_has_negative_days() {
        let status = evaluate(&cert(true, -400, chrono::Duration::days(-3)), now());

        assert!(status.expired);
        assert_eq!(status.days_remaining, -3);
    }

    #[test]
    fn test_untrusted_chain_is_expired() {
        let status = evaluate(&cert(false, -1, chrono::Duration::days(90)), now());

        assert!(status.expired);
        assert_eq!(status.days_remaining, 90);
    }

    #[test]
    fn test_not_yet_valid_is_expired() {
        let status = evaluate(&cert(true, 2, chrono::Duration::days(90)), now());
        assert!(status.expired);
    }

    #[tokio::test]
    async fn test_inspector_uses_clock() {
        let mut fetcher = MockCertificateFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(cert(true, -10, chrono::Duration::days(20))));

        let clock = Arc::new(ManualClock::new(now()));
        let inspector = CertificateInspector::new(Arc::new(fetcher), clock.clone());

        assert_eq!(inspector.inspect("a.b").await.unwrap().days_remaining, 20);

        clock.advance(chrono::Duration::days(5));
        assert_eq!(inspector.inspect("a.b").await.unwrap().days_remaining, 15);
    }

    #[tokio::test]
    async fn test_inspector_propagates_fetch_error() {
        let mut fetcher = MockCertificateFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(common::Error::tls("handshake failure")));

        let inspector = CertificateInspector::new(Arc::new(fetcher), Arc::new(ManualClock::new(now())));
        assert!(inspector.inspect("a.b").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_without_listener_fails() {
        let config = CheckerConfig {
            tls_port: 1,
            tls_timeout: Duration::from_millis(500),
            ..CheckerConfig::default()
        };
        let fetcher = TlsCertificateFetcher::new(&config);

        assert!(fetcher.fetch("127.0.0.1").await.is_err());
    }

    /// Self-signed P-256 certificate for `localhost`, valid 2020-01-01 to 2040-01-01
    const LOCALHOST_CERT: &[u8] = include_bytes!("../testdata/localhost-cert.der");
    const LOCALHOST_KEY: &[u8] = include_bytes!("../testdata/localhost-key.der");

    /// Serve the self-signed certificate on a local port, forever
    async fn self_signed_listener() -> u16 {
        use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
        use tokio_rustls::TlsAcceptor;

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(LOCALHOST_CERT.to_vec())],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(LOCALHOST_KEY.to_vec())),
        )
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = acceptor.accept(socket).await;
                });
            }
        });

        port
    }

    #[tokio::test]
    async fn test_fetch_reads_untrusted_certificate() {
        let config = CheckerConfig {
            tls_port: self_signed_listener().await,
            tls_timeout: Duration::from_secs(5),
            ..CheckerConfig::default()
        };
        let fetcher = TlsCertificateFetcher::new(&config);

        let cert = fetcher.fetch("localhost").await.unwrap();

        assert!(!cert.chain_verified);
        assert_eq!(cert.not_before, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(cert.not_after, Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap());

        // In date, but the chain does not verify
        let status = evaluate(&cert, now());
        assert!(status.expired);
        assert!(status.days_remaining > 4_000);
    }

    #[test]
    fn test_validity_window_reads_der() {
        let (not_before, not_after) = validity_window(LOCALHOST_CERT).unwrap();
        assert_eq!(not_before, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(not_after, Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_validity_window_rejects_garbage() {
        assert!(validity_window(b"not a certificate").is_err());
    }
}
