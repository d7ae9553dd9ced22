//! TLS certificate expiry reading.
//!
//! The handshake accepts any chain, self-signed included. Readings never
//! feed the up/down verdict.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::types::CertificateInfo;

/// Fixed bound for connect + handshake
pub const INSPECTION_TIMEOUT: Duration = Duration::from_secs(5);

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Source of certificate readings for a target URL
#[async_trait::async_trait]
pub trait CertificateSource: Send + Sync {
    /// `None` for non-HTTPS URLs or any failure
    async fn inspect(&self, url: &str) -> Option<CertificateInfo>;
}

/// Reads the peer certificate over a real TLS connection
pub struct CertificateInspector {
    connector: TlsConnector,
}

impl CertificateInspector {
    pub fn new() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }

    async fn read_certificate(&self, host: &str, port: u16) -> Result<CertificateInfo> {
        let stream = TcpStream::connect((host, port)).await?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| anyhow!("Invalid server name: {}", host))?;

        let tls_stream = self.connector.connect(server_name, stream).await?;
        let (_, connection) = tls_stream.get_ref();

        let leaf = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| anyhow!("No certificate presented by {}", host))?;

        certificate_info(leaf.as_ref(), host, Utc::now())
    }
}

#[async_trait::async_trait]
impl CertificateSource for CertificateInspector {
    async fn inspect(&self, url: &str) -> Option<CertificateInfo> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != "https" {
            return None;
        }

        let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
        let port = parsed.port_or_known_default().unwrap_or(443);

        match timeout(INSPECTION_TIMEOUT, self.read_certificate(&host, port)).await {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                debug!(url = %url, "Certificate inspection failed: {}", e);
                None
            }
            Err(_) => {
                debug!(url = %url, "Certificate inspection timed out");
                None
            }
        }
    }
}

/// Whole days between `now` and `expiry`, rounded down
///
/// Expired certificates yield negative values.
pub fn days_remaining(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Extract expiry and naming fields from a DER-encoded certificate
pub fn certificate_info(der: &[u8], host: &str, now: DateTime<Utc>) -> Result<CertificateInfo> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| anyhow!("Failed to parse certificate: {}", e))?;

    let validity = cert.validity();
    let valid_to = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| anyhow!("Certificate has no usable expiry"))?;
    let valid_from = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| anyhow!("Certificate has no usable start date"))?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or("Unknown")
        .to_string();
    let subject = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or(host)
        .to_string();

    Ok(CertificateInfo {
        days_remaining: days_remaining(valid_to, now),
        valid_from,
        valid_to,
        issuer,
        subject,
    })
}

#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
