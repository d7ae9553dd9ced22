use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use super::certificate::{CertificateInspector, CertificateSource};
use super::checker::{Checker, HttpChecker};
use super::types::{CertificateInfo, Check, Target};

/// Monitoring executor - executes individual monitoring checks
pub struct MonitoringExecutor {
    checker: Arc<dyn Checker>,
    certificates: Arc<dyn CertificateSource>,
}

impl MonitoringExecutor {
    /// Create an executor backed by real HTTP and TLS clients
    pub fn new() -> Result<Self> {
        Ok(Self::with_parts(
            Arc::new(HttpChecker::new()?),
            Arc::new(CertificateInspector::new()?),
        ))
    }

    pub fn with_parts(checker: Arc<dyn Checker>, certificates: Arc<dyn CertificateSource>) -> Self {
        Self { checker, certificates }
    }

    /// Probe a target and, when the request completed over HTTPS, read its certificate
    pub async fn execute_check(&self, target: &Target) -> (Check, Option<CertificateInfo>) {
        let outcome = self.checker.check(target).await;

        let certificate = match &outcome.response {
            Ok(_) if target.is_https() => self.certificates.inspect(&target.url).await,
            Ok(_) => None,
            Err(e) => {
                warn!(monitor = %target.name, url = %target.url, "Probe failed: {}", e);
                None
            }
        };

        let check = Check::from_outcome(target, outcome, certificate.as_ref());
        (check, certificate)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::monitoring::types::{ProbeError, ProbeOutcome, ProbeResponse, test_target};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Checker that always answers with the same outcome
    pub struct FixedChecker(pub Result<ProbeResponse, ProbeError>);

    #[async_trait::async_trait]
    impl Checker for FixedChecker {
        async fn check(&self, _target: &Target) -> ProbeOutcome {
            ProbeOutcome { latency_ms: 12, response: self.0.clone() }
        }
    }

    /// Certificate source returning a fixed expiry and counting calls
    #[derive(Default)]
    pub struct FixedCertificate {
        pub days: Option<i64>,
        pub calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CertificateSource for FixedCertificate {
        async fn inspect(&self, _url: &str) -> Option<CertificateInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now();
            self.days.map(|days| CertificateInfo {
                days_remaining: days,
                valid_from: now - chrono::Duration::days(80),
                valid_to: now + chrono::Duration::days(days),
                issuer: "Test CA".to_string(),
                subject: "example.com".to_string(),
            })
        }
    }

    fn ok(status_code: u16) -> Result<ProbeResponse, ProbeError> {
        Ok(ProbeResponse { status_code, body: String::new() })
    }

    #[tokio::test]
    async fn test_https_target_near_expiry_stays_up() {
        let certs = Arc::new(FixedCertificate { days: Some(10), ..Default::default() });
        let executor = MonitoringExecutor::with_parts(Arc::new(FixedChecker(ok(200))), certs);

        let (check, certificate) = executor.execute_check(&test_target("https://example.com")).await;

        assert!(check.is_up);
        assert_eq!(check.ssl_days_remaining, Some(10));
        assert_eq!(certificate.map(|c| c.days_remaining), Some(10));
    }

    #[tokio::test]
    async fn test_down_target_still_records_certificate() {
        let certs = Arc::new(FixedCertificate { days: Some(200), ..Default::default() });
        let executor = MonitoringExecutor::with_parts(Arc::new(FixedChecker(ok(500))), certs);

        let (check, _) = executor.execute_check(&test_target("https://example.com")).await;

        assert!(!check.is_up);
        assert_eq!(check.ssl_days_remaining, Some(200));
    }

    #[tokio::test]
    async fn test_plain_http_skips_inspection() {
        let certs = Arc::new(FixedCertificate { days: Some(10), ..Default::default() });
        let executor =
            MonitoringExecutor::with_parts(Arc::new(FixedChecker(ok(200))), certs.clone());

        let (check, _) = executor.execute_check(&test_target("http://example.com")).await;

        assert_eq!(check.ssl_days_remaining, None);
        assert_eq!(certs.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_skips_inspection() {
        let certs = Arc::new(FixedCertificate { days: Some(10), ..Default::default() });
        let checker = FixedChecker(Err(ProbeError::connection("connection refused")));
        let executor = MonitoringExecutor::with_parts(Arc::new(checker), certs.clone());

        let (check, certificate) =
            executor.execute_check(&test_target("https://example.com")).await;

        assert!(!check.is_up);
        assert_eq!(check.error.as_deref(), Some("connection refused"));
        assert!(certificate.is_none());
        assert_eq!(certs.calls.load(Ordering::SeqCst), 0);
    }
}
