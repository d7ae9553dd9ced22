use anyhow::Result;
use reqwest::Method;
use reqwest::redirect::Policy;
use std::time::Instant;
use tokio::time::timeout;

use super::types::{ProbeError, ProbeOutcome, ProbeResponse, Target};

pub const USER_AGENT: &str = "NetPulse/1.0";

/// Checker trait for issuing one bounded probe against a target
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform exactly one request; never retries
    async fn check(&self, target: &Target) -> ProbeOutcome;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        // Per-target timeouts are applied around each request instead of on the client.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client })
    }

    async fn request(&self, target: &Target) -> Result<ProbeResponse, ProbeError> {
        let method = Method::from_bytes(target.method.as_bytes())
            .map_err(|e| ProbeError::connection(e.to_string()))?;

        let mut request = self.client.request(method, &target.url);
        for (key, value) in &target.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(connection_error)?;
        let status_code = response.status().as_u16();
        let body = response.text().await.map_err(connection_error)?;

        Ok(ProbeResponse { status_code, body })
    }
}

/// Transport message including every source, joined with `: `
fn connection_error(error: reqwest::Error) -> ProbeError {
    ProbeError::connection(format!("{:#}", anyhow::Error::from(error)))
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &Target) -> ProbeOutcome {
        let start = Instant::now();

        let response = match timeout(target.timeout(), self.request(target)).await {
            Ok(response) => response,
            Err(_) => Err(ProbeError::Timeout(target.timeout_ms)),
        };

        ProbeOutcome { latency_ms: start.elapsed().as_millis() as u64, response }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::test_target;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection and return the bound URL
    async fn serve(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn test_completed_response() {
        let url = serve("200 OK", "all good").await;
        let checker = HttpChecker::new().unwrap();

        let outcome = checker.check(&test_target(&url)).await;
        let response = outcome.response.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "all good");
    }

    #[tokio::test]
    async fn test_error_status_still_completes() {
        let url = serve("503 Service Unavailable", "").await;
        let checker = HttpChecker::new().unwrap();

        let outcome = checker.check(&test_target(&url)).await;
        assert_eq!(outcome.response.unwrap().status_code, 503);
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let url = serve("302 Found", "").await;
        let checker = HttpChecker::new().unwrap();

        let outcome = checker.check(&test_target(&url)).await;
        assert_eq!(outcome.response.unwrap().status_code, 302);
    }

    #[tokio::test]
    async fn test_timeout_includes_wait() {
        // Accept but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut target = test_target(&format!("http://{addr}/"));
        target.timeout_ms = 200;

        let checker = HttpChecker::new().unwrap();
        let outcome = checker.check(&target).await;

        assert_eq!(outcome.response.unwrap_err(), ProbeError::Timeout(200));
        assert!(outcome.latency_ms >= 200);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = HttpChecker::new().unwrap();
        let outcome = checker.check(&test_target(&format!("http://{addr}/"))).await;

        match outcome.response {
            Err(ProbeError::Connection(message)) => {
                assert!(message.contains(&addr.to_string()), "{message}");
                assert!(message.to_lowercase().contains("refused"), "{message}");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }
}
