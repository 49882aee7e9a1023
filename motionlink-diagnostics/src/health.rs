//! Backend health probe

use motionlink_core::{MotionLinkError, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Path of the health endpoint
pub const HEALTH_PATH: &str = "/health";

/// Body returned by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    /// Whether the backend considers itself usable
    #[serde(default)]
    pub ok: bool,
    /// Free-form status text (`healthy`, ...)
    #[serde(default)]
    pub status: String,
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Decoded body
    pub status: HealthStatus,
    /// Round-trip time of the request
    pub latency: Duration,
}

/// Probes `GET /health` on the detection backend
#[derive(Debug, Clone)]
pub struct HealthProbe {
    url: String,
    client: reqwest::Client,
}

impl HealthProbe {
    /// Create a probe for a backend base URL
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MotionLinkError::Configuration {
                field: "backend_url".to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), HEALTH_PATH),
            client,
        })
    }

    /// Probe URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run one probe
    pub async fn check(&self) -> Result<HealthReport> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MotionLinkError::http(HEALTH_PATH, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "health check rejected");
            return Err(MotionLinkError::BackendRejected {
                endpoint: HEALTH_PATH.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let body: HealthStatus = response
            .json()
            .await
            .map_err(|e| MotionLinkError::InvalidPayload {
                reason: format!("health response: {}", e),
            })?;
        let latency = started.elapsed();
        debug!(
            url = %self.url,
            ok = body.ok,
            latency_ms = latency.as_millis() as u64,
            "health check"
        );
        Ok(HealthReport {
            status: body,
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_healthy_backend() {
        let base = serve_once("HTTP/1.1 200 OK", r#"{"ok":true,"status":"healthy"}"#).await;
        let probe = HealthProbe::new(&base, Duration::from_secs(5)).unwrap();
        assert!(probe.url().ends_with("/health"));

        let report = tokio_test::assert_ok!(probe.check().await);
        assert!(report.status.ok);
        assert_eq!(report.status.status, "healthy");
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let base = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let probe = HealthProbe::new(&base, Duration::from_secs(5)).unwrap();

        let err = probe.check().await.unwrap_err();
        assert!(matches!(
            err,
            MotionLinkError::BackendRejected { status: 503, .. }
        ));
    }
}
