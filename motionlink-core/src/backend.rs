//! HTTP surface of the detection backend

use crate::detection::DetectResponse;
use crate::error::{MotionLinkError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Path of the canvas reset command
pub const CLEAR_CANVAS_PATH: &str = "/api/clear_canvas";
/// Path of the detection-mode / monitoring command
pub const MODE_PATH: &str = "/api/mode";
/// Path of the single-frame detection upload
pub const DETECT_PATH: &str = "/api/detect";
/// Path of the server-pushed MJPEG feed
pub const VIDEO_FEED_PATH: &str = "/video_feed";
/// Path of the server-sent event stream
pub const EVENTS_PATH: &str = "/events";

/// Longest response body kept in a [`MotionLinkError::BackendRejected`]
const MAX_ERROR_BODY: usize = 256;

/// Operations the client consumes from the backend
#[async_trait]
pub trait BackendApi: Send + Sync + std::fmt::Debug {
    /// Ask the backend to clear its drawing canvas; returns the `ok` flag
    async fn clear_canvas(&self) -> Result<bool>;

    /// Switch the backend detector (`motion`, `gesture`, ...)
    async fn set_detection_mode(&self, mode: &str) -> Result<()>;

    /// Pause or resume backend monitoring
    async fn set_monitoring(&self, enabled: bool) -> Result<()>;

    /// Upload one compressed frame and return the events found in it
    async fn detect(&self, jpeg: Bytes) -> Result<DetectResponse>;

    /// URL of the MJPEG feed, with a cache-busting suffix
    fn video_feed_url(&self, cache_bust: u64) -> String;

    /// URL of the event stream
    fn events_url(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    ok: bool,
}

/// [`BackendApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a client for the given base URL (e.g. `http://127.0.0.1:5000`)
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MotionLinkError::Configuration {
                field: "backend_url".to_string(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self::with_client(base_url, client))
    }

    /// Reuse an existing reqwest client
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Shared reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(path: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
        Err(MotionLinkError::BackendRejected {
            endpoint: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn post_mode(&self, payload: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(MODE_PATH))
            .json(&payload)
            .send()
            .await
            .map_err(|e| MotionLinkError::http(MODE_PATH, e))?;
        Self::check(MODE_PATH, response).await?;
        Ok(())
    }
}

/// Shorten `text` to at most `max` bytes without splitting a character
fn truncate_at_char_boundary(text: &mut String, max: usize) {
    let mut cut = max.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn clear_canvas(&self) -> Result<bool> {
        let response = self
            .client
            .post(self.url(CLEAR_CANVAS_PATH))
            .send()
            .await
            .map_err(|e| MotionLinkError::http(CLEAR_CANVAS_PATH, e))?;
        let ack: Ack = Self::check(CLEAR_CANVAS_PATH, response)
            .await?
            .json()
            .await
            .map_err(|e| MotionLinkError::http(CLEAR_CANVAS_PATH, e))?;
        Ok(ack.ok)
    }

    async fn set_detection_mode(&self, mode: &str) -> Result<()> {
        debug!(mode, "posting detection mode");
        self.post_mode(json!({ "mode": mode })).await
    }

    async fn set_monitoring(&self, enabled: bool) -> Result<()> {
        debug!(enabled, "posting monitoring flag");
        self.post_mode(json!({ "cmd": "monitoring", "enabled": enabled }))
            .await
    }

    async fn detect(&self, jpeg: Bytes) -> Result<DetectResponse> {
        let part = reqwest::multipart::Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| MotionLinkError::http(DETECT_PATH, e))?;
        let form = reqwest::multipart::Form::new().part("frame", part);

        let response = self
            .client
            .post(self.url(DETECT_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MotionLinkError::http(DETECT_PATH, e))?;

        Self::check(DETECT_PATH, response)
            .await?
            .json::<DetectResponse>()
            .await
            .map_err(|e| MotionLinkError::http(DETECT_PATH, e))
    }

    fn video_feed_url(&self, cache_bust: u64) -> String {
        format!("{}?t={}", self.url(VIDEO_FEED_PATH), cache_bust)
    }

    fn events_url(&self) -> String {
        self.url(EVENTS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_strip_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:5000");
        assert_eq!(backend.events_url(), "http://localhost:5000/events");
        assert_eq!(
            backend.video_feed_url(1234),
            "http://localhost:5000/video_feed?t=1234"
        );
    }

    #[test]
    fn test_truncate_keeps_multibyte_characters_whole() {
        let mut body = format!("{}é tail", "x".repeat(255));
        truncate_at_char_boundary(&mut body, MAX_ERROR_BODY);
        assert_eq!(body.len(), 255);
        assert!(body.chars().all(|c| c == 'x'));

        let mut short = "déjà vu".to_string();
        truncate_at_char_boundary(&mut short, MAX_ERROR_BODY);
        assert_eq!(short, "déjà vu");
    }
}
