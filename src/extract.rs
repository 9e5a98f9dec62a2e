//! Extraction collaborator client.
//!
//! The extraction service converts raw document bytes into plain text over
//! the Tika wire protocol: `PUT {base}/tika` with the bytes as the body and
//! a content-type hint, plain UTF-8 text back. The service is treated as
//! unreliable — every call is bounded by an explicit timeout, and any
//! non-2xx response or transport failure is a hard failure for that
//! document.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ExtractionConfig;

/// Extraction failure. Non-2xx and transport/timeout failures are kept
/// apart so the pipeline can log the upstream status when there is one.
#[derive(Debug)]
pub enum ExtractError {
    Upstream(u16, String),
    Transport(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Upstream(status, body) => {
                write!(f, "extraction service returned {}: {}", status, body)
            }
            ExtractError::Transport(e) => write!(f, "extraction service unreachable: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Converts document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError>;
}

/// HTTP client for a Tika-protocol extraction service.
pub struct TikaExtractor {
    client: reqwest::Client,
    url: String,
}

impl TikaExtractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/tika", config.url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TextExtractor for TikaExtractor {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
        let response = self
            .client
            .put(&self.url)
            .header("Accept", "text/plain")
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Upstream(status.as_u16(), body));
        }

        response
            .text()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))
    }
}
