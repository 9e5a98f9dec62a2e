//! Generation collaborator client and prompt building.
//!
//! Calls an Ollama-protocol `POST /api/generate` endpoint with
//! `stream: false` and returns the full response text. The call is
//! bounded by the configured timeout; a timeout is a failure, not a hang.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::ScoredChunk;

/// Produces natural-language text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// HTTP client for an Ollama-protocol generation service.
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/api/generate", config.url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("generation service unreachable at {}: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("generation service error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("invalid generate response: missing response field"))
    }
}

/// Build the generation prompt from the user query and retrieved chunks.
///
/// Each chunk is prefixed with its source filename so the model can ground
/// its answer in the corpus; the instruction keeps it from inventing
/// content outside the retrieved context.
pub fn build_prompt(query: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::from(
        "You are an assistant answering questions about a document corpus. \
         Answer the question using only the context below. If the context \
         does not contain the answer, say so.\n\nContext:\n",
    );

    for chunk in chunks {
        prompt.push_str(&format!("[source: {}]\n{}\n\n", chunk.source_filename, chunk.text));
    }

    prompt.push_str(&format!("Question: {}\nAnswer:", query));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_sources_and_query() {
        let chunks = vec![ScoredChunk {
            id: "report.pdf_0".to_string(),
            text: "Q3 results show growth.".to_string(),
            source_filename: "report.pdf".to_string(),
            score: 0.9,
        }];

        let prompt = build_prompt("What were Q3 results?", &chunks);
        assert!(prompt.contains("[source: report.pdf]"));
        assert!(prompt.contains("Q3 results show growth."));
        assert!(prompt.contains("Question: What were Q3 results?"));
    }
}
