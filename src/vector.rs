//! Vector index clients.
//!
//! The vector index is an external shared service with upsert-by-id and
//! similarity search. Upsert is idempotent: writing the same id again
//! replaces the entry, which is what makes pipeline retries safe — no
//! local locking is layered on top.
//!
//! Two implementations:
//! - **[`ChromaIndex`]** — HTTP client for a Chroma-protocol service,
//!   the production backend.
//! - **[`MemoryIndex`]** — in-process map with brute-force cosine search,
//!   exercised by the test suite against the same upsert-by-id contract.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::VectorConfig;
use crate::models::{ChunkEntry, ScoredChunk};

/// Shared external vector index: idempotent upsert-by-id plus top-K
/// similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert-or-replace entries by their deterministic ids.
    async fn upsert(&self, entries: &[ChunkEntry]) -> Result<()>;

    /// Return the `top_k` most similar chunks, best first.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;
}

// ============ Chroma HTTP index ============

/// HTTP client for a Chroma-protocol vector index service.
///
/// Resolves the configured collection with `get_or_create` once at
/// connection time; entries carry the chunk text as the stored document
/// and `source_filename` in the metadata payload.
pub struct ChromaIndex {
    client: reqwest::Client,
    base: String,
    collection_id: String,
}

impl ChromaIndex {
    pub async fn connect(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = format!("{}/api/v1", config.url.trim_end_matches('/'));

        let response = client
            .post(format!("{}/collections", base))
            .json(&serde_json::json!({
                "name": config.collection,
                "get_or_create": true,
            }))
            .send()
            .await
            .with_context(|| format!("vector index unreachable at {}", config.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("vector index collection setup failed ({}): {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        let collection_id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("vector index response missing collection id"))?
            .to_string();

        Ok(Self {
            client,
            base,
            collection_id,
        })
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn upsert(&self, entries: &[ChunkEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let embeddings: Vec<&[f32]> = entries.iter().map(|e| e.embedding.as_slice()).collect();
        let documents: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        let metadatas: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "source_filename": e.source_filename,
                    "chunk_index": e.chunk_index,
                })
            })
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/upsert",
                self.base, self.collection_id
            ))
            .json(&serde_json::json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": documents,
                "metadatas": metadatas,
            }))
            .send()
            .await
            .context("vector index unreachable during upsert")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("vector index upsert failed ({}): {}", status, body);
        }

        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/query",
                self.base, self.collection_id
            ))
            .json(&serde_json::json!({
                "query_embeddings": [embedding],
                "n_results": top_k,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await
            .context("vector index unreachable during search")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("vector index query failed ({}): {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        parse_query_response(&json)
    }
}

/// First nested array under `key`. Query responses nest every array one
/// level because the API supports multiple query embeddings; we always
/// send exactly one.
fn first_array<'a>(
    json: &'a serde_json::Value,
    key: &str,
) -> Option<&'a Vec<serde_json::Value>> {
    json.get(key)?.as_array()?.first()?.as_array()
}

fn parse_query_response(json: &serde_json::Value) -> Result<Vec<ScoredChunk>> {
    let ids =
        first_array(json, "ids").ok_or_else(|| anyhow::anyhow!("query response missing ids"))?;
    let documents = first_array(json, "documents");
    let metadatas = first_array(json, "metadatas");
    let distances = first_array(json, "distances");

    let mut results = Vec::with_capacity(ids.len());

    for (i, id) in ids.iter().enumerate() {
        let id = id
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("query response id is not a string"))?
            .to_string();

        let text = documents
            .and_then(|d| d.get(i))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let source_filename = metadatas
            .and_then(|m| m.get(i))
            .and_then(|v| v.get("source_filename"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let distance = distances
            .and_then(|d| d.get(i))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32;

        results.push(ScoredChunk {
            id,
            text,
            source_filename,
            // Chroma returns cosine distance; flip to a similarity score.
            score: 1.0 - distance,
        });
    }

    Ok(results)
}

// ============ In-memory index ============

/// In-process vector index: a map keyed by entry id with brute-force
/// cosine similarity search. Upsert-by-id semantics match the HTTP
/// backend, so pipeline idempotency tests run against the same contract.
#[derive(Default)]
pub struct MemoryIndex {
    entries: Mutex<HashMap<String, ChunkEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored entry ids, sorted. Test helper.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, entries: &[ChunkEntry]) -> Result<()> {
        let mut map = self.entries.lock().unwrap();
        for entry in entries {
            map.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let map = self.entries.lock().unwrap();
        let mut scored: Vec<ScoredChunk> = map
            .values()
            .map(|e| ScoredChunk {
                id: e.id.clone(),
                text: e.text.clone(),
                source_filename: e.source_filename.clone(),
                score: cosine_similarity(embedding, &e.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
