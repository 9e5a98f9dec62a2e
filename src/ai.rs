//! Lazy once-per-process initializer for the AI components.
//!
//! The embedding client, vector index client, and generation client are
//! expensive to construct (the index client performs a network round-trip
//! to resolve its collection). [`AiHandle`] constructs them at most once
//! per process, on first demand: concurrent first callers block on the
//! cell's internal guard until the single construction finishes, and all
//! later reads are lock-free clones of the shared `Arc`.
//!
//! The handle is owned by the process's composition root (the server's
//! `AppState`) and passed explicitly to the pipeline and the answer
//! engine — there is no ambient global.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{EmbeddingConfig, GenerationConfig, VectorConfig};
use crate::embedding::{Embedder, OllamaEmbedder};
use crate::generate::{Generator, OllamaGenerator};
use crate::vector::{ChromaIndex, VectorIndex};

/// The shared, immutable-after-construction AI component set.
pub struct AiComponents {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn Generator>,
}

/// Constructs the component set. Split out as a trait so tests can count
/// constructions and substitute fakes.
#[async_trait]
pub trait AiBuilder: Send + Sync {
    async fn build(&self) -> Result<AiComponents>;
}

/// Production builder: Ollama embedder + generator, Chroma index.
pub struct CollaboratorBuilder {
    embedding: EmbeddingConfig,
    vector: VectorConfig,
    generation: GenerationConfig,
}

impl CollaboratorBuilder {
    pub fn new(
        embedding: EmbeddingConfig,
        vector: VectorConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            embedding,
            vector,
            generation,
        }
    }
}

#[async_trait]
impl AiBuilder for CollaboratorBuilder {
    async fn build(&self) -> Result<AiComponents> {
        tracing::info!("initializing AI components");

        let embedder = Arc::new(OllamaEmbedder::new(&self.embedding)?);
        let index = Arc::new(ChromaIndex::connect(&self.vector).await?);
        let generator = Arc::new(OllamaGenerator::new(&self.generation)?);

        tracing::info!("AI components ready");

        Ok(AiComponents {
            embedder,
            index,
            generator,
        })
    }
}

/// Thread-safe construct-at-most-once handle over [`AiComponents`].
pub struct AiHandle {
    cell: OnceCell<Arc<AiComponents>>,
    builder: Box<dyn AiBuilder>,
}

impl AiHandle {
    pub fn new(builder: Box<dyn AiBuilder>) -> Self {
        Self {
            cell: OnceCell::new(),
            builder,
        }
    }

    /// Return the shared components, constructing them on first use.
    ///
    /// Concurrent first callers block until the single in-flight
    /// construction completes. A failed construction leaves the cell
    /// empty, so a later call retries rather than caching the error.
    pub async fn get(&self) -> Result<Arc<AiComponents>> {
        let components = self
            .cell
            .get_or_try_init(|| async { Ok::<_, anyhow::Error>(Arc::new(self.builder.build().await?)) })
            .await?;

        Ok(Arc::clone(components))
    }
}
