//! Retrieval-augmented answer engine.
//!
//! Embeds the query, retrieves the top-K most similar chunks from the
//! vector index, and generates an answer conditioned on them. Sources are
//! the de-duplicated filenames of the chunks actually handed to the
//! generator — never chunks that were not considered.

use std::collections::BTreeSet;

use crate::ai::AiHandle;
use crate::generate::build_prompt;
use crate::models::Answer;

/// Query failure. `Transient` covers an unreachable or timed-out
/// collaborator and is surfaced to callers as a try-again condition,
/// never as a crash.
#[derive(Debug)]
pub enum QueryError {
    EmptyQuery,
    Transient(anyhow::Error),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::EmptyQuery => write!(f, "query must not be empty"),
            QueryError::Transient(e) => write!(f, "query backend failure: {:#}", e),
        }
    }
}

impl std::error::Error for QueryError {}

const NO_MATCH_ANSWER: &str = "No relevant documents were found for this query.";

/// Answer a natural-language query over the ingested corpus.
pub async fn answer(ai: &AiHandle, top_k: usize, query: &str) -> Result<Answer, QueryError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let components = ai.get().await.map_err(QueryError::Transient)?;

    let mut vectors = components
        .embedder
        .embed(&[query.to_string()])
        .await
        .map_err(QueryError::Transient)?;
    let query_vec = match vectors.pop() {
        Some(v) => v,
        None => {
            return Err(QueryError::Transient(anyhow::anyhow!(
                "embedder returned no vector for the query"
            )))
        }
    };

    let chunks = components
        .index
        .search(&query_vec, top_k)
        .await
        .map_err(QueryError::Transient)?;

    if chunks.is_empty() {
        return Ok(Answer {
            answer: NO_MATCH_ANSWER.to_string(),
            sources: BTreeSet::new(),
        });
    }

    let prompt = build_prompt(query, &chunks);
    let text = components
        .generator
        .generate(&prompt)
        .await
        .map_err(QueryError::Transient)?;

    let sources: BTreeSet<String> = chunks
        .iter()
        .map(|c| c.source_filename.clone())
        .filter(|s| !s.is_empty())
        .collect();

    Ok(Answer {
        answer: text,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiBuilder, AiComponents};
    use crate::embedding::Embedder;
    use crate::generate::Generator;
    use crate::models::ChunkEntry;
    use crate::vector::MemoryIndex;
    use crate::vector::VectorIndex;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FixedGenerator {
        reply: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("generation service unreachable");
            }
            Ok(self.reply.to_string())
        }
    }

    struct StaticBuilder {
        index: Arc<MemoryIndex>,
        generator_calls: Arc<AtomicUsize>,
        generator_fails: bool,
    }

    #[async_trait]
    impl AiBuilder for StaticBuilder {
        async fn build(&self) -> Result<AiComponents> {
            Ok(AiComponents {
                embedder: Arc::new(UnitEmbedder),
                index: Arc::clone(&self.index) as Arc<dyn crate::vector::VectorIndex>,
                generator: Arc::new(FixedGenerator {
                    reply: "Q3 results showed strong growth.",
                    calls: Arc::clone(&self.generator_calls),
                    fail: self.generator_fails,
                }),
            })
        }
    }

    fn handle(index: Arc<MemoryIndex>, calls: Arc<AtomicUsize>, fails: bool) -> AiHandle {
        AiHandle::new(Box::new(StaticBuilder {
            index,
            generator_calls: calls,
            generator_fails: fails,
        }))
    }

    async fn seeded_index() -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new());
        index
            .upsert(&[ChunkEntry {
                id: "report.pdf_0".to_string(),
                text: "Q3 results show growth.".to_string(),
                source_filename: "report.pdf".to_string(),
                chunk_index: 0,
                embedding: vec![1.0, 0.0],
            }])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn answers_with_deduplicated_sources() {
        let index = seeded_index().await;
        index
            .upsert(&[ChunkEntry {
                id: "report.pdf_1".to_string(),
                text: "Revenue is up.".to_string(),
                source_filename: "report.pdf".to_string(),
                chunk_index: 1,
                embedding: vec![0.9, 0.1],
            }])
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let ai = handle(index, Arc::clone(&calls), false);

        let result = answer(&ai, 5, "What were Q3 results?").await.unwrap();
        assert_eq!(result.answer, "Q3 results showed strong growth.");
        assert_eq!(
            result.sources,
            BTreeSet::from(["report.pdf".to_string()])
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let ai = handle(seeded_index().await, Arc::new(AtomicUsize::new(0)), false);
        assert!(matches!(
            answer(&ai, 5, "   ").await,
            Err(QueryError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn empty_corpus_skips_generation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ai = handle(Arc::new(MemoryIndex::new()), Arc::clone(&calls), false);

        let result = answer(&ai, 5, "anything?").await.unwrap();
        assert_eq!(result.answer, NO_MATCH_ANSWER);
        assert!(result.sources.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generator_failure_is_transient() {
        let ai = handle(seeded_index().await, Arc::new(AtomicUsize::new(0)), true);
        assert!(matches!(
            answer(&ai, 5, "What were Q3 results?").await,
            Err(QueryError::Transient(_))
        ));
    }
}
