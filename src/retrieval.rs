//! Query embedding, similarity ranking, and retrieval orchestration.
//!
//! Retrieval failures are typed so the HTTP layer can distinguish "no
//! relevant context" (an ordinary empty result) from "retrieval is broken"
//! (logged, then degraded to a chat without corpus context). A retrieval
//! failure never fails the chat request itself.

use anyhow::anyhow;
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, EmbeddingBackend};
use crate::index::KnowledgeIndex;
use crate::models::{EmbeddingRecord, RetrievalResult};
use crate::text::truncate_chars;

/// Failures on the retrieval path. Recovered at the request boundary.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The corpus embedding fill failed. Nothing was cached, so a later
    /// request retries.
    #[error("knowledge embeddings unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    /// Embedding the caller's query failed.
    #[error("query embedding failed: {0}")]
    EmbeddingFailed(#[source] anyhow::Error),
}

/// Embed a single query text, truncated to the input limit.
pub async fn embed_query(
    embedder: &dyn EmbeddingBackend,
    query: &str,
    max_input_chars: usize,
) -> Result<Vec<f32>, RetrievalError> {
    let text = truncate_chars(query, max_input_chars).to_string();
    let mut vectors = embedder
        .embed_batch(&[text])
        .await
        .map_err(RetrievalError::EmbeddingFailed)?;

    if vectors.len() != 1 {
        return Err(RetrievalError::EmbeddingFailed(anyhow!(
            "expected one vector, got {}",
            vectors.len()
        )));
    }

    Ok(vectors.remove(0))
}

/// Score every record against the query vector and keep the best matches.
///
/// Records are sorted by score descending (the sort is stable, so equal
/// scores keep corpus order), cut to `top_k`, then filtered to scores
/// strictly above `min_score`. An empty result means no relevant context,
/// not an error.
pub fn rank(
    records: &[EmbeddingRecord],
    query: &[f32],
    top_k: usize,
    min_score: f32,
) -> Vec<RetrievalResult> {
    let mut scored: Vec<RetrievalResult> = records
        .iter()
        .map(|r| RetrievalResult {
            topic: r.topic.clone(),
            text: r.text.clone(),
            score: cosine_similarity(query, &r.embedding),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored.retain(|r| r.score > min_score);

    scored
}

/// Full retrieval path for one request.
///
/// The corpus cache lookup (a fill on the first request of the process) and
/// the query embedding have independent inputs, so they run concurrently;
/// ranking needs both.
pub async fn retrieve(
    index: &KnowledgeIndex,
    embedder: &dyn EmbeddingBackend,
    query: &str,
    config: &RetrievalConfig,
) -> Result<Vec<RetrievalResult>, RetrievalError> {
    let (records, query_vec) = tokio::join!(
        index.records(embedder),
        embed_query(embedder, query, config.max_input_chars)
    );

    Ok(rank(records?, &query_vec?, config.top_k, config.min_score))
}
