//! Process-lifetime cache of corpus embeddings.
//!
//! The corpus is embedded lazily, in one batched call, the first time any
//! request needs it. Concurrent first callers share a single in-flight fill
//! and a failed fill is not memoized, so a later request retries. There is
//! no invalidation path: corpus changes take effect on process restart.

use anyhow::anyhow;
use tokio::sync::OnceCell;

use crate::corpus::Corpus;
use crate::embedding::EmbeddingBackend;
use crate::models::EmbeddingRecord;
use crate::retrieval::RetrievalError;
use crate::text::truncate_chars;

pub struct KnowledgeIndex {
    corpus: Corpus,
    max_input_chars: usize,
    records: OnceCell<Vec<EmbeddingRecord>>,
}

impl KnowledgeIndex {
    pub fn new(corpus: Corpus, max_input_chars: usize) -> Self {
        Self {
            corpus,
            max_input_chars,
            records: OnceCell::new(),
        }
    }

    /// All corpus embeddings, computed on first call and memoized for the
    /// process lifetime.
    ///
    /// `get_or_try_init` coalesces concurrent cold callers onto one fill and
    /// only stores a successful result, so the next caller after a failure
    /// triggers a fresh attempt.
    pub async fn records(
        &self,
        embedder: &dyn EmbeddingBackend,
    ) -> Result<&[EmbeddingRecord], RetrievalError> {
        let records = self
            .records
            .get_or_try_init(|| self.fill(embedder))
            .await?;
        Ok(records.as_slice())
    }

    async fn fill(
        &self,
        embedder: &dyn EmbeddingBackend,
    ) -> Result<Vec<EmbeddingRecord>, RetrievalError> {
        let texts: Vec<String> = self
            .corpus
            .entries()
            .iter()
            .map(|e| truncate_chars(&e.text(), self.max_input_chars).to_string())
            .collect();

        let vectors = embedder
            .embed_batch(&texts)
            .await
            .map_err(RetrievalError::Unavailable)?;

        if vectors.len() != texts.len() {
            return Err(RetrievalError::Unavailable(anyhow!(
                "embeddings endpoint returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        let records = self
            .corpus
            .entries()
            .iter()
            .zip(texts)
            .zip(vectors)
            .map(|((entry, text), embedding)| EmbeddingRecord {
                topic: entry.topic.clone(),
                text,
                embedding,
            })
            .collect();

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::KnowledgeEntry;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_corpus() -> Corpus {
        Corpus::new(vec![
            KnowledgeEntry {
                topic: "alpha".into(),
                summary: "First topic.".into(),
                details: "Details about the first topic.".into(),
            },
            KnowledgeEntry {
                topic: "beta".into(),
                summary: "Second topic.".into(),
                details: String::new(),
            },
        ])
        .unwrap()
    }

    struct CountingBackend {
        calls: AtomicUsize,
        fail_first: AtomicUsize,
        short_vectors: bool,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
                short_vectors: false,
            }
        }

        fn failing_first(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(n),
                short_vectors: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Hold the fill open long enough for concurrent callers to pile up.
            tokio::time::sleep(Duration::from_millis(25)).await;
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("simulated embedding outage");
            }
            let count = if self.short_vectors {
                texts.len().saturating_sub(1)
            } else {
                texts.len()
            };
            Ok((0..count).map(|i| vec![i as f32, 1.0]).collect())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_first_callers_share_one_fill() {
        let index = Arc::new(KnowledgeIndex::new(test_corpus(), 4000));
        let backend = Arc::new(CountingBackend::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = index.clone();
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                index.records(backend.as_ref()).await.map(|r| r.len())
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 2);
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fill_is_not_memoized() {
        let index = KnowledgeIndex::new(test_corpus(), 4000);
        let backend = CountingBackend::failing_first(1);

        let err = index.records(&backend).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable(_)));

        // The failure was not cached: the next call retries and succeeds.
        let records = index.records(&backend).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        // The success IS cached: no further calls.
        index.records(&backend).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_fails_fill() {
        let index = KnowledgeIndex::new(test_corpus(), 4000);
        let backend = CountingBackend {
            calls: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
            short_vectors: true,
        };

        let err = index.records(&backend).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable(_)));
        assert!(err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_corpus_text_truncated_before_embedding() {
        let corpus = Corpus::new(vec![KnowledgeEntry {
            topic: "long".into(),
            summary: "x".repeat(50),
            details: "y".repeat(100),
        }])
        .unwrap();
        let index = KnowledgeIndex::new(corpus, 40);
        let backend = CountingBackend::new();

        let records = index.records(&backend).await.unwrap();
        assert_eq!(records[0].text.chars().count(), 40);
    }
}
