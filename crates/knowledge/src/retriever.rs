//! Question → ranked passages.

use crate::embeddings::Embedder;
use crate::index::SqliteVectorIndex;
use crate::types::RetrievalResult;
use cyclecare_core::{AppError, AppResult};
use std::sync::Arc;

/// Embeds a question and searches the index with the same scheme.
#[derive(Debug, Clone)]
pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<SqliteVectorIndex>,
    default_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, index: Arc<SqliteVectorIndex>, default_k: usize) -> Self {
        Self {
            embedder,
            index,
            default_k,
        }
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Top `k` passages for `question` (configured default when `None`).
    ///
    /// An index with no entries yields an empty result without calling the
    /// embedder. Embedding failures surface as `AppError::Retrieval`, except
    /// timeouts which keep their own variant.
    #[tracing::instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> AppResult<RetrievalResult> {
        let k = k.unwrap_or(self.default_k);
        if k == 0 {
            return Err(AppError::InvalidArgument("k must be at least 1".to_string()));
        }
        if self.index.is_empty() {
            tracing::debug!("Index is empty, nothing to retrieve");
            return Ok(RetrievalResult::default());
        }

        let query = self.embedder.embed(question).await.map_err(|e| match e {
            AppError::Timeout { .. } => e,
            other => AppError::Retrieval(format!("Failed to embed question: {}", other)),
        })?;

        let result = self.index.search(&query, k)?;
        tracing::debug!(
            hits = result.len(),
            max_score = result.max_score(),
            "Retrieved passages"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::HashedProvider;
    use crate::index::BuildMode;
    use crate::limiter::ExternalCallLimiter;
    use crate::types::{Chunk, DocumentRecord, IndexBatch, IndexEntry, SourceMetadata};
    use std::time::Duration;
    use tempfile::TempDir;

    fn embedder() -> Arc<Embedder> {
        Arc::new(Embedder::new(
            Arc::new(HashedProvider::new(128)),
            ExternalCallLimiter::new(2, Duration::from_secs(5)),
            1_000,
        ))
    }

    async fn index_with(dir: &TempDir, texts: &[&str]) -> Arc<SqliteVectorIndex> {
        let embedder = embedder();
        let mut batch = IndexBatch::default();
        for (i, text) in texts.iter().enumerate() {
            let doc = format!("doc{}", i);
            batch.documents.push(DocumentRecord {
                id: doc.clone(),
                content_hash: format!("hash{}", i),
                metadata: SourceMetadata::new(format!("{}.txt", doc)),
                char_count: text.chars().count(),
            });
            batch.entries.push(IndexEntry {
                chunk: Chunk {
                    id: format!("{}:0", doc),
                    document_id: doc.clone(),
                    position: 0,
                    text: text.to_string(),
                    char_start: 0,
                    char_end: text.chars().count(),
                    metadata: SourceMetadata::new(format!("{}.txt", doc)),
                },
                vector: embedder.embed(text).await.unwrap(),
            });
        }
        Arc::new(
            SqliteVectorIndex::build(
                dir.path(),
                &embedder.scheme_id(),
                embedder.dimensions(),
                batch,
                BuildMode::CreateNew,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_retrieves_relevant_passage_first() {
        let dir = TempDir::new().unwrap();
        let index = index_with(
            &dir,
            &[
                "Severe cramps that stop daily activities should be checked by a doctor.",
                "Menstrual cycles average 28 days.",
            ],
        )
        .await;
        let retriever = Retriever::new(embedder(), index, 5);

        let result = retriever
            .retrieve("How many days do menstrual cycles last?", None)
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].chunk.id, "doc1:0");

        let one = retriever
            .retrieve("How many days do menstrual cycles last?", Some(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_index_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let index = index_with(&dir, &[]).await;
        let retriever = Retriever::new(embedder(), index, 5);

        // Empty text would be rejected by the embedder if it were called.
        let result = retriever.retrieve("", None).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let dir = TempDir::new().unwrap();
        let index = index_with(&dir, &["Cycles vary between people."]).await;
        let retriever = Retriever::new(embedder(), index, 5);

        assert!(matches!(
            retriever.retrieve("   ", None).await,
            Err(AppError::Retrieval(_))
        ));
        assert!(matches!(
            retriever.retrieve("cycles", Some(0)).await,
            Err(AppError::InvalidArgument(_))
        ));
    }
}
