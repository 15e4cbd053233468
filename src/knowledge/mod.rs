//! Failure Analysis Knowledge Base
//!
//! A small in-process vector index over the diagnostic playbooks. Documents
//! are embedded once on `index`; `query` ranks them by cosine similarity.
//! Every internal failure is logged and degrades to an empty result.

pub mod docs;
pub mod embedder;

pub use docs::{playbooks, PLAYBOOKS, PLAYBOOK_SOURCE};
pub use embedder::{embedder_from_config, Embedder, FastEmbedder, HashingEmbedder};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::evaluation::similarity::cosine_similarity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticDocument {
    pub index: usize,
    pub source: String,
    pub content: String,
}

struct IndexedDocument {
    document: DiagnosticDocument,
    embedding: Vec<f32>,
}

pub struct DiagnosticKb {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<IndexedDocument>>,
}

impl DiagnosticKb {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Store preloaded with the stock playbooks.
    pub async fn with_playbooks(embedder: Arc<dyn Embedder>) -> Self {
        let kb = Self::new(embedder);
        kb.index(playbooks()).await;
        kb
    }

    /// Embed and append `documents`. On failure nothing is added.
    pub async fn index(&self, documents: Vec<String>) {
        if documents.is_empty() {
            return;
        }
        match self.try_index(documents).await {
            Ok(added) => info!("Indexed {} diagnostic documents", added),
            Err(e) => error!("Failed to index diagnostic documents: {:#}", e),
        }
    }

    async fn try_index(&self, documents: Vec<String>) -> Result<usize> {
        let embeddings = self
            .embedder
            .embed(&documents)
            .await
            .context("embedding documents")?;
        if embeddings.len() != documents.len() {
            bail!(
                "embedder returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            );
        }

        let mut entries = self.entries.write().await;
        let start = entries.len();
        for (offset, (content, embedding)) in documents.into_iter().zip(embeddings).enumerate() {
            entries.push(IndexedDocument {
                document: DiagnosticDocument {
                    index: start + offset,
                    source: PLAYBOOK_SOURCE.to_string(),
                    content,
                },
                embedding,
            });
        }
        Ok(entries.len() - start)
    }

    /// Top `top_n` documents by descending similarity, ties in insertion order.
    pub async fn query(&self, text: &str, top_n: usize) -> Vec<String> {
        match self.try_query(text, top_n).await {
            Ok(docs) => docs.into_iter().map(|d| d.content).collect(),
            Err(e) => {
                error!("Knowledge base query failed: {:#}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_query(&self, text: &str, top_n: usize) -> Result<Vec<DiagnosticDocument>> {
        let entries = self.entries.read().await;
        if entries.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .context("No embedding")?;

        let dims = query_embedding.len();
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dims) {
            bail!(
                "dimension mismatch: query has {}, document {} has {}",
                dims,
                bad.document.index,
                bad.embedding.len()
            );
        }

        let mut scored: Vec<(f32, &IndexedDocument)> = entries
            .par_iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.document.index.cmp(&b.1.document.index))
        });

        debug!(
            "KB scores for '{}': {:?}",
            text,
            scored.iter().map(|(s, e)| (e.document.index, *s)).collect::<Vec<_>>()
        );

        Ok(scored
            .into_iter()
            .take(top_n)
            .map(|(_, e)| e.document.clone())
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("model offline")
        }
    }

    /// Every text maps to the same vector, so all scores tie.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let kb = DiagnosticKb::new(Arc::new(HashingEmbedder::default()));
        assert!(kb.query("high latency", 2).await.is_empty());
    }

    #[tokio::test]
    async fn test_query_ranks_matching_playbook_first() {
        let kb = DiagnosticKb::with_playbooks(Arc::new(HashingEmbedder::default())).await;
        assert_eq!(kb.len().await, 5);

        let hits = kb.query("connection rejected with error code", 2).await;
        assert_eq!(hits.len(), 2);
        assert!(hits[0].contains("Connection Rejected Diagnostic"));
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let kb = DiagnosticKb::new(Arc::new(ConstantEmbedder));
        kb.index(vec!["first".into(), "second".into(), "third".into()])
            .await;
        assert_eq!(kb.query("anything", 2).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_empty() {
        let kb = DiagnosticKb::new(Arc::new(FailingEmbedder));
        kb.index(playbooks()).await;
        assert!(kb.is_empty().await);
        assert!(kb.query("link status", 2).await.is_empty());
    }

    #[tokio::test]
    async fn test_documents_carry_source_and_index() {
        let kb = DiagnosticKb::with_playbooks(Arc::new(HashingEmbedder::default())).await;
        let docs = kb.try_query("Connection Rejected response code", 5).await.unwrap();
        assert_eq!(docs.len(), 5);
        assert!(docs.iter().all(|d| d.source == "sample_document"));
        let mut indices: Vec<usize> = docs.iter().map(|d| d.index).collect();
        indices.sort();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
