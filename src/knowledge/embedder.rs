//! Text embedding backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{DiagnosticsConfig, EmbedderKind};

/// Produces one L2-normalised vector per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// AllMiniLM-L6-v2 through `fastembed`, loaded lazily on first use.
pub struct FastEmbedder {
    model: Mutex<Option<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
        }
    }
}

impl Default for FastEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut guard = self.model.lock().await;
        if guard.is_none() {
            info!("Loading embedding model AllMiniLML6V2...");
            *guard = Some(
                TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                    .context("Failed to initialize embedding model")?,
            );
        }
        let model = guard.as_mut().context("embedding model unavailable")?;
        let mut embeddings = model.embed(texts.to_vec(), None)?;
        for emb in &mut embeddings {
            normalize(emb);
        }
        Ok(embeddings)
    }
}

/// Deterministic bag-of-words feature hashing. Useful offline and in tests;
/// texts sharing more words score a higher cosine similarity.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dims as u64) as usize;
            vec[bucket] += 1.0;
        }
        normalize(&mut vec);
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn embedder_from_config(config: &DiagnosticsConfig) -> Arc<dyn Embedder> {
    match config.embedder {
        EmbedderKind::FastEmbed => Arc::new(FastEmbedder::new()),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
    }
}

fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec {
            *x /= norm;
        }
    }
}
