//! Cosine similarity between answers.

use anyhow::{Context, Result};

use crate::knowledge::Embedder;

/// Cosine of the angle between two vectors. Zero for mismatched lengths or a
/// zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// `trunc(cos * 100)` clamped to `0..=100`. The cosine is taken in f64.
pub fn similarity_score(a: &[f32], b: &[f32]) -> u32 {
    if a.len() != b.len() || a.is_empty() {
        return 0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0;
    }
    percent_truncated(dot / (norm_a * norm_b))
}

/// Guard of 1e-9 absorbs f64 rounding only; it never lifts a real cosine
/// across a whole-point boundary.
fn percent_truncated(cos: f64) -> u32 {
    (cos * 100.0 + 1e-9).trunc().clamp(0.0, 100.0) as u32
}

/// Embed both texts and score their similarity. Each text is embedded on its
/// own so the result does not depend on argument order.
pub async fn embedding_score(embedder: &dyn Embedder, a: &str, b: &str) -> Result<u32> {
    let first = embedder
        .embed(&[a.to_string()])
        .await?
        .into_iter()
        .next()
        .context("embedder returned no vector")?;
    let second = embedder
        .embed(&[b.to_string()])
        .await?
        .into_iter()
        .next()
        .context("embedder returned no vector")?;
    Ok(similarity_score(&first, &second))
}
