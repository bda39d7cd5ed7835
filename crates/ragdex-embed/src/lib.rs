//! Offline embedding support: a deterministic hashed embedder, a content-hash
//! cache in front of any embedder, and similarity ranking.
use anyhow::{anyhow, Result};
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use ragdex_core::traits::Embedder;

pub mod cache;
pub mod similarity;

pub use cache::CachedEmbedder;
pub use similarity::{cosine_similarity, top_k_by_similarity};

/// Feature-hashing embedder: each lowercased word bumps one bucket, and the
/// result is L2-normalized. Identical text always yields the identical vector
/// and texts sharing words score higher, which is all the offline paths need.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(anyhow!("embedding dimension must be > 0"));
        }
        Ok(Self { dim })
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase);
        for (i, token) in words.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += 0.5 + val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v { *x /= norm; }
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// The embedder the CLI uses: a hashed embedder behind a content cache.
pub fn get_default_embedder(dim: usize) -> Result<CachedEmbedder<HashEmbedder>> {
    let inner = HashEmbedder::new(dim)?;
    Ok(CachedEmbedder::new(inner, format!("hash-{dim}")))
}
