//! Embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling the wrapped embedder and written
//! through on misses. It can be saved to and restored from a JSON file so
//! repeated ingests of unchanged text skip the embedder entirely.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

use ragdex_core::traits::Embedder;

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

pub struct CachedEmbedder<E> {
    inner: E,
    embedder_id: String,
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, embedder_id: impl Into<String>) -> Self {
        Self { inner, embedder_id: embedder_id.into(), entries: RwLock::new(HashMap::new()) }
    }

    pub fn embedder_id(&self) -> &str { &self.embedder_id }

    pub fn len(&self) -> usize { self.entries.read().map(|e| e.len()).unwrap_or(0) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Merge entries from `path` that were produced by this embedder.
    /// A missing file is not an error.
    pub fn load(&self, path: &Path) -> Result<usize> {
        if !path.exists() { return Ok(0); }
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let stored: Vec<CacheEntry> = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let mut entries = self.entries.write().map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
        let mut loaded = 0usize;
        for e in stored {
            if e.embedder_id == self.embedder_id && e.vector.len() == self.inner.dim() {
                entries.insert(e.content_hash, e.vector);
                loaded += 1;
            }
        }
        debug!(loaded, path = %path.display(), "loaded embedding cache");
        Ok(loaded)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let entries = self.entries.read().map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
        let mut stored: Vec<CacheEntry> = entries
            .iter()
            .map(|(h, v)| CacheEntry { content_hash: h.clone(), embedder_id: self.embedder_id.clone(), vector: v.clone() })
            .collect();
        stored.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        fs::write(path, serde_json::to_string(&stored)?).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn dim(&self) -> usize { self.inner.dim() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let hashes: Vec<String> = texts.iter().map(|t| hash_content(t)).collect();
        let mut out: Vec<Option<Vec<f32>>> = {
            let entries = self.entries.read().map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            hashes.iter().map(|h| entries.get(h).cloned()).collect()
        };
        let misses: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&miss_texts)?;
            if fresh.len() != miss_texts.len() {
                anyhow::bail!("embedder returned {} vectors for {} texts", fresh.len(), miss_texts.len());
            }
            let mut entries = self.entries.write().map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
            for (&i, v) in misses.iter().zip(fresh) {
                entries.insert(hashes[i].clone(), v.clone());
                out[i] = Some(v);
            }
        }
        debug!(total = texts.len(), misses = misses.len(), "embedded batch");
        Ok(out.into_iter().flatten().collect())
    }
}
