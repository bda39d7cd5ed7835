//! In-process vector engine with brute-force cosine search.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use ragdex_core::traits::{MetadataFilters, VectorEngine, VectorEntry};
use ragdex_core::Metadata;
use ragdex_embed::top_k_by_similarity;

pub const VECTOR_STORE_FILE: &str = "vector_store.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredVector {
    id: String,
    embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ref_doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    metadata: Metadata,
}

/// Vectors kept in insertion order, which is also the tie-break order of
/// [`VectorEngine::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleVectorStore {
    dimension: usize,
    entries: Vec<StoredVector>,
}

impl SimpleVectorStore {
    pub fn new(dimension: usize) -> Self { Self { dimension, entries: Vec::new() } }

    pub fn dimension(&self) -> usize { self.dimension }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.embedding.as_slice())
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(VECTOR_STORE_FILE);
        fs::write(&path, serde_json::to_string(self)?).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), vectors = self.entries.len(), "persisted vector store");
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(VECTOR_STORE_FILE);
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let store: Self = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        if let Some(bad) = store.entries.iter().find(|e| e.embedding.len() != store.dimension) {
            bail!("vector '{}' has dimension {}, store expects {}", bad.id, bad.embedding.len(), store.dimension);
        }
        Ok(store)
    }
}

impl VectorEngine for SimpleVectorStore {
    /// Upsert: an existing id keeps its position and takes the new vector.
    fn add(&mut self, entries: Vec<VectorEntry>) -> Result<Vec<String>> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            bail!("vector '{}' has dimension {}, store expects {}", bad.id, bad.embedding.len(), self.dimension);
        }
        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            ids.push(entry.id.clone());
            let stored = StoredVector {
                id: entry.id,
                embedding: entry.embedding,
                ref_doc_id: entry.ref_doc_id,
                metadata: entry.metadata,
            };
            match self.entries.iter_mut().find(|e| e.id == stored.id) {
                Some(existing) => *existing = stored,
                None => self.entries.push(stored),
            }
        }
        debug!(added = ids.len(), total = self.entries.len(), "vector store add");
        Ok(ids)
    }

    fn query(&self, embedding: &[f32], k: usize, filter: Option<&MetadataFilters>) -> Result<Vec<(String, f32)>> {
        if embedding.len() != self.dimension {
            bail!("query has dimension {}, store expects {}", embedding.len(), self.dimension);
        }
        let candidates = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| (e.id.clone(), e.embedding.as_slice()));
        Ok(top_k_by_similarity(embedding, candidates, k, None))
    }

    fn delete(&mut self, ref_doc_id: &str) -> Result<()> {
        let before = self.entries.len();
        self.entries.retain(|e| e.ref_doc_id.as_deref() != Some(ref_doc_id));
        debug!(ref_doc_id, removed = before - self.entries.len(), "vector store delete");
        Ok(())
    }
}
