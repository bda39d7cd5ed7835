use crate::error::Result;
use crate::index_struct::Triplet;
use crate::types::{Document, Metadata, MetadataValue, NodeWithScore, SimilarityTracker};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for the query"))
    }
}

pub trait LanguageModel: Send + Sync {
    /// Fill `{name}` placeholders in `template` from `vars` and complete it.
    fn predict(&self, template: &str, vars: &[(&str, &str)]) -> anyhow::Result<String>;
}

/// Substitute `{name}` placeholders; unknown placeholders are left alone.
pub fn format_prompt(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| acc.replace(&format!("{{{name}}}"), value))
}

/// A vector handed to a [`VectorEngine`], with the node's metadata as payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub ref_doc_id: Option<String>,
    pub metadata: Metadata,
}

/// Exact-match conditions on metadata. Every pair must match; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilters {
    filters: Vec<(String, MetadataValue)>,
}

impl MetadataFilters {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool { self.filters.is_empty() }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.filters.iter().all(|(key, value)| metadata.get(key) == Some(value))
    }
}

pub trait VectorEngine: Send + Sync {
    /// Store the entries and return the id the engine assigned to each, in
    /// the order given.
    fn add(&mut self, entries: Vec<VectorEntry>) -> anyhow::Result<Vec<String>>;
    /// Up to `k` (id, score) pairs among the entries passing `filter`,
    /// highest score first, ties in insertion order.
    fn query(&self, embedding: &[f32], k: usize, filter: Option<&MetadataFilters>) -> anyhow::Result<Vec<(String, f32)>>;
    fn delete(&mut self, ref_doc_id: &str) -> anyhow::Result<()>;
}

pub trait Reader: Send + Sync {
    fn load(&self) -> anyhow::Result<Vec<Document>>;
}

pub trait KeywordExtractor: Send + Sync {
    fn extract_keywords(&self, text: &str, max_keywords: usize) -> anyhow::Result<Vec<String>>;
}

pub trait TripletExtractor: Send + Sync {
    fn extract_triplets(&self, text: &str, max_triplets: usize) -> anyhow::Result<Vec<Triplet>>;
}

/// A query string plus its embedding once one has been computed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBundle {
    pub query_str: String,
    pub embedding: Option<Vec<f32>>,
}

impl QueryBundle {
    pub fn new(query_str: impl Into<String>) -> Self {
        Self { query_str: query_str.into(), embedding: None }
    }

    /// The query embedding, computing it with `embedder` if not yet present.
    pub fn embedding_with(&self, embedder: &dyn Embedder) -> Result<Vec<f32>> {
        match &self.embedding {
            Some(e) => Ok(e.clone()),
            None => embedder.embed_query(&self.query_str).map_err(crate::Error::external),
        }
    }
}

/// Candidates produced by one traversal, with the scores it recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieval {
    pub nodes: Vec<NodeWithScore>,
    pub similarity: SimilarityTracker,
}

impl Retrieval {
    pub fn empty() -> Self { Self::default() }
}

pub trait Retriever {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval>;
}
