//! Domain types shared by every index struct and retriever.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

pub type NodeId = String;
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar metadata value attached to a node or document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self { MetadataValue::Str(s.to_string()) }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self { MetadataValue::Str(s) }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self { MetadataValue::Int(i) }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self { MetadataValue::Bool(b) }
}

/// Kind of link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRelationship {
    Source,
    Previous,
    Next,
    Parent,
    Child,
}

/// Whether metadata is rendered into a node's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataMode {
    #[default]
    None,
    All,
}

/// Atomic unit of indexed content.
///
/// - `id`: stable identifier, referenced by every index struct
/// - `text`: content; replaced only through `DocumentStore::update_text`
/// - `embedding`: present only for nodes that took part in a vector index
/// - `relationships`: links to other nodes by id, never ownership
/// - `ref_doc_id`: originating document, used for cascade delete
/// - `index_id`: set on index nodes that stand in for a whole sub-index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub relationships: BTreeMap<NodeRelationship, Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding: None,
            metadata: Metadata::new(),
            relationships: BTreeMap::new(),
            ref_doc_id: None,
            index_id: None,
        }
    }

    /// A node whose text summarizes the index registered under `index_id`.
    pub fn index_node(id: impl Into<NodeId>, summary: impl Into<String>, index_id: impl Into<String>) -> Self {
        let mut node = Self::new(id, summary);
        node.index_id = Some(index_id.into());
        node
    }

    #[must_use]
    pub fn with_ref_doc(mut self, ref_doc_id: impl Into<String>) -> Self {
        self.ref_doc_id = Some(ref_doc_id.into());
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace every link of `kind` with the single id `target`.
    pub fn set_relationship(&mut self, kind: NodeRelationship, target: impl Into<NodeId>) {
        self.relationships.insert(kind, vec![target.into()]);
    }

    pub fn add_relationship(&mut self, kind: NodeRelationship, target: impl Into<NodeId>) {
        let target = target.into();
        let ids = self.relationships.entry(kind).or_default();
        if !ids.contains(&target) { ids.push(target); }
    }

    pub fn related(&self, kind: NodeRelationship) -> &[NodeId] {
        self.relationships.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn source_id(&self) -> Option<&str> { self.related(NodeRelationship::Source).first().map(String::as_str) }
    pub fn prev_id(&self) -> Option<&str> { self.related(NodeRelationship::Previous).first().map(String::as_str) }
    pub fn next_id(&self) -> Option<&str> { self.related(NodeRelationship::Next).first().map(String::as_str) }
    pub fn parent_id(&self) -> Option<&str> { self.related(NodeRelationship::Parent).first().map(String::as_str) }
    pub fn child_ids(&self) -> &[NodeId] { self.related(NodeRelationship::Child) }

    /// Text used for embedding, keyword extraction and display.
    pub fn content(&self, mode: MetadataMode) -> String {
        match mode {
            MetadataMode::None => self.text.clone(),
            MetadataMode::All if self.metadata.is_empty() => self.text.clone(),
            MetadataMode::All => {
                let header = self.metadata.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join("\n");
                format!("{header}\n\n{}", self.text)
            }
        }
    }
}

/// Raw document as produced by a reader, before chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Document whose id is derived from its text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { id: hash_text(&text), text, metadata: Metadata::new() }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new() }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A retrieved node and the score the traversal assigned to it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: Option<f32>,
}

impl NodeWithScore {
    pub fn new(node: Node, score: Option<f32>) -> Self { Self { node, score } }
    pub fn id(&self) -> &str { &self.node.id }
}

/// Side channel recording the similarity each retrieved node scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityTracker {
    scores: BTreeMap<NodeId, f32>,
}

impl SimilarityTracker {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, node_id: impl Into<NodeId>, score: f32) {
        self.scores.insert(node_id.into(), score);
    }

    pub fn find(&self, node_id: &str) -> Option<f32> { self.scores.get(node_id).copied() }

    pub fn extend(&mut self, other: &SimilarityTracker) {
        for (id, score) in &other.scores { self.scores.insert(id.clone(), *score); }
    }

    pub fn len(&self) -> usize { self.scores.len() }
    pub fn is_empty(&self) -> bool { self.scores.is_empty() }
}

/// Stable 64-bit xxHash of `text`, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(text.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Id of the `chunk_index`-th chunk of `doc_id`.
pub fn chunk_id(doc_id: &str, chunk_index: usize) -> NodeId { format!("{doc_id}:{chunk_index}") }
