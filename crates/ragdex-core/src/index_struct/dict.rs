use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Node, NodeId};

/// Vector backend an `IndexDict` is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    #[default]
    Simple,
    Faiss,
    Weaviate,
    Pinecone,
    Qdrant,
    Chroma,
    Opensearch,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorBackend::Simple => "simple",
            VectorBackend::Faiss => "faiss",
            VectorBackend::Weaviate => "weaviate",
            VectorBackend::Pinecone => "pinecone",
            VectorBackend::Qdrant => "qdrant",
            VectorBackend::Chroma => "chroma",
            VectorBackend::Opensearch => "opensearch",
        }
    }

    /// Whether embeddings live in `IndexDict::embeddings_dict` rather than an
    /// external engine.
    pub fn is_in_process(&self) -> bool { matches!(self, VectorBackend::Simple) }
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "simple" => VectorBackend::Simple,
            "faiss" => VectorBackend::Faiss,
            "weaviate" => VectorBackend::Weaviate,
            "pinecone" => VectorBackend::Pinecone,
            "qdrant" => VectorBackend::Qdrant,
            "chroma" => VectorBackend::Chroma,
            "opensearch" => VectorBackend::Opensearch,
            other => return Err(Error::InvalidConfig(format!("unknown vector backend '{other}'"))),
        })
    }
}

/// Mapping from vector-engine ids to node ids, plus a reverse map from the
/// originating document to its vector ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDict {
    pub index_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub backend: VectorBackend,
    nodes_dict: BTreeMap<String, NodeId>,
    doc_id_dict: BTreeMap<String, Vec<String>>,
    /// In-process embeddings as (vector id, embedding), in insertion order.
    #[serde(default)]
    embeddings_dict: Vec<(String, Vec<f32>)>,
}

impl IndexDict {
    pub fn new(index_id: impl Into<String>, backend: VectorBackend) -> Self {
        Self { index_id: index_id.into(), backend, ..Self::default() }
    }

    /// Register `node` under `vector_id` (the node id when `None`) and return
    /// the vector id. Registering the same pair again changes nothing; a vector
    /// id already bound to another node is a duplicate.
    pub fn add_node(&mut self, node: &Node, vector_id: Option<&str>) -> Result<String> {
        let vector_id = vector_id.unwrap_or(node.id.as_str()).to_string();
        match self.nodes_dict.get(&vector_id) {
            Some(existing) if *existing == node.id => return Ok(vector_id),
            Some(existing) => {
                return Err(Error::Duplicate(format!("vector id '{vector_id}' already maps to node '{existing}'")));
            }
            None => {}
        }
        self.nodes_dict.insert(vector_id.clone(), node.id.clone());
        if let Some(doc) = &node.ref_doc_id {
            self.doc_id_dict.entry(doc.clone()).or_default().push(vector_id.clone());
        }
        Ok(vector_id)
    }

    /// Store an in-process embedding. Replacing one keeps its original slot.
    pub fn add_embedding(&mut self, vector_id: &str, embedding: Vec<f32>) {
        match self.embeddings_dict.iter_mut().find(|(id, _)| id == vector_id) {
            Some((_, existing)) => *existing = embedding,
            None => self.embeddings_dict.push((vector_id.to_string(), embedding)),
        }
    }

    pub fn get_embedding(&self, vector_id: &str) -> Option<&[f32]> {
        self.embeddings_dict.iter().find(|(id, _)| id == vector_id).map(|(_, e)| e.as_slice())
    }

    /// Move everything recorded under `old` to `new`, for engines that assign
    /// their own ids.
    pub fn rebind_vector_id(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if let Some(existing) = self.nodes_dict.get(new) {
            return Err(Error::Duplicate(format!("vector id '{new}' already maps to node '{existing}'")));
        }
        let node_id = self
            .nodes_dict
            .remove(old)
            .ok_or_else(|| Error::NotFound(format!("vector id '{old}' in '{}'", self.index_id)))?;
        self.nodes_dict.insert(new.to_string(), node_id);
        for vector_ids in self.doc_id_dict.values_mut() {
            for id in vector_ids.iter_mut().filter(|id| id.as_str() == old) {
                *id = new.to_string();
            }
        }
        for (id, _) in self.embeddings_dict.iter_mut().filter(|(id, _)| id == old) {
            *id = new.to_string();
        }
        Ok(())
    }

    pub fn get_node_id(&self, vector_id: &str) -> Result<&NodeId> {
        self.nodes_dict
            .get(vector_id)
            .ok_or_else(|| Error::Corruption(format!("vector id '{vector_id}' is not mapped in '{}'", self.index_id)))
    }

    pub fn nodes_dict(&self) -> &BTreeMap<String, NodeId> { &self.nodes_dict }
    pub fn doc_id_dict(&self) -> &BTreeMap<String, Vec<String>> { &self.doc_id_dict }
    pub fn embeddings_dict(&self) -> &[(String, Vec<f32>)] { &self.embeddings_dict }

    pub fn node_ids(&self) -> Vec<NodeId> { self.nodes_dict.values().cloned().collect() }
    pub fn len(&self) -> usize { self.nodes_dict.len() }
    pub fn is_empty(&self) -> bool { self.nodes_dict.is_empty() }

    /// Remove every vector id registered for `doc_id` and return them, so the
    /// caller can delete the same ids from the vector engine.
    pub fn delete(&mut self, doc_id: &str) -> Result<Vec<String>> {
        let vector_ids = self
            .doc_id_dict
            .remove(doc_id)
            .ok_or_else(|| Error::NotFound(format!("ref doc '{doc_id}' in vector index '{}'", self.index_id)))?;
        for vector_id in &vector_ids {
            self.nodes_dict.remove(vector_id);
        }
        self.embeddings_dict.retain(|(id, _)| !vector_ids.contains(id));
        debug!(index_id = %self.index_id, doc_id, removed = vector_ids.len(), "vector dict delete");
        Ok(vector_ids)
    }

    /// Every vector id listed for a document must be mapped to a node.
    pub fn validate(&self) -> Result<()> {
        for (doc, vector_ids) in &self.doc_id_dict {
            if let Some(missing) = vector_ids.iter().find(|v| !self.nodes_dict.contains_key(*v)) {
                return Err(Error::Corruption(format!("doc '{doc}' lists unmapped vector id '{missing}'")));
            }
        }
        Ok(())
    }
}
