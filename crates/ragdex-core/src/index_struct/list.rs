use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::types::NodeId;

/// Ordered list of node ids; insertion order is the traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexList {
    pub index_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    nodes: Vec<NodeId>,
}

impl IndexList {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self { index_id: index_id.into(), ..Self::default() }
    }

    /// Append `node_id`. Returns false (and changes nothing) if it is already listed.
    pub fn add_node(&mut self, node_id: &str) -> bool {
        if self.contains(node_id) {
            return false;
        }
        self.nodes.push(node_id.to_string());
        true
    }

    pub fn contains(&self, node_id: &str) -> bool { self.nodes.iter().any(|id| id == node_id) }
    pub fn nodes(&self) -> &[NodeId] { &self.nodes }
    pub fn len(&self) -> usize { self.nodes.len() }
    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn delete_ref_doc(&mut self, ref_doc_id: &str, docstore: &DocumentStore) -> Result<Vec<NodeId>> {
        let mut doomed = Vec::new();
        for id in &self.nodes {
            if docstore.resolve(id)?.ref_doc_id.as_deref() == Some(ref_doc_id) {
                doomed.push(id.clone());
            }
        }
        if doomed.is_empty() {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in list '{}'", self.index_id)));
        }
        self.nodes.retain(|id| !doomed.contains(id));
        debug!(index_id = %self.index_id, ref_doc_id, removed = doomed.len(), "list delete");
        Ok(doomed)
    }
}
