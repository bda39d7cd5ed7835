//! Process-local node store shared by every index struct built over a corpus.
//!
//! Index structs hold only node ids; the store owns the nodes. A lookup that
//! misses is always an error: `get_node` reports `NotFound` for caller-supplied
//! ids, `resolve` reports `Corruption` for ids that came out of an index struct.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Node, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: BTreeMap<NodeId, Node>,
}

impl DocumentStore {
    pub fn new() -> Self { Self::default() }

    /// Add a batch of nodes. The whole batch is checked before anything is
    /// written, so a rejected batch leaves the store untouched.
    pub fn add_documents<I>(&mut self, nodes: I, allow_update: bool) -> Result<()>
    where
        I: IntoIterator<Item = Node>,
    {
        let nodes: Vec<Node> = nodes.into_iter().collect();
        let mut seen = HashSet::with_capacity(nodes.len());
        for node in &nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(Error::Duplicate(format!("node '{}' appears twice in one batch", node.id)));
            }
            if !allow_update && self.docs.contains_key(&node.id) {
                return Err(Error::Duplicate(format!("node '{}' already exists in the document store", node.id)));
            }
        }
        let count = nodes.len();
        for node in nodes {
            self.docs.insert(node.id.clone(), node);
        }
        debug!(count, "added nodes to document store");
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Result<&Node> {
        self.docs.get(id).ok_or_else(|| Error::NotFound(format!("node '{id}' in document store")))
    }

    /// Look up an id referenced by an index struct.
    pub fn resolve(&self, id: &str) -> Result<&Node> {
        self.docs
            .get(id)
            .ok_or_else(|| Error::Corruption(format!("index references node '{id}' missing from the document store")))
    }

    pub fn get_nodes<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&Node>> {
        ids.iter().map(|id| self.get_node(id.as_ref())).collect()
    }

    pub fn document_exists(&self, id: &str) -> bool { self.docs.contains_key(id) }

    pub fn update_text(&mut self, id: &str, text: impl Into<String>) -> Result<()> {
        let node = self.docs.get_mut(id).ok_or_else(|| Error::NotFound(format!("node '{id}' in document store")))?;
        node.text = text.into();
        Ok(())
    }

    pub fn set_embedding(&mut self, id: &str, embedding: Vec<f32>) -> Result<()> {
        let node = self.docs.get_mut(id).ok_or_else(|| Error::NotFound(format!("node '{id}' in document store")))?;
        node.embedding = Some(embedding);
        Ok(())
    }

    pub fn delete_node(&mut self, id: &str) -> Result<Node> {
        self.docs.remove(id).ok_or_else(|| Error::NotFound(format!("node '{id}' in document store")))
    }

    /// Remove every node whose `ref_doc_id` is `ref_doc_id`.
    pub fn delete_ref_doc(&mut self, ref_doc_id: &str) -> Result<Vec<NodeId>> {
        let ids: Vec<NodeId> = self
            .docs
            .values()
            .filter(|n| n.ref_doc_id.as_deref() == Some(ref_doc_id))
            .map(|n| n.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in document store")));
        }
        for id in &ids {
            self.docs.remove(id);
        }
        debug!(ref_doc_id, removed = ids.len(), "deleted ref doc from document store");
        Ok(ids)
    }

    pub fn ref_doc_ids(&self) -> BTreeSet<String> {
        self.docs.values().filter_map(|n| n.ref_doc_id.clone()).collect()
    }

    /// Nodes of one document in chunk-run order (following NEXT links from the
    /// head of the run). Nodes not reachable that way follow in id order.
    pub fn nodes_for_ref_doc(&self, ref_doc_id: &str) -> Vec<&Node> {
        let members: BTreeMap<&str, &Node> = self
            .docs
            .values()
            .filter(|n| n.ref_doc_id.as_deref() == Some(ref_doc_id))
            .map(|n| (n.id.as_str(), n))
            .collect();
        let mut ordered = Vec::with_capacity(members.len());
        let mut placed: HashSet<&str> = HashSet::new();
        let heads = members.values().filter(|n| n.prev_id().map_or(true, |p| !members.contains_key(p)));
        for head in heads {
            let mut cur = Some(*head);
            while let Some(node) = cur {
                if !placed.insert(node.id.as_str()) { break; }
                ordered.push(node);
                cur = node.next_id().and_then(|next| members.get(next).copied());
            }
        }
        for (id, node) in &members {
            if !placed.contains(id) { ordered.push(*node); }
        }
        ordered
    }

    /// Number of PREVIOUS hops from `id` to the head of its chunk run.
    pub fn chain_position(&self, id: &str) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut cur = self.get_node(id)?;
        let mut position = 0usize;
        while let Some(prev) = cur.prev_id() {
            if !visited.insert(cur.id.clone()) {
                return Err(Error::Corruption(format!("PREVIOUS links around '{id}' form a cycle")));
            }
            match self.docs.get(prev) {
                Some(node) => { cur = node; position += 1; }
                None => break,
            }
        }
        Ok(position)
    }

    pub fn len(&self) -> usize { self.docs.len() }
    pub fn is_empty(&self) -> bool { self.docs.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &Node> { self.docs.values() }
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> { self.docs.keys() }
}
