use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::keyword_table::{check_depth, owned_by, prune};
use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::types::NodeId;

/// A (subject, relation, object) fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl Triplet {
    pub fn new(subject: impl Into<String>, relation: impl Into<String>, object: impl Into<String>) -> Self {
        Self { subject: subject.into(), relation: relation.into(), object: object.into() }
    }
}

impl std::fmt::Display for Triplet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.relation, self.object)
    }
}

/// Keyword table plus a relation map from subject to (relation, object) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub index_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    table: BTreeMap<String, BTreeSet<NodeId>>,
    rel_map: BTreeMap<String, Vec<(String, String)>>,
    #[serde(default)]
    embedding_dict: BTreeMap<String, Vec<f32>>,
}

impl KnowledgeGraph {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self { index_id: index_id.into(), ..Self::default() }
    }

    pub fn add_node<I, S>(&mut self, keywords: I, node_id: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for keyword in keywords {
            self.table.entry(keyword.into()).or_default().insert(node_id.to_string());
        }
    }

    /// Record `triplet` as a relation and index `node_id` under its subject
    /// and object.
    pub fn upsert_triplet(&mut self, triplet: &Triplet, node_id: &str) {
        let pairs = self.rel_map.entry(triplet.subject.clone()).or_default();
        let pair = (triplet.relation.clone(), triplet.object.clone());
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
        self.add_node([triplet.subject.as_str(), triplet.object.as_str()], node_id);
    }

    pub fn add_embedding(&mut self, text: impl Into<String>, embedding: Vec<f32>) {
        self.embedding_dict.insert(text.into(), embedding);
    }

    /// Ids of nodes under `keyword` followed by those under each object the
    /// keyword relates to, without repeats. Depth above 1 is unsupported.
    pub fn get_node_ids(&self, keyword: &str, depth: usize) -> Result<Vec<NodeId>> {
        check_depth(depth)?;
        if !self.table.contains_key(keyword) {
            return Ok(Vec::new());
        }
        let mut keywords = vec![keyword];
        keywords.extend(self.rel_map.get(keyword).into_iter().flatten().map(|(_, object)| object.as_str()));
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        for kw in keywords {
            for id in self.table.get(kw).into_iter().flatten() {
                if seen.insert(id.as_str()) {
                    ids.push(id.clone());
                }
            }
        }
        Ok(ids)
    }

    pub fn get_rel_map_tuples(&self, subject: &str) -> Vec<Triplet> {
        self.rel_map
            .get(subject)
            .into_iter()
            .flatten()
            .map(|(relation, object)| Triplet::new(subject, relation.as_str(), object.as_str()))
            .collect()
    }

    /// Relations of `subject` rendered as `(subject, relation, object)` lines.
    pub fn get_rel_map_texts(&self, subject: &str) -> Vec<String> {
        self.get_rel_map_tuples(subject).iter().map(Triplet::to_string).collect()
    }

    pub fn table(&self) -> &BTreeMap<String, BTreeSet<NodeId>> { &self.table }
    pub fn rel_map(&self) -> &BTreeMap<String, Vec<(String, String)>> { &self.rel_map }
    pub fn embedding_dict(&self) -> &BTreeMap<String, Vec<f32>> { &self.embedding_dict }

    pub fn node_ids(&self) -> BTreeSet<NodeId> { self.table.values().flatten().cloned().collect() }
    pub fn size(&self) -> usize { self.table.len() }
    pub fn is_empty(&self) -> bool { self.table.is_empty() }

    /// Remove the document's nodes; relations whose subject or object no
    /// longer names any node are dropped with them.
    pub fn delete_ref_doc(&mut self, ref_doc_id: &str, docstore: &DocumentStore) -> Result<Vec<NodeId>> {
        let doomed = owned_by(self.node_ids(), ref_doc_id, docstore)?;
        if doomed.is_empty() {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in knowledge graph '{}'", self.index_id)));
        }
        prune(&mut self.table, &doomed);
        let table = &self.table;
        self.rel_map.retain(|subject, _| table.contains_key(subject));
        for pairs in self.rel_map.values_mut() {
            pairs.retain(|(_, object)| table.contains_key(object));
        }
        self.rel_map.retain(|_, pairs| !pairs.is_empty());
        debug!(index_id = %self.index_id, ref_doc_id, removed = doomed.len(), "knowledge graph delete");
        Ok(doomed.into_iter().collect())
    }
}
