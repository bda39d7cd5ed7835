use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::types::NodeId;

/// Inverted index from keyword to the ids of nodes containing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub index_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    table: BTreeMap<String, BTreeSet<NodeId>>,
}

impl KeywordTable {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self { index_id: index_id.into(), ..Self::default() }
    }

    /// Record `node_id` under each keyword. Re-adding is a no-op.
    pub fn add_node<I, S>(&mut self, keywords: I, node_id: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for keyword in keywords {
            self.table.entry(keyword.into()).or_default().insert(node_id.to_string());
        }
    }

    /// Ids of nodes recorded under `keyword`. Only direct lookups (depth 1)
    /// are supported; an unknown keyword yields an empty list.
    pub fn get_node_ids(&self, keyword: &str, depth: usize) -> Result<Vec<NodeId>> {
        check_depth(depth)?;
        Ok(self.table.get(keyword).map(|ids| ids.iter().cloned().collect()).unwrap_or_default())
    }

    pub fn table(&self) -> &BTreeMap<String, BTreeSet<NodeId>> { &self.table }

    pub fn keywords(&self) -> impl Iterator<Item = &str> { self.table.keys().map(String::as_str) }

    pub fn contains_keyword(&self, keyword: &str) -> bool { self.table.contains_key(keyword) }

    /// Union of every id in the table.
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.table.values().flatten().cloned().collect()
    }

    /// Number of distinct keywords.
    pub fn size(&self) -> usize { self.table.len() }
    pub fn is_empty(&self) -> bool { self.table.is_empty() }

    pub fn delete_ref_doc(&mut self, ref_doc_id: &str, docstore: &DocumentStore) -> Result<Vec<NodeId>> {
        let doomed = owned_by(self.node_ids(), ref_doc_id, docstore)?;
        if doomed.is_empty() {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in keyword table '{}'", self.index_id)));
        }
        prune(&mut self.table, &doomed);
        debug!(index_id = %self.index_id, ref_doc_id, removed = doomed.len(), "keyword table delete");
        Ok(doomed.into_iter().collect())
    }
}

pub(crate) fn check_depth(depth: usize) -> Result<()> {
    match depth {
        0 => Err(Error::InvalidConfig("keyword lookup depth must be at least 1".into())),
        1 => Ok(()),
        d => Err(Error::UnsupportedDepth(d)),
    }
}

pub(crate) fn owned_by(ids: BTreeSet<NodeId>, ref_doc_id: &str, docstore: &DocumentStore) -> Result<BTreeSet<NodeId>> {
    let mut doomed = BTreeSet::new();
    for id in ids {
        if docstore.resolve(&id)?.ref_doc_id.as_deref() == Some(ref_doc_id) {
            doomed.insert(id);
        }
    }
    Ok(doomed)
}

/// Drop `doomed` ids from every posting list and remove emptied keywords.
pub(crate) fn prune(table: &mut BTreeMap<String, BTreeSet<NodeId>>, doomed: &BTreeSet<NodeId>) {
    for ids in table.values_mut() {
        ids.retain(|id| !doomed.contains(id));
    }
    table.retain(|_, ids| !ids.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Node;

    #[test]
    fn node_ids_is_union_of_postings() {
        let mut t = KeywordTable::new("kw");
        t.add_node(["rust", "index"], "n1");
        t.add_node(["rust"], "n2");
        t.add_node(["rust"], "n2");
        assert_eq!(t.size(), 2);
        assert_eq!(t.node_ids().into_iter().collect::<Vec<_>>(), vec!["n1", "n2"]);
        assert_eq!(t.get_node_ids("rust", 1).unwrap(), vec!["n1", "n2"]);
        assert!(t.get_node_ids("missing", 1).unwrap().is_empty());
    }

    #[test]
    fn deep_lookup_is_rejected() {
        let t = KeywordTable::new("kw");
        assert!(matches!(t.get_node_ids("x", 2), Err(Error::UnsupportedDepth(2))));
        assert!(matches!(t.get_node_ids("x", 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn delete_drops_emptied_keywords() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![Node::new("n1", "a").with_ref_doc("d1"), Node::new("n2", "b").with_ref_doc("d2")], false).unwrap();
        let mut t = KeywordTable::new("kw");
        t.add_node(["shared", "only1"], "n1");
        t.add_node(["shared"], "n2");
        assert_eq!(t.delete_ref_doc("d1", &store).unwrap(), vec!["n1"]);
        assert!(!t.contains_keyword("only1"));
        assert_eq!(t.get_node_ids("shared", 1).unwrap(), vec!["n2"]);
        assert!(matches!(t.delete_ref_doc("d1", &store), Err(Error::NotFound(_))));
    }
}
