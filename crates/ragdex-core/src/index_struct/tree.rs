//! Position-addressed summarization tree over node ids.
//!
//! `all_nodes` maps an integer position to a node id. `node_id_to_index` and
//! `node_id_to_children_indices` are kept in lock-step with it, and
//! `root_nodes` always holds exactly the positions that have no parent.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::types::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexGraph {
    pub index_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(with = "position_keys")]
    all_nodes: BTreeMap<usize, NodeId>,
    #[serde(with = "position_keys")]
    root_nodes: BTreeMap<usize, NodeId>,
    node_id_to_index: BTreeMap<NodeId, usize>,
    node_id_to_children_indices: BTreeMap<NodeId, BTreeSet<usize>>,
}

impl IndexGraph {
    pub fn new(index_id: impl Into<String>) -> Self {
        Self { index_id: index_id.into(), ..Self::default() }
    }

    pub fn size(&self) -> usize { self.all_nodes.len() }
    pub fn is_empty(&self) -> bool { self.all_nodes.is_empty() }

    pub fn all_nodes(&self) -> &BTreeMap<usize, NodeId> { &self.all_nodes }
    pub fn root_nodes(&self) -> &BTreeMap<usize, NodeId> { &self.root_nodes }
    pub fn node_id_to_index(&self) -> &BTreeMap<NodeId, usize> { &self.node_id_to_index }
    pub fn node_id_to_children_indices(&self) -> &BTreeMap<NodeId, BTreeSet<usize>> { &self.node_id_to_children_indices }

    /// Next free position: one past the highest occupied position.
    pub fn next_index(&self) -> usize {
        self.all_nodes.keys().next_back().map_or(0, |last| last + 1)
    }

    pub fn contains(&self, node_id: &str) -> bool { self.node_id_to_index.contains_key(node_id) }

    pub fn get_index(&self, node_id: &str) -> Result<usize> {
        self.node_id_to_index
            .get(node_id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("node '{node_id}' in tree '{}'", self.index_id)))
    }

    /// Position of the parent of `node_id`, if it has one.
    pub fn parent_of(&self, node_id: &str) -> Option<&NodeId> {
        let index = self.node_id_to_index.get(node_id)?;
        self.node_id_to_children_indices
            .iter()
            .find(|(_, children)| children.contains(index))
            .map(|(parent, _)| parent)
    }

    fn check_free(&self, node_id: &str, index: usize) -> Result<()> {
        if self.node_id_to_index.contains_key(node_id) {
            return Err(Error::Duplicate(format!("node '{node_id}' already in tree '{}'", self.index_id)));
        }
        if let Some(existing) = self.all_nodes.get(&index) {
            return Err(Error::Duplicate(format!("tree position {index} is occupied by '{existing}'")));
        }
        Ok(())
    }

    /// Register `node_id` at `index` (or the next free position) as the parent
    /// of `children`. The new node starts as a root; each child stops being one.
    pub fn insert(&mut self, node_id: &str, index: Option<usize>, children: &[NodeId]) -> Result<usize> {
        let index = index.unwrap_or_else(|| self.next_index());
        self.check_free(node_id, index)?;
        let mut child_indices = BTreeSet::new();
        for child in children {
            let child_index = self.get_index(child)?;
            if let Some(parent) = self.parent_of(child) {
                return Err(Error::Duplicate(format!("node '{child}' already has parent '{parent}'")));
            }
            if !child_indices.insert(child_index) {
                return Err(Error::Duplicate(format!("node '{child}' listed twice as a child")));
            }
        }
        for child_index in &child_indices {
            self.root_nodes.remove(child_index);
        }
        self.all_nodes.insert(index, node_id.to_string());
        self.root_nodes.insert(index, node_id.to_string());
        self.node_id_to_index.insert(node_id.to_string(), index);
        if !child_indices.is_empty() {
            self.node_id_to_children_indices.insert(node_id.to_string(), child_indices);
        }
        debug!(index_id = %self.index_id, node_id, index, children = children.len(), "tree insert");
        Ok(index)
    }

    /// Insert a new node under `parent` (or as a root when `parent` is `None`).
    pub fn insert_under_parent(&mut self, node_id: &str, parent: Option<&str>, new_index: Option<usize>) -> Result<usize> {
        let index = new_index.unwrap_or_else(|| self.next_index());
        self.check_free(node_id, index)?;
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(Error::NotFound(format!("parent '{parent}' in tree '{}'", self.index_id)));
            }
        }
        self.attach(node_id, parent, index);
        Ok(index)
    }

    /// Insert several nodes under one parent; either all are registered or none.
    pub fn insert_many_under_parent(&mut self, node_ids: &[NodeId], parent: Option<&str>) -> Result<Vec<usize>> {
        if let Some(parent) = parent {
            if !self.contains(parent) {
                return Err(Error::NotFound(format!("parent '{parent}' in tree '{}'", self.index_id)));
            }
        }
        let mut seen = HashSet::new();
        for node_id in node_ids {
            if !seen.insert(node_id.as_str()) || self.contains(node_id) {
                return Err(Error::Duplicate(format!("node '{node_id}' already in tree '{}'", self.index_id)));
            }
        }
        let mut positions = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            let index = self.next_index();
            self.attach(node_id, parent, index);
            positions.push(index);
        }
        Ok(positions)
    }

    /// Insert `node_id` between `parent` and some of its current `children`:
    /// the new node adopts them and becomes a child of `parent` (a root when
    /// `parent` is `None`).
    pub fn insert_between(&mut self, node_id: &str, parent: Option<&str>, children: &[NodeId]) -> Result<usize> {
        let index = self.next_index();
        self.check_free(node_id, index)?;
        let siblings = self.get_children_indices(parent)?;
        let mut adopted = BTreeSet::new();
        for child in children {
            let child_index = self.get_index(child)?;
            if !siblings.contains(&child_index) {
                return Err(Error::NotFound(format!("node '{child}' under '{}'", parent.unwrap_or("<root>"))));
            }
            adopted.insert(child_index);
        }
        match parent {
            None => self.root_nodes.retain(|i, _| !adopted.contains(i)),
            Some(parent) => {
                if let Some(set) = self.node_id_to_children_indices.get_mut(parent) {
                    set.retain(|i| !adopted.contains(i));
                }
            }
        }
        if !adopted.is_empty() {
            self.node_id_to_children_indices.insert(node_id.to_string(), adopted);
        }
        self.attach(node_id, parent, index);
        Ok(index)
    }

    fn attach(&mut self, node_id: &str, parent: Option<&str>, index: usize) {
        match parent {
            None => { self.root_nodes.insert(index, node_id.to_string()); }
            Some(parent) => {
                self.node_id_to_children_indices.entry(parent.to_string()).or_default().insert(index);
            }
        }
        self.all_nodes.insert(index, node_id.to_string());
        self.node_id_to_index.insert(node_id.to_string(), index);
        debug!(index_id = %self.index_id, node_id, index, parent, "tree insert under parent");
    }

    pub fn get_children_indices(&self, parent: Option<&str>) -> Result<BTreeSet<usize>> {
        match parent {
            None => Ok(self.root_nodes.keys().copied().collect()),
            Some(parent) => {
                self.get_index(parent)?;
                Ok(self.node_id_to_children_indices.get(parent).cloned().unwrap_or_default())
            }
        }
    }

    /// Children of `parent` by position; the roots when `parent` is `None`.
    pub fn get_children(&self, parent: Option<&str>) -> Result<BTreeMap<usize, NodeId>> {
        let indices = self.get_children_indices(parent)?;
        indices
            .into_iter()
            .map(|i| {
                self.all_nodes
                    .get(&i)
                    .map(|id| (i, id.clone()))
                    .ok_or_else(|| Error::Corruption(format!("child position {i} missing from tree '{}'", self.index_id)))
            })
            .collect()
    }

    pub fn is_leaf(&self, node_id: &str) -> bool {
        self.node_id_to_children_indices.get(node_id).map_or(true, BTreeSet::is_empty)
    }

    /// Leaf node ids in position order.
    pub fn leaf_ids(&self) -> Vec<NodeId> {
        self.all_nodes.values().filter(|id| self.is_leaf(id)).cloned().collect()
    }

    /// All node ids in position order.
    pub fn node_ids(&self) -> Vec<NodeId> { self.all_nodes.values().cloned().collect() }

    /// Check the structural invariants: children exist, one parent per node,
    /// roots are exactly the parentless nodes, and no cycles.
    pub fn validate(&self) -> Result<()> {
        let mut parent_count: BTreeMap<usize, usize> = BTreeMap::new();
        for (parent, children) in &self.node_id_to_children_indices {
            if !self.node_id_to_index.contains_key(parent) {
                return Err(Error::Corruption(format!("children recorded for unknown node '{parent}'")));
            }
            for child in children {
                if !self.all_nodes.contains_key(child) {
                    return Err(Error::Corruption(format!("child position {child} of '{parent}' is not in all_nodes")));
                }
                *parent_count.entry(*child).or_default() += 1;
            }
        }
        for (index, node_id) in &self.all_nodes {
            if self.node_id_to_index.get(node_id) != Some(index) {
                return Err(Error::Corruption(format!("node_id_to_index out of sync for '{node_id}'")));
            }
            let parents = parent_count.get(index).copied().unwrap_or(0);
            if parents > 1 {
                return Err(Error::Corruption(format!("node '{node_id}' has {parents} parents")));
            }
            if (parents == 0) != self.root_nodes.contains_key(index) {
                return Err(Error::Corruption(format!("root set disagrees with parent links for '{node_id}'")));
            }
        }
        let mut reached = HashSet::new();
        let mut stack: Vec<usize> = self.root_nodes.keys().copied().collect();
        while let Some(index) = stack.pop() {
            if !reached.insert(index) {
                return Err(Error::Corruption(format!("position {index} reached twice")));
            }
            if let Some(children) = self.all_nodes.get(&index).and_then(|id| self.node_id_to_children_indices.get(id)) {
                stack.extend(children.iter().copied());
            }
        }
        if reached.len() != self.all_nodes.len() {
            return Err(Error::Corruption(format!("tree '{}' contains a cycle", self.index_id)));
        }
        Ok(())
    }

    /// Remove every node whose `ref_doc_id` matches. Children of a removed
    /// node move up to the removed node's parent, or become roots. A parent
    /// left without children is removed as well, cascading upward, when it is
    /// derived text (no `ref_doc_id`, such as a summary); source nodes stay.
    /// Returns the removed ids, matching nodes first, then pruned parents.
    pub fn delete_ref_doc(&mut self, ref_doc_id: &str, docstore: &DocumentStore) -> Result<Vec<NodeId>> {
        let mut doomed = Vec::new();
        for node_id in self.all_nodes.values() {
            if docstore.resolve(node_id)?.ref_doc_id.as_deref() == Some(ref_doc_id) {
                doomed.push(node_id.clone());
            }
        }
        if doomed.is_empty() {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in tree '{}'", self.index_id)));
        }
        let mut pruned = Vec::new();
        for node_id in &doomed {
            let mut emptied = self.remove_node(node_id);
            while let Some(parent) = emptied.take() {
                if docstore.resolve(&parent)?.ref_doc_id.is_some() || doomed.contains(&parent) {
                    break;
                }
                emptied = self.remove_node(&parent);
                pruned.push(parent);
            }
        }
        debug!(index_id = %self.index_id, ref_doc_id, removed = doomed.len(), pruned = pruned.len(), "tree delete");
        doomed.extend(pruned);
        Ok(doomed)
    }

    /// Detach `node_id`, handing its children to its parent. Returns the
    /// parent when it is left with no children.
    fn remove_node(&mut self, node_id: &str) -> Option<NodeId> {
        let index = self.node_id_to_index.remove(node_id)?;
        let parent = self.parent_of_index(index);
        let orphans = self.node_id_to_children_indices.remove(node_id).unwrap_or_default();
        self.all_nodes.remove(&index);
        match parent {
            Some(parent) => {
                let siblings = self.node_id_to_children_indices.entry(parent.clone()).or_default();
                siblings.remove(&index);
                siblings.extend(orphans.iter().copied());
                if siblings.is_empty() {
                    self.node_id_to_children_indices.remove(&parent);
                    return Some(parent);
                }
                None
            }
            None => {
                self.root_nodes.remove(&index);
                for orphan in &orphans {
                    if let Some(id) = self.all_nodes.get(orphan) {
                        self.root_nodes.insert(*orphan, id.clone());
                    }
                }
                None
            }
        }
    }

    fn parent_of_index(&self, index: usize) -> Option<NodeId> {
        self.node_id_to_children_indices
            .iter()
            .find(|(_, children)| children.contains(&index))
            .map(|(parent, _)| parent.clone())
    }
}

/// Positions are written as string keys. An `IndexStruct` is internally
/// tagged, so its content is buffered before deserialization and integer map
/// keys would come back as strings.
mod position_keys {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    use crate::types::NodeId;

    pub fn serialize<S: Serializer>(map: &BTreeMap<usize, NodeId>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(map.iter().map(|(position, id)| (position.to_string(), id)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<usize, NodeId>, D::Error> {
        BTreeMap::<String, NodeId>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, id)| {
                key.parse::<usize>()
                    .map(|position| (position, id))
                    .map_err(|_| D::Error::custom(format!("tree position '{key}' is not an integer")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Node;

    fn ids(v: &[&str]) -> Vec<NodeId> { v.iter().map(|s| (*s).to_string()).collect() }

    #[test]
    fn insert_under_parent_assigns_positions() {
        let mut g = IndexGraph::new("t");
        assert_eq!(g.insert_under_parent("root", None, None).unwrap(), 0);
        assert_eq!(g.insert_under_parent("a", Some("root"), None).unwrap(), 1);
        assert_eq!(g.insert_under_parent("b", Some("root"), Some(7)).unwrap(), 7);
        assert_eq!(g.insert_under_parent("c", Some("a"), None).unwrap(), 8);
        assert_eq!(g.root_nodes().len(), 1);
        let children = g.get_children(Some("root")).unwrap();
        assert_eq!(children.values().cloned().collect::<Vec<_>>(), ids(&["a", "b"]));
        g.validate().unwrap();
    }

    #[test]
    fn occupied_position_is_rejected() {
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("a", None, Some(0)).unwrap();
        let err = g.insert_under_parent("b", None, Some(0)).unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        assert_eq!(g.size(), 1);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("a", None, None).unwrap();
        assert!(matches!(g.insert_under_parent("a", None, None), Err(Error::Duplicate(_))));
    }

    #[test]
    fn missing_parent_is_not_found() {
        let mut g = IndexGraph::new("t");
        assert!(matches!(g.insert_under_parent("a", Some("ghost"), None), Err(Error::NotFound(_))));
        assert!(g.is_empty());
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("p", None, None).unwrap();
        g.insert_under_parent("x", Some("p"), None).unwrap();
        let err = g.insert_many_under_parent(&ids(&["y", "x"]), Some("p")).unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        assert_eq!(g.size(), 2);
        assert_eq!(g.insert_many_under_parent(&ids(&["y", "z"]), Some("p")).unwrap(), vec![2, 3]);
    }

    #[test]
    fn insert_with_children_demotes_roots() {
        let mut g = IndexGraph::new("t");
        for id in ["l0", "l1", "l2"] { g.insert(id, None, &[]).unwrap(); }
        assert_eq!(g.root_nodes().len(), 3);
        g.insert("s0", None, &ids(&["l0", "l1"])).unwrap();
        g.insert("s1", None, &ids(&["l2"])).unwrap();
        assert_eq!(g.root_nodes().values().cloned().collect::<Vec<_>>(), ids(&["s0", "s1"]));
        assert!(matches!(g.insert("s2", None, &ids(&["l0"])), Err(Error::Duplicate(_))));
        assert_eq!(g.leaf_ids(), ids(&["l0", "l1", "l2"]));
        g.validate().unwrap();
    }

    #[test]
    fn insert_between_adopts_children() {
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("p", None, None).unwrap();
        for id in ["a", "b", "c"] { g.insert_under_parent(id, Some("p"), None).unwrap(); }
        assert_eq!(g.insert_between("s", Some("p"), &ids(&["a", "b"])).unwrap(), 4);
        assert_eq!(g.get_children(Some("p")).unwrap().values().cloned().collect::<Vec<_>>(), ids(&["c", "s"]));
        assert_eq!(g.parent_of("a").map(String::as_str), Some("s"));
        assert!(matches!(g.insert_between("t", Some("p"), &ids(&["a"])), Err(Error::NotFound(_))));
        g.insert_between("top", None, &ids(&["p"])).unwrap();
        assert_eq!(g.root_nodes().values().cloned().collect::<Vec<_>>(), ids(&["top"]));
        g.validate().unwrap();
    }

    #[test]
    fn reused_position_after_delete_is_skipped() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![Node::new("a", "a"), Node::new("b", "b").with_ref_doc("gone"), Node::new("c", "c")], false).unwrap();
        let mut g = IndexGraph::new("t");
        for id in ["a", "b", "c"] { g.insert_under_parent(id, None, None).unwrap(); }
        g.delete_ref_doc("gone", &store).unwrap();
        assert_eq!(g.next_index(), 3);
        assert_eq!(g.insert_under_parent("d", None, None).unwrap(), 3);
    }

    #[test]
    fn delete_reattaches_children() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![
            Node::new("root", "r"),
            Node::new("mid", "m").with_ref_doc("doc"),
            Node::new("leaf", "l"),
        ], false).unwrap();
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("root", None, None).unwrap();
        g.insert_under_parent("mid", Some("root"), None).unwrap();
        g.insert_under_parent("leaf", Some("mid"), None).unwrap();
        assert_eq!(g.delete_ref_doc("doc", &store).unwrap(), ids(&["mid"]));
        assert_eq!(g.parent_of("leaf").map(String::as_str), Some("root"));
        g.validate().unwrap();
        assert!(matches!(g.delete_ref_doc("doc", &store), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_prunes_summaries_left_without_children() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![
            Node::new("n0", "Sentence 0.").with_ref_doc("A"),
            Node::new("n1", "Sentence 1.").with_ref_doc("A"),
            Node::new("n2", "Sentence 2.").with_ref_doc("B"),
            Node::new("n3", "Sentence 3.").with_ref_doc("B"),
            Node::new("s0", "Sentence 0. Sentence 1."),
            Node::new("s1", "Sentence 2. Sentence 3."),
            Node::new("top", "Sentence 0. Sentence 2."),
        ], false).unwrap();
        let mut g = IndexGraph::new("t");
        for id in ["n0", "n1", "n2", "n3"] { g.insert(id, None, &[]).unwrap(); }
        g.insert("s0", None, &ids(&["n0", "n1"])).unwrap();
        g.insert("s1", None, &ids(&["n2", "n3"])).unwrap();
        g.insert("top", None, &ids(&["s0", "s1"])).unwrap();

        assert_eq!(g.delete_ref_doc("A", &store).unwrap(), ids(&["n0", "n1", "s0"]));
        assert_eq!(g.leaf_ids(), ids(&["n2", "n3"]));
        assert_eq!(g.get_children(Some("top")).unwrap().values().cloned().collect::<Vec<_>>(), ids(&["s1"]));
        g.validate().unwrap();

        assert_eq!(g.delete_ref_doc("B", &store).unwrap(), ids(&["n2", "n3", "s1", "top"]));
        assert!(g.is_empty());
        assert!(g.root_nodes().is_empty());
    }

    #[test]
    fn delete_keeps_source_parent_as_leaf() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![
            Node::new("p", "parent").with_ref_doc("keep"),
            Node::new("c", "child").with_ref_doc("gone"),
        ], false).unwrap();
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("p", None, None).unwrap();
        g.insert_under_parent("c", Some("p"), None).unwrap();
        assert_eq!(g.delete_ref_doc("gone", &store).unwrap(), ids(&["c"]));
        assert_eq!(g.leaf_ids(), ids(&["p"]));
        g.validate().unwrap();
    }

    #[test]
    fn populated_tree_survives_tagged_json() {
        let mut g = IndexGraph::new("t");
        for id in ["a", "b", "c"] { g.insert(id, None, &[]).unwrap(); }
        g.insert("s", None, &ids(&["a", "b"])).unwrap();
        let s = crate::index_struct::IndexStruct::from(g);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"3\":\"s\""));
        let back: crate::index_struct::IndexStruct = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn dangling_node_is_corruption() {
        let store = DocumentStore::new();
        let mut g = IndexGraph::new("t");
        g.insert_under_parent("ghost", None, None).unwrap();
        assert!(matches!(g.delete_ref_doc("x", &store), Err(Error::Corruption(_))));
    }
}
