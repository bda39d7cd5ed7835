//! Persistence of the document store and every index struct built over it.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::docstore::DocumentStore;
use crate::error::{Error, Result};
use crate::index_struct::IndexStruct;

pub const DOCSTORE_FILE: &str = "docstore.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";

/// Index structs keyed by their index id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStore {
    structs: BTreeMap<String, IndexStruct>,
}

impl IndexStore {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, index_struct: IndexStruct) -> Result<()> {
        let id = index_struct.index_id().to_string();
        if self.structs.contains_key(&id) {
            return Err(Error::Duplicate(format!("index struct '{id}'")));
        }
        self.structs.insert(id, index_struct);
        Ok(())
    }

    /// Insert or replace.
    pub fn put(&mut self, index_struct: IndexStruct) {
        self.structs.insert(index_struct.index_id().to_string(), index_struct);
    }

    pub fn get(&self, index_id: &str) -> Result<&IndexStruct> {
        self.structs.get(index_id).ok_or_else(|| Error::NotFound(format!("index struct '{index_id}'")))
    }

    pub fn get_mut(&mut self, index_id: &str) -> Result<&mut IndexStruct> {
        self.structs.get_mut(index_id).ok_or_else(|| Error::NotFound(format!("index struct '{index_id}'")))
    }

    pub fn remove(&mut self, index_id: &str) -> Result<IndexStruct> {
        self.structs.remove(index_id).ok_or_else(|| Error::NotFound(format!("index struct '{index_id}'")))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> { self.structs.keys().map(String::as_str) }
    pub fn iter(&self) -> impl Iterator<Item = &IndexStruct> { self.structs.values() }
    pub fn len(&self) -> usize { self.structs.len() }
    pub fn is_empty(&self) -> bool { self.structs.is_empty() }
}

/// A document store together with the index structs that reference it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageContext {
    pub docstore: DocumentStore,
    pub index_store: IndexStore,
}

impl StorageContext {
    pub fn new() -> Self { Self::default() }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_json(&dir.join(DOCSTORE_FILE), &self.docstore)?;
        write_json(&dir.join(INDEX_STORE_FILE), &self.index_store)?;
        info!(dir = %dir.display(), nodes = self.docstore.len(), indices = self.index_store.len(), "persisted storage context");
        Ok(())
    }

    /// Load a persisted context and check every struct against the store.
    pub fn load(dir: &Path) -> Result<Self> {
        let docstore: DocumentStore = read_json(&dir.join(DOCSTORE_FILE))?;
        let index_store: IndexStore = read_json(&dir.join(INDEX_STORE_FILE))?;
        for index_struct in index_store.iter() {
            index_struct.validate(&docstore)?;
        }
        info!(dir = %dir.display(), nodes = docstore.len(), indices = index_store.len(), "loaded storage context");
        Ok(Self { docstore, index_store })
    }

    /// Remove a document from every struct that references it, then from the
    /// store. Returns, per index id, the ids each struct dropped (vector ids
    /// for vector dicts). Summary nodes a tree prunes along the way leave the
    /// store too. The work is staged: on any error neither the structs nor
    /// the store change.
    pub fn delete_ref_doc(&mut self, ref_doc_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
        if !self.docstore.iter().any(|n| n.ref_doc_id.as_deref() == Some(ref_doc_id)) {
            return Err(Error::NotFound(format!("ref doc '{ref_doc_id}' in document store")));
        }
        let mut staged = self.index_store.clone();
        let mut removed = BTreeMap::new();
        let mut derived = BTreeSet::new();
        for index_struct in staged.structs.values_mut() {
            match index_struct.delete_ref_doc(ref_doc_id, &self.docstore) {
                Ok(ids) => {
                    if matches!(index_struct, IndexStruct::Tree(_)) {
                        derived.extend(ids.iter().filter(|id| self.is_derived(id)).cloned());
                    }
                    removed.insert(index_struct.index_id().to_string(), ids);
                }
                Err(Error::NotFound(_)) => debug!(index_id = index_struct.index_id(), ref_doc_id, "struct does not reference doc"),
                Err(e) => return Err(e),
            }
        }
        let mut docstore = self.docstore.clone();
        docstore.delete_ref_doc(ref_doc_id)?;
        for id in &derived {
            docstore.delete_node(id)?;
        }
        self.index_store = staged;
        self.docstore = docstore;
        Ok(removed)
    }

    /// True for a stored node that no source document backs.
    fn is_derived(&self, id: &str) -> bool {
        self.docstore.get_node(id).map_or(false, |n| n.ref_doc_id.is_none())
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(Error::NotFound(format!("persisted file {}", path.display())));
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_struct::{IndexGraph, IndexList, KeywordTable};
    use crate::types::Node;

    fn context() -> StorageContext {
        let mut ctx = StorageContext::new();
        ctx.docstore.add_documents(vec![
            Node::new("a", "x").with_ref_doc("d1"),
            Node::new("b", "y").with_ref_doc("d2"),
        ], false).unwrap();
        let mut list = IndexList::new("list");
        list.add_node("a");
        list.add_node("b");
        let mut table = KeywordTable::new("kw");
        table.add_node(["y"], "b");
        ctx.index_store.add(list.into()).unwrap();
        ctx.index_store.add(table.into()).unwrap();
        ctx
    }

    #[test]
    fn duplicate_index_id_is_rejected() {
        let mut ctx = context();
        assert!(matches!(ctx.index_store.add(IndexList::new("list").into()), Err(Error::Duplicate(_))));
        assert!(matches!(ctx.index_store.get("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_cascades_to_referencing_structs() {
        let mut ctx = context();
        let removed = ctx.delete_ref_doc("d1").unwrap();
        assert_eq!(removed.keys().collect::<Vec<_>>(), vec!["list"]);
        assert_eq!(ctx.index_store.get("list").unwrap().node_ids(), vec!["b".to_string()]);
        assert!(!ctx.docstore.document_exists("a"));
        assert!(matches!(ctx.delete_ref_doc("d1"), Err(Error::NotFound(_))));
    }

    #[test]
    fn failed_delete_changes_nothing() {
        let mut ctx = StorageContext::new();
        ctx.docstore.add_documents(vec![Node::new("a", "x").with_ref_doc("D")], false).unwrap();
        let mut list = IndexList::new("a_list");
        list.add_node("a");
        let mut table = KeywordTable::new("b_kw");
        table.add_node(["x"], "ghost");
        ctx.index_store.add(list.into()).unwrap();
        ctx.index_store.add(table.into()).unwrap();
        let before = ctx.clone();

        assert!(matches!(ctx.delete_ref_doc("D"), Err(Error::Corruption(_))));
        assert_eq!(ctx, before);
        assert_eq!(ctx.index_store.get("a_list").unwrap().node_ids(), vec!["a".to_string()]);
        assert!(ctx.docstore.document_exists("a"));
    }

    #[test]
    fn delete_drops_pruned_summaries_from_store() {
        let mut ctx = StorageContext::new();
        ctx.docstore.add_documents(vec![
            Node::new("a0", "x").with_ref_doc("A"),
            Node::new("a1", "y").with_ref_doc("A"),
            Node::new("b0", "z").with_ref_doc("B"),
            Node::new("t:summary:3", "x y"),
        ], false).unwrap();
        let mut tree = IndexGraph::new("t");
        for id in ["a0", "a1", "b0"] { tree.insert(id, None, &[]).unwrap(); }
        tree.insert("t:summary:3", None, &["a0".to_string(), "a1".to_string()]).unwrap();
        ctx.index_store.add(tree.into()).unwrap();

        let removed = ctx.delete_ref_doc("A").unwrap();
        assert_eq!(removed["t"], vec!["a0".to_string(), "a1".to_string(), "t:summary:3".to_string()]);
        assert!(!ctx.docstore.document_exists("t:summary:3"));
        assert_eq!(ctx.docstore.len(), 1);
        assert_eq!(ctx.index_store.get("t").unwrap().node_ids(), vec!["b0".to_string()]);
    }

    #[test]
    fn load_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(StorageContext::load(&dir.path().join("none")), Err(Error::NotFound(_))));
    }
}
