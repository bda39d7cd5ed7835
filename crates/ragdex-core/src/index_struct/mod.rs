//! The index-struct family. Every struct holds node ids only and resolves them
//! through a [`DocumentStore`](crate::docstore::DocumentStore).

mod dict;
mod keyword_table;
mod kg;
mod list;
mod tree;

pub use dict::{IndexDict, VectorBackend};
pub use keyword_table::KeywordTable;
pub use kg::{KnowledgeGraph, Triplet};
pub use list::IndexList;
pub use tree::IndexGraph;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::types::NodeId;

/// Discriminant of an [`IndexStruct`], used to pick a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexStructType {
    Tree,
    KeywordTable,
    List,
    VectorStore(VectorBackend),
    Kg,
}

impl IndexStructType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStructType::Tree => "tree",
            IndexStructType::KeywordTable => "keyword_table",
            IndexStructType::List => "list",
            IndexStructType::VectorStore(_) => "vector_store",
            IndexStructType::Kg => "kg",
        }
    }
}

impl fmt::Display for IndexStructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStructType::VectorStore(backend) => write!(f, "vector_store/{backend}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Closed set of index structures, persisted with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexStruct {
    Tree(IndexGraph),
    KeywordTable(KeywordTable),
    List(IndexList),
    VectorStore(IndexDict),
    Kg(KnowledgeGraph),
}

impl IndexStruct {
    pub fn index_id(&self) -> &str {
        match self {
            IndexStruct::Tree(s) => &s.index_id,
            IndexStruct::KeywordTable(s) => &s.index_id,
            IndexStruct::List(s) => &s.index_id,
            IndexStruct::VectorStore(s) => &s.index_id,
            IndexStruct::Kg(s) => &s.index_id,
        }
    }

    pub fn get_type(&self) -> IndexStructType {
        match self {
            IndexStruct::Tree(_) => IndexStructType::Tree,
            IndexStruct::KeywordTable(_) => IndexStructType::KeywordTable,
            IndexStruct::List(_) => IndexStructType::List,
            IndexStruct::VectorStore(s) => IndexStructType::VectorStore(s.backend),
            IndexStruct::Kg(_) => IndexStructType::Kg,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            IndexStruct::Tree(s) => s.summary.as_deref(),
            IndexStruct::KeywordTable(s) => s.summary.as_deref(),
            IndexStruct::List(s) => s.summary.as_deref(),
            IndexStruct::VectorStore(s) => s.summary.as_deref(),
            IndexStruct::Kg(s) => s.summary.as_deref(),
        }
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        let summary = Some(summary.into());
        match self {
            IndexStruct::Tree(s) => s.summary = summary,
            IndexStruct::KeywordTable(s) => s.summary = summary,
            IndexStruct::List(s) => s.summary = summary,
            IndexStruct::VectorStore(s) => s.summary = summary,
            IndexStruct::Kg(s) => s.summary = summary,
        }
    }

    /// Every node id the struct references.
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            IndexStruct::Tree(s) => s.node_ids(),
            IndexStruct::KeywordTable(s) => s.node_ids().into_iter().collect(),
            IndexStruct::List(s) => s.nodes().to_vec(),
            IndexStruct::VectorStore(s) => s.node_ids(),
            IndexStruct::Kg(s) => s.node_ids().into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            IndexStruct::Tree(s) => s.is_empty(),
            IndexStruct::KeywordTable(s) => s.is_empty(),
            IndexStruct::List(s) => s.is_empty(),
            IndexStruct::VectorStore(s) => s.is_empty(),
            IndexStruct::Kg(s) => s.is_empty(),
        }
    }

    /// Drop every node of `ref_doc_id` from the struct. For a vector dict
    /// the returned ids are vector ids, which the caller must also remove
    /// from the engine.
    pub fn delete_ref_doc(&mut self, ref_doc_id: &str, docstore: &DocumentStore) -> Result<Vec<String>> {
        match self {
            IndexStruct::Tree(s) => s.delete_ref_doc(ref_doc_id, docstore),
            IndexStruct::KeywordTable(s) => s.delete_ref_doc(ref_doc_id, docstore),
            IndexStruct::List(s) => s.delete_ref_doc(ref_doc_id, docstore),
            IndexStruct::VectorStore(s) => s.delete(ref_doc_id),
            IndexStruct::Kg(s) => s.delete_ref_doc(ref_doc_id, docstore),
        }
    }

    /// Structural checks plus resolution of every referenced id.
    pub fn validate(&self, docstore: &DocumentStore) -> Result<()> {
        match self {
            IndexStruct::Tree(s) => s.validate()?,
            IndexStruct::VectorStore(s) => s.validate()?,
            _ => {}
        }
        for id in self.node_ids() {
            docstore.resolve(&id)?;
        }
        Ok(())
    }
}

impl From<IndexGraph> for IndexStruct {
    fn from(s: IndexGraph) -> Self { IndexStruct::Tree(s) }
}

impl From<KeywordTable> for IndexStruct {
    fn from(s: KeywordTable) -> Self { IndexStruct::KeywordTable(s) }
}

impl From<IndexList> for IndexStruct {
    fn from(s: IndexList) -> Self { IndexStruct::List(s) }
}

impl From<IndexDict> for IndexStruct {
    fn from(s: IndexDict) -> Self { IndexStruct::VectorStore(s) }
}

impl From<KnowledgeGraph> for IndexStruct {
    fn from(s: KnowledgeGraph) -> Self { IndexStruct::Kg(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Node;

    #[test]
    fn json_carries_type_tag() {
        let mut list = IndexList::new("l1");
        list.add_node("a");
        let s: IndexStruct = list.into();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "list");
        let back: IndexStruct = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn type_reports_vector_backend() {
        let s: IndexStruct = IndexDict::new("v", VectorBackend::Chroma).into();
        assert_eq!(s.get_type(), IndexStructType::VectorStore(VectorBackend::Chroma));
        assert_eq!(s.get_type().to_string(), "vector_store/chroma");
    }

    #[test]
    fn validate_flags_dangling_ids() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![Node::new("a", "x")], false).unwrap();
        let mut table = KeywordTable::new("k");
        table.add_node(["x"], "a");
        let mut s: IndexStruct = table.into();
        s.validate(&store).unwrap();
        if let IndexStruct::KeywordTable(t) = &mut s {
            t.add_node(["y"], "ghost");
        }
        assert!(matches!(s.validate(&store), Err(Error::Corruption(_))));
    }
}
