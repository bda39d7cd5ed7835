//! Indices over indices.
//!
//! A composable graph registers a set of index structs, each with the store
//! that holds its nodes. A node whose `index_id` is set stands in for the
//! whole index of that id; retrieval that lands on such a node continues
//! inside the referenced index. The graph does not detect cycles: it must be
//! built from the leaves upward, and a hand-made cycle recurses until the
//! stack runs out.
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use ragdex_core::traits::{QueryBundle, Retrieval, Retriever};
use ragdex_core::{DocumentStore, Error, IndexStruct, Node, NodeId, Result};

use crate::dispatch::{retriever_for, QueryContext};

/// Id of the node standing in for index `index_id` inside a parent index.
pub fn index_node_id(index_id: &str) -> NodeId {
    format!("{index_id}:index")
}

/// Index nodes for `children`, one per child, carrying the child's summary.
pub fn index_nodes<'c, I>(children: I) -> Result<Vec<Node>>
where
    I: IntoIterator<Item = &'c IndexStruct>,
{
    children
        .into_iter()
        .map(|child| {
            let summary = child
                .summary()
                .ok_or_else(|| Error::InvalidConfig(format!("index '{}' has no summary to compose with", child.index_id())))?;
            Ok(Node::index_node(index_node_id(child.index_id()), summary, child.index_id()))
        })
        .collect()
}

pub struct ComposableGraph {
    root_id: String,
    all_indices: BTreeMap<String, (IndexStruct, Arc<DocumentStore>)>,
}

impl ComposableGraph {
    pub fn new(root: IndexStruct, docstore: Arc<DocumentStore>) -> Self {
        let root_id = root.index_id().to_string();
        let mut all_indices = BTreeMap::new();
        all_indices.insert(root_id.clone(), (root, docstore));
        Self { root_id, all_indices }
    }

    /// Register a sub-index that nodes of some other index may point at.
    pub fn add_index(&mut self, index: IndexStruct, docstore: Arc<DocumentStore>) -> Result<()> {
        let id = index.index_id().to_string();
        if self.all_indices.contains_key(&id) {
            return Err(Error::Duplicate(format!("index '{id}' already in graph")));
        }
        debug!(index_id = %id, kind = %index.get_type(), "added index to graph");
        self.all_indices.insert(id, (index, docstore));
        Ok(())
    }

    pub fn root_id(&self) -> &str { &self.root_id }

    pub fn root(&self) -> Result<&IndexStruct> { self.get_index_struct(&self.root_id) }

    pub fn get_index_struct(&self, index_id: &str) -> Result<&IndexStruct> {
        self.entry(index_id).map(|(s, _)| s)
    }

    pub fn get_docstore(&self, index_id: &str) -> Result<&DocumentStore> {
        self.entry(index_id).map(|(_, d)| d.as_ref())
    }

    pub fn index_ids(&self) -> impl Iterator<Item = &String> { self.all_indices.keys() }

    pub fn len(&self) -> usize { self.all_indices.len() }
    pub fn is_empty(&self) -> bool { self.all_indices.is_empty() }

    fn entry(&self, index_id: &str) -> Result<&(IndexStruct, Arc<DocumentStore>)> {
        self.all_indices
            .get(index_id)
            .ok_or_else(|| Error::NotFound(format!("index '{index_id}' in composable graph")))
    }

    /// Retrieve starting at the root, descending into every index node hit.
    pub fn retrieve(&self, query: &QueryBundle, ctx: &QueryContext<'_>) -> Result<Retrieval> {
        let out = self.retrieve_from(&self.root_id, query, *ctx, 0)?;
        info!(root = %self.root_id, hits = out.nodes.len(), "graph retrieval");
        Ok(out)
    }

    // The vector engine in `ctx` serves the root only; composed vector
    // indices are searched over their in-process embeddings.
    fn retrieve_from(&self, index_id: &str, query: &QueryBundle, ctx: QueryContext<'_>, depth: usize) -> Result<Retrieval> {
        let (index_struct, docstore) = self.entry(index_id)?;
        let ctx = ctx.with_docstore(docstore);
        let ctx = if depth == 0 { ctx } else { ctx.without_engine() };
        let found = retriever_for(index_struct, &ctx)?.retrieve(query)?;
        let mut out = Retrieval { nodes: Vec::new(), similarity: found.similarity };
        for hit in found.nodes {
            match hit.node.index_id.as_deref() {
                Some(child) => {
                    debug!(from = index_id, to = child, depth, "following index node");
                    let sub = self.retrieve_from(child, query, ctx, depth + 1)?;
                    out.similarity.extend(&sub.similarity);
                    out.nodes.extend(sub.nodes);
                }
                None => out.nodes.push(hit),
            }
        }
        Ok(out)
    }

    pub fn as_retriever<'g>(&'g self, ctx: QueryContext<'g>) -> GraphRetriever<'g> {
        GraphRetriever { graph: self, ctx }
    }
}

/// A graph bound to its query context, usable wherever a [`Retriever`] is.
pub struct GraphRetriever<'a> {
    graph: &'a ComposableGraph,
    ctx: QueryContext<'a>,
}

impl Retriever for GraphRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        self.graph.retrieve(query, &self.ctx)
    }
}
