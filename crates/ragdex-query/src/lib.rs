//! ragdex-query
//!
//! Tree construction and traversal, list traversal, per-variant dispatch,
//! composable graphs, node postprocessors and the retriever query engine.
pub mod dispatch;
pub mod engine;
pub mod graph;
pub mod list;
pub mod postprocessor;
pub mod tree;

pub use dispatch::{retriever_for, QueryContext};
pub use engine::RetrieverQueryEngine;
pub use graph::{index_node_id, index_nodes, ComposableGraph, GraphRetriever};
pub use list::{ListRetriever, ListRetrieverMode};
pub use postprocessor::{
    KeywordNodePostprocessor, NodePostprocessor, PostprocessContext, PostprocessorChain, PrevNextMode,
    PrevNextNodePostprocessor, SimilarityPostprocessor,
};
pub use tree::{
    ChildSelector, EmbeddingChildSelector, ExtractiveSummarizer, LlmChildSelector, LlmSummarizer, Summarizer, TreeBuilder,
    TreeInserter, TreeRetriever, TreeRetrieverMode,
};

use ragdex_core::traits::Embedder;
use ragdex_core::{Error, MetadataMode, Node, Result};

/// Embedding of every node, in order: the stored one when present, otherwise
/// computed in a single batch.
pub(crate) fn node_embeddings(embedder: &dyn Embedder, nodes: &[&Node]) -> Result<Vec<Vec<f32>>> {
    let missing: Vec<String> = nodes.iter().filter(|n| n.embedding.is_none()).map(|n| n.content(MetadataMode::None)).collect();
    let fresh = if missing.is_empty() { Vec::new() } else { embedder.embed_batch(&missing).map_err(Error::external)? };
    if fresh.len() != missing.len() {
        return Err(Error::External(format!("embedder returned {} vectors for {} texts", fresh.len(), missing.len())));
    }
    let mut fresh = fresh.into_iter();
    Ok(nodes
        .iter()
        .map(|n| match &n.embedding {
            Some(e) => e.clone(),
            None => fresh.next().unwrap_or_default(),
        })
        .collect())
}
