use std::fmt;
use std::str::FromStr;
use tracing::debug;

use ragdex_core::traits::{Embedder, LanguageModel, QueryBundle, Retrieval, Retriever};
use ragdex_core::{DocumentStore, Error, IndexGraph, Node, NodeWithScore, Result};

use super::select::{ChildSelector, EmbeddingChildSelector, LlmChildSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeRetrieverMode {
    /// Descend with a language model choosing children.
    #[default]
    SelectLeaf,
    /// Descend by query/summary embedding similarity.
    SelectLeafEmbedding,
    /// Every leaf, in position order.
    AllLeaf,
    /// The roots only.
    RootOnly,
}

impl TreeRetrieverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeRetrieverMode::SelectLeaf => "select_leaf",
            TreeRetrieverMode::SelectLeafEmbedding => "select_leaf_embedding",
            TreeRetrieverMode::AllLeaf => "all_leaf",
            TreeRetrieverMode::RootOnly => "root",
        }
    }
}

impl fmt::Display for TreeRetrieverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TreeRetrieverMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "select_leaf" => Ok(TreeRetrieverMode::SelectLeaf),
            "select_leaf_embedding" => Ok(TreeRetrieverMode::SelectLeafEmbedding),
            "all_leaf" => Ok(TreeRetrieverMode::AllLeaf),
            "root" => Ok(TreeRetrieverMode::RootOnly),
            other => Err(Error::InvalidConfig(format!("unknown tree retriever mode '{other}'"))),
        }
    }
}

pub struct TreeRetriever<'a> {
    graph: &'a IndexGraph,
    docstore: &'a DocumentStore,
    mode: TreeRetrieverMode,
    selector: Option<Box<dyn ChildSelector + 'a>>,
    child_branch_factor: usize,
    depth_limit: Option<usize>,
}

impl<'a> TreeRetriever<'a> {
    fn with_mode(graph: &'a IndexGraph, docstore: &'a DocumentStore, mode: TreeRetrieverMode, selector: Option<Box<dyn ChildSelector + 'a>>) -> Self {
        Self { graph, docstore, mode, selector, child_branch_factor: 1, depth_limit: None }
    }

    pub fn select_leaf(graph: &'a IndexGraph, docstore: &'a DocumentStore, llm: &'a dyn LanguageModel) -> Self {
        Self::with_mode(graph, docstore, TreeRetrieverMode::SelectLeaf, Some(Box::new(LlmChildSelector::new(llm))))
    }

    pub fn select_leaf_embedding(graph: &'a IndexGraph, docstore: &'a DocumentStore, embedder: &'a dyn Embedder) -> Self {
        Self::with_mode(
            graph,
            docstore,
            TreeRetrieverMode::SelectLeafEmbedding,
            Some(Box::new(EmbeddingChildSelector::new(embedder))),
        )
    }

    pub fn all_leaf(graph: &'a IndexGraph, docstore: &'a DocumentStore) -> Self {
        Self::with_mode(graph, docstore, TreeRetrieverMode::AllLeaf, None)
    }

    pub fn root_only(graph: &'a IndexGraph, docstore: &'a DocumentStore) -> Self {
        Self::with_mode(graph, docstore, TreeRetrieverMode::RootOnly, None)
    }

    pub fn mode(&self) -> TreeRetrieverMode { self.mode }

    /// Number of children followed at every level of a selecting descent.
    #[must_use]
    pub fn with_child_branch_factor(mut self, child_branch_factor: usize) -> Self {
        self.child_branch_factor = child_branch_factor;
        self
    }

    /// Stop a selecting descent after `depth` levels and return the nodes
    /// reached there, even if they are summaries.
    #[must_use]
    pub fn with_depth_limit(mut self, depth: usize) -> Self {
        self.depth_limit = Some(depth);
        self
    }

    fn nodes_of<'n, I>(&self, ids: I) -> Result<Vec<NodeWithScore>>
    where
        I: IntoIterator<Item = &'n String>,
    {
        ids.into_iter().map(|id| Ok(NodeWithScore::new(self.docstore.resolve(id)?.clone(), None))).collect()
    }

    fn descend(&self, selector: &dyn ChildSelector, query: &QueryBundle, parent: Option<&str>, depth: usize, out: &mut Retrieval) -> Result<()> {
        let children = self.graph.get_children(parent)?;
        let candidates: Vec<&Node> = children.values().map(|id| self.docstore.resolve(id)).collect::<Result<_>>()?;
        let picks = selector.select(query, &candidates, self.child_branch_factor)?;
        debug!(index_id = %self.graph.index_id, parent, depth, picks = picks.len(), "tree level");
        for (i, score) in picks {
            let child = candidates[i];
            if let Some(score) = score {
                out.similarity.add(child.id.clone(), score);
            }
            let at_limit = self.depth_limit.map_or(false, |limit| depth + 1 >= limit);
            if at_limit || self.graph.is_leaf(&child.id) {
                out.nodes.push(NodeWithScore::new(child.clone(), score));
            } else {
                self.descend(selector, query, Some(&child.id), depth + 1, out)?;
            }
        }
        Ok(())
    }
}

impl Retriever for TreeRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        if self.child_branch_factor == 0 {
            return Err(Error::InvalidConfig("child_branch_factor must be at least 1".to_string()));
        }
        if self.depth_limit == Some(0) {
            return Err(Error::InvalidConfig("tree depth limit must be at least 1".to_string()));
        }
        if self.graph.is_empty() {
            return Ok(Retrieval::empty());
        }
        let out = match (self.mode, self.selector.as_deref()) {
            (TreeRetrieverMode::AllLeaf, _) => {
                let leaves = self.graph.leaf_ids();
                Retrieval { nodes: self.nodes_of(&leaves)?, ..Retrieval::default() }
            }
            (TreeRetrieverMode::RootOnly, _) => {
                Retrieval { nodes: self.nodes_of(self.graph.root_nodes().values())?, ..Retrieval::default() }
            }
            (mode, Some(selector)) => {
                let mut out = Retrieval::empty();
                self.descend(selector, query, None, 0, &mut out)?;
                debug!(index_id = %self.graph.index_id, %mode, hits = out.nodes.len(), "tree retrieval");
                out
            }
            (mode, None) => return Err(Error::InvalidConfig(format!("tree mode {mode} needs a child selector"))),
        };
        Ok(out)
    }
}
