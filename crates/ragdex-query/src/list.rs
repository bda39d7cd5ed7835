use std::fmt;
use std::str::FromStr;
use tracing::debug;

use ragdex_core::traits::{Embedder, QueryBundle, Retrieval, Retriever};
use ragdex_core::{DocumentStore, Error, IndexList, Node, NodeWithScore, Result};
use ragdex_embed::top_k_by_similarity;

use crate::node_embeddings;
use crate::postprocessor::passes_keyword_filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListRetrieverMode {
    /// Every node in list order.
    #[default]
    Default,
    /// The `similarity_top_k` nodes closest to the query.
    Embedding,
}

impl fmt::Display for ListRetrieverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListRetrieverMode::Default => "default",
            ListRetrieverMode::Embedding => "embedding",
        })
    }
}

impl FromStr for ListRetrieverMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(ListRetrieverMode::Default),
            "embedding" => Ok(ListRetrieverMode::Embedding),
            other => Err(Error::InvalidConfig(format!("unknown list retriever mode '{other}'"))),
        }
    }
}

pub struct ListRetriever<'a> {
    list: &'a IndexList,
    docstore: &'a DocumentStore,
    embedder: Option<&'a dyn Embedder>,
    similarity_top_k: usize,
    required_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
}

impl<'a> ListRetriever<'a> {
    /// Full scan in list order.
    pub fn new(list: &'a IndexList, docstore: &'a DocumentStore) -> Self {
        Self {
            list,
            docstore,
            embedder: None,
            similarity_top_k: 1,
            required_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
        }
    }

    /// Top-k by embedding similarity. Nodes without a stored embedding are
    /// embedded on the fly.
    pub fn embedding(list: &'a IndexList, docstore: &'a DocumentStore, embedder: &'a dyn Embedder) -> Self {
        Self { embedder: Some(embedder), ..Self::new(list, docstore) }
    }

    pub fn mode(&self) -> ListRetrieverMode {
        if self.embedder.is_some() { ListRetrieverMode::Embedding } else { ListRetrieverMode::Default }
    }

    #[must_use]
    pub fn with_top_k(mut self, similarity_top_k: usize) -> Self {
        self.similarity_top_k = similarity_top_k;
        self
    }

    /// Only keep nodes containing every `required` word and none of `excluded`.
    #[must_use]
    pub fn with_keyword_filter(mut self, required: Vec<String>, excluded: Vec<String>) -> Self {
        self.required_keywords = required;
        self.exclude_keywords = excluded;
        self
    }

    fn candidates(&self) -> Result<Vec<&'a Node>> {
        let mut out = Vec::with_capacity(self.list.len());
        for id in self.list.nodes() {
            let node = self.docstore.resolve(id)?;
            if passes_keyword_filter(&node.text, &self.required_keywords, &self.exclude_keywords) {
                out.push(node);
            }
        }
        Ok(out)
    }

    fn rank(&self, embedder: &dyn Embedder, query: &QueryBundle, nodes: Vec<&'a Node>) -> Result<Retrieval> {
        let query_embedding = query.embedding_with(embedder)?;
        let embeddings = node_embeddings(embedder, &nodes)?;
        let ranked = top_k_by_similarity(
            &query_embedding,
            embeddings.iter().enumerate().map(|(i, e)| (i, e.as_slice())),
            self.similarity_top_k,
            None,
        );
        let mut out = Retrieval::empty();
        for (i, score) in ranked {
            out.similarity.add(nodes[i].id.clone(), score);
            out.nodes.push(NodeWithScore::new(nodes[i].clone(), Some(score)));
        }
        Ok(out)
    }
}

impl Retriever for ListRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        if self.list.is_empty() {
            return Ok(Retrieval::empty());
        }
        let nodes = self.candidates()?;
        let out = match self.embedder {
            None => Retrieval { nodes: nodes.into_iter().map(|n| NodeWithScore::new(n.clone(), None)).collect(), ..Retrieval::default() },
            Some(embedder) => self.rank(embedder, query, nodes)?,
        };
        debug!(index_id = %self.list.index_id, mode = %self.mode(), hits = out.nodes.len(), "list retrieval");
        Ok(out)
    }
}
