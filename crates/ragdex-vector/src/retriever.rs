use tracing::debug;

use ragdex_core::traits::{Embedder, MetadataFilters, QueryBundle, Retrieval, Retriever, VectorEngine};
use ragdex_core::{DocumentStore, Error, IndexDict, NodeWithScore, Result};
use ragdex_embed::top_k_by_similarity;

/// Top-k similarity traversal over a vector dict.
pub struct VectorRetriever<'a> {
    dict: &'a IndexDict,
    docstore: &'a DocumentStore,
    embedder: &'a dyn Embedder,
    engine: Option<&'a dyn VectorEngine>,
    similarity_top_k: usize,
    filters: Option<MetadataFilters>,
}

impl<'a> VectorRetriever<'a> {
    pub fn new(dict: &'a IndexDict, docstore: &'a DocumentStore, embedder: &'a dyn Embedder) -> Self {
        Self { dict, docstore, embedder, engine: None, similarity_top_k: 2, filters: None }
    }

    #[must_use]
    pub fn with_engine(mut self, engine: &'a dyn VectorEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, similarity_top_k: usize) -> Self {
        self.similarity_top_k = similarity_top_k;
        self
    }

    /// Only consider vectors whose node metadata matches every filter.
    #[must_use]
    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// (vector id, score) pairs, best first, ties in insertion order.
    fn query_ids(&self, embedding: &[f32]) -> Result<Vec<(String, f32)>> {
        match self.engine {
            Some(engine) => engine.query(embedding, self.similarity_top_k, self.filters.as_ref()).map_err(Error::external),
            None if self.dict.backend.is_in_process() => {
                let mut candidates = Vec::with_capacity(self.dict.embeddings_dict().len());
                for (vector_id, v) in self.dict.embeddings_dict() {
                    if let Some(filters) = &self.filters {
                        let node = self.docstore.resolve(self.dict.get_node_id(vector_id)?)?;
                        if !filters.matches(&node.metadata) {
                            continue;
                        }
                    }
                    candidates.push((vector_id.clone(), v.as_slice()));
                }
                Ok(top_k_by_similarity(embedding, candidates, self.similarity_top_k, None))
            }
            None => Err(Error::InvalidConfig(format!(
                "vector index '{}' uses the {} backend but no vector engine is bound",
                self.dict.index_id, self.dict.backend
            ))),
        }
    }
}

impl Retriever for VectorRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        if self.dict.is_empty() {
            return Ok(Retrieval::empty());
        }
        let embedding = query.embedding_with(self.embedder)?;
        let hits = self.query_ids(&embedding)?;
        let mut out = Retrieval::empty();
        for (vector_id, score) in hits {
            let node_id = self.dict.get_node_id(&vector_id)?;
            let node = self.docstore.resolve(node_id)?;
            out.similarity.add(node_id.clone(), score);
            out.nodes.push(NodeWithScore::new(node.clone(), Some(score)));
        }
        debug!(index_id = %self.dict.index_id, hits = out.nodes.len(), "vector retrieval");
        Ok(out)
    }
}
