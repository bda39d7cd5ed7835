//! Knowledge-graph construction and traversal.
use std::collections::HashSet;
use tracing::{debug, info};

use ragdex_core::traits::{Embedder, KeywordExtractor, QueryBundle, Retrieval, Retriever, TripletExtractor};
use ragdex_core::{DocumentStore, Error, KnowledgeGraph, MetadataMode, Node, NodeWithScore, Result};

pub struct KnowledgeGraphBuilder<'a> {
    extractor: &'a dyn TripletExtractor,
    max_triplets_per_chunk: usize,
    embedder: Option<&'a dyn Embedder>,
}

impl<'a> KnowledgeGraphBuilder<'a> {
    pub fn new(extractor: &'a dyn TripletExtractor, max_triplets_per_chunk: usize) -> Self {
        Self { extractor, max_triplets_per_chunk, embedder: None }
    }

    /// Also embed each triplet's text into the graph's embedding dict.
    #[must_use]
    pub fn with_embedder(mut self, embedder: &'a dyn Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn build(&self, index_id: &str, nodes: &[Node]) -> Result<KnowledgeGraph> {
        let mut kg = KnowledgeGraph::new(index_id);
        self.insert(&mut kg, nodes)?;
        info!(index_id, nodes = nodes.len(), keywords = kg.size(), "built knowledge graph");
        Ok(kg)
    }

    /// Extract triplets (and embeddings) for the whole batch, then register them.
    pub fn insert(&self, kg: &mut KnowledgeGraph, nodes: &[Node]) -> Result<()> {
        let mut extracted = Vec::with_capacity(nodes.len());
        for node in nodes {
            let triplets = self
                .extractor
                .extract_triplets(&node.content(MetadataMode::None), self.max_triplets_per_chunk)
                .map_err(Error::external)?;
            debug!(node_id = %node.id, triplets = triplets.len(), "extracted triplets");
            extracted.push((node.id.as_str(), triplets));
        }
        let mut embeddings = Vec::new();
        if let Some(embedder) = self.embedder {
            let texts: Vec<String> = extracted.iter().flat_map(|(_, ts)| ts.iter().map(|t| t.to_string())).collect();
            if !texts.is_empty() {
                let vectors = embedder.embed_batch(&texts).map_err(Error::external)?;
                embeddings = texts.into_iter().zip(vectors).collect();
            }
        }
        for (id, triplets) in &extracted {
            for triplet in triplets {
                kg.upsert_triplet(triplet, id);
            }
        }
        for (text, vector) in embeddings {
            kg.add_embedding(text, vector);
        }
        Ok(())
    }
}

/// Keyword lookup through the relation map, one hop deep.
pub struct KgRetriever<'a> {
    kg: &'a KnowledgeGraph,
    docstore: &'a DocumentStore,
    extractor: &'a dyn KeywordExtractor,
    max_keywords_per_query: usize,
    num_chunks_per_query: usize,
}

impl<'a> KgRetriever<'a> {
    pub fn new(kg: &'a KnowledgeGraph, docstore: &'a DocumentStore, extractor: &'a dyn KeywordExtractor) -> Self {
        Self { kg, docstore, extractor, max_keywords_per_query: 10, num_chunks_per_query: 10 }
    }

    #[must_use]
    pub fn with_limits(mut self, max_keywords_per_query: usize, num_chunks_per_query: usize) -> Self {
        self.max_keywords_per_query = max_keywords_per_query;
        self.num_chunks_per_query = num_chunks_per_query;
        self
    }

    /// Retrieved nodes plus the `(subject, relation, object)` texts of every
    /// matched keyword.
    pub fn retrieve_with_rel_texts(&self, query: &QueryBundle) -> Result<(Retrieval, Vec<String>)> {
        if self.kg.is_empty() {
            return Ok((Retrieval::empty(), Vec::new()));
        }
        let keywords = self
            .extractor
            .extract_keywords(&query.query_str, self.max_keywords_per_query)
            .map_err(Error::external)?;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        let mut rel_texts = Vec::new();
        for keyword in &keywords {
            for id in self.kg.get_node_ids(keyword, 1)? {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            rel_texts.extend(self.kg.get_rel_map_texts(keyword));
        }
        ids.truncate(self.num_chunks_per_query);
        debug!(index_id = %self.kg.index_id, ?keywords, hits = ids.len(), rels = rel_texts.len(), "kg retrieval");
        let nodes = ids
            .iter()
            .map(|id| Ok(NodeWithScore::new(self.docstore.resolve(id)?.clone(), None)))
            .collect::<Result<Vec<_>>>()?;
        Ok((Retrieval { nodes, ..Retrieval::default() }, rel_texts))
    }
}

impl Retriever for KgRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        Ok(self.retrieve_with_rel_texts(query)?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleKeywordExtractor;
    use ragdex_core::Triplet;

    struct Fixed;

    impl TripletExtractor for Fixed {
        fn extract_triplets(&self, text: &str, _max: usize) -> anyhow::Result<Vec<Triplet>> {
            Ok(match text {
                "alice knows bob" => vec![Triplet::new("alice", "knows", "bob")],
                "bob writes rust" => vec![Triplet::new("bob", "writes", "rust")],
                _ => vec![],
            })
        }
    }

    #[test]
    fn builds_and_follows_relations() {
        let nodes = vec![Node::new("n1", "alice knows bob"), Node::new("n2", "bob writes rust")];
        let mut store = DocumentStore::new();
        store.add_documents(nodes.clone(), false).unwrap();
        let kg = KnowledgeGraphBuilder::new(&Fixed, 5).build("kg", &nodes).unwrap();
        let extractor = SimpleKeywordExtractor::new();
        let (out, rels) = KgRetriever::new(&kg, &store, &extractor)
            .retrieve_with_rel_texts(&QueryBundle::new("alice"))
            .unwrap();
        assert_eq!(out.nodes.iter().map(NodeWithScore::id).collect::<Vec<_>>(), vec!["n1", "n2"]);
        assert_eq!(rels, vec!["(alice, knows, bob)"]);
    }

    #[test]
    fn empty_graph_returns_nothing() {
        let kg = KnowledgeGraph::new("kg");
        let store = DocumentStore::new();
        let extractor = SimpleKeywordExtractor::new();
        assert!(KgRetriever::new(&kg, &store, &extractor).retrieve(&QueryBundle::new("x")).unwrap().nodes.is_empty());
    }
}
