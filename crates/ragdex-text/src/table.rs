//! Keyword-table construction and keyword traversal.
use std::collections::HashMap;
use tracing::{debug, info};

use ragdex_core::traits::{KeywordExtractor, QueryBundle, Retrieval, Retriever};
use ragdex_core::{DocumentStore, Error, KeywordTable, MetadataMode, Node, NodeWithScore, Result};

pub struct KeywordTableBuilder<'a> {
    extractor: &'a dyn KeywordExtractor,
    max_keywords_per_chunk: usize,
}

impl<'a> KeywordTableBuilder<'a> {
    pub fn new(extractor: &'a dyn KeywordExtractor, max_keywords_per_chunk: usize) -> Self {
        Self { extractor, max_keywords_per_chunk }
    }

    pub fn build(&self, index_id: &str, nodes: &[Node]) -> Result<KeywordTable> {
        let mut table = KeywordTable::new(index_id);
        self.insert(&mut table, nodes)?;
        info!(index_id, nodes = nodes.len(), keywords = table.size(), "built keyword table");
        Ok(table)
    }

    /// Extract keywords for each node and register them. Extraction runs for
    /// the whole batch before the table is touched.
    pub fn insert(&self, table: &mut KeywordTable, nodes: &[Node]) -> Result<()> {
        let mut extracted = Vec::with_capacity(nodes.len());
        for node in nodes {
            let keywords = self
                .extractor
                .extract_keywords(&node.content(MetadataMode::None), self.max_keywords_per_chunk)
                .map_err(Error::external)?;
            debug!(node_id = %node.id, keywords = keywords.len(), "extracted keywords");
            extracted.push((node.id.as_str(), keywords));
        }
        for (id, keywords) in extracted {
            table.add_node(keywords, id);
        }
        Ok(())
    }
}

/// Ranks nodes by how many query keywords point at them.
pub struct KeywordTableRetriever<'a> {
    table: &'a KeywordTable,
    docstore: &'a DocumentStore,
    extractor: &'a dyn KeywordExtractor,
    max_keywords_per_query: usize,
    num_chunks_per_query: usize,
}

impl<'a> KeywordTableRetriever<'a> {
    pub fn new(table: &'a KeywordTable, docstore: &'a DocumentStore, extractor: &'a dyn KeywordExtractor) -> Self {
        Self { table, docstore, extractor, max_keywords_per_query: 10, num_chunks_per_query: 10 }
    }

    #[must_use]
    pub fn with_limits(mut self, max_keywords_per_query: usize, num_chunks_per_query: usize) -> Self {
        self.max_keywords_per_query = max_keywords_per_query;
        self.num_chunks_per_query = num_chunks_per_query;
        self
    }

    /// Query keywords present in the table.
    pub fn matched_keywords(&self, query: &str) -> Result<Vec<String>> {
        let keywords = self
            .extractor
            .extract_keywords(query, self.max_keywords_per_query)
            .map_err(Error::external)?;
        Ok(keywords.into_iter().filter(|k| self.table.contains_keyword(k)).collect())
    }
}

impl Retriever for KeywordTableRetriever<'_> {
    fn retrieve(&self, query: &QueryBundle) -> Result<Retrieval> {
        if self.table.is_empty() {
            return Ok(Retrieval::empty());
        }
        let keywords = self.matched_keywords(&query.query_str)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for keyword in &keywords {
            for id in self.table.get_node_ids(keyword, 1)? {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.num_chunks_per_query);
        debug!(index_id = %self.table.index_id, ?keywords, hits = ranked.len(), "keyword retrieval");
        let nodes = ranked
            .into_iter()
            .map(|(id, count)| Ok(NodeWithScore::new(self.docstore.resolve(&id)?.clone(), Some(count as f32))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Retrieval { nodes, ..Retrieval::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleKeywordExtractor;

    fn setup() -> (DocumentStore, Vec<Node>) {
        let nodes = vec![
            Node::new("n1", "Rust ownership and borrowing"),
            Node::new("n2", "Borrowing rules in Rust with lifetimes"),
            Node::new("n3", "Baking bread at home"),
        ];
        let mut store = DocumentStore::new();
        store.add_documents(nodes.clone(), false).unwrap();
        (store, nodes)
    }

    #[test]
    fn ranks_by_keyword_overlap() {
        let (store, nodes) = setup();
        let extractor = SimpleKeywordExtractor::new();
        let table = KeywordTableBuilder::new(&extractor, 10).build("kw", &nodes).unwrap();
        let retriever = KeywordTableRetriever::new(&table, &store, &extractor);
        let out = retriever.retrieve(&QueryBundle::new("rust lifetimes")).unwrap();
        let ids: Vec<&str> = out.nodes.iter().map(NodeWithScore::id).collect();
        assert_eq!(ids, vec!["n2", "n1"]);
        assert_eq!(out.nodes[0].score, Some(2.0));
    }

    #[test]
    fn ties_break_by_node_id() {
        let (store, nodes) = setup();
        let extractor = SimpleKeywordExtractor::new();
        let table = KeywordTableBuilder::new(&extractor, 10).build("kw", &nodes).unwrap();
        let out = KeywordTableRetriever::new(&table, &store, &extractor)
            .retrieve(&QueryBundle::new("borrowing"))
            .unwrap();
        assert_eq!(out.nodes.iter().map(NodeWithScore::id).collect::<Vec<_>>(), vec!["n1", "n2"]);
    }

    #[test]
    fn empty_table_returns_nothing() {
        let store = DocumentStore::new();
        let table = KeywordTable::new("kw");
        let extractor = SimpleKeywordExtractor::new();
        let out = KeywordTableRetriever::new(&table, &store, &extractor).retrieve(&QueryBundle::new("anything")).unwrap();
        assert!(out.nodes.is_empty());
    }
}
