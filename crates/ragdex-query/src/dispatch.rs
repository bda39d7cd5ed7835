//! One traversal per index struct variant.
use ragdex_core::config::RetrievalSettings;
use ragdex_core::traits::{Embedder, KeywordExtractor, LanguageModel, Retriever, VectorEngine};
use ragdex_core::{DocumentStore, Error, IndexStruct, Result};
use ragdex_text::{KeywordTableRetriever, KgRetriever};
use ragdex_vector::VectorRetriever;

use crate::list::{ListRetriever, ListRetrieverMode};
use crate::tree::{TreeRetriever, TreeRetrieverMode};

/// Collaborators and knobs shared by every traversal.
#[derive(Clone, Copy)]
pub struct QueryContext<'a> {
    pub docstore: &'a DocumentStore,
    pub embedder: &'a dyn Embedder,
    pub keyword_extractor: &'a dyn KeywordExtractor,
    pub llm: Option<&'a dyn LanguageModel>,
    pub engine: Option<&'a dyn VectorEngine>,
    pub settings: &'a RetrievalSettings,
    pub tree_mode: TreeRetrieverMode,
    pub list_mode: ListRetrieverMode,
}

impl<'a> QueryContext<'a> {
    pub fn new(
        docstore: &'a DocumentStore,
        embedder: &'a dyn Embedder,
        keyword_extractor: &'a dyn KeywordExtractor,
        settings: &'a RetrievalSettings,
    ) -> Self {
        Self {
            docstore,
            embedder,
            keyword_extractor,
            llm: None,
            engine: None,
            settings,
            tree_mode: TreeRetrieverMode::SelectLeafEmbedding,
            list_mode: ListRetrieverMode::Default,
        }
    }

    #[must_use]
    pub fn with_docstore(mut self, docstore: &'a DocumentStore) -> Self {
        self.docstore = docstore;
        self
    }

    #[must_use]
    pub fn with_llm(mut self, llm: &'a dyn LanguageModel) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: &'a dyn VectorEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn without_engine(mut self) -> Self {
        self.engine = None;
        self
    }

    #[must_use]
    pub fn with_tree_mode(mut self, mode: TreeRetrieverMode) -> Self {
        self.tree_mode = mode;
        self
    }

    #[must_use]
    pub fn with_list_mode(mut self, mode: ListRetrieverMode) -> Self {
        self.list_mode = mode;
        self
    }
}

/// The traversal for `index_struct`, chosen by its variant.
pub fn retriever_for<'a>(index_struct: &'a IndexStruct, ctx: &QueryContext<'a>) -> Result<Box<dyn Retriever + 'a>> {
    let settings = ctx.settings;
    let retriever: Box<dyn Retriever + 'a> = match index_struct {
        IndexStruct::Tree(graph) => {
            let tree = match ctx.tree_mode {
                TreeRetrieverMode::SelectLeaf => {
                    let llm = ctx.llm.ok_or_else(|| {
                        Error::InvalidConfig(format!("tree '{}' in select_leaf mode needs a language model", graph.index_id))
                    })?;
                    TreeRetriever::select_leaf(graph, ctx.docstore, llm)
                }
                TreeRetrieverMode::SelectLeafEmbedding => TreeRetriever::select_leaf_embedding(graph, ctx.docstore, ctx.embedder),
                TreeRetrieverMode::AllLeaf => TreeRetriever::all_leaf(graph, ctx.docstore),
                TreeRetrieverMode::RootOnly => TreeRetriever::root_only(graph, ctx.docstore),
            };
            Box::new(tree.with_child_branch_factor(settings.child_branch_factor))
        }
        IndexStruct::KeywordTable(table) => Box::new(
            KeywordTableRetriever::new(table, ctx.docstore, ctx.keyword_extractor)
                .with_limits(settings.max_keywords_per_query, settings.num_chunks_per_query),
        ),
        IndexStruct::List(list) => match ctx.list_mode {
            ListRetrieverMode::Default => Box::new(ListRetriever::new(list, ctx.docstore)),
            ListRetrieverMode::Embedding => {
                Box::new(ListRetriever::embedding(list, ctx.docstore, ctx.embedder).with_top_k(settings.similarity_top_k))
            }
        },
        IndexStruct::VectorStore(dict) => {
            let vector = VectorRetriever::new(dict, ctx.docstore, ctx.embedder).with_top_k(settings.similarity_top_k);
            match ctx.engine {
                Some(engine) => Box::new(vector.with_engine(engine)),
                None => Box::new(vector),
            }
        }
        IndexStruct::Kg(kg) => Box::new(
            KgRetriever::new(kg, ctx.docstore, ctx.keyword_extractor)
                .with_limits(settings.max_keywords_per_query, settings.num_chunks_per_query),
        ),
    };
    Ok(retriever)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdex_core::traits::QueryBundle;
    use ragdex_core::{IndexGraph, IndexList, KeywordTable, Node};
    use ragdex_embed::HashEmbedder;
    use ragdex_text::SimpleKeywordExtractor;

    #[test]
    fn select_leaf_without_llm_is_config_error() {
        let store = DocumentStore::new();
        let embedder = HashEmbedder::new(8).unwrap();
        let extractor = SimpleKeywordExtractor::new();
        let settings = RetrievalSettings::default();
        let ctx = QueryContext::new(&store, &embedder, &extractor, &settings).with_tree_mode(TreeRetrieverMode::SelectLeaf);
        let tree = IndexStruct::Tree(IndexGraph::new("t"));
        assert!(matches!(retriever_for(&tree, &ctx), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn every_empty_variant_returns_nothing() {
        let store = DocumentStore::new();
        let embedder = HashEmbedder::new(8).unwrap();
        let extractor = SimpleKeywordExtractor::new();
        let settings = RetrievalSettings::default();
        let ctx = QueryContext::new(&store, &embedder, &extractor, &settings);
        let structs: Vec<IndexStruct> = vec![
            IndexGraph::new("t").into(),
            KeywordTable::new("k").into(),
            IndexList::new("l").into(),
            ragdex_core::IndexDict::new("v", ragdex_core::VectorBackend::Simple).into(),
            ragdex_core::KnowledgeGraph::new("g").into(),
        ];
        let q = QueryBundle::new("what about the well pump");
        for s in &structs {
            let out = retriever_for(s, &ctx).unwrap().retrieve(&q).unwrap();
            assert!(out.nodes.is_empty(), "{} returned nodes", s.get_type());
        }
        let list_ctx = ctx.with_list_mode(ListRetrieverMode::Embedding);
        assert!(retriever_for(&structs[2], &list_ctx).unwrap().retrieve(&q).unwrap().nodes.is_empty());
    }

    #[test]
    fn list_dispatch_honours_mode() {
        let mut store = DocumentStore::new();
        store.add_documents(vec![Node::new("a", "alpha"), Node::new("b", "beta")], false).unwrap();
        let mut list = IndexList::new("l");
        list.add_node("a");
        list.add_node("b");
        let s = IndexStruct::List(list);
        let embedder = HashEmbedder::new(32).unwrap();
        let extractor = SimpleKeywordExtractor::new();
        let settings = RetrievalSettings { similarity_top_k: 1, ..RetrievalSettings::default() };
        let ctx = QueryContext::new(&store, &embedder, &extractor, &settings);
        let q = QueryBundle::new("beta");
        assert_eq!(retriever_for(&s, &ctx).unwrap().retrieve(&q).unwrap().nodes.len(), 2);
        let top = retriever_for(&s, &ctx.with_list_mode(ListRetrieverMode::Embedding)).unwrap().retrieve(&q).unwrap();
        assert_eq!(top.nodes[0].id(), "b");
        assert_eq!(top.nodes.len(), 1);
    }
}
