use std::sync::Arc;

use tempfile::TempDir;

use ragdex_core::config::{ChunkingSettings, RetrievalSettings};
use ragdex_core::data_processor::NodeParser;
use ragdex_core::traits::{LanguageModel, TripletExtractor};
use ragdex_core::{Document, IndexList, IndexStruct, QueryBundle, StorageContext, Triplet, VectorBackend};
use ragdex_embed::HashEmbedder;
use ragdex_query::{
    index_nodes, ComposableGraph, ExtractiveSummarizer, LlmChildSelector, PrevNextMode, PrevNextNodePostprocessor,
    QueryContext, RetrieverQueryEngine, SimilarityPostprocessor, TreeBuilder, TreeInserter, TreeRetrieverMode,
};
use ragdex_text::{KeywordTableBuilder, KnowledgeGraphBuilder, SimpleKeywordExtractor};
use ragdex_vector::VectorIndexBuilder;

struct PumpTriplets;

impl TripletExtractor for PumpTriplets {
    fn extract_triplets(&self, text: &str, _max: usize) -> anyhow::Result<Vec<Triplet>> {
        Ok(if text.contains("pump") { vec![Triplet::new("pump", "draws", "water")] } else { Vec::new() })
    }
}

/// Always picks the last listed choice.
struct PickLast;

impl LanguageModel for PickLast {
    fn predict(&self, _template: &str, vars: &[(&str, &str)]) -> anyhow::Result<String> {
        let n = vars.iter().find(|(k, _)| *k == "num_chunks").map_or("1", |(_, v)| *v);
        Ok(format!("ANSWER: {n}"))
    }
}

fn corpus() -> Vec<Document> {
    vec![
        Document::with_id("water", "The hand pump sits on the well.\n\nRainwater fills the cistern in spring.\n\nA filter cleans the water."),
        Document::with_id("power", "Solar panels face south.\n\nBatteries store the charge overnight."),
    ]
}

fn build_all(dir: &std::path::Path) {
    let embedder = HashEmbedder::new(64).unwrap();
    let extractor = SimpleKeywordExtractor::new();
    let parser = NodeParser::new(ChunkingSettings { max_tokens: 12, overlap_percent: 0.0 }).unwrap();
    let mut nodes = parser.get_nodes_from_documents(&corpus());
    assert!(nodes.len() >= 5);

    let mut ctx = StorageContext::new();
    let vector = VectorIndexBuilder::new(&embedder).build("vector", VectorBackend::Simple, &mut nodes).unwrap();
    ctx.docstore.add_documents(nodes.clone(), false).unwrap();

    let mut list = IndexList::new("list");
    for n in &nodes { list.add_node(&n.id); }
    let keyword = KeywordTableBuilder::new(&extractor, 10).build("keyword", &nodes).unwrap();
    let kg = KnowledgeGraphBuilder::new(&PumpTriplets, 2).build("kg", &nodes).unwrap();
    let tree = TreeBuilder::new(&ExtractiveSummarizer, 2).unwrap().build("tree", &nodes, &mut ctx.docstore).unwrap();

    for s in [IndexStruct::from(list), keyword.into(), kg.into(), vector.into(), tree.into()] {
        ctx.index_store.add(s).unwrap();
    }
    ctx.persist(dir).unwrap();
}

#[test]
fn every_struct_answers_after_reload() {
    let tmp = TempDir::new().unwrap();
    build_all(tmp.path());
    let ctx = StorageContext::load(tmp.path()).unwrap();

    let embedder = HashEmbedder::new(64).unwrap();
    let extractor = SimpleKeywordExtractor::new();
    let settings = RetrievalSettings { similarity_top_k: 1, ..RetrievalSettings::default() };
    let llm = PickLast;
    let qctx = QueryContext::new(&ctx.docstore, &embedder, &extractor, &settings).with_llm(&llm);
    let q = QueryBundle::new("hand pump well");

    for id in ["list", "keyword", "kg", "vector", "tree"] {
        let index = ctx.index_store.get(id).unwrap();
        let out = RetrieverQueryEngine::for_index(index, &qctx).unwrap().query(&q).unwrap();
        assert!(!out.nodes.is_empty(), "{id} found nothing");
    }

    let vector = ctx.index_store.get("vector").unwrap();
    let out = RetrieverQueryEngine::for_index(vector, &qctx)
        .unwrap()
        .with_postprocessor(SimilarityPostprocessor::new(0.1))
        .with_postprocessor(PrevNextNodePostprocessor::new(1, PrevNextMode::Next))
        .query(&q)
        .unwrap();
    assert_eq!(out.nodes[0].id(), "water:0");
    assert_eq!(out.nodes[1].id(), "water:1");

    let tree = ctx.index_store.get("tree").unwrap();
    for mode in [TreeRetrieverMode::SelectLeaf, TreeRetrieverMode::AllLeaf, TreeRetrieverMode::RootOnly] {
        let out = RetrieverQueryEngine::for_index(tree, &qctx.with_tree_mode(mode)).unwrap().query(&q).unwrap();
        assert!(!out.nodes.is_empty(), "tree {mode} found nothing");
    }
}

#[test]
fn tree_insert_with_llm_selector_keeps_invariants() {
    let tmp = TempDir::new().unwrap();
    build_all(tmp.path());
    let mut ctx = StorageContext::load(tmp.path()).unwrap();
    let IndexStruct::Tree(mut tree) = ctx.index_store.remove("tree").unwrap() else { panic!("tree kind") };
    let before = tree.leaf_ids().len();

    let llm = PickLast;
    let selector = LlmChildSelector::for_insert(&llm);
    let inserter = TreeInserter::new(&ExtractiveSummarizer, &selector, 2).unwrap();
    let new = NodeParser::new(ChunkingSettings::default())
        .unwrap()
        .get_nodes_from_documents(&[Document::with_id("wood", "Split oak dries in a year.")]);
    inserter.insert(&mut tree, new, &mut ctx.docstore).unwrap();

    assert_eq!(tree.leaf_ids().len(), before + 1);
    tree.validate().unwrap();
    ctx.index_store.add(tree.into()).unwrap();
    ctx.persist(tmp.path()).unwrap();
    StorageContext::load(tmp.path()).unwrap();
}

#[test]
fn graph_over_persisted_indices() {
    let tmp = TempDir::new().unwrap();
    build_all(tmp.path());
    let mut ctx = StorageContext::load(tmp.path()).unwrap();
    let mut keyword = ctx.index_store.remove("keyword").unwrap();
    keyword.set_summary("keywords about pumps, wells and solar power");
    let mut list = ctx.index_store.remove("list").unwrap();
    list.set_summary("every chunk in order");

    let children = index_nodes([&keyword, &list]).unwrap();
    let mut root = IndexList::new("root");
    for n in &children { root.add_node(&n.id); }
    let mut root_store = ragdex_core::DocumentStore::new();
    root_store.add_documents(children, false).unwrap();

    let shared = Arc::new(ctx.docstore.clone());
    let mut graph = ComposableGraph::new(root.into(), Arc::new(root_store));
    graph.add_index(keyword, Arc::clone(&shared)).unwrap();
    graph.add_index(list, shared).unwrap();

    let embedder = HashEmbedder::new(64).unwrap();
    let extractor = SimpleKeywordExtractor::new();
    let settings = RetrievalSettings::default();
    let qctx = QueryContext::new(&ctx.docstore, &embedder, &extractor, &settings);
    let out = RetrieverQueryEngine::new(Box::new(graph.as_retriever(qctx)))
        .query(&QueryBundle::new("solar batteries"))
        .unwrap();
    assert!(out.nodes.iter().all(|n| n.node.index_id.is_none()));
    assert!(out.nodes.iter().any(|n| n.id().starts_with("power:")));
    assert!(out.nodes.len() > ctx.docstore.nodes_for_ref_doc("power").len());
}
