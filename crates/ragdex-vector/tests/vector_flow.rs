use tempfile::TempDir;

use ragdex_core::traits::{MetadataFilters, VectorEngine, VectorEntry};
use ragdex_core::{Error, IndexStruct, Node, QueryBundle, Retriever, StorageContext, VectorBackend};
use ragdex_embed::HashEmbedder;
use ragdex_vector::{delete_ref_doc_everywhere, SimpleVectorStore, VectorIndexBuilder, VectorRetriever};

#[test]
fn vector_index_persist_reload_query_delete() {
    let tmp = TempDir::new().unwrap();
    let embedder = HashEmbedder::new(64).unwrap();
    let mut engine = SimpleVectorStore::new(64);
    let mut nodes = vec![
        Node::new("a:0", "campfire tinder and kindling").with_ref_doc("a"),
        Node::new("a:1", "bow drill friction fire").with_ref_doc("a"),
        Node::new("b:0", "ethernet switch configuration").with_ref_doc("b"),
    ];
    let dict = VectorIndexBuilder::new(&embedder)
        .with_engine(&mut engine)
        .build("vec", VectorBackend::Simple, &mut nodes)
        .expect("build");

    let mut ctx = StorageContext::new();
    ctx.docstore.add_documents(nodes, false).unwrap();
    ctx.index_store.add(dict.into()).unwrap();
    ctx.persist(tmp.path()).unwrap();
    engine.persist(tmp.path()).unwrap();

    let mut ctx = StorageContext::load(tmp.path()).expect("load ctx");
    let mut engine = SimpleVectorStore::load(tmp.path()).expect("load engine");
    assert_eq!(engine.len(), 3);
    {
        let IndexStruct::VectorStore(dict) = ctx.index_store.get("vec").unwrap() else { panic!("kind") };
        let hits = VectorRetriever::new(dict, &ctx.docstore, &embedder)
            .with_engine(&engine)
            .with_top_k(2)
            .retrieve(&QueryBundle::new("ethernet switch"))
            .unwrap();
        assert_eq!(hits.nodes[0].id(), "b:0");
        assert!(hits.nodes[0].node.embedding.is_some());
    }

    let removed = delete_ref_doc_everywhere(&mut ctx, &mut engine, "a").expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(engine.len(), 1);
    assert_eq!(ctx.docstore.len(), 1);
}

/// Engine whose deletes always fail.
struct Unreachable(SimpleVectorStore);

impl VectorEngine for Unreachable {
    fn add(&mut self, entries: Vec<VectorEntry>) -> anyhow::Result<Vec<String>> { self.0.add(entries) }

    fn query(&self, embedding: &[f32], k: usize, filter: Option<&MetadataFilters>) -> anyhow::Result<Vec<(String, f32)>> {
        self.0.query(embedding, k, filter)
    }

    fn delete(&mut self, _ref_doc_id: &str) -> anyhow::Result<()> { anyhow::bail!("connection refused") }
}

#[test]
fn failed_engine_delete_keeps_context() {
    let embedder = HashEmbedder::new(16).unwrap();
    let mut engine = Unreachable(SimpleVectorStore::new(16));
    let mut nodes = vec![Node::new("a:0", "well water").with_ref_doc("a"), Node::new("b:0", "solar panel").with_ref_doc("b")];
    let dict = VectorIndexBuilder::new(&embedder)
        .with_engine(&mut engine)
        .build("vec", VectorBackend::Chroma, &mut nodes)
        .unwrap();
    let mut ctx = StorageContext::new();
    ctx.docstore.add_documents(nodes, false).unwrap();
    ctx.index_store.add(dict.into()).unwrap();
    let before = ctx.clone();

    let err = delete_ref_doc_everywhere(&mut ctx, &mut engine, "a").unwrap_err();
    assert!(matches!(err, Error::External(_)));
    assert_eq!(ctx, before);
    assert_eq!(engine.0.len(), 2);
}
