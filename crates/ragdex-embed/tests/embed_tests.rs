use ragdex_core::traits::Embedder;
use ragdex_embed::{cosine_similarity, get_default_embedder, HashEmbedder};

#[test]
fn hash_embedder_shapes_and_determinism() {
    let embedder = get_default_embedder(64).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 64, "embedding dim is 64");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
    assert_eq!(embedder.len(), 1, "duplicate text is cached once");
}

#[test]
fn shared_words_score_higher() {
    let e = HashEmbedder::new(256).unwrap();
    let q = e.embed_text("rust borrow checker");
    let near = e.embed_text("The borrow checker in Rust");
    let far = e.embed_text("baking sourdough bread");
    assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
}

#[test]
fn empty_text_is_zero_vector() {
    let e = HashEmbedder::new(8).unwrap();
    assert!(e.embed_text("").iter().all(|x| *x == 0.0));
    assert!(HashEmbedder::new(0).is_err());
}
