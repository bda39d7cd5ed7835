//! ragdex-vector
//!
//! In-process vector engine, vector-dict construction with batched embedding,
//! and similarity traversal.
pub mod index;
pub mod retriever;
pub mod store;

pub use index::VectorIndexBuilder;
pub use retriever::VectorRetriever;
pub use store::SimpleVectorStore;

use ragdex_core::traits::VectorEngine;
use ragdex_core::{Error, IndexStruct, Result, StorageContext};

/// Delete a document everywhere: every index struct, the document store, and
/// the vector engine backing the vector dicts. `ctx` is only replaced once the
/// engine delete has succeeded too.
pub fn delete_ref_doc_everywhere(ctx: &mut StorageContext, engine: &mut dyn VectorEngine, ref_doc_id: &str) -> Result<usize> {
    let had_vectors = ctx
        .index_store
        .iter()
        .any(|s| matches!(s, IndexStruct::VectorStore(d) if d.doc_id_dict().contains_key(ref_doc_id)));
    let mut staged = ctx.clone();
    let removed = staged.delete_ref_doc(ref_doc_id)?;
    if had_vectors {
        engine.delete(ref_doc_id).map_err(Error::external)?;
    }
    *ctx = staged;
    Ok(removed.values().map(Vec::len).sum())
}
