//! Building and extending a vector dict.
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ragdex_core::traits::{Embedder, VectorEngine, VectorEntry};
use ragdex_core::{Error, IndexDict, MetadataMode, Node, Result, VectorBackend};

pub struct VectorIndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    engine: Option<&'a mut dyn VectorEngine>,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> VectorIndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self {
        Self { embedder, engine: None, batch_size: 64, show_progress: false }
    }

    /// Hand every vector to `engine` as well as recording it in the dict.
    #[must_use]
    pub fn with_engine(mut self, engine: &'a mut dyn VectorEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn build(&mut self, index_id: &str, backend: VectorBackend, nodes: &mut [Node]) -> Result<IndexDict> {
        let mut dict = IndexDict::new(index_id, backend);
        self.insert(&mut dict, nodes)?;
        info!(index_id, backend = %backend, vectors = dict.len(), "built vector index");
        Ok(dict)
    }

    /// Embed the nodes that have no embedding yet, then register all of them.
    /// Embeddings are written back onto `nodes`. The dict is only changed if
    /// every step, including the engine add, succeeds.
    pub fn insert(&mut self, dict: &mut IndexDict, nodes: &mut [Node]) -> Result<Vec<String>> {
        if !dict.backend.is_in_process() && self.engine.is_none() {
            return Err(Error::InvalidConfig(format!(
                "vector index '{}' uses the {} backend but no vector engine is bound",
                dict.index_id, dict.backend
            )));
        }
        self.embed_missing(nodes)?;

        let mut staged = dict.clone();
        let mut entries = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            let embedding = node
                .embedding
                .clone()
                .ok_or_else(|| Error::External(format!("node '{}' has no embedding", node.id)))?;
            let vector_id = staged.add_node(node, None)?;
            if staged.backend.is_in_process() {
                staged.add_embedding(&vector_id, embedding.clone());
            }
            entries.push(VectorEntry {
                id: vector_id,
                embedding,
                ref_doc_id: node.ref_doc_id.clone(),
                metadata: node.metadata.clone(),
            });
        }
        let proposed: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let ids = match self.engine.as_deref_mut() {
            Some(engine) => engine.add(entries).map_err(Error::external)?,
            None => proposed.clone(),
        };
        if ids.len() != proposed.len() {
            return Err(Error::External(format!("vector engine returned {} ids for {} vectors", ids.len(), proposed.len())));
        }
        for (old, new) in proposed.iter().zip(&ids) {
            staged.rebind_vector_id(old, new)?;
        }
        *dict = staged;
        Ok(ids)
    }

    fn embed_missing(&self, nodes: &mut [Node]) -> Result<()> {
        let pending: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].embedding.is_none()).collect();
        if pending.is_empty() {
            return Ok(());
        }
        let pb = if self.show_progress { ProgressBar::new(pending.len() as u64) } else { ProgressBar::hidden() };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} nodes ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        let dim = self.embedder.dim();
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| nodes[i].content(MetadataMode::None)).collect();
            let vectors = self.embedder.embed_batch(&texts).map_err(Error::external)?;
            if vectors.len() != batch.len() {
                return Err(Error::External(format!("embedder returned {} vectors for {} texts", vectors.len(), batch.len())));
            }
            for (&i, v) in batch.iter().zip(vectors) {
                if v.len() != dim {
                    return Err(Error::External(format!("embedding of '{}' has dimension {}, expected {dim}", nodes[i].id, v.len())));
                }
                nodes[i].embedding = Some(v);
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");
        Ok(())
    }
}
