use tracing::info;

use ragdex_core::traits::{QueryBundle, Retrieval, Retriever};
use ragdex_core::{DocumentStore, IndexStruct, Result};

use crate::dispatch::{retriever_for, QueryContext};
use crate::postprocessor::{NodePostprocessor, PostprocessContext, PostprocessorChain};

/// Retrieval followed by a postprocessor chain. The result is the final
/// node list handed to response synthesis, plus the scores the traversal
/// recorded.
pub struct RetrieverQueryEngine<'a> {
    retriever: Box<dyn Retriever + 'a>,
    postprocessors: PostprocessorChain,
    docstore: Option<&'a DocumentStore>,
}

impl<'a> RetrieverQueryEngine<'a> {
    pub fn new(retriever: Box<dyn Retriever + 'a>) -> Self {
        Self { retriever, postprocessors: PostprocessorChain::new(), docstore: None }
    }

    /// Engine over one index struct, with the context's store made available
    /// to postprocessors.
    pub fn for_index(index_struct: &'a IndexStruct, ctx: &QueryContext<'a>) -> Result<Self> {
        Ok(Self::new(retriever_for(index_struct, ctx)?).with_docstore(ctx.docstore))
    }

    #[must_use]
    pub fn with_docstore(mut self, docstore: &'a DocumentStore) -> Self {
        self.docstore = Some(docstore);
        self
    }

    #[must_use]
    pub fn with_postprocessor(mut self, stage: impl NodePostprocessor + 'static) -> Self {
        self.postprocessors.push(stage);
        self
    }

    #[must_use]
    pub fn with_postprocessors(mut self, chain: PostprocessorChain) -> Self {
        self.postprocessors = chain;
        self
    }

    pub fn query(&self, query: &QueryBundle) -> Result<Retrieval> {
        let retrieved = self.retriever.retrieve(query)?;
        let ctx = PostprocessContext { docstore: self.docstore, similarity: Some(&retrieved.similarity) };
        let before = retrieved.nodes.len();
        let nodes = self.postprocessors.postprocess_nodes(retrieved.nodes.clone(), &ctx)?;
        info!(query = %query.query_str, retrieved = before, kept = nodes.len(), stages = self.postprocessors.len(), "query");
        Ok(Retrieval { nodes, similarity: retrieved.similarity })
    }
}
