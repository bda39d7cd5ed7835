//! Summarization tree: construction, incremental insertion and descent.
//!
//! Leaves are the parsed chunks. Every level above them is made of summary
//! nodes, each one standing for a run of at most `num_children` nodes of the
//! level below. Summary nodes live in the document store like any other node
//! and are addressed as `"{index_id}:summary:{position}"`.
mod build;
mod retrieve;
mod select;

pub use build::{TreeBuilder, TreeInserter};
pub use retrieve::{TreeRetriever, TreeRetrieverMode};
pub use select::{parse_choice_numbers, ChildSelector, EmbeddingChildSelector, LlmChildSelector};

use ragdex_core::data_processor::split_sentences;
use ragdex_core::traits::LanguageModel;
use ragdex_core::{Error, NodeId, Result};

pub const SUMMARY_PROMPT: &str = "Write a summary of the following. Try to use only the information provided. \
Try to include as many key details as possible.\n\n{context_str}\n\nSUMMARY:\n";

/// Id of the summary node created at `position` of tree `index_id`.
pub fn summary_id(index_id: &str, position: usize) -> NodeId {
    format!("{index_id}:summary:{position}")
}

/// Condenses the texts of a group of sibling nodes into one parent text.
pub trait Summarizer {
    fn summarize(&self, texts: &[&str]) -> Result<String>;
}

/// Asks a language model for the summary.
pub struct LlmSummarizer<'a> {
    llm: &'a dyn LanguageModel,
}

impl<'a> LlmSummarizer<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self { Self { llm } }
}

impl Summarizer for LlmSummarizer<'_> {
    fn summarize(&self, texts: &[&str]) -> Result<String> {
        let context = texts.join("\n\n");
        let out = self.llm.predict(SUMMARY_PROMPT, &[("context_str", &context)]).map_err(Error::external)?;
        Ok(out.trim().to_string())
    }
}

/// Offline summarizer: the lead sentence of every child, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, texts: &[&str]) -> Result<String> {
        let leads: Vec<&str> = texts.iter().filter_map(|t| split_sentences(t).into_iter().next()).collect();
        Ok(leads.join(" "))
    }
}
