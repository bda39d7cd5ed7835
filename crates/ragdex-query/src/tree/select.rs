use tracing::{debug, warn};

use ragdex_core::traits::{Embedder, LanguageModel, QueryBundle};
use ragdex_core::{Error, MetadataMode, Node, Result};
use ragdex_embed::top_k_by_similarity;

use crate::node_embeddings;

pub const QUERY_SELECT_PROMPT: &str = "Some choices are given below. It is provided in a numbered list \
(1 to {num_chunks}), where each item in the list corresponds to a summary.\n\
---------------------\n{context_list}\n---------------------\n\
Using only the choices above and not prior knowledge, return the top choices \
(no more than {branching_factor}, ranked by most relevant to least) that are most \
relevant to the question: '{query_str}'\n\
Provide choices in the following format: 'ANSWER: <numbers>' and explain why \
these summaries were selected in relation to the question.\n";

pub const INSERT_SELECT_PROMPT: &str = "Context information is below. It is provided in a numbered list \
(1 to {num_chunks}), where each item in the list corresponds to a summary.\n\
---------------------\n{context_list}\n---------------------\n\
Given the context information, here is a new piece of information: {query_str}\n\
Answer with the number corresponding to the summary that should be updated. \
The answer should be the number corresponding to the summary that is most \
relevant to the question. Return no more than {branching_factor} number.\n";

/// Picks which children of a tree level to follow.
pub trait ChildSelector {
    /// Up to `branch_factor` picks as (position in `candidates`, score),
    /// best first. An empty answer stops the descent at this level.
    fn select(&self, query: &QueryBundle, candidates: &[&Node], branch_factor: usize) -> Result<Vec<(usize, Option<f32>)>>;
}

/// Every integer in `response`, in order of appearance.
pub fn parse_choice_numbers(response: &str) -> Vec<usize> {
    response
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// Presents the children as a numbered list and lets the model answer with
/// the numbers to follow.
pub struct LlmChildSelector<'a> {
    llm: &'a dyn LanguageModel,
    template: &'static str,
}

impl<'a> LlmChildSelector<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self { Self { llm, template: QUERY_SELECT_PROMPT } }

    /// Selector asking where new content belongs rather than what answers a question.
    pub fn for_insert(llm: &'a dyn LanguageModel) -> Self { Self { llm, template: INSERT_SELECT_PROMPT } }
}

impl ChildSelector for LlmChildSelector<'_> {
    fn select(&self, query: &QueryBundle, candidates: &[&Node], branch_factor: usize) -> Result<Vec<(usize, Option<f32>)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let context_list = candidates
            .iter()
            .enumerate()
            .map(|(i, n)| format!("({}) {}", i + 1, n.content(MetadataMode::None).replace('\n', " ")))
            .collect::<Vec<_>>()
            .join("\n\n");
        let num_chunks = candidates.len().to_string();
        let branching = branch_factor.to_string();
        let response = self
            .llm
            .predict(
                self.template,
                &[
                    ("num_chunks", &num_chunks),
                    ("context_list", &context_list),
                    ("query_str", &query.query_str),
                    ("branching_factor", &branching),
                ],
            )
            .map_err(Error::external)?;
        let mut picks: Vec<(usize, Option<f32>)> = Vec::new();
        for n in parse_choice_numbers(&response) {
            if n == 0 || n > candidates.len() {
                debug!(choice = n, candidates = candidates.len(), "ignoring out-of-range choice");
                continue;
            }
            if picks.iter().any(|(i, _)| *i == n - 1) { continue; }
            picks.push((n - 1, None));
            if picks.len() == branch_factor { break; }
        }
        if picks.is_empty() {
            warn!(response = %response.trim(), "no usable choice in selection reply");
        }
        Ok(picks)
    }
}

/// Follows the children whose embeddings are closest to the query.
pub struct EmbeddingChildSelector<'a> {
    embedder: &'a dyn Embedder,
}

impl<'a> EmbeddingChildSelector<'a> {
    pub fn new(embedder: &'a dyn Embedder) -> Self { Self { embedder } }
}

impl ChildSelector for EmbeddingChildSelector<'_> {
    fn select(&self, query: &QueryBundle, candidates: &[&Node], branch_factor: usize) -> Result<Vec<(usize, Option<f32>)>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = query.embedding_with(self.embedder)?;
        let embeddings = node_embeddings(self.embedder, candidates)?;
        let scored = top_k_by_similarity(
            &query_embedding,
            embeddings.iter().enumerate().map(|(i, e)| (i, e.as_slice())),
            branch_factor,
            None,
        );
        Ok(scored.into_iter().map(|(i, s)| (i, Some(s))).collect())
    }
}
