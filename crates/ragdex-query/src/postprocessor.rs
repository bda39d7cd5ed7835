//! Filters and expanders applied to retrieved nodes before synthesis.
//!
//! A postprocessor never touches the document store; what it needs beyond the
//! node list comes in through [`PostprocessContext`].
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use ragdex_core::{DocumentStore, Error, Node, NodeId, NodeWithScore, Result, SimilarityTracker};

/// Auxiliary state a postprocessor may require.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostprocessContext<'a> {
    pub docstore: Option<&'a DocumentStore>,
    pub similarity: Option<&'a SimilarityTracker>,
}

impl<'a> PostprocessContext<'a> {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_docstore(mut self, docstore: &'a DocumentStore) -> Self {
        self.docstore = Some(docstore);
        self
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: &'a SimilarityTracker) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

pub trait NodePostprocessor {
    fn postprocess_nodes(&self, nodes: Vec<NodeWithScore>, ctx: &PostprocessContext<'_>) -> Result<Vec<NodeWithScore>>;
}

/// Runs of word characters (alphanumeric or `_`) in `text`.
pub fn words(text: &str) -> HashSet<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_')).filter(|w| !w.is_empty()).collect()
}

/// True when `text` contains every `required` word and none of `excluded`.
/// Matching is whole-word and case-sensitive.
pub fn passes_keyword_filter(text: &str, required: &[String], excluded: &[String]) -> bool {
    let present = words(text);
    required.iter().all(|w| present.contains(w.as_str())) && !excluded.iter().any(|w| present.contains(w.as_str()))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordNodePostprocessor {
    pub required_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl KeywordNodePostprocessor {
    pub fn new(required_keywords: Vec<String>, exclude_keywords: Vec<String>) -> Self {
        Self { required_keywords, exclude_keywords }
    }
}

impl NodePostprocessor for KeywordNodePostprocessor {
    fn postprocess_nodes(&self, nodes: Vec<NodeWithScore>, _ctx: &PostprocessContext<'_>) -> Result<Vec<NodeWithScore>> {
        let before = nodes.len();
        let kept: Vec<NodeWithScore> = nodes
            .into_iter()
            .filter(|n| passes_keyword_filter(&n.node.text, &self.required_keywords, &self.exclude_keywords))
            .collect();
        debug!(before, after = kept.len(), "keyword postprocessor");
        Ok(kept)
    }
}

/// Drops nodes whose tracked similarity is below the cutoff, or missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPostprocessor {
    pub similarity_cutoff: f32,
}

impl SimilarityPostprocessor {
    pub fn new(similarity_cutoff: f32) -> Self { Self { similarity_cutoff } }
}

impl NodePostprocessor for SimilarityPostprocessor {
    fn postprocess_nodes(&self, nodes: Vec<NodeWithScore>, ctx: &PostprocessContext<'_>) -> Result<Vec<NodeWithScore>> {
        let tracker = ctx
            .similarity
            .ok_or_else(|| Error::InvalidConfig("similarity cutoff requested but no similarity tracker was supplied".to_string()))?;
        let before = nodes.len();
        let kept: Vec<NodeWithScore> = nodes
            .into_iter()
            .filter(|n| tracker.find(n.id()).map_or(false, |s| s >= self.similarity_cutoff))
            .collect();
        debug!(before, after = kept.len(), cutoff = self.similarity_cutoff, "similarity postprocessor");
        Ok(kept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrevNextMode {
    #[default]
    Next,
    Previous,
    Both,
}

impl fmt::Display for PrevNextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrevNextMode::Next => "next",
            PrevNextMode::Previous => "previous",
            PrevNextMode::Both => "both",
        })
    }
}

impl FromStr for PrevNextMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "next" => Ok(PrevNextMode::Next),
            "previous" => Ok(PrevNextMode::Previous),
            "both" => Ok(PrevNextMode::Both),
            other => Err(Error::InvalidConfig(format!("unknown prev/next mode '{other}'"))),
        }
    }
}

/// Pulls in up to `num_nodes` neighbours along the PREVIOUS/NEXT chain of
/// every retrieved node. The result has no duplicates and is ordered by
/// document, then by position in the document's chunk run. Neighbours carry
/// no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevNextNodePostprocessor {
    pub num_nodes: usize,
    pub mode: PrevNextMode,
}

impl PrevNextNodePostprocessor {
    pub fn new(num_nodes: usize, mode: PrevNextMode) -> Self { Self { num_nodes, mode } }

    fn walk<'s>(&self, store: &'s DocumentStore, start: &Node, forward: bool) -> Result<Vec<&'s Node>> {
        let mut out = Vec::new();
        let mut cur = if forward { start.next_id() } else { start.prev_id() };
        while let Some(id) = cur {
            if out.len() == self.num_nodes { break; }
            let node = store.get_node(id)?;
            if node.id == start.id || out.iter().any(|n: &&Node| n.id == node.id) { break; }
            out.push(node);
            cur = if forward { node.next_id() } else { node.prev_id() };
        }
        Ok(out)
    }
}

impl NodePostprocessor for PrevNextNodePostprocessor {
    fn postprocess_nodes(&self, nodes: Vec<NodeWithScore>, ctx: &PostprocessContext<'_>) -> Result<Vec<NodeWithScore>> {
        let store = ctx
            .docstore
            .ok_or_else(|| Error::InvalidConfig("prev/next expansion needs the document store".to_string()))?;
        let before = nodes.len();
        let mut picked: BTreeMap<NodeId, NodeWithScore> = BTreeMap::new();
        let mut neighbours: Vec<Node> = Vec::new();
        for hit in nodes {
            if matches!(self.mode, PrevNextMode::Next | PrevNextMode::Both) {
                neighbours.extend(self.walk(store, &hit.node, true)?.into_iter().cloned());
            }
            if matches!(self.mode, PrevNextMode::Previous | PrevNextMode::Both) {
                neighbours.extend(self.walk(store, &hit.node, false)?.into_iter().cloned());
            }
            picked.insert(hit.node.id.clone(), hit);
        }
        for node in neighbours {
            picked.entry(node.id.clone()).or_insert_with(|| NodeWithScore::new(node, None));
        }
        let mut keyed = Vec::with_capacity(picked.len());
        for hit in picked.into_values() {
            let position = if store.document_exists(hit.id()) { store.chain_position(hit.id())? } else { 0 };
            keyed.push((hit.node.ref_doc_id.clone(), position, hit));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then_with(|| a.2.id().cmp(b.2.id())));
        debug!(before, after = keyed.len(), num_nodes = self.num_nodes, mode = %self.mode, "prev/next postprocessor");
        Ok(keyed.into_iter().map(|(_, _, hit)| hit).collect())
    }
}

/// Postprocessors applied one after another in the order they were added.
#[derive(Default)]
pub struct PostprocessorChain {
    stages: Vec<Box<dyn NodePostprocessor>>,
}

impl PostprocessorChain {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with(mut self, stage: impl NodePostprocessor + 'static) -> Self {
        self.push(stage);
        self
    }

    pub fn push(&mut self, stage: impl NodePostprocessor + 'static) {
        self.stages.push(Box::new(stage));
    }

    pub fn len(&self) -> usize { self.stages.len() }
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }
}

impl NodePostprocessor for PostprocessorChain {
    fn postprocess_nodes(&self, mut nodes: Vec<NodeWithScore>, ctx: &PostprocessContext<'_>) -> Result<Vec<NodeWithScore>> {
        for stage in &self.stages {
            nodes = stage.postprocess_nodes(nodes, ctx)?;
        }
        Ok(nodes)
    }
}
