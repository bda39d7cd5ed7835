use std::collections::HashMap;
use tracing::{debug, info, warn};

use ragdex_core::traits::QueryBundle;
use ragdex_core::{DocumentStore, Error, IndexGraph, Node, NodeId, NodeRelationship, Result};

use super::select::ChildSelector;
use super::{summary_id, Summarizer};

fn check_num_children(num_children: usize) -> Result<()> {
    if num_children < 2 {
        return Err(Error::InvalidConfig(format!("num_children must be at least 2, got {num_children}")));
    }
    Ok(())
}

fn summary_node(id: NodeId, text: String, children: &[NodeId]) -> Node {
    let mut node = Node::new(id, text);
    for child in children {
        node.add_relationship(NodeRelationship::Child, child.clone());
    }
    node
}

/// Builds a tree bottom-up from leaf nodes already held by the document store.
pub struct TreeBuilder<'a> {
    summarizer: &'a dyn Summarizer,
    num_children: usize,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(summarizer: &'a dyn Summarizer, num_children: usize) -> Result<Self> {
        check_num_children(num_children)?;
        Ok(Self { summarizer, num_children })
    }

    /// Summary nodes are added to `docstore` only once the whole tree has
    /// been built.
    pub fn build(&self, index_id: &str, leaves: &[Node], docstore: &mut DocumentStore) -> Result<IndexGraph> {
        let mut graph = IndexGraph::new(index_id);
        for leaf in leaves {
            docstore.get_node(&leaf.id)?;
            graph.insert(&leaf.id, None, &[])?;
        }
        let mut texts: HashMap<NodeId, String> = leaves.iter().map(|n| (n.id.clone(), n.text.clone())).collect();
        let mut pending: Vec<Node> = Vec::new();
        let mut level: Vec<NodeId> = leaves.iter().map(|n| n.id.clone()).collect();
        let mut depth = 0usize;
        while level.len() > self.num_children {
            let mut next = Vec::with_capacity(level.len() / self.num_children + 1);
            for group in level.chunks(self.num_children) {
                let group_texts: Vec<&str> = group.iter().map(|id| texts.get(id).map_or("", String::as_str)).collect();
                let summary = self.summarizer.summarize(&group_texts)?;
                let position = graph.next_index();
                let id = summary_id(index_id, position);
                graph.insert(&id, Some(position), group)?;
                pending.push(summary_node(id.clone(), summary.clone(), group));
                texts.insert(id.clone(), summary);
                next.push(id);
            }
            depth += 1;
            debug!(index_id, depth, nodes = next.len(), "built tree level");
            level = next;
        }
        if !level.is_empty() {
            let root_texts: Vec<&str> = level.iter().map(|id| texts.get(id).map_or("", String::as_str)).collect();
            graph.summary = Some(self.summarizer.summarize(&root_texts)?);
        }
        let summaries = pending.len();
        docstore.add_documents(pending, false)?;
        info!(index_id, leaves = leaves.len(), summaries, roots = graph.root_nodes().len(), "built tree index");
        Ok(graph)
    }
}

/// Adds nodes to an existing tree, keeping every level at most
/// `num_children` wide.
///
/// A node is routed from the roots down through the `selector` until it
/// reaches a level of leaves, where it is attached. When that overflows the
/// level, the level is split into two halves under new summary nodes. Every
/// summary on the path back up is regenerated.
pub struct TreeInserter<'a> {
    summarizer: &'a dyn Summarizer,
    selector: &'a dyn ChildSelector,
    num_children: usize,
}

impl<'a> TreeInserter<'a> {
    pub fn new(summarizer: &'a dyn Summarizer, selector: &'a dyn ChildSelector, num_children: usize) -> Result<Self> {
        check_num_children(num_children)?;
        Ok(Self { summarizer, selector, num_children })
    }

    /// Insert `nodes` into `graph`, adding them (and any new summary nodes) to
    /// `docstore`. On error neither `graph` nor `docstore` is changed.
    pub fn insert(&self, graph: &mut IndexGraph, nodes: Vec<Node>, docstore: &mut DocumentStore) -> Result<()> {
        let mut staged_graph = graph.clone();
        let mut staged_store = docstore.clone();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        staged_store.add_documents(nodes, false)?;
        for id in &ids {
            self.insert_node(&mut staged_graph, &mut staged_store, id, None)?;
        }
        *graph = staged_graph;
        *docstore = staged_store;
        info!(index_id = %graph.index_id, inserted = ids.len(), size = graph.size(), "tree insert");
        Ok(())
    }

    fn insert_node(&self, graph: &mut IndexGraph, store: &mut DocumentStore, node_id: &str, parent: Option<&str>) -> Result<()> {
        let children = graph.get_children(parent)?;
        let at_leaves = children.values().next().map_or(true, |first| graph.is_leaf(first));
        if at_leaves {
            self.attach_and_split(graph, store, node_id, parent)?;
        } else {
            let chosen: Option<NodeId> = {
                let candidates: Vec<&Node> = children.values().map(|id| store.resolve(id)).collect::<Result<_>>()?;
                let query = QueryBundle::new(store.get_node(node_id)?.text.clone());
                let picks = self.selector.select(&query, &candidates, 1)?;
                picks.first().map(|(i, _)| candidates[*i].id.clone())
            };
            match chosen {
                Some(child) => self.insert_node(graph, store, node_id, Some(&child))?,
                None => {
                    warn!(node_id, parent, "no child selected, attaching at this level");
                    self.attach_and_split(graph, store, node_id, parent)?;
                }
            }
        }
        if let Some(parent) = parent {
            self.refresh_summary(graph, store, parent)?;
        }
        Ok(())
    }

    fn attach_and_split(&self, graph: &mut IndexGraph, store: &mut DocumentStore, node_id: &str, parent: Option<&str>) -> Result<()> {
        graph.insert_under_parent(node_id, parent, None)?;
        let siblings: Vec<NodeId> = graph.get_children(parent)?.into_values().collect();
        if siblings.len() <= self.num_children {
            return Ok(());
        }
        let half = siblings.len() / 2;
        for group in [&siblings[..half], &siblings[half..]] {
            let texts: Vec<String> = group.iter().map(|id| store.resolve(id).map(|n| n.text.clone())).collect::<Result<_>>()?;
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let summary = self.summarizer.summarize(&refs)?;
            let id = summary_id(&graph.index_id, graph.next_index());
            graph.insert_between(&id, parent, group)?;
            store.add_documents([summary_node(id, summary, group)], false)?;
        }
        debug!(index_id = %graph.index_id, parent, "split overfull tree level");
        Ok(())
    }

    fn refresh_summary(&self, graph: &IndexGraph, store: &mut DocumentStore, parent: &str) -> Result<()> {
        let children: Vec<NodeId> = graph.get_children(Some(parent))?.into_values().collect();
        let texts: Vec<String> = children.iter().map(|id| store.resolve(id).map(|n| n.text.clone())).collect::<Result<_>>()?;
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let summary = self.summarizer.summarize(&refs)?;
        store.update_text(parent, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{EmbeddingChildSelector, ExtractiveSummarizer};
    use ragdex_embed::HashEmbedder;

    fn leaves(n: usize) -> Vec<Node> {
        (0..n).map(|i| Node::new(format!("d:{i}"), format!("Leaf number {i}. More text.")).with_ref_doc("d")).collect()
    }

    #[test]
    fn build_groups_levels_until_roots_fit() {
        let mut store = DocumentStore::new();
        let nodes = leaves(7);
        store.add_documents(nodes.clone(), false).unwrap();
        let graph = TreeBuilder::new(&ExtractiveSummarizer, 2).unwrap().build("t", &nodes, &mut store).unwrap();
        // 7 leaves -> 4 summaries -> 2 roots
        assert_eq!(graph.size(), 13);
        assert_eq!(graph.root_nodes().len(), 2);
        assert_eq!(graph.root_nodes().values().cloned().collect::<Vec<_>>(), vec!["t:summary:11", "t:summary:12"]);
        assert_eq!(store.get_node("t:summary:7").unwrap().text, "Leaf number 0. Leaf number 1.");
        assert_eq!(store.get_node("t:summary:7").unwrap().child_ids().len(), 2);
        assert!(graph.summary.is_some());
        graph.validate().unwrap();
    }

    #[test]
    fn build_requires_leaves_in_store() {
        let mut store = DocumentStore::new();
        let err = TreeBuilder::new(&ExtractiveSummarizer, 2).unwrap().build("t", &leaves(1), &mut store).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(TreeBuilder::new(&ExtractiveSummarizer, 1), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn small_input_stays_flat() {
        let mut store = DocumentStore::new();
        let nodes = leaves(3);
        store.add_documents(nodes.clone(), false).unwrap();
        let graph = TreeBuilder::new(&ExtractiveSummarizer, 4).unwrap().build("t", &nodes, &mut store).unwrap();
        assert_eq!(graph.root_nodes().len(), 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn inserter_splits_overfull_root_level() {
        let embedder = HashEmbedder::new(32).unwrap();
        let selector = EmbeddingChildSelector::new(&embedder);
        let inserter = TreeInserter::new(&ExtractiveSummarizer, &selector, 3).unwrap();
        let mut graph = IndexGraph::new("t");
        let mut store = DocumentStore::new();
        inserter.insert(&mut graph, leaves(4), &mut store).unwrap();
        // Fourth leaf overflows the roots: two summaries over two leaves each.
        assert_eq!(graph.root_nodes().len(), 2);
        assert_eq!(graph.size(), 6);
        graph.validate().unwrap();

        inserter.insert(&mut graph, vec![Node::new("x", "Leaf number 3 again. Extra.")], &mut store).unwrap();
        assert_eq!(graph.root_nodes().len(), 2);
        assert_eq!(graph.leaf_ids().len(), 5);
        let parent = graph.parent_of("x").cloned().unwrap();
        assert!(store.get_node(&parent).unwrap().text.contains("Leaf number 3 again."));
        graph.validate().unwrap();
    }

    #[test]
    fn failed_insert_changes_nothing() {
        let embedder = HashEmbedder::new(8).unwrap();
        let selector = EmbeddingChildSelector::new(&embedder);
        let inserter = TreeInserter::new(&ExtractiveSummarizer, &selector, 3).unwrap();
        let mut graph = IndexGraph::new("t");
        let mut store = DocumentStore::new();
        inserter.insert(&mut graph, leaves(1), &mut store).unwrap();
        let err = inserter.insert(&mut graph, vec![Node::new("new", "n"), Node::new("d:0", "dup")], &mut store).unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
        assert_eq!(graph.size(), 1);
        assert_eq!(store.len(), 1);
    }
}
