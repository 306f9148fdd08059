// Directed index over the page graph: BFS pathfinding and free-text
// target resolution for the navigation resolver.

use crate::error::Result;
use crate::model::{Edge, Node, PageGraph};
use crate::routes::parameterize_path;
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::debug;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "page", "with", "from", "into", "that", "this", "view", "open",
];

pub struct GraphIndex {
    graph: PageGraph,
    pg: DiGraph<(), usize>,
    node_indices: HashMap<String, NodeIndex>,
}

impl GraphIndex {
    /// Build the index. The graph is validated first; edges marked external
    /// are left out of the traversal structure entirely.
    pub fn build(graph: PageGraph) -> Result<Self> {
        graph.validate()?;

        let mut pg = DiGraph::new();
        let mut node_indices = HashMap::new();
        for node in &graph.nodes {
            let idx = pg.add_node(());
            node_indices.insert(node.id.clone(), idx);
        }
        for (edge_pos, edge) in graph.edges.iter().enumerate() {
            if edge.external {
                continue;
            }
            let (Some(&from), Some(&to)) =
                (node_indices.get(&edge.from), node_indices.get(&edge.to))
            else {
                continue;
            };
            pg.add_edge(from, to, edge_pos);
        }

        Ok(Self {
            graph,
            pg,
            node_indices,
        })
    }

    pub fn graph(&self) -> &PageGraph {
        &self.graph
    }

    pub fn into_graph(self) -> PageGraph {
        self.graph
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.graph.node(id)
    }

    /// Find the node whose url covers `url` (concrete match first, then
    /// template shape).
    pub fn node_for_url(&self, url: &str) -> Option<&Node> {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        if let Some(node) = self.graph.nodes.iter().find(|n| n.url == path) {
            return Some(node);
        }
        let template = parameterize_path(&path).template;
        self.graph.nodes.iter().find(|n| n.url == template)
    }

    /// Shortest edge path between two node ids via breadth-first search.
    ///
    /// Returns an empty path when already at the target and `None` when no
    /// path exists; callers fall back to direct URL navigation in that case.
    pub fn find_path(&self, from: &str, to: &str) -> Option<Vec<Edge>> {
        if from == to {
            return Some(Vec::new());
        }
        let start = *self.node_indices.get(from)?;
        let goal = *self.node_indices.get(to)?;

        let (_, node_path) = astar(&self.pg, start, |n| n == goal, |_| 1usize, |_| 0usize)?;

        let mut edges = Vec::with_capacity(node_path.len().saturating_sub(1));
        for pair in node_path.windows(2) {
            let edge_idx = self.pg.find_edge(pair[0], pair[1])?;
            let edge_pos = *self.pg.edge_weight(edge_idx)?;
            edges.push(self.graph.edges[edge_pos].clone());
        }
        Some(edges)
    }

    /// Resolve a target given either a node id or a free-text description.
    ///
    /// Free text is scored by weighted keyword matching: display label 3,
    /// node id 2, url 2, description 1. Highest score wins, ties broken by
    /// first match.
    pub fn resolve_target(&self, target: &str) -> Option<&Node> {
        if let Some(node) = self.graph.node(target) {
            return Some(node);
        }

        let keywords: Vec<String> = target
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
            .map(|w| w.to_string())
            .collect();
        if keywords.is_empty() {
            return None;
        }

        let mut best: Option<(&Node, usize)> = None;
        for node in &self.graph.nodes {
            let label = node.display_label.to_lowercase();
            let id = node.id.to_lowercase();
            let url = node.url.to_lowercase();
            let description = node.description.to_lowercase();

            let mut score = 0usize;
            for word in &keywords {
                if label.contains(word.as_str()) {
                    score += 3;
                }
                if id.contains(word.as_str()) {
                    score += 2;
                }
                if url.contains(word.as_str()) {
                    score += 2;
                }
                if description.contains(word.as_str()) {
                    score += 1;
                }
            }
            if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((node, score));
            }
        }

        if let Some((node, score)) = best {
            debug!(target, node = %node.id, score, "resolved free-text target");
        }
        best.map(|(node, _)| node)
    }
}
