//! Index-based dependency graph.
//!
//! Lock files and manifests reference packages by key, and they legally
//! describe mutually dependent packages. Parsers therefore load nodes into
//! an arena first, record edges by index, and only then turn the graph into
//! trees. Tree building starts with a depth-first pass that produces a new
//! edge set without back edges, so every tree handed out is acyclic.

use crate::model::DependencyNode;
use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    edges: Vec<Vec<NodeId>>,
    keys: HashMap<String, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` to the arena. Its `children` are ignored; use
    /// [`add_edge`](Self::add_edge).
    pub fn add(&mut self, mut node: DependencyNode) -> NodeId {
        node.children.clear();
        self.nodes.push(node);
        self.edges.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Makes `key` resolve to `id`. Later aliases for the same key win.
    pub fn alias(&mut self, key: impl Into<String>, id: NodeId) {
        self.keys.insert(key.into(), id);
    }

    pub fn lookup(&self, key: &str) -> Option<NodeId> {
        self.keys.get(key).copied()
    }

    /// Records `from -> to`, keeping first-seen order and ignoring repeats.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return;
        }
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    pub fn node(&self, id: NodeId) -> &DependencyNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.edges[id]
    }

    /// Edge set with every back edge removed. The search starts from
    /// `roots` in order, then from any node not yet reached, so edges out of
    /// the requested roots are the ones preserved.
    pub fn acyclic_edges(&self, roots: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut kept: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];

        let starts = roots
            .iter()
            .copied()
            .filter(|&r| r < self.nodes.len())
            .chain(0..self.nodes.len());

        for start in starts {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            // (node, index of the next edge to examine)
            let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
            marks[start] = Mark::OnPath;

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if next == self.edges[node].len() {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                }
                frame.1 += 1;
                let child = self.edges[node][next];
                match marks[child] {
                    Mark::OnPath => {}
                    Mark::Done => kept[node].push(child),
                    Mark::Unvisited => {
                        kept[node].push(child);
                        marks[child] = Mark::OnPath;
                        stack.push((child, 0));
                    }
                }
            }
        }

        kept
    }

    /// Nodes nothing points at once back edges are removed, in arena order.
    pub fn roots(&self) -> Vec<NodeId> {
        let kept = self.acyclic_edges(&[]);
        let mut referenced = vec![false; self.nodes.len()];
        for targets in &kept {
            for &t in targets {
                referenced[t] = true;
            }
        }
        (0..self.nodes.len()).filter(|&i| !referenced[i]).collect()
    }

    /// Materializes trees for `roots`. Shared dependencies appear under
    /// every parent that references them.
    pub fn build_trees(&self, roots: &[NodeId]) -> Vec<DependencyNode> {
        let kept = self.acyclic_edges(roots);
        let mut memo: HashMap<NodeId, DependencyNode> = HashMap::new();
        roots
            .iter()
            .filter(|&&r| r < self.nodes.len())
            .map(|&r| self.materialize(r, &kept, &mut memo))
            .collect()
    }

    /// Trees for every root node (see [`roots`](Self::roots)).
    pub fn into_forest(self) -> Vec<DependencyNode> {
        let roots = self.roots();
        self.build_trees(&roots)
    }

    fn materialize(
        &self,
        id: NodeId,
        kept: &[Vec<NodeId>],
        memo: &mut HashMap<NodeId, DependencyNode>,
    ) -> DependencyNode {
        if let Some(done) = memo.get(&id) {
            return done.clone();
        }
        let mut node = self.nodes[id].clone();
        for &child in &kept[id] {
            let built = self.materialize(child, kept, memo);
            node.children.push(built);
        }
        memo.insert(id, node.clone());
        node
    }
}
