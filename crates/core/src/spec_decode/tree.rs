//! Candidate tree for speculative decoding.
//!
//! Each node is a candidate future token; the root is the last verified
//! token from the previous step. The tree is arena-backed: nodes live in a
//! flat vector and refer to each other by [`NodeId`], so parent
//! back-references need no shared ownership and all walks are iterative.
//!
//! A tree belongs to exactly one decode step of one request and is never
//! shared across threads, so it carries no synchronization.

use std::cmp::Ordering;

/// Index of a node within its owning [`SpeculativeTree`].
///
/// Ids are only minted by the owning tree; using an id from another tree
/// is a programmer error (and may panic on out-of-range access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One candidate token in the speculation tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Candidate token id.
    pub token_id: u32,
    /// Distance from the root (root = 0). Child depth = parent depth + 1.
    pub depth: usize,
    /// Parent node; None for the root.
    pub parent: Option<NodeId>,
    /// Child nodes, in insertion order (descending draft logprob within
    /// one `expand` call).
    pub children: Vec<NodeId>,
    /// Draft log probability of this token.
    pub logprob: f32,
    /// Sum of draft logprobs along the root path.
    pub cumulative_logprob: f32,
    /// Set once the verifier confirmed this node's path.
    pub is_accepted: bool,
    /// Draft-model hidden state, for proposers that carry one per node
    /// (Eagle-style feature-level autoregression).
    pub hidden_state: Option<Vec<f32>>,
}

/// An owned tree of candidate future tokens for one decode step.
pub struct SpeculativeTree {
    nodes: Vec<TreeNode>,
    max_depth: usize,
    /// Nodes created through [`expand`](Self::expand) (plus the root).
    /// Not recomputed by [`prune`](Self::prune); use
    /// [`count_reachable`](Self::count_reachable) for an exact live count.
    num_nodes: usize,
    /// Token ids of the path the verifier accepted, root first.
    accepted_path: Vec<u32>,
}

impl SpeculativeTree {
    /// Build a tree holding only a depth-0 root.
    pub fn new(root_token_id: u32, max_depth: usize) -> Self {
        let root = TreeNode {
            token_id: root_token_id,
            depth: 0,
            parent: None,
            children: Vec::new(),
            logprob: 0.0,
            cumulative_logprob: 0.0,
            is_accepted: false,
            hidden_state: None,
        };
        Self {
            nodes: vec![root],
            max_depth,
            num_nodes: 1,
            accepted_path: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of nodes created so far. Monotone: pruning detaches branches
    /// but does not decrement this counter.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn accepted_path(&self) -> &[u32] {
        &self.accepted_path
    }

    /// Append a child under `parent` with depth + 1 and a running
    /// cumulative logprob.
    ///
    /// Tree-level node-count bookkeeping is [`expand`](Self::expand)'s
    /// job; this method does not touch `num_nodes`.
    pub fn add_child(&mut self, parent: NodeId, token_id: u32, logprob: f32) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent_node = &self.nodes[parent.0];
        let node = TreeNode {
            token_id,
            depth: parent_node.depth + 1,
            parent: Some(parent),
            children: Vec::new(),
            logprob,
            cumulative_logprob: parent_node.cumulative_logprob + logprob,
            is_accepted: false,
            hidden_state: None,
        };
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Expand `node` with the top `max_width` of the scored `candidates`.
    ///
    /// Candidates are ranked by logprob descending; the sort is stable, so
    /// ties keep their input order. Expanding a node already at `max_depth`
    /// is a normal terminal condition: it returns no children and changes
    /// nothing.
    ///
    /// Repeated expansion of the same node does not deduplicate token ids —
    /// duplicate edges would only arise from duplicate candidate lists, and
    /// the verifier deduplicates paths. Callers expand each node once per
    /// step.
    pub fn expand(
        &mut self,
        node: NodeId,
        candidates: &[(u32, f32)],
        max_width: usize,
    ) -> Vec<NodeId> {
        if self.nodes[node.0].depth >= self.max_depth {
            return Vec::new();
        }

        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(max_width);

        let added: Vec<NodeId> = ranked
            .into_iter()
            .map(|(token_id, logprob)| self.add_child(node, token_id, logprob))
            .collect();
        self.num_nodes += added.len();
        added
    }

    /// Token ids from the root down to `node`, root first.
    pub fn path_to_root(&self, node: NodeId) -> Vec<u32> {
        let mut tokens = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.nodes[id.0];
            tokens.push(n.token_id);
            current = n.parent;
        }
        tokens.reverse();
        tokens
    }

    /// All nodes without children, in depth-first order from the root.
    pub fn all_leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.children.is_empty() {
                leaves.push(id);
            } else {
                // Reversed so the first child is visited first.
                stack.extend(node.children.iter().rev().copied());
            }
        }
        leaves
    }

    /// Every root-to-leaf token sequence, one per leaf, for the verifier.
    pub fn get_all_paths(&self) -> Vec<Vec<u32>> {
        self.all_leaves()
            .into_iter()
            .map(|leaf| self.path_to_root(leaf))
            .collect()
    }

    /// Discard every draft branch beyond the verified depth.
    ///
    /// Clears the child list of every reachable node whose own depth is
    /// `>= accepted_depth`; nodes above that depth are left structurally
    /// untouched. `num_nodes` is not recomputed.
    pub fn prune(&mut self, accepted_depth: usize) {
        let mut to_clear = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            stack.extend(node.children.iter().copied());
            if node.depth >= accepted_depth {
                to_clear.push(id);
            }
        }
        for id in to_clear {
            self.nodes[id.0].children.clear();
        }
    }

    /// Exact count of nodes still reachable from the root.
    pub fn count_reachable(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend(self.nodes[id.0].children.iter().copied());
        }
        count
    }

    /// Mark `node` and its ancestors as verifier-accepted and remember the
    /// accepted token path for the next step's root selection.
    pub fn mark_accepted(&mut self, node: NodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            self.nodes[id.0].is_accepted = true;
            current = self.nodes[id.0].parent;
        }
        self.accepted_path = self.path_to_root(node);
    }

    /// Attach a draft-model hidden state to `node`.
    pub fn set_hidden_state(&mut self, node: NodeId, state: Vec<f32>) {
        self.nodes[node.0].hidden_state = Some(state);
    }
}
