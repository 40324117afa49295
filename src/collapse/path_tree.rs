//! Aggregation of resolved stacks into a weighted call-path tree

use std::collections::HashMap;

/// Stable handle to a node in a [`PathTree`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The synthetic root above all sampled stacks
    pub const ROOT: NodeId = NodeId(0);

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One frame position in the aggregated call tree
#[derive(Debug)]
pub struct PathNode {
    pub name: String,
    /// Samples whose stacks pass through or end at this node
    pub count: u64,
    /// Child handle per frame name
    pub children: HashMap<String, NodeId>,
}

/// Count-weighted tree of every distinct call path seen
///
/// Nodes live in an arena indexed by [`NodeId`], so arbitrarily deep
/// stacks build and drop without recursion and without ownership
/// cycles. The root is a synthetic node for the empty call path.
/// Identical consecutive frames (direct recursion) occupy distinct
/// nodes at their true depth.
#[derive(Debug)]
pub struct PathTree {
    nodes: Vec<PathNode>,
}

impl PathTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode {
                name: "all".to_string(),
                count: 0,
                children: HashMap::new(),
            }],
        }
    }

    /// Fold one resolved stack, ordered root to leaf, into the tree
    ///
    /// Every node along the path is incremented, the root included, so
    /// each count equals the samples passing through that node and the
    /// root's count equals the total folded. Counts are plain sums, so
    /// folding order never changes the final tree.
    pub fn fold(&mut self, stack: &[String]) {
        self.nodes[NodeId::ROOT.0].count += 1;

        let mut current = NodeId::ROOT;
        for name in stack {
            let next = self.child(current, name);
            self.nodes[next.0].count += 1;
            current = next;
        }
    }

    fn child(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(&id) = self.nodes[parent.0].children.get(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(PathNode {
            name: name.to_string(),
            count: 0,
            children: HashMap::new(),
        });
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.0]
    }

    /// Total samples folded so far
    #[must_use]
    pub fn total(&self) -> u64 {
        self.nodes[NodeId::ROOT.0].count
    }

    /// Whether no sample has been folded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Nodes in the arena, the synthetic root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Samples whose stacks end exactly at this node
    ///
    /// A node's count minus its children's counts. Nonzero on leaves
    /// and on interior nodes where truncated stacks stopped.
    #[must_use]
    pub fn terminating(&self, id: NodeId) -> u64 {
        let node = &self.nodes[id.0];
        let children_sum: u64 = node.children.values().map(|&c| self.nodes[c.0].count).sum();
        node.count - children_sum
    }

    /// Distinct complete call paths in the tree
    #[must_use]
    pub fn unique_paths(&self) -> usize {
        (1..self.nodes.len()).filter(|&i| self.terminating(NodeId(i)) > 0).count()
    }

    /// Every complete call path with the samples terminating on it
    ///
    /// Paths exclude the synthetic root. Order follows the traversal;
    /// callers needing a stable order sort the result themselves.
    #[must_use]
    pub fn folded_paths(&self) -> Vec<(Vec<&str>, u64)> {
        let mut out = Vec::new();
        let mut pending: Vec<(NodeId, usize)> = vec![(NodeId::ROOT, 0)];
        let mut path: Vec<&str> = Vec::new();

        while let Some((id, depth)) = pending.pop() {
            path.truncate(depth);
            let node = &self.nodes[id.0];
            if id != NodeId::ROOT {
                path.push(&node.name);
                let ending = self.terminating(id);
                if ending > 0 {
                    out.push((path.clone(), ending));
                }
            }
            for &child in node.children.values() {
                pending.push((child, path.len()));
            }
        }
        out
    }
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_root_count_equals_samples_folded() {
        let mut tree = PathTree::new();
        tree.fold(&stack(&["main", "alpha"]));
        tree.fold(&stack(&["main", "beta"]));
        tree.fold(&stack(&["main"]));

        assert_eq!(tree.total(), 3);
    }

    #[test]
    fn test_count_is_children_sum_plus_terminating() {
        let mut tree = PathTree::new();
        tree.fold(&stack(&["main", "alpha"]));
        tree.fold(&stack(&["main", "beta"]));

        let main = tree.node(NodeId::ROOT).children["main"];
        assert_eq!(tree.node(main).count, 2);
        assert_eq!(tree.terminating(main), 0);

        // A stack ending at main makes it a partial terminator
        tree.fold(&stack(&["main"]));
        assert_eq!(tree.node(main).count, 3);
        assert_eq!(tree.terminating(main), 1);
    }

    #[test]
    fn test_folding_order_does_not_change_counts() {
        let stacks =
            [stack(&["a", "b", "c"]), stack(&["a", "b"]), stack(&["a", "d"]), stack(&["e"])];

        let mut forward = PathTree::new();
        for s in &stacks {
            forward.fold(s);
        }
        let mut reverse = PathTree::new();
        for s in stacks.iter().rev() {
            reverse.fold(s);
        }

        let mut lhs = forward.folded_paths();
        let mut rhs = reverse.folded_paths();
        lhs.sort();
        rhs.sort();
        assert_eq!(lhs, rhs);
        assert_eq!(forward.total(), reverse.total());
    }

    #[test]
    fn test_recursive_frames_stay_distinct_nodes() {
        let mut tree = PathTree::new();
        tree.fold(&stack(&["fib", "fib", "fib"]));

        // Root plus one node per stack position
        assert_eq!(tree.node_count(), 4);

        let first = tree.node(NodeId::ROOT).children["fib"];
        let second = tree.node(first).children["fib"];
        let third = tree.node(second).children["fib"];
        assert_ne!(first, second);
        assert_eq!(tree.node(third).count, 1);
        assert_eq!(tree.terminating(third), 1);
    }

    #[test]
    fn test_distinct_orderings_stay_distinct_paths() {
        let mut tree = PathTree::new();
        tree.fold(&stack(&["a", "b"]));
        tree.fold(&stack(&["b", "a"]));

        assert_eq!(tree.unique_paths(), 2);
        let mut paths = tree.folded_paths();
        paths.sort();
        assert_eq!(paths, vec![(vec!["a", "b"], 1), (vec!["b", "a"], 1)]);
    }

    #[test]
    fn test_empty_tree() {
        let tree = PathTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.total(), 0);
        assert_eq!(tree.unique_paths(), 0);
        assert!(tree.folded_paths().is_empty());
    }

    #[test]
    fn test_empty_stack_counts_toward_total_only() {
        let mut tree = PathTree::new();
        tree.fold(&[]);
        tree.fold(&stack(&["main"]));

        assert_eq!(tree.total(), 2);
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.terminating(NodeId::ROOT), 1);
    }
}
