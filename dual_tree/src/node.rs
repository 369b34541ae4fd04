//! Holds structs for representing nodes (both internal and leaf) of a binary space tree.
//!
//! Nodes live in a flat store and refer to each other by index. Every node owns a contiguous
//! range of columns of the tree's (permuted) dataset; the two children of an internal node split
//! their parent's range.

use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub enum NodePointer {
    Internal(usize),
    Leaf(usize),
}

impl fmt::Display for NodePointer {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodePointer::Internal(index) => write!(f, "NODE {}", index),
            NodePointer::Leaf(index) => write!(f, "LEAF {}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode<B> {
    pub begin: usize,
    pub count: usize,
    pub bound: B,
    pub parent: Option<usize>,
    pub children: Option<(usize, usize)>,
}

impl<B> TreeNode<B> {

    pub fn new(begin: usize, count: usize, bound: B, parent: Option<usize>) -> Self {

        return Self {
            begin,
            count,
            bound,
            parent,
            children: None,
        }
    }

    pub fn points(&self) -> Range<usize> {
        return self.begin..self.begin + self.count;
    }

    pub fn is_leaf(&self) -> bool {
        return self.children.is_none();
    }

    pub fn pretty(&self, index: usize) -> String {

        let pointer = match self.is_leaf() {
            true => NodePointer::Leaf(index),
            false => NodePointer::Internal(index),
        };

        return format!("{} [{}..{}) children: {:?}", pointer, self.begin, self.begin + self.count, self.children);
    }
}

/// Flat, append-only store of tree nodes. The root is always at index 0.
#[derive(Debug, Clone)]
pub struct NodeStore<B> {
    pub store: Vec<TreeNode<B>>,
}

impl<B> NodeStore<B> {

    pub fn new() -> Self {

        return Self {
            store: Vec::new(),
        };
    }

    pub fn len(&self) -> usize {
        return self.store.len();
    }

    pub fn add_node(&mut self, node: TreeNode<B>) -> usize {

        self.store.push(node);

        return self.store.len() - 1;
    }

    pub fn get_node(&self, index: usize) -> &TreeNode<B> {
        return &self.store[index];
    }

    pub fn set_children(&mut self, index: usize, left: usize, right: usize) {
        self.store[index].children = Some((left, right));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_links_children() {

        let mut nodes: NodeStore<()> = NodeStore::new();

        let root = nodes.add_node(TreeNode::new(0, 10, (), None));
        let left = nodes.add_node(TreeNode::new(0, 4, (), Some(root)));
        let right = nodes.add_node(TreeNode::new(4, 6, (), Some(root)));
        nodes.set_children(root, left, right);

        assert_eq!(root, 0);
        assert!(!nodes.get_node(root).is_leaf());
        assert!(nodes.get_node(left).is_leaf());
        assert_eq!(nodes.get_node(right).points(), 4..10);
        assert_eq!(nodes.get_node(root).pretty(root), "NODE 0 [0..10) children: Some((1, 2))");
    }
}
