//! Implementation of binary space tree creation, and the capability contract every tree type
//! offers to the traversers and rules.

use serde::{Serialize, Deserialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::ops::Range;
use std::str::FromStr;

use crate::bound::{Bound, BallBound, HRectBound};
use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::metric::{EuclideanDistance, Metric};
use crate::node::{NodeStore, TreeNode};

/// What the traversers and rules need from a tree. Nodes are addressed by index.
pub trait SpatialTree: Clone + Debug + Send + Sync {

    type Metric: Metric;

    /// Builds a tree over `dataset`, returning it with the old-from-new permutation of its
    /// storage: column `i` of `tree.dataset()` is column `old_from_new[i]` of the input.
    fn build(dataset: Matrix, leaf_size: usize, metric: Self::Metric) -> (Self, Vec<usize>);

    fn dataset(&self) -> &Matrix;

    fn metric(&self) -> &Self::Metric;

    fn root(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn children(&self, node: usize) -> Option<(usize, usize)>;

    fn parent(&self, node: usize) -> Option<usize>;

    /// Storage indices of every point below `node`.
    fn points(&self, node: usize) -> Range<usize>;

    fn is_leaf(&self, node: usize) -> bool {
        return self.children(node).is_none();
    }

    fn num_descendants(&self, node: usize) -> usize {
        return self.points(node).len();
    }

    fn min_distance_to_point(&self, node: usize, point: &[f64]) -> f64;

    fn max_distance_to_point(&self, node: usize, point: &[f64]) -> f64;

    /// Smallest distance between any point of `node` and any point of `other_node` in `other`.
    fn min_distance(&self, node: usize, other: &Self, other_node: usize) -> f64;

    fn max_distance(&self, node: usize, other: &Self, other_node: usize) -> f64;
}

/// Binary tree splitting each node at the midpoint of its widest dimension, until nodes hold at
/// most `leaf_size` points. The bound type decides whether this is a kd tree or a ball tree.
#[derive(Debug, Clone)]
pub struct BinarySpaceTree<M, B> {
    metric: M,
    dataset: Matrix,
    nodes: NodeStore<B>,
    leaf_size: usize,
}

pub type KdTree<M = EuclideanDistance> = BinarySpaceTree<M, HRectBound>;
pub type BallTree<M = EuclideanDistance> = BinarySpaceTree<M, BallBound>;

impl<M: Metric, B: Bound> BinarySpaceTree<M, B> {

    pub fn leaf_size(&self) -> usize {
        return self.leaf_size;
    }

    pub fn num_leaves(&self) -> usize {
        return self.nodes.store.iter().filter(|x| x.is_leaf()).count();
    }

    pub fn depth(&self) -> usize {

        let mut deepest = 0;
        let mut to_visit: VecDeque<(usize, usize)> = VecDeque::new();
        to_visit.push_back((0, 1));

        while let Some((index, depth)) = to_visit.pop_front() {
            deepest = deepest.max(depth);
            if let Some((left, right)) = self.nodes.get_node(index).children {
                to_visit.push_back((left, depth + 1));
                to_visit.push_back((right, depth + 1));
            }
        }

        return deepest;
    }

    /// One line per node, depth first.
    pub fn output_nodes(&self) -> String {

        let mut s = String::new();
        let mut to_visit: Vec<(usize, usize)> = vec![(0, 0)];

        while let Some((index, depth)) = to_visit.pop() {
            let node = self.nodes.get_node(index);
            s += &format!("{}{}\n", "  ".repeat(depth), node.pretty(index));
            if let Some((left, right)) = node.children {
                to_visit.push((right, depth + 1));
                to_visit.push((left, depth + 1));
            }
        }

        return s;
    }

    ///Returns the widest dimension of columns `begin..begin + count` and the midpoint of its
    ///range, or None when every point is identical.
    fn split_dimension(dataset: &Matrix, begin: usize, count: usize) -> Option<(usize, f64)> {

        let mut lo = vec![f64::INFINITY; dataset.dims()];
        let mut hi = vec![f64::NEG_INFINITY; dataset.dims()];

        for i in begin..begin + count {
            for (d, value) in dataset.col(i).iter().enumerate() {
                lo[d] = lo[d].min(*value);
                hi[d] = hi[d].max(*value);
            }
        }

        let mut split_axis = 0;
        let mut widest = 0.0;
        for d in 0..dataset.dims() {
            let width = hi[d] - lo[d];
            if width > widest {
                widest = width;
                split_axis = d;
            }
        }

        match widest > 0.0 {
            true => Some((split_axis, lo[split_axis] + (hi[split_axis] - lo[split_axis]) / 2.0)),
            false => None,
        }
    }

    ///Moves columns with `value <= split_value` on `split_axis` to the front of the range and
    ///returns the index of the first column of the right side.
    fn partition(dataset: &mut Matrix, old_from_new: &mut [usize], begin: usize, count: usize, split_axis: usize, split_value: f64) -> usize {

        let mut left = begin;
        let mut right = begin + count;

        while left < right {
            match dataset.col(left)[split_axis] <= split_value {
                true => {
                    left += 1;
                },
                false => {
                    right -= 1;
                    dataset.swap_cols(left, right);
                    old_from_new.swap(left, right);
                },
            }
        }

        return left;
    }
}

impl<M: Metric, B: Bound> SpatialTree for BinarySpaceTree<M, B> {

    type Metric = M;

    fn build(dataset: Matrix, leaf_size: usize, metric: M) -> (Self, Vec<usize>) {

        let mut dataset = dataset;
        let leaf_size = leaf_size.max(1);
        let num_points = dataset.num_points();
        let mut old_from_new: Vec<usize> = (0..num_points).collect();

        let mut nodes: NodeStore<B> = NodeStore::new();

        let root_bound = match num_points {
            0 => B::from_points(&metric, &Matrix::new(dataset.dims(), 1), 0, 1),
            _ => B::from_points(&metric, &dataset, 0, num_points),
        };
        nodes.add_node(TreeNode::new(0, num_points, root_bound, None));

        let mut to_visit: VecDeque<usize> = VecDeque::new();
        to_visit.push_back(0);

        while let Some(index) = to_visit.pop_front() {

            let (begin, count) = {
                let node = nodes.get_node(index);
                (node.begin, node.count)
            };

            if count <= leaf_size {
                continue;
            }

            let (split_axis, split_value) = match Self::split_dimension(&dataset, begin, count) {
                None => continue,
                Some(x) => x,
            };

            let split_col = Self::partition(&mut dataset, &mut old_from_new, begin, count, split_axis, split_value);
            let left_count = split_col - begin;

            if left_count == 0 || left_count == count {
                continue;
            }

            let left_bound = B::from_points(&metric, &dataset, begin, left_count);
            let right_bound = B::from_points(&metric, &dataset, split_col, count - left_count);

            let left = nodes.add_node(TreeNode::new(begin, left_count, left_bound, Some(index)));
            let right = nodes.add_node(TreeNode::new(split_col, count - left_count, right_bound, Some(index)));
            nodes.set_children(index, left, right);

            to_visit.push_back(left);
            to_visit.push_back(right);
        }

        let tree = Self {
            metric,
            dataset,
            nodes,
            leaf_size,
        };

        return (tree, old_from_new);
    }

    fn dataset(&self) -> &Matrix {
        return &self.dataset;
    }

    fn metric(&self) -> &M {
        return &self.metric;
    }

    fn root(&self) -> usize {
        return 0;
    }

    fn num_nodes(&self) -> usize {
        return self.nodes.len();
    }

    fn children(&self, node: usize) -> Option<(usize, usize)> {
        return self.nodes.get_node(node).children;
    }

    fn parent(&self, node: usize) -> Option<usize> {
        return self.nodes.get_node(node).parent;
    }

    fn points(&self, node: usize) -> Range<usize> {
        return self.nodes.get_node(node).points();
    }

    fn min_distance_to_point(&self, node: usize, point: &[f64]) -> f64 {
        return self.nodes.get_node(node).bound.min_distance_to_point(&self.metric, point);
    }

    fn max_distance_to_point(&self, node: usize, point: &[f64]) -> f64 {
        return self.nodes.get_node(node).bound.max_distance_to_point(&self.metric, point);
    }

    fn min_distance(&self, node: usize, other: &Self, other_node: usize) -> f64 {
        return self.nodes.get_node(node).bound.min_distance(&self.metric, &other.nodes.get_node(other_node).bound);
    }

    fn max_distance(&self, node: usize, other: &Self, other_node: usize) -> f64 {
        return self.nodes.get_node(node).bound.max_distance(&self.metric, &other.nodes.get_node(other_node).bound);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TreeType {
    Kd,
    Ball,
}

impl FromStr for TreeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kd" => Ok(TreeType::Kd),
            "ball" => Ok(TreeType::Ball),
            _ => Err(Error::invalid(format!("unknown tree type: {}", s))),
        }
    }
}
