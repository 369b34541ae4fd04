//! Pruning rules for kernel density estimation.

use crate::data::Matrix;
use crate::kernel::Kernel;
use crate::metric::Metric;
use crate::traversal::{Rules, Score, TraversalInfo};
use crate::tree::SpatialTree;

use super::ErrorBudget;

/// Accumulates unnormalized kernel sums per query.
///
/// Query indices handed to the rules are storage indices of `query_set`. When the queries live
/// in a tree, `old_from_new_queries` maps them back so that the sums land in original order.
pub struct KdeRules<'r, K, T> {
    reference: &'r T,
    query_set: &'r Matrix,
    query_tree: Option<&'r T>,
    old_from_new_queries: Option<&'r [usize]>,
    kernel: &'r K,
    budget: ErrorBudget,
    densities: Vec<f64>,
    last_query_index: Option<usize>,
    last_reference_index: Option<usize>,
    last_base_case: f64,
    info: TraversalInfo,
    base_cases: usize,
    scores: usize,
}

impl<'r, K: Kernel, T: SpatialTree> KdeRules<'r, K, T> {

    /// Rules for naive and single-tree evaluation of the points of `query_set`, in their order.
    pub fn single(reference: &'r T, query_set: &'r Matrix, kernel: &'r K, budget: ErrorBudget) -> Self {
        return Self::with_queries(reference, query_set, None, None, kernel, budget);
    }

    /// Rules for dual-tree evaluation of the points of `query_tree`.
    pub fn dual(reference: &'r T, query_tree: &'r T, old_from_new_queries: &'r [usize], kernel: &'r K, budget: ErrorBudget) -> Self {
        return Self::with_queries(reference, query_tree.dataset(), Some(query_tree), Some(old_from_new_queries), kernel, budget);
    }

    fn with_queries(reference: &'r T, query_set: &'r Matrix, query_tree: Option<&'r T>, old_from_new_queries: Option<&'r [usize]>, kernel: &'r K, budget: ErrorBudget) -> Self {

        return Self {
            reference,
            query_set,
            query_tree,
            old_from_new_queries,
            kernel,
            budget,
            densities: vec![0.0; query_set.num_points()],
            last_query_index: None,
            last_reference_index: None,
            last_base_case: 0.0,
            info: TraversalInfo::new(),
            base_cases: 0,
            scores: 0,
        };
    }

    /// Raw kernel sums, indexed by original query index.
    pub fn into_densities(self) -> Vec<f64> {
        return self.densities;
    }

    fn original_query(&self, query_index: usize) -> usize {
        match self.old_from_new_queries {
            Some(old_from_new) => old_from_new[query_index],
            None => query_index,
        }
    }

    /// Midpoint contribution of `count` reference points whose kernel values lie in
    /// `[min_kernel, max_kernel]`, or None when the interval is too wide to approximate.
    fn approximation(&self, min_kernel: f64, max_kernel: f64, count: usize) -> Option<f64> {

        match self.budget.allows(min_kernel, max_kernel) {
            true => Some(count as f64 * (max_kernel + min_kernel) / 2.0),
            false => None,
        }
    }
}

impl<'r, K: Kernel, T: SpatialTree> Rules for KdeRules<'r, K, T> {

    fn base_case(&mut self, query_index: usize, reference_index: usize) -> f64 {

        if self.last_query_index == Some(query_index) && self.last_reference_index == Some(reference_index) {
            return self.last_base_case;
        }

        let distance = self.reference.metric().evaluate(self.query_set.col(query_index), self.reference.dataset().col(reference_index));
        let value = self.kernel.evaluate(distance);

        let original = self.original_query(query_index);
        self.densities[original] += value;

        self.base_cases += 1;
        self.last_query_index = Some(query_index);
        self.last_reference_index = Some(reference_index);
        self.last_base_case = value;

        return value;
    }

    fn score_point(&mut self, query_index: usize, reference_node: usize) -> Score {

        let point = self.query_set.col(query_index);
        let min_distance = self.reference.min_distance_to_point(reference_node, point);
        let max_distance = self.reference.max_distance_to_point(reference_node, point);
        let (min_kernel, max_kernel) = self.kernel.bounds(min_distance, max_distance);

        self.scores += 1;

        match self.approximation(min_kernel, max_kernel, self.reference.num_descendants(reference_node)) {
            Some(contribution) => {
                let original = self.original_query(query_index);
                self.densities[original] += contribution;
                Score::Prune
            },
            None => Score::Visit(min_distance),
        }
    }

    fn rescore_point(&mut self, _query_index: usize, _reference_node: usize, old_score: Score) -> Score {
        return old_score;
    }

    fn score(&mut self, query_node: usize, reference_node: usize) -> Score {

        let query_tree = match self.query_tree {
            Some(x) => x,
            None => return Score::Visit(0.0),
        };

        let min_distance = query_tree.min_distance(query_node, self.reference, reference_node);
        let max_distance = query_tree.max_distance(query_node, self.reference, reference_node);
        let (min_kernel, max_kernel) = self.kernel.bounds(min_distance, max_distance);

        self.scores += 1;

        match self.approximation(min_kernel, max_kernel, self.reference.num_descendants(reference_node)) {
            Some(contribution) => {
                for query_index in query_tree.points(query_node) {
                    let original = self.original_query(query_index);
                    self.densities[original] += contribution;
                }
                Score::Prune
            },
            None => Score::Visit(min_distance),
        }
    }

    fn rescore(&mut self, _query_node: usize, _reference_node: usize, old_score: Score) -> Score {
        return old_score;
    }

    fn traversal_info(&self) -> &TraversalInfo {
        return &self.info;
    }

    fn traversal_info_mut(&mut self) -> &mut TraversalInfo {
        return &mut self.info;
    }

    fn base_cases(&self) -> usize {
        return self.base_cases;
    }

    fn scores(&self) -> usize {
        return self.scores;
    }
}
