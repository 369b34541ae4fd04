//! Pruning rules for k-nearest and k-furthest neighbor search.

use crate::data::Matrix;
use crate::metric::Metric;
use crate::traversal::{Rules, Score, TraversalInfo};
use crate::tree::SpatialTree;

use super::sort::SortPolicy;
use super::top_hits::TopHits;

/// Keeps one candidate list per query, indexed by storage index of the query set.
///
/// In dual-tree mode every query node also caches the worst k-th candidate distance over its
/// descendants. The cache only ever tightens.
pub struct NeighborSearchRules<'r, S, T> {
    reference: &'r T,
    query_set: &'r Matrix,
    query_tree: Option<&'r T>,
    candidates: Vec<TopHits<S>>,
    bounds: Vec<f64>,
    k: usize,
    epsilon: f64,
    same_set: bool,
    last_query_index: Option<usize>,
    last_reference_index: Option<usize>,
    last_base_case: f64,
    info: TraversalInfo,
    base_cases: usize,
    scores: usize,
}

impl<'r, S: SortPolicy, T: SpatialTree> NeighborSearchRules<'r, S, T> {

    pub fn single(reference: &'r T, query_set: &'r Matrix, k: usize, epsilon: f64, same_set: bool) -> Self {
        return Self::with_queries(reference, query_set, None, k, epsilon, same_set);
    }

    pub fn dual(reference: &'r T, query_tree: &'r T, k: usize, epsilon: f64, same_set: bool) -> Self {
        return Self::with_queries(reference, query_tree.dataset(), Some(query_tree), k, epsilon, same_set);
    }

    fn with_queries(reference: &'r T, query_set: &'r Matrix, query_tree: Option<&'r T>, k: usize, epsilon: f64, same_set: bool) -> Self {

        let num_query_nodes = match query_tree {
            Some(tree) => tree.num_nodes(),
            None => 0,
        };

        return Self {
            reference,
            query_set,
            query_tree,
            candidates: vec![TopHits::new(k); query_set.num_points()],
            bounds: vec![S::worst_distance(); num_query_nodes],
            k,
            epsilon,
            same_set,
            last_query_index: None,
            last_reference_index: None,
            last_base_case: 0.0,
            info: TraversalInfo::new(),
            base_cases: 0,
            scores: 0,
        };
    }

    pub fn into_candidates(self) -> Vec<TopHits<S>> {
        return self.candidates;
    }

    /// A node whose best distance is worse than the bound holds no improvement. A node exactly at
    /// the bound may still hold a tie with a lower index, so it is kept. An unfilled candidate
    /// list always accepts.
    fn can_improve(distance: f64, bound: f64) -> bool {
        return bound == S::worst_distance() || !S::is_better(bound, distance);
    }

    /// Best distance of the last scored pair, when that pair is `(query_node, reference_node)`
    /// or one of its ancestors. No descendant pair can do better.
    fn ancestor_distance(&self, query_tree: &T, query_node: usize, reference_node: usize) -> Option<f64> {

        let (last_query, last_reference) = match (self.info.last_query_node, self.info.last_reference_node) {
            (Some(q), Some(r)) => (q, r),
            _ => return None,
        };

        let query_related = last_query == query_node || query_tree.parent(query_node) == Some(last_query);
        let reference_related = last_reference == reference_node || self.reference.parent(reference_node) == Some(last_reference);

        match query_related && reference_related {
            true => Some(S::convert_to_distance(self.info.last_score)),
            false => None,
        }
    }

    fn to_score(distance: f64, bound: f64) -> Score {
        match Self::can_improve(distance, bound) {
            true => Score::Visit(S::convert_to_score(distance)),
            false => Score::Prune,
        }
    }

    /// Worst k-th candidate distance over the descendants of `query_node`, tightened by the
    /// parent's cached bound and stored.
    fn query_bound(&mut self, query_tree: &T, query_node: usize) -> f64 {

        let mut worst = S::best_distance();

        match query_tree.children(query_node) {
            None => {
                for query_index in query_tree.points(query_node) {
                    worst = S::combine_worst(worst, self.candidates[query_index].worst());
                }
            },
            Some((left, right)) => {
                worst = S::combine_worst(self.bounds[left], self.bounds[right]);
            },
        }

        if let Some(parent) = query_tree.parent(query_node) {
            if S::is_better(self.bounds[parent], worst) {
                worst = self.bounds[parent];
            }
        }

        if S::is_better(worst, self.bounds[query_node]) {
            self.bounds[query_node] = worst;
        }

        return self.bounds[query_node];
    }
}

impl<'r, S: SortPolicy, T: SpatialTree> Rules for NeighborSearchRules<'r, S, T> {

    fn base_case(&mut self, query_index: usize, reference_index: usize) -> f64 {

        if self.same_set && query_index == reference_index {
            return 0.0;
        }

        if self.last_query_index == Some(query_index) && self.last_reference_index == Some(reference_index) {
            return self.last_base_case;
        }

        let distance = self.reference.metric().evaluate(self.query_set.col(query_index), self.reference.dataset().col(reference_index));
        self.candidates[query_index].try_add(distance, reference_index);

        self.base_cases += 1;
        self.last_query_index = Some(query_index);
        self.last_reference_index = Some(reference_index);
        self.last_base_case = distance;

        return distance;
    }

    fn score_point(&mut self, query_index: usize, reference_node: usize) -> Score {

        let distance = S::best_point_distance(self.reference, reference_node, self.query_set.col(query_index));
        let bound = S::relax(self.candidates[query_index].worst(), self.epsilon);

        self.scores += 1;

        return Self::to_score(distance, bound);
    }

    fn rescore_point(&mut self, query_index: usize, _reference_node: usize, old_score: Score) -> Score {

        let distance = match old_score {
            Score::Prune => return Score::Prune,
            Score::Visit(x) => S::convert_to_distance(x),
        };

        let bound = S::relax(self.candidates[query_index].worst(), self.epsilon);

        return Self::to_score(distance, bound);
    }

    fn score(&mut self, query_node: usize, reference_node: usize) -> Score {

        let query_tree = match self.query_tree {
            Some(x) => x,
            None => return Score::Visit(0.0),
        };

        let bound = S::relax(self.query_bound(query_tree, query_node), self.epsilon);
        self.scores += 1;

        if let Some(distance) = self.ancestor_distance(query_tree, query_node, reference_node) {
            if !Self::can_improve(distance, bound) {
                return Score::Prune;
            }
        }

        let distance = S::best_node_distance(query_tree, query_node, self.reference, reference_node);

        let score = Self::to_score(distance, bound);
        if let Score::Visit(x) = score {
            self.info.last_query_node = Some(query_node);
            self.info.last_reference_node = Some(reference_node);
            self.info.last_score = x;
        }

        return score;
    }

    fn rescore(&mut self, query_node: usize, _reference_node: usize, old_score: Score) -> Score {

        let distance = match old_score {
            Score::Prune => return Score::Prune,
            Score::Visit(x) => S::convert_to_distance(x),
        };

        let bound = S::relax(self.bounds[query_node], self.epsilon);

        return Self::to_score(distance, bound);
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

    /// Enough points to fill every candidate list, counting the skipped self pair.
    fn minimum_base_cases(&self) -> usize {
        return self.k + self.same_set as usize;
    }
}
