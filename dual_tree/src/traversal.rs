//! Tree-shape-agnostic traversals driving a set of pruning rules.
//!
//! The traversers only know tree structure (children, point ranges). Everything about what a
//! visit means lives behind [`Rules`]: distances, bounds, pruning and accumulation. The contract
//! the traversers keep:
//!
//! - `score`/`score_point` is called for a pair before descending into it, and `Prune` is obeyed;
//! - `base_case` only runs for points of reference leaves, against a single query point;
//! - every reference leaf is reached for every query that was not pruned on the way down.
//!
//! Rules must be correct under any visitation order; the order given by scores is a heuristic.

use serde::{Serialize, Deserialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::tree::SpatialTree;

/// Outcome of scoring a pair. Lower priorities are visited first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Prune,
    Visit(f64),
}

impl Score {

    pub fn is_prune(&self) -> bool {
        return *self == Score::Prune;
    }

    pub fn priority(&self) -> f64 {
        match self {
            Score::Prune => f64::INFINITY,
            Score::Visit(x) => *x,
        }
    }
}

/// State the rules keep about the last scored pair. The dual traverser saves it before
/// descending into one child and restores it before the next.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalInfo {
    pub last_query_node: Option<usize>,
    pub last_reference_node: Option<usize>,
    pub last_score: f64,
}

impl TraversalInfo {

    pub fn new() -> Self {

        return Self {
            last_query_node: None,
            last_reference_node: None,
            last_score: 0.0,
        };
    }
}

pub trait Rules {

    /// Point-to-point computation. `query_index` and `reference_index` are storage indices of
    /// the query set and of the reference tree's dataset.
    fn base_case(&mut self, query_index: usize, reference_index: usize) -> f64;

    fn score_point(&mut self, query_index: usize, reference_node: usize) -> Score;

    fn rescore_point(&mut self, query_index: usize, reference_node: usize, old_score: Score) -> Score;

    /// Score valid for every point of `query_node`.
    fn score(&mut self, query_node: usize, reference_node: usize) -> Score;

    fn rescore(&mut self, query_node: usize, reference_node: usize, old_score: Score) -> Score;

    fn traversal_info(&self) -> &TraversalInfo;

    fn traversal_info_mut(&mut self) -> &mut TraversalInfo;

    fn base_cases(&self) -> usize;

    fn scores(&self) -> usize;

    /// Fewest reference points a greedy descent may end on.
    fn minimum_base_cases(&self) -> usize {
        return 0;
    }
}

/// Counters reported by an evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub base_cases: usize,
    pub scores: usize,
    pub prunes: usize,
}

impl TraversalStats {

    pub fn collect<R: Rules>(rules: &R, prunes: usize) -> Self {

        return Self {
            base_cases: rules.base_cases(),
            scores: rules.scores(),
            prunes,
        };
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Naive,
    SingleTree,
    DualTree,
    Greedy,
}

impl Algorithm {

    /// Whether every reference point that could change a result is examined.
    pub fn is_exact(&self) -> bool {
        return *self != Algorithm::Greedy;
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "naive" => Ok(Algorithm::Naive),
            "single_tree" => Ok(Algorithm::SingleTree),
            "dual_tree" => Ok(Algorithm::DualTree),
            "greedy" => Ok(Algorithm::Greedy),
            _ => Err(Error::invalid(format!("unknown algorithm: {}", s))),
        }
    }
}

/// Every query against every reference point.
pub fn naive<R: Rules>(num_queries: usize, num_references: usize, rules: &mut R) {

    for query_index in 0..num_queries {
        for reference_index in 0..num_references {
            rules.base_case(query_index, reference_index);
        }
    }
}

fn order(left: (usize, Score), right: (usize, Score)) -> ((usize, Score), (usize, Score)) {

    match right.1.priority() < left.1.priority() {
        true => (right, left),
        false => (left, right),
    }
}

/// Descends the reference tree once per query point.
pub struct SingleTreeTraverser<'t, T> {
    reference: &'t T,
    num_prunes: usize,
}

impl<'t, T: SpatialTree> SingleTreeTraverser<'t, T> {

    pub fn new(reference: &'t T) -> Self {

        return Self {
            reference,
            num_prunes: 0,
        };
    }

    pub fn num_prunes(&self) -> usize {
        return self.num_prunes;
    }

    pub fn traverse<R: Rules>(&mut self, query_index: usize, rules: &mut R) {

        let root = self.reference.root();

        match rules.score_point(query_index, root) {
            Score::Prune => self.num_prunes += 1,
            Score::Visit(_) => self.descend(query_index, root, rules),
        }
    }

    fn descend<R: Rules>(&mut self, query_index: usize, reference_node: usize, rules: &mut R) {

        let (left, right) = match self.reference.children(reference_node) {
            Some(x) => x,
            None => {
                for reference_index in self.reference.points(reference_node) {
                    rules.base_case(query_index, reference_index);
                }
                return;
            },
        };

        let left_score = rules.score_point(query_index, left);
        let right_score = rules.score_point(query_index, right);

        let ((first, first_score), (second, second_score)) = order((left, left_score), (right, right_score));

        if first_score.is_prune() {
            self.num_prunes += 2;
            return;
        }

        self.descend(query_index, first, rules);

        match rules.rescore_point(query_index, second, second_score) {
            Score::Prune => self.num_prunes += 1,
            Score::Visit(_) => self.descend(query_index, second, rules),
        }
    }
}

/// Descends the reference tree once per query point, following only the better-scored child.
/// Once the better child holds too few points, every point below the current node is a base case.
pub struct GreedySingleTreeTraverser<'t, T> {
    reference: &'t T,
    num_prunes: usize,
}

impl<'t, T: SpatialTree> GreedySingleTreeTraverser<'t, T> {

    pub fn new(reference: &'t T) -> Self {

        return Self {
            reference,
            num_prunes: 0,
        };
    }

    pub fn num_prunes(&self) -> usize {
        return self.num_prunes;
    }

    pub fn traverse<R: Rules>(&mut self, query_index: usize, rules: &mut R) {

        let mut node = self.reference.root();

        while let Some((left, right)) = self.reference.children(node) {

            let left_score = rules.score_point(query_index, left);
            let right_score = rules.score_point(query_index, right);
            let ((best, _), _) = order((left, left_score), (right, right_score));

            if self.reference.num_descendants(best) <= rules.minimum_base_cases() {
                break;
            }

            self.num_prunes += 1;
            node = best;
        }

        for reference_index in self.reference.points(node) {
            rules.base_case(query_index, reference_index);
        }
    }
}

/// Descends a query tree and a reference tree together.
pub struct DualTreeTraverser<'t, T> {
    query: &'t T,
    reference: &'t T,
    num_prunes: usize,
}

impl<'t, T: SpatialTree> DualTreeTraverser<'t, T> {

    pub fn new(query: &'t T, reference: &'t T) -> Self {

        return Self {
            query,
            reference,
            num_prunes: 0,
        };
    }

    pub fn num_prunes(&self) -> usize {
        return self.num_prunes;
    }

    pub fn traverse<R: Rules>(&mut self, rules: &mut R) {

        let query_root = self.query.root();
        let reference_root = self.reference.root();

        match rules.score(query_root, reference_root) {
            Score::Prune => self.num_prunes += 1,
            Score::Visit(_) => self.descend(query_root, reference_root, rules),
        }
    }

    fn descend<R: Rules>(&mut self, query_node: usize, reference_node: usize, rules: &mut R) {

        let info = rules.traversal_info().clone();

        match (self.query.children(query_node), self.reference.children(reference_node)) {
            (None, None) => {
                for query_index in self.query.points(query_node) {
                    if rules.score_point(query_index, reference_node).is_prune() {
                        self.num_prunes += 1;
                        continue;
                    }

                    for reference_index in self.reference.points(reference_node) {
                        rules.base_case(query_index, reference_index);
                    }

                    *rules.traversal_info_mut() = info.clone();
                }
            },
            (Some((query_left, query_right)), None) => {
                for query_child in [query_left, query_right] {
                    match rules.score(query_child, reference_node) {
                        Score::Prune => self.num_prunes += 1,
                        Score::Visit(_) => self.descend(query_child, reference_node, rules),
                    }
                    *rules.traversal_info_mut() = info.clone();
                }
            },
            (None, Some((reference_left, reference_right))) => {
                self.visit_reference_children(query_node, reference_left, reference_right, rules);
            },
            (Some((query_left, query_right)), Some((reference_left, reference_right))) => {
                for query_child in [query_left, query_right] {
                    self.visit_reference_children(query_child, reference_left, reference_right, rules);
                    *rules.traversal_info_mut() = info.clone();
                }
            },
        }
    }

    fn visit_reference_children<R: Rules>(&mut self, query_node: usize, left: usize, right: usize, rules: &mut R) {

        let left_score = rules.score(query_node, left);
        let right_score = rules.score(query_node, right);

        let ((first, first_score), (second, second_score)) = order((left, left_score), (right, right_score));

        if first_score.is_prune() {
            self.num_prunes += 2;
            return;
        }

        self.descend(query_node, first, rules);

        match rules.rescore(query_node, second, second_score) {
            Score::Prune => self.num_prunes += 1,
            Score::Visit(_) => self.descend(query_node, second, rules),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Matrix;
    use crate::metric::EuclideanDistance;
    use crate::tree::KdTree;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Never prunes and records every base case.
    struct CountingRules {
        pairs: Vec<(usize, usize)>,
        scores: usize,
        minimum: usize,
        info: TraversalInfo,
    }

    impl CountingRules {
        fn new() -> Self {
            return Self { pairs: Vec::new(), scores: 0, minimum: 0, info: TraversalInfo::new() };
        }
    }

    impl Rules for CountingRules {

        fn base_case(&mut self, query_index: usize, reference_index: usize) -> f64 {
            self.pairs.push((query_index, reference_index));
            return 0.0;
        }

        fn score_point(&mut self, _query_index: usize, _reference_node: usize) -> Score {
            self.scores += 1;
            return Score::Visit(0.0);
        }

        fn rescore_point(&mut self, _query_index: usize, _reference_node: usize, old_score: Score) -> Score {
            return old_score;
        }

        fn score(&mut self, query_node: usize, reference_node: usize) -> Score {
            self.scores += 1;
            self.info.last_query_node = Some(query_node);
            self.info.last_reference_node = Some(reference_node);
            return Score::Visit(0.0);
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
            return self.pairs.len();
        }

        fn scores(&self) -> usize {
            return self.scores;
        }

        fn minimum_base_cases(&self) -> usize {
            return self.minimum;
        }
    }

    fn all_pairs(num_queries: usize, num_references: usize) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for q in 0..num_queries {
            for r in 0..num_references {
                pairs.push((q, r));
            }
        }
        return pairs;
    }

    #[test]
    fn traversals_without_pruning_visit_every_pair_once() {

        let mut rng = StdRng::seed_from_u64(11);
        let (reference, _): (KdTree, Vec<usize>) = KdTree::build(Matrix::random(2, 60, &mut rng), 4, EuclideanDistance);
        let (query, _): (KdTree, Vec<usize>) = KdTree::build(Matrix::random(2, 35, &mut rng), 3, EuclideanDistance);

        let mut rules = CountingRules::new();
        naive(35, 60, &mut rules);
        assert_eq!(rules.pairs, all_pairs(35, 60));

        let mut rules = CountingRules::new();
        let mut traverser = SingleTreeTraverser::new(&reference);
        for q in 0..35 {
            traverser.traverse(q, &mut rules);
        }
        rules.pairs.sort();
        assert_eq!(rules.pairs, all_pairs(35, 60));
        assert_eq!(traverser.num_prunes(), 0);

        let mut rules = CountingRules::new();
        let mut traverser = DualTreeTraverser::new(&query, &reference);
        traverser.traverse(&mut rules);
        rules.pairs.sort();
        assert_eq!(rules.pairs, all_pairs(35, 60));
        assert_eq!(TraversalStats::collect(&rules, traverser.num_prunes()).base_cases, 35 * 60);
    }

    #[test]
    fn greedy_descent_ends_on_one_subtree() {

        let mut rng = StdRng::seed_from_u64(12);
        let (reference, _): (KdTree, Vec<usize>) = KdTree::build(Matrix::random(2, 64, &mut rng), 4, EuclideanDistance);

        let mut rules = CountingRules::new();
        let mut traverser = GreedySingleTreeTraverser::new(&reference);
        traverser.traverse(0, &mut rules);

        //equal scores pick the left child, down to a single leaf
        assert!(rules.pairs.len() <= 4);
        assert!(!rules.pairs.is_empty());
        assert!(traverser.num_prunes() > 0);
        assert!(rules.pairs.iter().all(|(q, _)| *q == 0));

        let mut rules = CountingRules { minimum: 64, ..CountingRules::new() };
        let mut traverser = GreedySingleTreeTraverser::new(&reference);
        traverser.traverse(0, &mut rules);
        assert_eq!(rules.pairs.len(), 64);
        assert_eq!(traverser.num_prunes(), 0);
    }

    #[test]
    fn lower_priority_goes_first() {

        let ((first, _), (second, _)) = order((1, Score::Visit(2.0)), (2, Score::Visit(0.5)));
        assert_eq!((first, second), (2, 1));

        let ((first, _), _) = order((1, Score::Prune), (2, Score::Visit(100.0)));
        assert_eq!(first, 2);

        assert_eq!("dual_tree".parse::<Algorithm>().unwrap(), Algorithm::DualTree);
        assert_eq!("greedy".parse::<Algorithm>().unwrap(), Algorithm::Greedy);
        assert!(!Algorithm::Greedy.is_exact());
        assert!("cover".parse::<Algorithm>().is_err());
    }
}
