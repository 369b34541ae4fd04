//! k-nearest and k-furthest neighbor search over a reference tree.
//!
//! Results are indexed `[query][rank]`, queries in their original order and ranks best first.
//! Neighbor indices refer to the reference set as it was handed to [`NeighborSearch::train`];
//! for a tree adopted with [`NeighborSearch::train_tree`] they are storage indices of that tree.

pub mod rules;
pub mod sort;
pub mod top_hits;

use std::marker::PhantomData;

use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::reference::ReferenceTree;
use crate::traversal::{self, Algorithm, DualTreeTraverser, GreedySingleTreeTraverser, SingleTreeTraverser, TraversalStats};
use crate::tree::SpatialTree;
use crate::validate;

use rules::NeighborSearchRules;
use sort::{SortKind, SortPolicy};
use top_hits::TopHits;

pub const DEFAULT_LEAF_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub neighbors: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
}

impl SearchResult {

    /// `(k, number of queries)`.
    pub fn shape(&self) -> (usize, usize) {

        let k = self.neighbors.first().map(|row| row.len()).unwrap_or(0);

        return (k, self.neighbors.len());
    }

    /// Mean relative difference between the distances found and the true ones. Pairs whose true
    /// distance is 0, or where nothing was found, are skipped.
    pub fn effective_error(&self, true_distances: &[Vec<f64>]) -> Result<f64> {

        let (k, num_queries) = self.shape();
        validate::check_result_shape("true distances", true_distances, k, num_queries)?;

        let mut total = 0.0;
        let mut count = 0;
        for (found, truth) in self.distances.iter().zip(true_distances.iter()) {
            for (d, t) in found.iter().zip(truth.iter()) {
                if *t != 0.0 && *d != f64::MAX {
                    total += (d - t).abs() / t;
                    count += 1;
                }
            }
        }

        match count {
            0 => Ok(0.0),
            _ => Ok(total / count as f64),
        }
    }

    /// Fraction of the true neighbors that were found.
    pub fn recall(&self, true_neighbors: &[Vec<usize>]) -> Result<f64> {

        let (k, num_queries) = self.shape();
        validate::check_result_shape("true neighbors", true_neighbors, k, num_queries)?;

        if k == 0 || num_queries == 0 {
            return Ok(1.0);
        }

        let mut found = 0;
        for (row, truth) in self.neighbors.iter().zip(true_neighbors.iter()) {
            found += row.iter().filter(|x| truth.contains(x)).count();
        }

        return Ok(found as f64 / (k * num_queries) as f64);
    }
}

#[derive(Debug, Clone)]
pub struct NeighborSearch<'a, S, T> {
    algorithm: Algorithm,
    epsilon: f64,
    leaf_size: usize,
    reference: Option<ReferenceTree<'a, T>>,
    sort: PhantomData<S>,
}

impl<'a, S: SortPolicy, T: SpatialTree> NeighborSearch<'a, S, T> {

    pub fn new(algorithm: Algorithm, epsilon: f64, leaf_size: usize) -> Result<Self> {

        let epsilon = validate::check_epsilon(epsilon, S::kind() == SortKind::Furthest)?;

        return Ok(Self {
            algorithm,
            epsilon,
            leaf_size,
            reference: None,
            sort: PhantomData,
        });
    }

    /// Exact dual-tree search with the default leaf size.
    pub fn exact() -> Self {

        return Self {
            algorithm: Algorithm::DualTree,
            epsilon: 0.0,
            leaf_size: DEFAULT_LEAF_SIZE,
            reference: None,
            sort: PhantomData,
        };
    }

    pub fn train(&mut self, reference: Matrix) -> Result<()> {

        validate::check_reference_set(&reference)?;

        log::info!("building reference tree over {} points in {} dimensions", reference.num_points(), reference.dims());

        self.reference = Some(ReferenceTree::build(reference, self.leaf_size, T::Metric::default()));

        Ok(())
    }

    pub fn train_tree(&mut self, tree: &'a T) -> Result<()> {

        validate::check_reference_set(tree.dataset())?;

        self.reference = Some(ReferenceTree::Borrowed(tree));

        Ok(())
    }

    /// Bichromatic search: the `k` best reference points for every point of `query`.
    pub fn search(&self, query: &Matrix, k: usize) -> Result<SearchResult> {

        let (result, _) = self.search_with_stats(query, k)?;

        return Ok(result);
    }

    pub fn search_with_stats(&self, query: &Matrix, k: usize) -> Result<(SearchResult, TraversalStats)> {

        let reference = self.trained_reference()?;
        validate::check_dimensions(reference.dims(), query)?;
        let k = validate::check_neighbor_count(k, reference.num_points(), false)?;

        if query.is_empty() {
            return Ok((SearchResult { neighbors: Vec::new(), distances: Vec::new() }, TraversalStats::default()));
        }

        let tree = reference.tree();

        let (candidates, stats, old_from_new) = match self.algorithm {
            Algorithm::Naive => {
                let mut rules = NeighborSearchRules::single(tree, query, k, self.epsilon, false);
                traversal::naive(query.num_points(), tree.dataset().num_points(), &mut rules);
                let stats = TraversalStats::collect(&rules, 0);
                (rules.into_candidates(), stats, None)
            },
            Algorithm::SingleTree => {
                let (candidates, stats) = self.single_tree(tree, query, k, false);
                (candidates, stats, None)
            },
            Algorithm::Greedy => {
                let (candidates, stats) = self.greedy(tree, query, k, false);
                (candidates, stats, None)
            },
            Algorithm::DualTree => {
                let (query_tree, old_from_new) = T::build(query.clone(), self.leaf_size, tree.metric().clone());
                let (candidates, stats) = self.dual_tree(tree, &query_tree, k, false);
                (candidates, stats, Some(old_from_new))
            },
        };

        let result = self.collect(reference, candidates, old_from_new.as_deref())?;
        log::debug!("searched {} queries for {} neighbors: {:?}", query.num_points(), k, stats);

        return Ok((result, stats));
    }

    /// Monochromatic search: the reference set queries itself, and no point is its own neighbor.
    pub fn search_self(&self, k: usize) -> Result<SearchResult> {

        let (result, _) = self.search_self_with_stats(k)?;

        return Ok(result);
    }

    pub fn search_self_with_stats(&self, k: usize) -> Result<(SearchResult, TraversalStats)> {

        let reference = self.trained_reference()?;
        let k = validate::check_neighbor_count(k, reference.num_points(), true)?;
        let tree = reference.tree();

        let (candidates, stats) = match self.algorithm {
            Algorithm::Naive => {
                let mut rules = NeighborSearchRules::single(tree, tree.dataset(), k, self.epsilon, true);
                let num_points = tree.dataset().num_points();
                traversal::naive(num_points, num_points, &mut rules);
                let stats = TraversalStats::collect(&rules, 0);
                (rules.into_candidates(), stats)
            },
            Algorithm::SingleTree => self.single_tree(tree, tree.dataset(), k, true),
            Algorithm::Greedy => self.greedy(tree, tree.dataset(), k, true),
            Algorithm::DualTree => self.dual_tree(tree, tree, k, true),
        };

        let result = self.collect(reference, candidates, reference.old_from_new())?;
        log::debug!("searched the reference set for {} neighbors: {:?}", k, stats);

        return Ok((result, stats));
    }

    /// Dual-tree search with a caller-built query tree. `old_from_new` maps the tree's storage to
    /// the order results are returned in.
    pub fn search_tree(&self, query_tree: &T, old_from_new: &[usize], k: usize) -> Result<SearchResult> {

        let reference = self.trained_reference()?;
        validate::check_dimensions(reference.dims(), query_tree.dataset())?;
        let k = validate::check_neighbor_count(k, reference.num_points(), false)?;

        validate::check_permutation(old_from_new, query_tree.dataset().num_points())?;

        if query_tree.dataset().is_empty() {
            return Ok(SearchResult { neighbors: Vec::new(), distances: Vec::new() });
        }

        let (candidates, _) = self.dual_tree(reference.tree(), query_tree, k, false);

        return self.collect(reference, candidates, Some(old_from_new));
    }

    fn single_tree(&self, tree: &T, query_set: &Matrix, k: usize, same_set: bool) -> (Vec<TopHits<S>>, TraversalStats) {

        let mut rules = NeighborSearchRules::single(tree, query_set, k, self.epsilon, same_set);
        let mut traverser = SingleTreeTraverser::new(tree);
        for query_index in 0..query_set.num_points() {
            traverser.traverse(query_index, &mut rules);
        }

        let stats = TraversalStats::collect(&rules, traverser.num_prunes());

        return (rules.into_candidates(), stats);
    }

    fn greedy(&self, tree: &T, query_set: &Matrix, k: usize, same_set: bool) -> (Vec<TopHits<S>>, TraversalStats) {

        let mut rules = NeighborSearchRules::single(tree, query_set, k, self.epsilon, same_set);
        let mut traverser = GreedySingleTreeTraverser::new(tree);
        for query_index in 0..query_set.num_points() {
            traverser.traverse(query_index, &mut rules);
        }

        let stats = TraversalStats::collect(&rules, traverser.num_prunes());

        return (rules.into_candidates(), stats);
    }

    fn dual_tree(&self, tree: &T, query_tree: &T, k: usize, same_set: bool) -> (Vec<TopHits<S>>, TraversalStats) {

        let mut rules = NeighborSearchRules::dual(tree, query_tree, k, self.epsilon, same_set);
        let mut traverser = DualTreeTraverser::new(query_tree, tree);
        traverser.traverse(&mut rules);

        let stats = TraversalStats::collect(&rules, traverser.num_prunes());

        return (rules.into_candidates(), stats);
    }

    /// Moves candidate lists from query storage order to original order, and reference storage
    /// indices to the indices callers know.
    fn collect(&self, reference: &ReferenceTree<'a, T>, candidates: Vec<TopHits<S>>, old_from_new_queries: Option<&[usize]>) -> Result<SearchResult> {

        let num_queries = candidates.len();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); num_queries];
        let mut distances: Vec<Vec<f64>> = vec![Vec::new(); num_queries];

        for (query_index, hits) in candidates.into_iter().enumerate() {

            if !hits.is_full() {
                return Err(Error::InvalidState(format!("query {} found fewer than {} candidates", query_index, hits.max_length)));
            }

            let original = match old_from_new_queries {
                Some(old_from_new) => old_from_new[query_index],
                None => query_index,
            };

            for (reference_index, distance) in hits.hits() {
                neighbors[original].push(reference.original_index(reference_index));
                distances[original].push(distance);
            }
        }

        return Ok(SearchResult { neighbors, distances });
    }

    fn trained_reference(&self) -> Result<&ReferenceTree<'a, T>> {
        match &self.reference {
            Some(x) => Ok(x),
            None => Err(Error::NotTrained),
        }
    }

    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {

        self.epsilon = validate::check_epsilon(epsilon, S::kind() == SortKind::Furthest)?;

        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
    }

    pub fn epsilon(&self) -> f64 {
        return self.epsilon;
    }

    pub fn algorithm(&self) -> Algorithm {
        return self.algorithm;
    }

    pub fn leaf_size(&self) -> usize {
        return self.leaf_size;
    }

    pub fn is_trained(&self) -> bool {
        return self.reference.is_some();
    }

    pub fn owns_reference_tree(&self) -> bool {
        match &self.reference {
            Some(reference) => reference.is_owned(),
            None => false,
        }
    }

    pub fn reference(&self) -> Option<&ReferenceTree<'a, T>> {
        return self.reference.as_ref();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{EuclideanDistance, Metric};
    use crate::tree::{BallTree, KdTree};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use super::sort::{FurthestNeighborSort, NearestNeighborSort};

    /// Sorted (distance, index) pairs of every reference point, per query.
    fn brute_force(reference: &Matrix, query: &Matrix, furthest: bool) -> Vec<Vec<(f64, usize)>> {

        let mut all = Vec::new();
        for q in 0..query.num_points() {
            let mut row: Vec<(f64, usize)> = (0..reference.num_points())
                .map(|r| (EuclideanDistance.evaluate(query.col(q), reference.col(r)), r))
                .collect();
            row.sort_by(|a, b| a.partial_cmp(b).unwrap());
            if furthest {
                row.reverse();
            }
            all.push(row);
        }

        return all;
    }

    fn searcher<S: SortPolicy, T: SpatialTree>(algorithm: Algorithm, epsilon: f64, reference: &Matrix) -> NeighborSearch<'static, S, T> {
        let mut search: NeighborSearch<S, T> = NeighborSearch::new(algorithm, epsilon, 5).unwrap();
        search.train(reference.clone()).unwrap();
        return search;
    }

    #[test]
    fn exact_search_agrees_across_algorithms_and_trees() {

        let mut rng = StdRng::seed_from_u64(51);
        let reference = Matrix::random(3, 100, &mut rng);

        let expected = searcher::<NearestNeighborSort, KdTree>(Algorithm::Naive, 0.0, &reference).search_self(10).unwrap();
        assert_eq!(expected.shape(), (10, 100));

        let truth = brute_force(&reference, &reference, false);
        for q in 0..100 {
            //rank 0 of the brute force is the point itself
            let expected_row: Vec<usize> = truth[q][1..11].iter().map(|x| x.1).collect();
            assert_eq!(expected.neighbors[q], expected_row);
        }

        for algorithm in [Algorithm::SingleTree, Algorithm::DualTree] {
            let kd = searcher::<NearestNeighborSort, KdTree>(algorithm, 0.0, &reference).search_self(10).unwrap();
            let ball = searcher::<NearestNeighborSort, BallTree>(algorithm, 0.0, &reference).search_self(10).unwrap();

            assert_eq!(kd, expected);
            assert_eq!(ball, expected);
        }
    }

    fn integer_grid(width: usize, height: usize, depth: usize) -> Matrix {

        let mut points = Vec::new();
        for x in 0..width {
            for y in 0..height {
                for z in 0..depth {
                    points.push(vec![x as f64, y as f64, z as f64]);
                }
            }
        }

        return Matrix::from_points(&points).unwrap();
    }

    fn tied_results_agree<S: SortPolicy, T: SpatialTree + 'static>(reference: &Matrix, query: &Matrix) {

        let expected_self = searcher::<S, T>(Algorithm::Naive, 0.0, reference).search_self(10).unwrap();
        let expected = searcher::<S, T>(Algorithm::Naive, 0.0, reference).search(query, 10).unwrap();

        for algorithm in [Algorithm::SingleTree, Algorithm::DualTree] {
            let search = searcher::<S, T>(algorithm, 0.0, reference);
            assert_eq!(search.search_self(10).unwrap(), expected_self, "{:?}", algorithm);
            assert_eq!(search.search(query, 10).unwrap(), expected, "{:?}", algorithm);
        }
    }

    #[test]
    fn ties_resolve_the_same_way_for_every_algorithm() {

        let reference = integer_grid(6, 6, 3);
        let query = Matrix::from_points(&[vec![2.0, 2.0, 1.0], vec![0.5, 0.5, 0.5], vec![5.0, 0.0, 2.0]]).unwrap();

        tied_results_agree::<NearestNeighborSort, KdTree>(&reference, &query);
        tied_results_agree::<FurthestNeighborSort, KdTree>(&reference, &query);

        //the first query is itself a grid point, with 6 grid neighbors at distance 1
        let result = searcher::<NearestNeighborSort, KdTree>(Algorithm::DualTree, 0.0, &reference).search(&query, 10).unwrap();
        assert_eq!(result.distances[0][0], 0.0);
        assert_eq!(result.distances[0][1..7], [1.0; 6]);
    }

    #[test]
    fn bichromatic_search_matches_brute_force() {

        let mut rng = StdRng::seed_from_u64(52);
        let reference = Matrix::random(4, 300, &mut rng);
        let query = Matrix::random(4, 60, &mut rng);
        let truth = brute_force(&reference, &query, false);

        for algorithm in [Algorithm::Naive, Algorithm::SingleTree, Algorithm::DualTree] {
            let result = searcher::<NearestNeighborSort, KdTree>(algorithm, 0.0, &reference).search(&query, 7).unwrap();

            assert_eq!(result.shape(), (7, 60));
            for q in 0..60 {
                let expected_row: Vec<usize> = truth[q][..7].iter().map(|x| x.1).collect();
                assert_eq!(result.neighbors[q], expected_row);
                assert_eq!(result.distances[q][0], truth[q][0].0);
            }
        }
    }

    #[test]
    fn furthest_search_matches_brute_force() {

        let mut rng = StdRng::seed_from_u64(53);
        let reference = Matrix::random(3, 200, &mut rng);
        let query = Matrix::random(3, 40, &mut rng);
        let truth = brute_force(&reference, &query, true);

        for algorithm in [Algorithm::Naive, Algorithm::SingleTree, Algorithm::DualTree] {
            let result = searcher::<FurthestNeighborSort, BallTree>(algorithm, 0.0, &reference).search(&query, 5).unwrap();

            for q in 0..40 {
                let expected_row: Vec<usize> = truth[q][..5].iter().map(|x| x.1).collect();
                assert_eq!(result.neighbors[q], expected_row);
            }

            let true_distances: Vec<Vec<f64>> = truth.iter().map(|row| row[..5].iter().map(|x| x.0).collect()).collect();
            let true_neighbors: Vec<Vec<usize>> = truth.iter().map(|row| row[..5].iter().map(|x| x.1).collect()).collect();
            assert_eq!(result.effective_error(&true_distances).unwrap(), 0.0);
            assert_eq!(result.recall(&true_neighbors).unwrap(), 1.0);
        }
    }

    #[test]
    fn epsilon_trades_accuracy_for_work() {

        let mut rng = StdRng::seed_from_u64(54);
        let reference = Matrix::random(3, 1000, &mut rng);
        let truth = brute_force(&reference, &reference, false);

        let exact = searcher::<NearestNeighborSort, KdTree>(Algorithm::DualTree, 0.0, &reference);
        let approximate = searcher::<NearestNeighborSort, KdTree>(Algorithm::DualTree, 0.5, &reference);

        let (exact_result, exact_stats) = exact.search_self_with_stats(10).unwrap();
        let (approximate_result, approximate_stats) = approximate.search_self_with_stats(10).unwrap();

        assert!(approximate_stats.base_cases < exact_stats.base_cases);

        for q in 0..1000 {
            for rank in 0..10 {
                assert_eq!(exact_result.distances[q][rank], truth[q][rank + 1].0);
                assert!(approximate_result.distances[q][rank] <= 1.5 * truth[q][rank + 1].0 + 1e-12);
            }
        }

        let error = approximate_result.effective_error(&exact_result.distances).unwrap();
        assert!(error >= 0.0 && error <= 0.5);
        assert!(approximate_result.recall(&exact_result.neighbors).unwrap() <= 1.0);
    }

    #[test]
    fn greedy_search_fills_every_list() {

        let mut rng = StdRng::seed_from_u64(57);
        let reference = Matrix::random(3, 2000, &mut rng);
        let query = Matrix::random(3, 100, &mut rng);
        let truth = brute_force(&reference, &query, false);

        let exact = searcher::<NearestNeighborSort, KdTree>(Algorithm::SingleTree, 0.0, &reference);
        let greedy = searcher::<NearestNeighborSort, KdTree>(Algorithm::Greedy, 0.0, &reference);

        let (_, exact_stats) = exact.search_with_stats(&query, 5).unwrap();
        let (result, greedy_stats) = greedy.search_with_stats(&query, 5).unwrap();

        assert_eq!(result.shape(), (5, 100));
        assert!(greedy_stats.base_cases < exact_stats.base_cases);

        //no neighbor found can beat the true one at the same rank
        for q in 0..100 {
            for rank in 0..5 {
                assert!(result.distances[q][rank] >= truth[q][rank].0);
            }
        }

        let self_result = greedy.search_self(5).unwrap();
        for (q, row) in self_result.neighbors.iter().enumerate() {
            assert!(!row.contains(&q));
        }

        let furthest = searcher::<FurthestNeighborSort, BallTree>(Algorithm::Greedy, 0.0, &reference);
        assert_eq!(furthest.search(&query, 5).unwrap().shape(), (5, 100));
    }

    #[test]
    fn caller_trees_report_storage_indices() {

        let mut rng = StdRng::seed_from_u64(55);
        let reference = Matrix::random(2, 150, &mut rng);
        let query = Matrix::random(2, 30, &mut rng);

        let (reference_tree, old_from_new): (KdTree, Vec<usize>) = KdTree::build(reference.clone(), 8, EuclideanDistance);
        let (query_tree, query_old_from_new): (KdTree, Vec<usize>) = KdTree::build(query.clone(), 8, EuclideanDistance);

        let mut borrowed: NeighborSearch<NearestNeighborSort, KdTree> = NeighborSearch::exact();
        borrowed.train_tree(&reference_tree).unwrap();
        assert!(!borrowed.owns_reference_tree());

        let owned = searcher::<NearestNeighborSort, KdTree>(Algorithm::DualTree, 0.0, &reference);

        let from_borrowed = borrowed.search_tree(&query_tree, &query_old_from_new, 3).unwrap();
        let from_owned = owned.search(&query, 3).unwrap();

        for q in 0..30 {
            let mapped: Vec<usize> = from_borrowed.neighbors[q].iter().map(|x| old_from_new[*x]).collect();
            assert_eq!(mapped, from_owned.neighbors[q]);
            assert_eq!(from_borrowed.distances[q], from_owned.distances[q]);
        }

        let mut repeated = query_old_from_new.clone();
        repeated[0] = repeated[1];
        let out_of_range: Vec<usize> = query_old_from_new.iter().map(|x| x + 30).collect();
        for bad in [repeated, out_of_range] {
            match borrowed.search_tree(&query_tree, &bad, 3) {
                Err(Error::ShapeMismatch(_)) => {},
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn invalid_searches_are_rejected() {

        let mut rng = StdRng::seed_from_u64(56);
        let reference = Matrix::random(3, 100, &mut rng);

        let untrained: NeighborSearch<NearestNeighborSort, KdTree> = NeighborSearch::exact();
        match untrained.search_self(1) {
            Err(Error::NotTrained) => {},
            other => panic!("unexpected {:?}", other),
        }

        let search = searcher::<NearestNeighborSort, KdTree>(Algorithm::DualTree, 0.0, &reference);
        assert!(search.search(&reference, 0).is_err());
        assert!(search.search(&reference, 101).is_err());
        assert!(search.search(&reference, 100).is_ok());
        assert!(search.search_self(100).is_err());
        assert!(search.search(&Matrix::random(2, 10, &mut rng), 5).unwrap_err().is_configuration_error());

        assert!(NeighborSearch::<FurthestNeighborSort, KdTree>::new(Algorithm::DualTree, 1.0, 5).is_err());
        assert!(NeighborSearch::<NearestNeighborSort, KdTree>::new(Algorithm::DualTree, -1.0, 5).is_err());
        assert!(NeighborSearch::<NearestNeighborSort, KdTree>::new(Algorithm::DualTree, 2.0, 5).is_ok());

        let result = search.search_self(3).unwrap();
        assert!(result.recall(&vec![vec![0; 3]; 99]).is_err());
        assert!(result.effective_error(&vec![vec![0.0; 2]; 100]).is_err());
    }
}
