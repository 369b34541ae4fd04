//! Kernel density estimation over a reference tree.
//!
//! The estimator is `Untrained` until [`Kde::train`] or [`Kde::train_tree`] gives it a reference
//! tree. Evaluation returns, for each query in its original order, the kernel sum over every
//! reference point divided by the number of reference points.

pub mod rules;

use serde::{Serialize, Deserialize};

use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::reference::ReferenceTree;
use crate::traversal::{self, Algorithm, DualTreeTraverser, SingleTreeTraverser, TraversalStats};
use crate::tree::SpatialTree;
use crate::validate;

use rules::KdeRules;

pub const DEFAULT_RELATIVE_ERROR: f64 = 0.05;
pub const DEFAULT_ABSOLUTE_ERROR: f64 = 0.0;
pub const DEFAULT_LEAF_SIZE: usize = 20;

/// Absolute and relative tolerance of an estimate. When both are positive they add up.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ErrorBudget {
    relative: f64,
    absolute: f64,
}

impl ErrorBudget {

    pub fn new(relative: f64, absolute: f64) -> Result<Self> {

        let budget = Self {
            relative: validate::check_relative_error(relative)?,
            absolute: validate::check_absolute_error(absolute)?,
        };

        budget.warn_if_additive();

        return Ok(budget);
    }

    pub fn exact() -> Self {
        return Self { relative: 0.0, absolute: 0.0 };
    }

    pub fn relative(&self) -> f64 {
        return self.relative;
    }

    pub fn absolute(&self) -> f64 {
        return self.absolute;
    }

    /// True when replacing every kernel value in `[min_kernel, max_kernel]` by the midpoint
    /// stays within tolerance.
    pub fn allows(&self, min_kernel: f64, max_kernel: f64) -> bool {
        return max_kernel - min_kernel <= 2.0 * (self.absolute + self.relative * min_kernel);
    }

    fn warn_if_additive(&self) {
        if self.relative > 0.0 && self.absolute > 0.0 {
            log::warn!("absolute ({}) and relative ({}) error tolerances will be summed up", self.absolute, self.relative);
        }
    }
}

impl Default for ErrorBudget {
    fn default() -> Self {
        return Self { relative: DEFAULT_RELATIVE_ERROR, absolute: DEFAULT_ABSOLUTE_ERROR };
    }
}

#[derive(Debug, Clone)]
pub struct Kde<'a, K, T> {
    kernel: K,
    budget: ErrorBudget,
    algorithm: Algorithm,
    leaf_size: usize,
    reference: Option<ReferenceTree<'a, T>>,
}

impl<'a, K: Kernel, T: SpatialTree> Kde<'a, K, T> {

    pub fn new(kernel: K, budget: ErrorBudget, algorithm: Algorithm, leaf_size: usize) -> Self {

        return Self {
            kernel,
            budget,
            algorithm,
            leaf_size,
            reference: None,
        };
    }

    /// Dual-tree estimator with the default tolerances and leaf size.
    pub fn with_kernel(kernel: K) -> Self {
        return Self::new(kernel, ErrorBudget::default(), Algorithm::DualTree, DEFAULT_LEAF_SIZE);
    }

    /// Builds and owns a reference tree. Any previous tree is released.
    pub fn train(&mut self, reference: Matrix) -> Result<()> {

        validate::check_reference_set(&reference)?;

        log::info!("building reference tree over {} points in {} dimensions", reference.num_points(), reference.dims());

        let metric = T::Metric::default();
        self.reference = Some(ReferenceTree::build(reference, self.leaf_size, metric));

        Ok(())
    }

    /// Adopts a caller-built tree without taking ownership.
    pub fn train_tree(&mut self, tree: &'a T) -> Result<()> {

        validate::check_reference_set(tree.dataset())?;

        self.reference = Some(ReferenceTree::Borrowed(tree));

        Ok(())
    }

    pub fn evaluate(&self, query: &Matrix) -> Result<Vec<f64>> {

        let (densities, _) = self.evaluate_with_stats(query)?;

        return Ok(densities);
    }

    pub fn evaluate_with_stats(&self, query: &Matrix) -> Result<(Vec<f64>, TraversalStats)> {

        let reference = self.trained_reference()?;
        validate::check_dimensions(reference.dims(), query)?;
        validate::check_kde_algorithm(self.algorithm)?;

        if query.is_empty() {
            return Ok((Vec::new(), TraversalStats::default()));
        }

        let tree = reference.tree();

        let (mut densities, stats) = match self.algorithm {
            Algorithm::Naive => {
                let mut rules = KdeRules::single(tree, query, &self.kernel, self.budget);
                traversal::naive(query.num_points(), tree.dataset().num_points(), &mut rules);
                let stats = TraversalStats::collect(&rules, 0);
                (rules.into_densities(), stats)
            },
            Algorithm::SingleTree => {
                let mut rules = KdeRules::single(tree, query, &self.kernel, self.budget);
                let mut traverser = SingleTreeTraverser::new(tree);
                for query_index in 0..query.num_points() {
                    traverser.traverse(query_index, &mut rules);
                }
                let stats = TraversalStats::collect(&rules, traverser.num_prunes());
                (rules.into_densities(), stats)
            },
            Algorithm::DualTree | Algorithm::Greedy => {
                let (query_tree, old_from_new) = T::build(query.clone(), self.leaf_size, tree.metric().clone());
                self.dual_tree(tree, &query_tree, &old_from_new)
            },
        };

        self.normalize(&mut densities, tree);
        log::debug!("kde evaluated {} queries: {:?}", densities.len(), stats);

        return Ok((densities, stats));
    }

    /// Dual-tree evaluation with a caller-built query tree. `old_from_new` maps the tree's storage
    /// to the order results are returned in.
    pub fn evaluate_tree(&self, query_tree: &T, old_from_new: &[usize]) -> Result<Vec<f64>> {

        let reference = self.trained_reference()?;
        validate::check_dimensions(reference.dims(), query_tree.dataset())?;

        validate::check_permutation(old_from_new, query_tree.dataset().num_points())?;

        if query_tree.dataset().is_empty() {
            return Ok(Vec::new());
        }

        let tree = reference.tree();
        let (mut densities, stats) = self.dual_tree(tree, query_tree, old_from_new);

        self.normalize(&mut densities, tree);
        log::debug!("kde evaluated {} queries: {:?}", densities.len(), stats);

        return Ok(densities);
    }

    fn dual_tree(&self, tree: &T, query_tree: &T, old_from_new: &[usize]) -> (Vec<f64>, TraversalStats) {

        let mut rules = KdeRules::dual(tree, query_tree, old_from_new, &self.kernel, self.budget);
        let mut traverser = DualTreeTraverser::new(query_tree, tree);
        traverser.traverse(&mut rules);

        let stats = TraversalStats::collect(&rules, traverser.num_prunes());

        return (rules.into_densities(), stats);
    }

    fn normalize(&self, densities: &mut [f64], tree: &T) {

        let count = tree.dataset().num_points() as f64;
        for value in densities.iter_mut() {
            *value /= count;
        }
    }

    fn trained_reference(&self) -> Result<&ReferenceTree<'a, T>> {
        match &self.reference {
            Some(x) => Ok(x),
            None => Err(Error::NotTrained),
        }
    }

    pub fn set_relative_error(&mut self, relative: f64) -> Result<()> {

        self.budget = ErrorBudget::new(relative, self.budget.absolute)?;

        Ok(())
    }

    pub fn set_absolute_error(&mut self, absolute: f64) -> Result<()> {

        self.budget = ErrorBudget::new(self.budget.relative, absolute)?;

        Ok(())
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.algorithm = algorithm;
    }

    pub fn set_kernel(&mut self, kernel: K) {
        self.kernel = kernel;
    }

    pub fn kernel(&self) -> &K {
        return &self.kernel;
    }

    pub fn budget(&self) -> ErrorBudget {
        return self.budget;
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
    use crate::kernel::{EpanechnikovKernel, GaussianKernel, KernelName, KernelType};
    use crate::metric::{EuclideanDistance, Metric};
    use crate::tree::{BallTree, KdTree};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn brute_force<K: Kernel>(reference: &Matrix, query: &Matrix, kernel: &K) -> Vec<f64> {

        let mut densities = vec![0.0; query.num_points()];
        for q in 0..query.num_points() {
            for r in 0..reference.num_points() {
                densities[q] += kernel.evaluate(EuclideanDistance.evaluate(query.col(q), reference.col(r)));
            }
            densities[q] /= reference.num_points() as f64;
        }

        return densities;
    }

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() <= 1e-10 * y.abs().max(1.0), "{} != {}", x, y);
        }
    }

    #[test]
    fn exact_estimates_match_brute_force_in_query_order() {

        let mut rng = StdRng::seed_from_u64(31);
        let reference = Matrix::random(3, 400, &mut rng);
        let query = Matrix::random(3, 150, &mut rng);
        let kernel = GaussianKernel::new(0.3);

        let expected = brute_force(&reference, &query, &kernel);

        for algorithm in [Algorithm::Naive, Algorithm::SingleTree, Algorithm::DualTree] {
            let mut kd: Kde<GaussianKernel, KdTree> = Kde::new(kernel, ErrorBudget::exact(), algorithm, 10);
            kd.train(reference.clone()).unwrap();
            assert_close(&kd.evaluate(&query).unwrap(), &expected);

            let mut ball: Kde<GaussianKernel, BallTree> = Kde::new(kernel, ErrorBudget::exact(), algorithm, 10);
            ball.train(reference.clone()).unwrap();
            assert_close(&ball.evaluate(&query).unwrap(), &expected);
        }
    }

    #[test]
    fn relative_error_is_respected() {

        let mut rng = StdRng::seed_from_u64(32);
        let reference = Matrix::random(2, 1000, &mut rng);
        let query = Matrix::random(2, 200, &mut rng);
        let kernel = EpanechnikovKernel::new(0.4);
        let expected = brute_force(&reference, &query, &kernel);

        for algorithm in [Algorithm::SingleTree, Algorithm::DualTree] {
            let mut kde: Kde<EpanechnikovKernel, KdTree> = Kde::new(kernel, ErrorBudget::new(0.05, 0.0).unwrap(), algorithm, 8);
            kde.train(reference.clone()).unwrap();

            let densities = kde.evaluate(&query).unwrap();
            for (estimate, truth) in densities.iter().zip(expected.iter()) {
                assert!((estimate - truth).abs() <= 0.05 * truth + 1e-12, "{} vs {}", estimate, truth);
            }
        }
    }

    #[test]
    fn looser_tolerance_prunes_more() {

        let mut rng = StdRng::seed_from_u64(33);
        let reference = Matrix::random(2, 2000, &mut rng);
        let query = Matrix::random(2, 300, &mut rng);
        let kernel = GaussianKernel::new(1.0);

        let mut exact: Kde<GaussianKernel, KdTree> = Kde::new(kernel, ErrorBudget::exact(), Algorithm::DualTree, 10);
        exact.train(reference.clone()).unwrap();
        let (exact_densities, exact_stats) = exact.evaluate_with_stats(&query).unwrap();

        let mut loose = exact.clone();
        loose.set_relative_error(0.2).unwrap();
        let (loose_densities, loose_stats) = loose.evaluate_with_stats(&query).unwrap();

        assert!(exact_stats.base_cases <= 2000 * 300);
        assert!(loose_stats.prunes > exact_stats.prunes);
        assert!(loose_stats.base_cases < exact_stats.base_cases);
        assert_ne!(loose_densities, exact_densities);

        for (estimate, truth) in loose_densities.iter().zip(exact_densities.iter()) {
            assert!((estimate - truth).abs() <= 0.2 * truth + 1e-12);
        }
    }

    #[test]
    fn absolute_error_is_respected() {

        let mut rng = StdRng::seed_from_u64(37);
        let reference = Matrix::random(2, 2000, &mut rng);
        let query = Matrix::random(2, 200, &mut rng);
        let kernel = GaussianKernel::new(0.2);
        let expected = brute_force(&reference, &query, &kernel);

        for algorithm in [Algorithm::SingleTree, Algorithm::DualTree] {
            let mut kde: Kde<GaussianKernel, BallTree> = Kde::new(kernel, ErrorBudget::new(0.0, 0.01).unwrap(), algorithm, 10);
            kde.train(reference.clone()).unwrap();

            let densities = kde.evaluate(&query).unwrap();
            for (estimate, truth) in densities.iter().zip(expected.iter()) {
                assert!((estimate - truth).abs() <= 0.01 + 1e-12, "{} vs {}", estimate, truth);
            }
        }
    }

    #[test]
    fn absolute_tolerance_prunes_more() {

        let mut rng = StdRng::seed_from_u64(38);
        let reference = Matrix::random(2, 2000, &mut rng);
        let query = Matrix::random(2, 200, &mut rng);
        let kernel = GaussianKernel::new(0.2);

        for algorithm in [Algorithm::SingleTree, Algorithm::DualTree] {
            let mut exact: Kde<GaussianKernel, KdTree> = Kde::new(kernel, ErrorBudget::exact(), algorithm, 10);
            exact.train(reference.clone()).unwrap();
            let (exact_densities, exact_stats) = exact.evaluate_with_stats(&query).unwrap();

            let mut loose = exact.clone();
            loose.set_absolute_error(0.01).unwrap();
            let (loose_densities, loose_stats) = loose.evaluate_with_stats(&query).unwrap();

            assert!(loose_stats.prunes > exact_stats.prunes);
            assert!(loose_stats.base_cases < exact_stats.base_cases);
            assert_ne!(loose_densities, exact_densities);

            //a tighter budget never does less work
            let mut tighter = exact.clone();
            tighter.set_absolute_error(0.001).unwrap();
            let (_, tighter_stats) = tighter.evaluate_with_stats(&query).unwrap();
            assert!(tighter_stats.base_cases >= loose_stats.base_cases);
            assert!(tighter_stats.base_cases <= exact_stats.base_cases);
        }
    }

    #[test]
    fn contributions_only_accumulate() {

        let mut rng = StdRng::seed_from_u64(39);
        let reference = Matrix::random(3, 500, &mut rng);
        let extra = Matrix::random(3, 500, &mut rng);
        let query = Matrix::random(3, 100, &mut rng);
        let kernel = GaussianKernel::new(0.3);
        let tolerance = 0.001;

        let mut subset: Kde<GaussianKernel, KdTree> = Kde::new(kernel, ErrorBudget::new(0.0, tolerance).unwrap(), Algorithm::DualTree, 10);
        subset.train(reference.clone()).unwrap();

        let mut superset = subset.clone();
        let mut combined = reference.clone();
        combined.append(&extra).unwrap();
        superset.train(combined).unwrap();

        let smaller = subset.evaluate(&query).unwrap();
        let larger = superset.evaluate(&query).unwrap();

        //kernel sums over a superset never shrink, up to the tolerance of each estimate
        for (a, b) in smaller.iter().zip(larger.iter()) {
            assert!(*a >= 0.0 && *b >= 0.0);
            assert!(b * 1000.0 + tolerance * 1000.0 >= a * 500.0 - tolerance * 500.0 - 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn caller_query_tree_gives_same_estimates() {

        let mut rng = StdRng::seed_from_u64(34);
        let reference = Matrix::random(3, 300, &mut rng);
        let query = Matrix::random(3, 80, &mut rng);
        let kernel = KernelType::new(KernelName::Laplacian, 0.5).unwrap();

        let mut kde: Kde<KernelType, KdTree> = Kde::new(kernel, ErrorBudget::exact(), Algorithm::DualTree, 5);
        kde.train(reference).unwrap();

        let (query_tree, old_from_new): (KdTree, Vec<usize>) = KdTree::build(query.clone(), 5, EuclideanDistance);

        assert_close(&kde.evaluate_tree(&query_tree, &old_from_new).unwrap(), &kde.evaluate(&query).unwrap());
        assert!(kde.evaluate_tree(&query_tree, &old_from_new[1..]).is_err());

        let repeated = vec![0; 80];
        let out_of_range: Vec<usize> = (100..180).collect();
        for bad in [repeated, out_of_range] {
            match kde.evaluate_tree(&query_tree, &bad) {
                Err(Error::ShapeMismatch(_)) => {},
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn ownership_follows_training() {

        let mut rng = StdRng::seed_from_u64(35);
        let reference = Matrix::random(2, 100, &mut rng);
        let query = Matrix::random(2, 10, &mut rng);
        let (tree, _): (KdTree, Vec<usize>) = KdTree::build(reference.clone(), 20, EuclideanDistance);

        let mut kde: Kde<GaussianKernel, KdTree> = Kde::with_kernel(GaussianKernel::new(0.2));
        assert!(!kde.is_trained());
        assert!(!kde.owns_reference_tree());

        kde.train(reference.clone()).unwrap();
        assert!(kde.owns_reference_tree());

        let owned_copy = kde.clone();
        let original_tree = kde.reference().unwrap().tree();
        let copied_tree = owned_copy.reference().unwrap().tree();
        assert!(!std::ptr::eq(original_tree, copied_tree));
        assert_eq!(original_tree.dataset(), copied_tree.dataset());

        kde.train_tree(&tree).unwrap();
        assert!(kde.is_trained());
        assert!(!kde.owns_reference_tree());

        let borrowed_copy = kde.clone();
        assert!(std::ptr::eq(borrowed_copy.reference().unwrap().tree(), &tree));

        //the permuted storage holds the same points, so estimates agree
        assert_close(&kde.evaluate(&query).unwrap(), &owned_copy.evaluate(&query).unwrap());
    }

    #[test]
    fn invalid_use_is_rejected() {

        let mut rng = StdRng::seed_from_u64(36);
        let mut kde: Kde<GaussianKernel, KdTree> = Kde::with_kernel(GaussianKernel::new(0.2));

        match kde.evaluate(&Matrix::random(2, 3, &mut rng)) {
            Err(Error::NotTrained) => {},
            other => panic!("unexpected {:?}", other),
        }

        assert!(kde.set_relative_error(1.5).is_err());
        assert!(kde.set_relative_error(-0.1).is_err());
        assert!(kde.set_absolute_error(-1.0).is_err());
        assert_eq!(kde.budget(), ErrorBudget::default());

        kde.set_absolute_error(0.01).unwrap();
        assert_eq!(kde.budget().absolute(), 0.01);

        assert!(kde.train(Matrix::new(2, 0)).is_err());

        kde.train(Matrix::random(2, 50, &mut rng)).unwrap();
        match kde.evaluate(&Matrix::random(3, 3, &mut rng)) {
            Err(Error::DimensionMismatch { expected: 2, found: 3 }) => {},
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(kde.evaluate(&Matrix::new(2, 0)).unwrap().len(), 0);

        kde.set_algorithm(Algorithm::Greedy);
        assert!(kde.evaluate(&Matrix::random(2, 3, &mut rng)).unwrap_err().is_configuration_error());
    }
}
