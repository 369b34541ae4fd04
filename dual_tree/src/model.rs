//! Runtime-selected estimators, their parameter files, and model persistence.
//!
//! Tree type, kernel and sort order are compile-time parameters of [`Kde`] and
//! [`NeighborSearch`]. The models here pick one instantiation from parameters read at runtime.
//!
//! A saved model holds its parameters and the reference set in the order it was trained with.
//! Loading rebuilds the tree, which is deterministic, so a reloaded model returns bit-for-bit the
//! same results as the one that was saved.

use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::basis::RandomBasis;
use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::io;
use crate::kde::{self, ErrorBudget, Kde};
use crate::kernel::{Kernel, KernelName, KernelType};
use crate::neighbor::{self, NeighborSearch, SearchResult};
use crate::neighbor::sort::{FurthestNeighborSort, NearestNeighborSort, SortKind};
use crate::reference::ReferenceTree;
use crate::traversal::{Algorithm, TraversalStats};
use crate::tree::{BallTree, KdTree, SpatialTree, TreeType};
use crate::validate;

fn read_yaml<P: AsRef<Path>, C: DeserializeOwned>(filename: P) -> Result<C> {

    let serialized = std::fs::read_to_string(filename)?;
    let deserialized: C = serde_yaml::from_str(&serialized)?;

    return Ok(deserialized);
}

fn write_yaml<P: AsRef<Path>, C: Serialize>(config: &C, filename: P) -> Result<()> {

    let serialized = serde_yaml::to_string(config)?;
    let mut file = File::create(filename)?;

    file.write_all(serialized.as_bytes())?;

    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KdeParams {
    pub kernel: KernelName,
    pub bandwidth: f64,
    pub relative_error: f64,
    pub absolute_error: f64,
    pub algorithm: Algorithm,
    pub tree_type: TreeType,
    pub leaf_size: usize,
}

impl KdeParams {

    pub fn default() -> Self {

        return Self {
            kernel: KernelName::Gaussian,
            bandwidth: 1.0,
            relative_error: kde::DEFAULT_RELATIVE_ERROR,
            absolute_error: kde::DEFAULT_ABSOLUTE_ERROR,
            algorithm: Algorithm::DualTree,
            tree_type: TreeType::Kd,
            leaf_size: kde::DEFAULT_LEAF_SIZE,
        }
    }

    pub fn validate(&self) -> Result<()> {

        validate::check_bandwidth(self.bandwidth)?;
        validate::check_leaf_size(self.leaf_size as i64)?;
        validate::check_kde_algorithm(self.algorithm)?;
        ErrorBudget::new(self.relative_error, self.absolute_error)?;

        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        return read_yaml(filename);
    }

    pub fn to_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        return write_yaml(self, filename);
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NeighborSearchParams {
    pub sort: SortKind,
    pub algorithm: Algorithm,
    pub tree_type: TreeType,
    pub leaf_size: usize,
    pub epsilon: f64,
    /// Rotate reference and query sets into a random orthonormal basis before building trees.
    #[serde(default)]
    pub random_basis: bool,
}

impl NeighborSearchParams {

    pub fn default() -> Self {

        return Self {
            sort: SortKind::Nearest,
            algorithm: Algorithm::DualTree,
            tree_type: TreeType::Kd,
            leaf_size: neighbor::DEFAULT_LEAF_SIZE,
            epsilon: 0.0,
            random_basis: false,
        }
    }

    pub fn validate(&self) -> Result<()> {

        validate::check_leaf_size(self.leaf_size as i64)?;
        validate::check_epsilon(self.epsilon, self.sort == SortKind::Furthest)?;

        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        return read_yaml(filename);
    }

    pub fn to_file<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        return write_yaml(self, filename);
    }
}

const KDE_MODEL: &str = "kde";
const NEIGHBOR_SEARCH_MODEL: &str = "neighbor_search";

#[derive(Serialize, Deserialize, Debug)]
struct ModelHeader<P> {
    model: String,
    dims: usize,
    num_points: usize,
    params: P,
    #[serde(default)]
    basis: Option<Vec<f64>>,
}

fn to_blob<P: Serialize, T: SpatialTree>(model: &str, params: P, basis: Option<&RandomBasis>, reference: Option<&ReferenceTree<T>>) -> Result<Vec<u8>> {

    let reference = match reference {
        Some(x) => x,
        None => return Err(Error::NotTrained),
    };

    let dataset = reference.original_dataset()?;

    let header = ModelHeader {
        model: model.to_string(),
        dims: dataset.dims(),
        num_points: dataset.num_points(),
        params,
        basis: basis.map(|x| x.as_slice().to_vec()),
    };

    let header = serde_json::to_vec(&header)?;

    return Ok(io::write_blob(&header, &dataset));
}

fn from_blob<P: DeserializeOwned>(model: &str, data: &[u8]) -> Result<(P, Option<RandomBasis>, Matrix)> {

    let (header, dataset) = io::read_blob(data)?;
    let header: ModelHeader<P> = serde_json::from_slice(header)?;

    if header.model != model {
        return Err(Error::Serialization(format!("expected a {} model, found {}", model, header.model)));
    }

    if header.dims != dataset.dims() || header.num_points != dataset.num_points() {
        return Err(Error::Serialization(format!("header shape ({}, {}) does not match stored reference set ({}, {})",
            header.dims, header.num_points, dataset.dims(), dataset.num_points())));
    }

    let basis = match header.basis {
        Some(values) => Some(RandomBasis::from_vec(header.dims, values)?),
        None => None,
    };

    return Ok((header.params, basis, dataset));
}

#[derive(Debug, Clone)]
pub enum KdeModel {
    Kd(Kde<'static, KernelType, KdTree>),
    Ball(Kde<'static, KernelType, BallTree>),
}

macro_rules! with_kde {
    ($model:expr, $kde:ident => $body:expr) => {
        match $model {
            KdeModel::Kd($kde) => $body,
            KdeModel::Ball($kde) => $body,
        }
    };
}

impl KdeModel {

    pub fn new(params: &KdeParams) -> Result<Self> {

        params.validate()?;

        let kernel = KernelType::new(params.kernel, params.bandwidth)?;
        let budget = ErrorBudget::new(params.relative_error, params.absolute_error)?;

        let model = match params.tree_type {
            TreeType::Kd => KdeModel::Kd(Kde::new(kernel, budget, params.algorithm, params.leaf_size)),
            TreeType::Ball => KdeModel::Ball(Kde::new(kernel, budget, params.algorithm, params.leaf_size)),
        };

        return Ok(model);
    }

    pub fn params(&self) -> KdeParams {

        let tree_type = match self {
            KdeModel::Kd(_) => TreeType::Kd,
            KdeModel::Ball(_) => TreeType::Ball,
        };

        return with_kde!(self, kde => KdeParams {
            kernel: kde.kernel().name(),
            bandwidth: kde.kernel().bandwidth(),
            relative_error: kde.budget().relative(),
            absolute_error: kde.budget().absolute(),
            algorithm: kde.algorithm(),
            tree_type,
            leaf_size: kde.leaf_size(),
        });
    }

    pub fn train(&mut self, reference: Matrix) -> Result<()> {
        return with_kde!(self, kde => kde.train(reference));
    }

    pub fn is_trained(&self) -> bool {
        return with_kde!(self, kde => kde.is_trained());
    }

    pub fn dims(&self) -> Option<usize> {
        return with_kde!(self, kde => kde.reference().map(|x| x.dims()));
    }

    pub fn evaluate(&self, query: &Matrix) -> Result<Vec<f64>> {
        return with_kde!(self, kde => kde.evaluate(query));
    }

    pub fn evaluate_with_stats(&self, query: &Matrix) -> Result<(Vec<f64>, TraversalStats)> {
        return with_kde!(self, kde => kde.evaluate_with_stats(query));
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        with_kde!(self, kde => kde.set_algorithm(algorithm));
    }

    pub fn set_relative_error(&mut self, relative: f64) -> Result<()> {
        return with_kde!(self, kde => kde.set_relative_error(relative));
    }

    pub fn set_absolute_error(&mut self, absolute: f64) -> Result<()> {
        return with_kde!(self, kde => kde.set_absolute_error(absolute));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        return with_kde!(self, kde => to_blob(KDE_MODEL, self.params(), None, kde.reference()));
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {

        let (params, _, dataset): (KdeParams, Option<RandomBasis>, Matrix) = from_blob(KDE_MODEL, data)?;

        let mut model = Self::new(&params)?;
        model.train(dataset)?;

        return Ok(model);
    }

    pub fn save<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        return io::to_file(filename, &self.to_bytes()?);
    }

    pub fn load<P: AsRef<Path>>(filename: P) -> Result<Self> {
        return Self::from_bytes(&io::from_file(filename)?);
    }
}

#[derive(Debug, Clone)]
enum Searcher {
    KdNearest(NeighborSearch<'static, NearestNeighborSort, KdTree>),
    KdFurthest(NeighborSearch<'static, FurthestNeighborSort, KdTree>),
    BallNearest(NeighborSearch<'static, NearestNeighborSort, BallTree>),
    BallFurthest(NeighborSearch<'static, FurthestNeighborSort, BallTree>),
}

macro_rules! with_search {
    ($searcher:expr, $search:ident => $body:expr) => {
        match $searcher {
            Searcher::KdNearest($search) => $body,
            Searcher::KdFurthest($search) => $body,
            Searcher::BallNearest($search) => $body,
            Searcher::BallFurthest($search) => $body,
        }
    };
}

/// Neighbor search picked at runtime. With `random_basis` set, the reference set is rotated when
/// training and every query set is rotated the same way; the stored reference set is the rotated
/// one.
#[derive(Debug, Clone)]
pub struct NeighborSearchModel {
    searcher: Searcher,
    random_basis: bool,
    basis: Option<RandomBasis>,
}

impl NeighborSearchModel {

    pub fn new(params: &NeighborSearchParams) -> Result<Self> {

        params.validate()?;

        let (algorithm, epsilon, leaf_size) = (params.algorithm, params.epsilon, params.leaf_size);

        let searcher = match (params.tree_type, params.sort) {
            (TreeType::Kd, SortKind::Nearest) => Searcher::KdNearest(NeighborSearch::new(algorithm, epsilon, leaf_size)?),
            (TreeType::Kd, SortKind::Furthest) => Searcher::KdFurthest(NeighborSearch::new(algorithm, epsilon, leaf_size)?),
            (TreeType::Ball, SortKind::Nearest) => Searcher::BallNearest(NeighborSearch::new(algorithm, epsilon, leaf_size)?),
            (TreeType::Ball, SortKind::Furthest) => Searcher::BallFurthest(NeighborSearch::new(algorithm, epsilon, leaf_size)?),
        };

        return Ok(Self {
            searcher,
            random_basis: params.random_basis,
            basis: None,
        });
    }

    pub fn params(&self) -> NeighborSearchParams {

        let (tree_type, sort) = match self.searcher {
            Searcher::KdNearest(_) => (TreeType::Kd, SortKind::Nearest),
            Searcher::KdFurthest(_) => (TreeType::Kd, SortKind::Furthest),
            Searcher::BallNearest(_) => (TreeType::Ball, SortKind::Nearest),
            Searcher::BallFurthest(_) => (TreeType::Ball, SortKind::Furthest),
        };

        return with_search!(&self.searcher, search => NeighborSearchParams {
            sort,
            algorithm: search.algorithm(),
            tree_type,
            leaf_size: search.leaf_size(),
            epsilon: search.epsilon(),
            random_basis: self.random_basis,
        });
    }

    /// Draws a fresh basis when `random_basis` is set.
    pub fn train(&mut self, reference: Matrix) -> Result<()> {

        if !self.random_basis {
            return self.train_in_basis(None, reference);
        }

        validate::check_reference_set(&reference)?;
        let basis = RandomBasis::random(reference.dims(), &mut rand::thread_rng());
        log::info!("rotating reference set into a random basis");
        let rotated = basis.apply(&reference)?;

        return self.train_in_basis(Some(basis), rotated);
    }

    /// `reference` is already expressed in `basis`.
    fn train_in_basis(&mut self, basis: Option<RandomBasis>, reference: Matrix) -> Result<()> {

        with_search!(&mut self.searcher, search => search.train(reference))?;
        self.basis = basis;

        Ok(())
    }

    pub fn is_trained(&self) -> bool {
        return with_search!(&self.searcher, search => search.is_trained());
    }

    pub fn basis(&self) -> Option<&RandomBasis> {
        return self.basis.as_ref();
    }

    pub fn dims(&self) -> Option<usize> {
        return with_search!(&self.searcher, search => search.reference().map(|x| x.dims()));
    }

    pub fn num_references(&self) -> Option<usize> {
        return with_search!(&self.searcher, search => search.reference().map(|x| x.num_points()));
    }

    pub fn search(&self, query: &Matrix, k: usize) -> Result<SearchResult> {

        let (result, _) = self.search_with_stats(query, k)?;

        return Ok(result);
    }

    pub fn search_with_stats(&self, query: &Matrix, k: usize) -> Result<(SearchResult, TraversalStats)> {

        let rotated;
        let query = match &self.basis {
            Some(basis) => {
                rotated = basis.apply(query)?;
                &rotated
            },
            None => query,
        };

        return with_search!(&self.searcher, search => search.search_with_stats(query, k));
    }

    pub fn search_self(&self, k: usize) -> Result<SearchResult> {
        return with_search!(&self.searcher, search => search.search_self(k));
    }

    pub fn search_self_with_stats(&self, k: usize) -> Result<(SearchResult, TraversalStats)> {
        return with_search!(&self.searcher, search => search.search_self_with_stats(k));
    }

    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        with_search!(&mut self.searcher, search => search.set_algorithm(algorithm));
    }

    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {
        return with_search!(&mut self.searcher, search => search.set_epsilon(epsilon));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        return with_search!(&self.searcher, search => to_blob(NEIGHBOR_SEARCH_MODEL, self.params(), self.basis.as_ref(), search.reference()));
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {

        let (params, basis, dataset): (NeighborSearchParams, Option<RandomBasis>, Matrix) = from_blob(NEIGHBOR_SEARCH_MODEL, data)?;

        if params.random_basis != basis.is_some() {
            return Err(Error::Serialization("random basis setting does not match the stored basis".to_string()));
        }

        let mut model = Self::new(&params)?;
        model.train_in_basis(basis, dataset)?;

        return Ok(model);
    }

    pub fn save<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        return io::to_file(filename, &self.to_bytes()?);
    }

    pub fn load<P: AsRef<Path>>(filename: P) -> Result<Self> {
        return Self::from_bytes(&io::from_file(filename)?);
    }
}
