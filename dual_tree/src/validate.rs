//! Parameter checks run before any tree is built or traversed.

use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::traversal::Algorithm;

pub fn check_leaf_size(leaf_size: i64) -> Result<usize> {

    if leaf_size <= 0 {
        return Err(Error::invalid(format!("leaf size must be greater than 0, got {}", leaf_size)));
    }

    return Ok(leaf_size as usize);
}

/// `k` must select at least one and at most every reference point. A monochromatic search
/// excludes each point from its own results, so one fewer is available.
pub fn check_k(k: i64, num_references: usize, monochromatic: bool) -> Result<usize> {

    if k <= 0 {
        return Err(Error::invalid(format!("k must be greater than 0, got {}", k)));
    }

    return check_neighbor_count(k as usize, num_references, monochromatic);
}

pub fn check_neighbor_count(k: usize, num_references: usize, monochromatic: bool) -> Result<usize> {

    if k == 0 {
        return Err(Error::invalid("k must be greater than 0, got 0"));
    }

    if monochromatic && k >= num_references {
        return Err(Error::invalid(format!("k must be less than the number of reference points ({}) when the query set is the reference set, got {}", num_references, k)));
    }

    if k > num_references {
        return Err(Error::invalid(format!("k must not exceed the number of reference points ({}), got {}", num_references, k)));
    }

    return Ok(k);
}

pub fn check_epsilon(epsilon: f64, furthest: bool) -> Result<f64> {

    if !(epsilon >= 0.0) {
        return Err(Error::invalid(format!("epsilon must be at least 0, got {}", epsilon)));
    }

    if furthest && epsilon >= 1.0 {
        return Err(Error::invalid(format!("epsilon must be less than 1 for furthest neighbor search, got {}", epsilon)));
    }

    return Ok(epsilon);
}

/// Converts a furthest-search percentage into the equivalent epsilon.
pub fn check_percentage(percentage: f64) -> Result<f64> {

    if !(percentage > 0.0 && percentage <= 1.0) {
        return Err(Error::invalid(format!("percentage must be in (0, 1], got {}", percentage)));
    }

    return Ok(1.0 - percentage);
}

pub fn check_relative_error(relative: f64) -> Result<f64> {

    if !(0.0..=1.0).contains(&relative) {
        return Err(Error::invalid(format!("relative error must be in [0, 1], got {}", relative)));
    }

    return Ok(relative);
}

pub fn check_absolute_error(absolute: f64) -> Result<f64> {

    if !(absolute >= 0.0) {
        return Err(Error::invalid(format!("absolute error must be at least 0, got {}", absolute)));
    }

    return Ok(absolute);
}

pub fn check_bandwidth(bandwidth: f64) -> Result<f64> {

    if !(bandwidth > 0.0) || !bandwidth.is_finite() {
        return Err(Error::invalid(format!("bandwidth must be greater than 0, got {}", bandwidth)));
    }

    return Ok(bandwidth);
}

/// Density estimates have to visit every reference point, which a greedy descent does not.
pub fn check_kde_algorithm(algorithm: Algorithm) -> Result<()> {

    if !algorithm.is_exact() {
        return Err(Error::invalid(format!("{:?} traversal is only available for neighbor search", algorithm)));
    }

    Ok(())
}

pub fn check_dimensions(expected: usize, query: &Matrix) -> Result<()> {

    if query.dims() != expected {
        return Err(Error::DimensionMismatch { expected, found: query.dims() });
    }

    Ok(())
}

pub fn check_reference_set(reference: &Matrix) -> Result<()> {

    if reference.is_empty() {
        return Err(Error::invalid("reference set must contain at least one point"));
    }

    Ok(())
}

/// Where a model comes from: a saved file or a reference set to train on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource<'a> {
    Saved(&'a str),
    Reference(&'a str),
}

/// Exactly one of an input model and a reference set must be given.
pub fn check_model_source<'a>(model: Option<&'a str>, reference: Option<&'a str>) -> Result<ModelSource<'a>> {

    match (model, reference) {
        (Some(_), Some(_)) => Err(Error::InvalidState("an input model and a reference set cannot both be given".to_string())),
        (None, None) => Err(Error::invalid("either an input model or a reference set must be given")),
        (Some(x), None) => Ok(ModelSource::Saved(x)),
        (None, Some(x)) => Ok(ModelSource::Reference(x)),
    }
}

/// `old_from_new` must map `num_points` storage slots onto `0..num_points`, each exactly once.
pub fn check_permutation(old_from_new: &[usize], num_points: usize) -> Result<()> {

    if old_from_new.len() != num_points {
        return Err(Error::ShapeMismatch(format!("query permutation has {} entries for {} points", old_from_new.len(), num_points)));
    }

    let mut seen = vec![false; num_points];
    for old_index in old_from_new.iter() {
        if *old_index >= num_points {
            return Err(Error::ShapeMismatch(format!("query permutation entry {} is out of range for {} points", old_index, num_points)));
        }
        if seen[*old_index] {
            return Err(Error::ShapeMismatch(format!("query permutation repeats entry {}", old_index)));
        }
        seen[*old_index] = true;
    }

    Ok(())
}

/// Rows are queries, columns are ranks.
pub fn check_result_shape<T>(name: &str, rows: &[Vec<T>], k: usize, num_queries: usize) -> Result<()> {

    if rows.len() != num_queries || rows.iter().any(|row| row.len() != k) {
        let found_k = rows.first().map(|row| row.len()).unwrap_or(0);
        return Err(Error::ShapeMismatch(format!("{} must have shape ({}, {}), found ({}, {})", name, k, num_queries, found_k, rows.len())));
    }

    Ok(())
}
