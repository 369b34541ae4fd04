//! Orderings for neighbor search: what makes one candidate distance better than another.
//!
//! Sort policies are zero-sized and only carry associated functions, so the rules are
//! monomorphized per ordering.

use serde::{Serialize, Deserialize};
use std::fmt::Debug;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::tree::SpatialTree;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    Nearest,
    Furthest,
}

impl FromStr for SortKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest" => Ok(SortKind::Nearest),
            "furthest" => Ok(SortKind::Furthest),
            _ => Err(Error::invalid(format!("unknown sort kind: {}", s))),
        }
    }
}

pub trait SortPolicy: Clone + Debug + Default + Send + Sync {

    fn kind() -> SortKind;

    /// Strict: equal distances are not better.
    fn is_better(value: f64, reference: f64) -> bool;

    fn best_distance() -> f64;

    /// Distance held by an empty candidate slot.
    fn worst_distance() -> f64;

    /// The worse of two distances.
    fn combine_worst(a: f64, b: f64) -> f64;

    /// Loosens a bound so that results within a factor of `epsilon` are accepted.
    fn relax(value: f64, epsilon: f64) -> f64;

    /// Traversal priority for a distance; lower is visited first.
    fn convert_to_score(distance: f64) -> f64;

    fn convert_to_distance(score: f64) -> f64;

    /// Best distance any point of `node` can have to `point`.
    fn best_point_distance<T: SpatialTree>(tree: &T, node: usize, point: &[f64]) -> f64;

    /// Best distance between any point of `query_node` and any point of `reference_node`.
    fn best_node_distance<T: SpatialTree>(query_tree: &T, query_node: usize, reference_tree: &T, reference_node: usize) -> f64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NearestNeighborSort;

impl SortPolicy for NearestNeighborSort {

    fn kind() -> SortKind {
        return SortKind::Nearest;
    }

    fn is_better(value: f64, reference: f64) -> bool {
        return value < reference;
    }

    fn best_distance() -> f64 {
        return 0.0;
    }

    fn worst_distance() -> f64 {
        return f64::MAX;
    }

    fn combine_worst(a: f64, b: f64) -> f64 {
        return a.max(b);
    }

    fn relax(value: f64, epsilon: f64) -> f64 {

        if value == f64::MAX {
            return f64::MAX;
        }

        return value / (1.0 + epsilon);
    }

    fn convert_to_score(distance: f64) -> f64 {
        return distance;
    }

    fn convert_to_distance(score: f64) -> f64 {
        return score;
    }

    fn best_point_distance<T: SpatialTree>(tree: &T, node: usize, point: &[f64]) -> f64 {
        return tree.min_distance_to_point(node, point);
    }

    fn best_node_distance<T: SpatialTree>(query_tree: &T, query_node: usize, reference_tree: &T, reference_node: usize) -> f64 {
        return query_tree.min_distance(query_node, reference_tree, reference_node);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FurthestNeighborSort;

impl SortPolicy for FurthestNeighborSort {

    fn kind() -> SortKind {
        return SortKind::Furthest;
    }

    fn is_better(value: f64, reference: f64) -> bool {
        return value > reference;
    }

    fn best_distance() -> f64 {
        return f64::MAX;
    }

    fn worst_distance() -> f64 {
        return 0.0;
    }

    fn combine_worst(a: f64, b: f64) -> f64 {
        return a.min(b);
    }

    fn relax(value: f64, epsilon: f64) -> f64 {

        if value == 0.0 {
            return 0.0;
        }

        if value == f64::MAX || epsilon >= 1.0 {
            return f64::MAX;
        }

        return value / (1.0 - epsilon);
    }

    /// Negated so that the conversion is exact both ways.
    fn convert_to_score(distance: f64) -> f64 {
        return -distance;
    }

    fn convert_to_distance(score: f64) -> f64 {
        return -score;
    }

    fn best_point_distance<T: SpatialTree>(tree: &T, node: usize, point: &[f64]) -> f64 {
        return tree.max_distance_to_point(node, point);
    }

    fn best_node_distance<T: SpatialTree>(query_tree: &T, query_node: usize, reference_tree: &T, reference_node: usize) -> f64 {
        return query_tree.max_distance(query_node, reference_tree, reference_node);
    }
}
