//! Tree-based approximate kernel density estimation and k-nearest / k-furthest neighbor search.
//!
//! A space-partitioning tree is built once over the reference set. At query time a second tree
//! is built over the query set (or a single query point is used) and a generic traverser walks
//! both trees, asking a "rules" object at every node pair whether the whole pair can be resolved
//! analytically (pruned) or has to be descended into. Leaf pairs fall through to base cases,
//! which are plain point-to-point distance and kernel evaluations.
//!
//! The traversers only know about tree shape, the rules only know about bounds, so any tree
//! implementing [`tree::SpatialTree`] works with both KDE and neighbor search.
//!
//! TODO
//! - [x] kd tree and ball tree
//! - [x] single tree and dual tree traversal
//! - [x] kde rules with absolute and relative error budgets
//! - [x] nearest and furthest neighbor rules
//! - [ ] parallel query traversal
//!
pub mod error;
pub mod layout;
pub mod data;
pub mod io;
pub mod metric;
pub mod kernel;
pub mod basis;
pub mod bound;
pub mod node;
pub mod tree;
pub mod traversal;
pub mod reference;
pub mod validate;
pub mod kde;
pub mod neighbor;
pub mod model;

pub use error::{Error, Result};
pub use data::Matrix;
