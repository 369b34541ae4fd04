//! Bounding volumes for tree nodes.
//!
//! A bound summarizes the points of a node so that distances from any external point (or any
//! point of another node) to the node's points can be bracketed without touching the points.

use std::fmt::Debug;

use crate::data::Matrix;
use crate::metric::Metric;

pub trait Bound: Clone + Debug + Send + Sync {

    /// Smallest volume containing columns `begin..begin + count` of `data`. `count` is never 0.
    fn from_points<M: Metric>(metric: &M, data: &Matrix, begin: usize, count: usize) -> Self;

    fn min_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64;

    fn max_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64;

    fn min_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64;

    fn max_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64;
}

/// Axis-aligned hyperrectangle, used by kd trees.
#[derive(Debug, Clone, PartialEq)]
pub struct HRectBound {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
}

impl Bound for HRectBound {

    fn from_points<M: Metric>(_metric: &M, data: &Matrix, begin: usize, count: usize) -> Self {

        let mut lo = vec![f64::INFINITY; data.dims()];
        let mut hi = vec![f64::NEG_INFINITY; data.dims()];

        for i in begin..begin + count {
            for (d, value) in data.col(i).iter().enumerate() {
                lo[d] = lo[d].min(*value);
                hi[d] = hi[d].max(*value);
            }
        }

        return Self { lo, hi };
    }

    fn min_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64 {

        let gaps = (0..point.len()).map(|d| {
            (self.lo[d] - point[d]).max(point[d] - self.hi[d]).max(0.0)
        });

        return metric.combine(gaps);
    }

    fn max_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64 {

        let gaps = (0..point.len()).map(|d| {
            (point[d] - self.lo[d]).abs().max((self.hi[d] - point[d]).abs())
        });

        return metric.combine(gaps);
    }

    fn min_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64 {

        let gaps = (0..self.lo.len()).map(|d| {
            (other.lo[d] - self.hi[d]).max(self.lo[d] - other.hi[d]).max(0.0)
        });

        return metric.combine(gaps);
    }

    fn max_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64 {

        let gaps = (0..self.lo.len()).map(|d| {
            (other.hi[d] - self.lo[d]).max(self.hi[d] - other.lo[d])
        });

        return metric.combine(gaps);
    }
}

/// Hypersphere around the centroid of the points, used by ball trees.
///
/// Only the triangle inequality is needed, so the distance bounds hold for any true metric.
#[derive(Debug, Clone, PartialEq)]
pub struct BallBound {
    pub center: Vec<f64>,
    pub radius: f64,
}

impl Bound for BallBound {

    fn from_points<M: Metric>(metric: &M, data: &Matrix, begin: usize, count: usize) -> Self {

        let mut center = vec![0.0; data.dims()];
        for i in begin..begin + count {
            for (d, value) in data.col(i).iter().enumerate() {
                center[d] += value;
            }
        }

        for value in center.iter_mut() {
            *value /= count as f64;
        }

        let mut radius: f64 = 0.0;
        for i in begin..begin + count {
            radius = radius.max(metric.evaluate(&center, data.col(i)));
        }

        return Self { center, radius };
    }

    fn min_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64 {
        return (metric.evaluate(&self.center, point) - self.radius).max(0.0);
    }

    fn max_distance_to_point<M: Metric>(&self, metric: &M, point: &[f64]) -> f64 {
        return metric.evaluate(&self.center, point) + self.radius;
    }

    fn min_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64 {
        let between = metric.evaluate(&self.center, &other.center);
        return (between - self.radius - other.radius).max(0.0);
    }

    fn max_distance<M: Metric>(&self, metric: &M, other: &Self) -> f64 {
        let between = metric.evaluate(&self.center, &other.center);
        return between + self.radius + other.radius;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{EuclideanDistance, ManhattanDistance};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn check_bracketing<B: Bound, M: Metric>(metric: M) {

        let mut rng = StdRng::seed_from_u64(7);
        let a = Matrix::random(3, 40, &mut rng);
        let b = Matrix::random(3, 25, &mut rng);

        let bound_a = B::from_points(&metric, &a, 0, a.num_points());
        let bound_b = B::from_points(&metric, &b, 0, b.num_points());

        let node_min = bound_a.min_distance(&metric, &bound_b);
        let node_max = bound_a.max_distance(&metric, &bound_b);

        for j in 0..b.num_points() {
            let point = b.col(j);
            let point_min = bound_a.min_distance_to_point(&metric, point);
            let point_max = bound_a.max_distance_to_point(&metric, point);

            assert!(node_min <= point_min + 1e-12);
            assert!(point_max <= node_max + 1e-12);

            for i in 0..a.num_points() {
                let d = metric.evaluate(a.col(i), point);
                assert!(point_min <= d + 1e-12);
                assert!(d <= point_max + 1e-12);
            }
        }
    }

    #[test]
    fn hrect_brackets_true_distances() {
        check_bracketing::<HRectBound, _>(EuclideanDistance);
        check_bracketing::<HRectBound, _>(ManhattanDistance);
    }

    #[test]
    fn ball_brackets_true_distances() {
        check_bracketing::<BallBound, _>(EuclideanDistance);
        check_bracketing::<BallBound, _>(ManhattanDistance);
    }

    #[test]
    fn point_inside_hrect_has_zero_min_distance() {

        let bound = HRectBound { lo: vec![0.0, 0.0], hi: vec![1.0, 2.0] };

        assert_eq!(bound.min_distance_to_point(&EuclideanDistance, &[0.5, 1.0]), 0.0);
        assert_eq!(bound.min_distance_to_point(&EuclideanDistance, &[2.0, 1.0]), 1.0);
        assert_eq!(bound.max_distance_to_point(&EuclideanDistance, &[0.0, 0.0]), 5.0f64.sqrt());
    }
}
