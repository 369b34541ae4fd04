//! Distance metrics.
//!
//! Every metric here is an L-p metric: it is a function of the per-axis absolute differences
//! only. Box bounds rely on this, since they compute per-axis gaps to a hyperrectangle and hand
//! them to [`Metric::combine`].

use std::fmt::Debug;

pub trait Metric: Clone + Debug + Default + Send + Sync {

    /// Combines non-negative per-axis gaps into a distance.
    fn combine<I: Iterator<Item = f64>>(&self, gaps: I) -> f64;

    fn evaluate(&self, a: &[f64], b: &[f64]) -> f64 {
        return self.combine(a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EuclideanDistance;

impl Metric for EuclideanDistance {

    fn combine<I: Iterator<Item = f64>>(&self, gaps: I) -> f64 {
        let sum: f64 = gaps.map(|g| g * g).sum();
        return sum.sqrt();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManhattanDistance;

impl Metric for ManhattanDistance {

    fn combine<I: Iterator<Item = f64>>(&self, gaps: I) -> f64 {
        return gaps.sum();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChebyshevDistance;

impl Metric for ChebyshevDistance {

    fn combine<I: Iterator<Item = f64>>(&self, gaps: I) -> f64 {
        return gaps.fold(0.0, f64::max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn lp_metrics() {

        let a = [0.0, 0.0, 0.0];
        let b = [1.0, -2.0, 2.0];

        assert_approx_eq!(EuclideanDistance.evaluate(&a, &b), 3.0);
        assert_approx_eq!(ManhattanDistance.evaluate(&a, &b), 5.0);
        assert_approx_eq!(ChebyshevDistance.evaluate(&a, &b), 2.0);

        assert_eq!(EuclideanDistance.evaluate(&a, &b), EuclideanDistance.evaluate(&b, &a));
    }
}
