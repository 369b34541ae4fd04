//! Random orthonormal change of basis for point sets.
//!
//! Rotating the reference and query sets by the same orthonormal matrix keeps every Euclidean
//! distance, but changes which dimensions a kd tree sees as widest.

use rand::Rng;

use crate::data::Matrix;
use crate::error::{Error, Result};
use crate::validate;

/// Columns below this norm after orthogonalization are drawn again.
const MIN_NORM: f64 = 1e-6;

/// Square matrix with orthonormal columns, stored column-major like [`Matrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct RandomBasis {
    columns: Matrix,
}

impl RandomBasis {

    /// Orthonormalizes random vectors with modified Gram-Schmidt.
    pub fn random<R: Rng>(dims: usize, rng: &mut R) -> Self {

        let mut columns = Matrix::new(dims, dims);

        let mut filled = 0;
        while filled < dims {

            let mut candidate: Vec<f64> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();

            for j in 0..filled {
                let previous = columns.col(j);
                let projection: f64 = candidate.iter().zip(previous.iter()).map(|(a, b)| a * b).sum();
                for (value, direction) in candidate.iter_mut().zip(previous.iter()) {
                    *value -= projection * direction;
                }
            }

            let norm = candidate.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm < MIN_NORM {
                continue;
            }

            for (slot, value) in columns.col_mut(filled).iter_mut().zip(candidate.iter()) {
                *slot = value / norm;
            }
            filled += 1;
        }

        return Self { columns };
    }

    /// Rebuilds a stored basis. Orthonormality is checked to within rounding.
    pub fn from_vec(dims: usize, data: Vec<f64>) -> Result<Self> {

        let columns = Matrix::from_vec(dims, data)?;
        if columns.num_points() != dims {
            return Err(Error::ShapeMismatch(format!("basis must be {} x {}, found {} columns", dims, dims, columns.num_points())));
        }

        for i in 0..dims {
            for j in 0..dims {
                let dot: f64 = columns.col(i).iter().zip(columns.col(j).iter()).map(|(a, b)| a * b).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                if (dot - expected).abs() > 1e-9 {
                    return Err(Error::Serialization(format!("basis columns {} and {} are not orthonormal", i, j)));
                }
            }
        }

        return Ok(Self { columns });
    }

    pub fn dims(&self) -> usize {
        return self.columns.dims();
    }

    pub fn as_slice(&self) -> &[f64] {
        return self.columns.as_slice();
    }

    /// Coordinates of every point of `points` in this basis.
    pub fn apply(&self, points: &Matrix) -> Result<Matrix> {

        validate::check_dimensions(self.dims(), points)?;

        let mut rotated = Matrix::new(self.dims(), points.num_points());
        for i in 0..points.num_points() {
            let point = points.col(i);
            for (d, slot) in rotated.col_mut(i).iter_mut().enumerate() {
                *slot = self.columns.col(d).iter().zip(point.iter()).map(|(a, b)| a * b).sum();
            }
        }

        return Ok(rotated);
    }
}
