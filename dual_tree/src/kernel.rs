//! Kernels for density estimation.
//!
//! All kernels are radial and non-increasing in distance, which is what makes the bound over a
//! distance interval cheap: the largest value sits at the smallest distance and vice versa.
//! Kernels are left unnormalized; the estimator only divides by the reference count.

use serde::{Serialize, Deserialize};
use std::fmt::Debug;
use std::str::FromStr;

use crate::error::{Error, Result};

pub trait Kernel: Clone + Debug + Send + Sync {

    fn evaluate(&self, distance: f64) -> f64;

    fn bandwidth(&self) -> f64;

    /// Returns `(min, max)` of the kernel over distances in `[min_distance, max_distance]`.
    fn bounds(&self, min_distance: f64, max_distance: f64) -> (f64, f64) {
        return (self.evaluate(max_distance), self.evaluate(min_distance));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    bandwidth: f64,
    gamma: f64,
}

impl GaussianKernel {
    pub fn new(bandwidth: f64) -> Self {
        return Self { bandwidth, gamma: -0.5 / (bandwidth * bandwidth) };
    }
}

impl Kernel for GaussianKernel {

    fn evaluate(&self, distance: f64) -> f64 {
        return (self.gamma * distance * distance).exp();
    }

    fn bandwidth(&self) -> f64 {
        return self.bandwidth;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpanechnikovKernel {
    bandwidth: f64,
}

impl EpanechnikovKernel {
    pub fn new(bandwidth: f64) -> Self {
        return Self { bandwidth };
    }
}

impl Kernel for EpanechnikovKernel {

    fn evaluate(&self, distance: f64) -> f64 {
        let u = distance / self.bandwidth;
        return (1.0 - u * u).max(0.0);
    }

    fn bandwidth(&self) -> f64 {
        return self.bandwidth;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaplacianKernel {
    bandwidth: f64,
}

impl LaplacianKernel {
    pub fn new(bandwidth: f64) -> Self {
        return Self { bandwidth };
    }
}

impl Kernel for LaplacianKernel {

    fn evaluate(&self, distance: f64) -> f64 {
        return (-distance / self.bandwidth).exp();
    }

    fn bandwidth(&self) -> f64 {
        return self.bandwidth;
    }
}

/// Uniform kernel: 1 inside the bandwidth, 0 outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalKernel {
    bandwidth: f64,
}

impl SphericalKernel {
    pub fn new(bandwidth: f64) -> Self {
        return Self { bandwidth };
    }
}

impl Kernel for SphericalKernel {

    fn evaluate(&self, distance: f64) -> f64 {
        match distance <= self.bandwidth {
            true => 1.0,
            false => 0.0,
        }
    }

    fn bandwidth(&self) -> f64 {
        return self.bandwidth;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangularKernel {
    bandwidth: f64,
}

impl TriangularKernel {
    pub fn new(bandwidth: f64) -> Self {
        return Self { bandwidth };
    }
}

impl Kernel for TriangularKernel {

    fn evaluate(&self, distance: f64) -> f64 {
        return (1.0 - distance / self.bandwidth).max(0.0);
    }

    fn bandwidth(&self) -> f64 {
        return self.bandwidth;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KernelName {
    Gaussian,
    Epanechnikov,
    Laplacian,
    Spherical,
    Triangular,
}

impl FromStr for KernelName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gaussian" => Ok(KernelName::Gaussian),
            "epanechnikov" => Ok(KernelName::Epanechnikov),
            "laplacian" => Ok(KernelName::Laplacian),
            "spherical" => Ok(KernelName::Spherical),
            "triangular" => Ok(KernelName::Triangular),
            _ => Err(Error::invalid(format!("unknown kernel: {}", s))),
        }
    }
}

/// Kernel chosen at runtime, e.g. from a parameter file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelType {
    Gaussian(GaussianKernel),
    Epanechnikov(EpanechnikovKernel),
    Laplacian(LaplacianKernel),
    Spherical(SphericalKernel),
    Triangular(TriangularKernel),
}

impl KernelType {

    pub fn new(name: KernelName, bandwidth: f64) -> Result<Self> {

        crate::validate::check_bandwidth(bandwidth)?;

        let kernel = match name {
            KernelName::Gaussian => KernelType::Gaussian(GaussianKernel::new(bandwidth)),
            KernelName::Epanechnikov => KernelType::Epanechnikov(EpanechnikovKernel::new(bandwidth)),
            KernelName::Laplacian => KernelType::Laplacian(LaplacianKernel::new(bandwidth)),
            KernelName::Spherical => KernelType::Spherical(SphericalKernel::new(bandwidth)),
            KernelName::Triangular => KernelType::Triangular(TriangularKernel::new(bandwidth)),
        };

        return Ok(kernel);
    }

    pub fn name(&self) -> KernelName {
        match self {
            KernelType::Gaussian(_) => KernelName::Gaussian,
            KernelType::Epanechnikov(_) => KernelName::Epanechnikov,
            KernelType::Laplacian(_) => KernelName::Laplacian,
            KernelType::Spherical(_) => KernelName::Spherical,
            KernelType::Triangular(_) => KernelName::Triangular,
        }
    }
}

impl Kernel for KernelType {

    fn evaluate(&self, distance: f64) -> f64 {
        match self {
            KernelType::Gaussian(k) => k.evaluate(distance),
            KernelType::Epanechnikov(k) => k.evaluate(distance),
            KernelType::Laplacian(k) => k.evaluate(distance),
            KernelType::Spherical(k) => k.evaluate(distance),
            KernelType::Triangular(k) => k.evaluate(distance),
        }
    }

    fn bandwidth(&self) -> f64 {
        match self {
            KernelType::Gaussian(k) => k.bandwidth(),
            KernelType::Epanechnikov(k) => k.bandwidth(),
            KernelType::Laplacian(k) => k.bandwidth(),
            KernelType::Spherical(k) => k.bandwidth(),
            KernelType::Triangular(k) => k.bandwidth(),
        }
    }
}
