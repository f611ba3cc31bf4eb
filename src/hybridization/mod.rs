//! The tabulated Matsubara hybridization function Δ produced by the upstream
//! hybridization stage, together with the interpolator the local model samples
//! it through.

use crate::{spectral::MatsubaraSpace, BuildError};
use ndarray::{s, Array1, Array2, Array3};
use num_complex::Complex;

/// A hybridization function tabulated on the Matsubara grid.
///
/// Each tabulated frequency carries an `L x L` complex matrix coupling the
/// correlated orbitals to the lead environment. Queries interpolate linearly
/// over the imaginary part of the frequency; queries outside the tabulated
/// range return the zero matrix so that truncated tables never abort a
/// downstream evaluation.
#[derive(Debug, Clone)]
pub struct HybridizationTable {
    points: Vec<f64>,
    values: Array3<Complex<f64>>,
}

impl HybridizationTable {
    /// Reshape a flat buffer aligned with the Matsubara grid into the table.
    ///
    /// The buffer must hold `num_frequencies * L * L` entries in row-major
    /// frequency-first order, exactly as the hybridization stage writes it.
    pub fn from_flat(
        matsubara: &MatsubaraSpace,
        flat: Array1<Complex<f64>>,
        num_orbitals: usize,
    ) -> Result<Self, BuildError> {
        let num_frequencies = matsubara.num_points();
        let expected = num_frequencies * num_orbitals * num_orbitals;
        if flat.len() != expected {
            return Err(BuildError::Table(format!(
                "hybridization buffer holds {} entries, expected {} ({} frequencies x {} orbitals squared)",
                flat.len(),
                expected,
                num_frequencies,
                num_orbitals,
            )));
        }
        let values = flat
            .into_shape((num_frequencies, num_orbitals, num_orbitals))
            .map_err(|e| BuildError::Table(format!("hybridization buffer reshape failed: {}", e)))?;
        let points = matsubara.frequencies().iter().map(|z| z.im).collect();
        Ok(Self { points, values })
    }

    /// Build directly from interpolation nodes and tabulated matrices
    pub fn from_values(
        points: Vec<f64>,
        values: Array3<Complex<f64>>,
    ) -> Result<Self, BuildError> {
        if points.is_empty() || points.len() != values.shape()[0] {
            return Err(BuildError::Table(format!(
                "{} interpolation nodes for {} tabulated matrices",
                points.len(),
                values.shape()[0]
            )));
        }
        if points.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BuildError::Table(
                "interpolation nodes must be strictly ascending".into(),
            ));
        }
        if values.shape()[1] != values.shape()[2] {
            return Err(BuildError::Table(format!(
                "tabulated matrices must be square, got {} x {}",
                values.shape()[1],
                values.shape()[2]
            )));
        }
        Ok(Self { points, values })
    }

    /// Number of correlated orbitals `L`
    pub fn num_orbitals(&self) -> usize {
        self.values.shape()[1]
    }

    /// Interpolate the table at a frequency `z`, indexed by its imaginary part.
    ///
    /// Off-grid queries clamp to the zero matrix rather than extrapolating.
    pub fn sample(&self, z: Complex<f64>) -> Array2<Complex<f64>> {
        let l = self.num_orbitals();
        let x = z.im;
        let last = self.points.len() - 1;
        if x < self.points[0] || x > self.points[last] {
            return Array2::zeros((l, l));
        }
        // first node at or above the query
        let upper = self.points.partition_point(|&p| p < x);
        if upper == 0 || self.points[upper] == x {
            return self.values.slice(s![upper, .., ..]).to_owned();
        }
        let lower = upper - 1;
        let t = (x - self.points[lower]) / (self.points[upper] - self.points[lower]);
        let mut out = self.values.slice(s![lower, .., ..]).mapv(|v| v * (1. - t));
        out.zip_mut_with(&self.values.slice(s![upper, .., ..]), |acc, &v| {
            *acc += v * t
        });
        out
    }
}
