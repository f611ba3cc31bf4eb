//! The built-in reference solver: a discretized-bath fit plus a
//! Hubbard-I-type self-energy. It stands in for an external
//! exact-diagonalization code behind the same interface.

use super::ImpuritySolver;
use crate::{spectral::MatsubaraSpace, SolverError};
use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;
use num_complex::Complex;

// Ridge regularization keeping the normal equations invertible when bath
// poles are nearly degenerate on the imaginary axis.
const RIDGE: f64 = 1e-10;

/// Fits a finite bath `Delta_fit(z) = sum_k v_k^2 / (z - e_k)` to the sampled
/// hybridization and evaluates a Hubbard-I-type self-energy from the fit.
///
/// Bath energies are pinned to a uniform grid spanning the bandwidth implied
/// by the hybridization's first spectral moment; the couplings follow from a
/// ridge-regularized linear least-squares solve over the Matsubara samples.
/// The fit is the solver's only mutable state.
pub struct BathFitSolver {
    number_of_baths: usize,
    number_of_frequencies: usize,
    interaction: f64,
    beta: f64,
    occupancy: f64,
    bath_energies: Vec<f64>,
    bath_weights: Vec<f64>,
}

impl BathFitSolver {
    /// A fresh solver with an empty bath
    pub fn new(
        number_of_baths: usize,
        number_of_frequencies: usize,
        interaction: f64,
        beta: f64,
        occupancy: f64,
    ) -> Self {
        Self {
            number_of_baths,
            number_of_frequencies,
            interaction,
            beta,
            occupancy,
            bath_energies: Vec::new(),
            bath_weights: Vec::new(),
        }
    }

    /// The fitted effective hybridization
    pub fn fitted_hybridization(&self, z: Complex<f64>) -> Complex<f64> {
        self.bath_energies
            .iter()
            .zip(self.bath_weights.iter())
            .map(|(&energy, &weight)| Complex::from(weight) / (z - energy))
            .sum()
    }

    /// On-site interaction strength `U`
    pub fn interaction(&self) -> f64 {
        self.interaction
    }

    /// Inverse temperature the solver was built for
    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn bath_grid(&self, half_bandwidth: f64) -> Vec<f64> {
        let nb = self.number_of_baths;
        if nb == 1 {
            return vec![0.];
        }
        (0..nb)
            .map(|k| half_bandwidth * (-1. + 2. * k as f64 / (nb - 1) as f64))
            .collect()
    }
}

impl ImpuritySolver for BathFitSolver {
    fn fit(
        &mut self,
        matsubara: &MatsubaraSpace,
        hybridization: ArrayView1<Complex<f64>>,
    ) -> Result<(), SolverError> {
        if hybridization.len() != self.number_of_frequencies
            || matsubara.num_points() != self.number_of_frequencies
        {
            return Err(SolverError::Dimensions {
                expected: self.number_of_frequencies,
                got: hybridization.len(),
            });
        }
        let frequencies = matsubara.frequencies();

        // Delta ~ m1 / z asymptotically; the first moment sets the bandwidth
        // the bath grid has to cover.
        let tail = hybridization[self.number_of_frequencies - 1]
            * frequencies[self.number_of_frequencies - 1];
        let half_bandwidth = 2. * tail.norm().sqrt().max(1.);
        let bath_energies = self.bath_grid(half_bandwidth);

        // Least squares for the weights with real and imaginary residuals
        // stacked, so the unknowns stay real.
        let nf = self.number_of_frequencies;
        let nb = self.number_of_baths;
        let design = DMatrix::from_fn(2 * nf, nb, |row, k| {
            let n = row % nf;
            let pole = Complex::from(1.) / (frequencies[n] - bath_energies[k]);
            if row < nf {
                pole.re
            } else {
                pole.im
            }
        });
        let target = DVector::from_fn(2 * nf, |row, _| {
            let n = row % nf;
            if row < nf {
                hybridization[n].re
            } else {
                hybridization[n].im
            }
        });
        let normal = design.transpose() * &design + DMatrix::identity(nb, nb) * RIDGE;
        let projected = design.transpose() * target;
        let weights = normal
            .lu()
            .solve(&projected)
            .ok_or_else(|| SolverError::Fit("bath normal equations are singular".into()))?;

        self.bath_energies = bath_energies;
        // couplings enter squared, so negative least-squares weights clamp to zero
        self.bath_weights = weights.iter().map(|w| w.max(0.)).collect();
        Ok(())
    }

    fn self_energy(&self, z: Complex<f64>) -> Complex<f64> {
        let n = self.occupancy;
        let u = self.interaction;
        let hartree = Complex::from(u * n);
        if self.bath_weights.is_empty() {
            return hartree;
        }
        hartree + Complex::from(u * u * n * (1. - n)) / (z - self.fitted_hybridization(z))
    }
}
