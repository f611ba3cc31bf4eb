//! This module provides the discrete frequency grids the Green's functions are
//! sampled on: a real-axis energy grid for retarded quantities and a Matsubara
//! grid for the finite-temperature self-consistency. Both are immutable once
//! constructed.

use crate::BuildError;
use ndarray::Array1;
use num_complex::Complex;

/// An ordered real-axis energy grid
#[derive(Debug, Clone)]
pub struct EnergySpace {
    points: Vec<f64>,
}

impl EnergySpace {
    /// Build the space from an ordered sequence of sample energies
    pub fn new(points: Array1<f64>) -> Result<Self, BuildError> {
        if points.is_empty() {
            return Err(BuildError::Grid("energy grid is empty".into()));
        }
        if points.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            return Err(BuildError::Grid(
                "energy grid must be strictly ascending".into(),
            ));
        }
        Ok(Self {
            points: points.to_vec(),
        })
    }

    /// Number of sample energies
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Iterate the sample energies in ascending order
    pub fn points(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().copied()
    }

    /// The sample energy at `index`.
    ///
    /// # Panics
    /// Panics when `index` is not below [`num_points`](Self::num_points).
    pub fn energy_at(&self, index: usize) -> f64 {
        self.points[index]
    }
}

/// An ordered grid of imaginary-axis (Matsubara) frequencies
#[derive(Debug, Clone)]
pub struct MatsubaraSpace {
    frequencies: Vec<Complex<f64>>,
    beta: f64,
}

impl MatsubaraSpace {
    /// Build the space from purely imaginary frequencies sorted ascending in
    /// imaginary part. The inverse temperature follows from the first
    /// frequency, `beta = pi / Im(z_0)`.
    pub fn new(frequencies: Array1<Complex<f64>>) -> Result<Self, BuildError> {
        let first = frequencies
            .first()
            .ok_or_else(|| BuildError::Grid("matsubara grid is empty".into()))?;
        if first.im <= 0. {
            return Err(BuildError::Grid(format!(
                "first matsubara frequency must have positive imaginary part, got {}",
                first
            )));
        }
        if frequencies.windows(2).into_iter().any(|w| w[1].im <= w[0].im) {
            return Err(BuildError::Grid(
                "matsubara grid must be strictly ascending in imaginary part".into(),
            ));
        }
        let beta = std::f64::consts::PI / first.im;
        Ok(Self {
            frequencies: frequencies.to_vec(),
            beta,
        })
    }

    /// The inverse temperature implied by the grid
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Number of tabulated frequencies
    pub fn num_points(&self) -> usize {
        self.frequencies.len()
    }

    /// The tabulated frequencies, ascending in imaginary part
    pub fn frequencies(&self) -> &[Complex<f64>] {
        &self.frequencies
    }
}
