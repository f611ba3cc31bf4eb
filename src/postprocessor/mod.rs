//! Reshapes converged quantities into their on-disk artifact form and writes
//! them. The self-energy travels as a diagonal representation inside the
//! crate; later pipeline stages expect dense `(num_energies, L, L)` arrays, so
//! the diagonal is embedded here, at the persistence boundary.

use crate::{outer_loop::GridKey, IOError};
use ndarray::{Array2, Array3, ArrayView2};
use ndarray_npy::write_npy;
use num_complex::Complex;
use std::path::Path;

/// Embed a diagonal self-energy (one row per orbital, one column per sample
/// energy) into dense per-energy matrices with zero off-diagonal entries.
pub(crate) fn embed_diagonal(diagonal: ArrayView2<Complex<f64>>) -> Array3<Complex<f64>> {
    let (num_orbitals, num_energies) = diagonal.dim();
    let mut dense = Array3::zeros((num_energies, num_orbitals, num_orbitals));
    for n in 0..num_energies {
        for i in 0..num_orbitals {
            dense[[n, i, i]] = diagonal[[i, n]];
        }
    }
    dense
}

fn artifact_name(key: &GridKey) -> String {
    format!("dmu_{}.npy", key.label())
}

/// Persist the converged hybridization function for one grid point
pub(crate) fn write_delta(
    directory: &Path,
    key: &GridKey,
    delta: &Array2<Complex<f64>>,
) -> Result<(), IOError> {
    write_npy(directory.join(artifact_name(key)), delta)?;
    Ok(())
}

/// Persist the dense physical self-energy for one grid point
pub(crate) fn write_sigma(
    directory: &Path,
    key: &GridKey,
    sigma: &Array3<Complex<f64>>,
) -> Result<(), IOError> {
    write_npy(directory.join(artifact_name(key)), sigma)?;
    Ok(())
}

/// Persist the converged chemical potential as plain text
pub(crate) fn write_mu(path: &Path, mu: f64) -> Result<(), IOError> {
    std::fs::write(path, mu.to_string())?;
    Ok(())
}
