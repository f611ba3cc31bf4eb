//! dmft-sweep drives the dynamical mean-field stage of a multi-stage quantum
//! transport pipeline (DFT → localization → hybridization → DMFT → transmission).
//!
//! # Overview
//! The transmission stage of a Coulomb-blockade calculation needs a many-body
//! self-energy for the correlated subspace of the device. This crate produces it:
//! for every point on a grid of chemical-potential offsets it closes a DMFT
//! self-consistency loop between a lattice (local) Green's function and an
//! ensemble of single-impurity solvers, then persists the converged
//! hybridization function Δ and the physical self-energy Σ sampled on the
//! real-axis energy grid. Later pipeline stages pick the artifacts up by their
//! offset-keyed filenames.
//!
//! The numerically heavy impurity problem sits behind the
//! [`impurity::ImpuritySolver`] capability interface, so an external
//! exact-diagonalization code can replace the built-in bath-fit solver without
//! touching the sweep or engine logic.
//!
//! # Usage
//! The binary takes a TOML run description naming the input arrays and the
//! solver parameters:
//!
//! ```toml
//! [dmft]
//! interaction = 4.0
//! number_of_baths = 4
//! tolerance = 1e-1
//! alpha = 0.0
//! maximum_inner_iterations = 10
//! maximum_outer_iterations = 1000
//!
//! [sweep]
//! dmu_min = 0.0
//! dmu_max = 0.9
//! dmu_step = 1.0
//! ```
//!
//! with a `[data]` section pointing at the `.npy` files produced by the
//! hybridization stage.

#![warn(missing_docs)]
#![allow(dead_code)]

/// The command line application, configuration and tracing primitives
pub mod app;

/// Device structure, scattering-region restriction and species filtering
pub mod device;

/// The tabulated Matsubara hybridization function and its interpolator
pub mod hybridization;

/// Impurity solvers and the ensemble aggregating one solver per inequivalent orbital
pub mod impurity;

/// The inner loop, which closes the DMFT self-consistency at fixed chemical potential
mod inner_loop;

/// The outer loop, which sweeps the chemical-potential grid and persists artifacts
mod outer_loop;

/// Reshapes converged quantities into their on-disk artifact form
mod postprocessor;

/// Double counting, the equivalence index and the local lattice model
pub mod self_energy;

/// Discrete real-axis and Matsubara frequency grids
pub mod spectral;

use miette::Diagnostic;

/// Errors raised while assembling grids, tables, indices or solver configuration
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum BuildError {
    /// A frequency or energy grid is empty or out of order
    #[error("{0}")]
    Grid(String),
    /// The hybridization table does not line up with its grid
    #[error("{0}")]
    Table(String),
    /// The equivalence index is not a well-defined surjection
    #[error("{0}")]
    Index(String),
    /// The run configuration is internally inconsistent
    #[error("{0}")]
    Configuration(String),
}

/// Errors raised by an impurity solver while fitting its bath
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum SolverError {
    /// The bath fit could not be carried out
    #[error("{0}")]
    Fit(String),
    /// The sampled hybridization does not match the solver's grid size
    #[error("hybridization sampled on {got} frequencies, solver expects {expected}")]
    Dimensions {
        /// Grid size the solver was built for
        expected: usize,
        /// Grid size of the samples handed to `fit`
        got: usize,
    },
}

/// Errors raised inside a DMFT iteration; these abort the whole sweep
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum SolveError {
    /// The local Green's function could not be inverted
    #[error("local Green's function is singular at z = {0}")]
    SingularGreensFunction(num_complex::Complex<f64>),
    /// An impurity solver failed outright
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Error for IO events
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum IOError {
    /// Filesystem failure creating directories or writing text
    #[error("IO failure: {0}")]
    IO(#[from] std::io::Error),
    /// An `.npy` artifact could not be written
    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),
    /// An `.npy` input could not be read
    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),
}
