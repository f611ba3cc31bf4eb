//! The outer loop walks the grid of chemical-potential offsets. At each grid
//! point it re-initializes the DMFT engine, retries stalled solves on an
//! extended iteration budget, and persists the point's hybridization function
//! and physical self-energy under an offset-keyed filename.

mod convergence;
mod methods;

pub(crate) use convergence::Convergence;
pub(crate) use methods::Sweep;

use crate::{
    impurity::SolverEnsemble, self_energy::LocalModel, spectral::{EnergySpace, MatsubaraSpace},
    BuildError, IOError, SolveError,
};
use miette::Diagnostic;
use std::path::PathBuf;

/// Errors terminating a sweep
#[derive(thiserror::Error, Debug, Diagnostic)]
pub(crate) enum OuterLoopError {
    /// The configuration was rejected before any solver work
    #[error(transparent)]
    Build(#[from] BuildError),
    /// A DMFT iteration diverged
    #[error(transparent)]
    Solve(#[from] SolveError),
    /// An artifact could not be written
    #[error(transparent)]
    Io(#[from] IOError),
}

/// Identifies one grid point by its offset in fixed-point 1e-4 units.
///
/// The integer representation keys the retry loop and the artifact filenames;
/// rendering to the conventional four-decimal label happens only at the
/// persistence boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GridKey(i64);

impl GridKey {
    pub(crate) fn from_offset(offset: f64) -> Self {
        Self((offset * 1e4).round() as i64)
    }

    pub(crate) fn offset(&self) -> f64 {
        self.0 as f64 / 1e4
    }

    /// The four-decimal label consumed by later pipeline stages
    pub(crate) fn label(&self) -> String {
        format!("{:.4}", self.offset())
    }
}

/// Terminal status of one grid point. `Exhausted` marks output persisted
/// without a converged solve backing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SweepStatus {
    Converged,
    Exhausted,
}

/// What happened at a single grid point
#[derive(Debug, Clone)]
pub(crate) struct GridPointReport {
    pub(crate) key: GridKey,
    pub(crate) status: SweepStatus,
    pub(crate) iterations: usize,
}

/// The full sweep outcome, one entry per grid point in sweep order
#[derive(Debug, Clone, Default)]
pub(crate) struct SweepReport {
    pub(crate) points: Vec<GridPointReport>,
}

impl SweepReport {
    pub(crate) fn all_converged(&self) -> bool {
        self.points
            .iter()
            .all(|p| p.status == SweepStatus::Converged)
    }
}

/// Where the sweep writes its artifacts
#[derive(Debug, Clone)]
pub(crate) struct OutputLayout {
    pub(crate) delta_directory: PathBuf,
    pub(crate) sigma_directory: PathBuf,
    pub(crate) mu_file: PathBuf,
}

/// A structure holding the information to carry out the chemical-potential sweep
pub(crate) struct OuterLoop<'a> {
    /// The convergence information for the outer loop and the spawned DMFT engines
    convergence_settings: &'a Convergence,
    /// The static lattice block shared by every grid point
    local_model: &'a LocalModel<'a>,
    /// The imaginary-frequency grid the self-consistency runs on
    matsubara: &'a MatsubaraSpace,
    /// The real-axis grid the physical self-energy is sampled on
    energies: &'a EnergySpace,
    /// The impurity solvers, re-fitted at every grid point
    ensemble: SolverEnsemble,
    /// Per-impurity target occupancies for the adaptive-μ search
    occupancy_targets: Vec<f64>,
    /// The base chemical potential the offsets are measured from
    base_mu: f64,
    /// Static interaction seed for the initial hybridization guess
    seed_interaction: f64,
    /// Artifact destinations
    output: OutputLayout,
}

/// Builder struct for the outer loop
pub(crate) struct OuterLoopBuilder<
    RefConvergenceSettings,
    RefLocalModel,
    RefMatsubara,
    RefEnergies,
> {
    convergence_settings: RefConvergenceSettings,
    local_model: RefLocalModel,
    matsubara: RefMatsubara,
    energies: RefEnergies,
    ensemble: Option<SolverEnsemble>,
    occupancy_targets: Vec<f64>,
    base_mu: f64,
    seed_interaction: f64,
    output: Option<OutputLayout>,
}

impl OuterLoopBuilder<(), (), (), ()> {
    /// Initialise an empty OuterLoopBuilder
    pub(crate) fn new() -> Self {
        Self {
            convergence_settings: (),
            local_model: (),
            matsubara: (),
            energies: (),
            ensemble: None,
            occupancy_targets: Vec::new(),
            base_mu: 0.,
            seed_interaction: 0.,
            output: None,
        }
    }
}

impl<RefConvergenceSettings, RefLocalModel, RefMatsubara, RefEnergies>
    OuterLoopBuilder<RefConvergenceSettings, RefLocalModel, RefMatsubara, RefEnergies>
{
    /// Attach convergence information for the outer loop and the inner DMFT engines
    pub(crate) fn with_convergence_settings<ConvergenceSettings>(
        self,
        convergence_settings: &ConvergenceSettings,
    ) -> OuterLoopBuilder<&ConvergenceSettings, RefLocalModel, RefMatsubara, RefEnergies> {
        OuterLoopBuilder {
            convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            energies: self.energies,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
            base_mu: self.base_mu,
            seed_interaction: self.seed_interaction,
            output: self.output,
        }
    }

    /// Attach the corrected lattice block
    pub(crate) fn with_local_model<LocalModel>(
        self,
        local_model: &LocalModel,
    ) -> OuterLoopBuilder<RefConvergenceSettings, &LocalModel, RefMatsubara, RefEnergies> {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model,
            matsubara: self.matsubara,
            energies: self.energies,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
            base_mu: self.base_mu,
            seed_interaction: self.seed_interaction,
            output: self.output,
        }
    }

    /// Attach the Matsubara grid
    pub(crate) fn with_matsubara<Matsubara>(
        self,
        matsubara: &Matsubara,
    ) -> OuterLoopBuilder<RefConvergenceSettings, RefLocalModel, &Matsubara, RefEnergies> {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara,
            energies: self.energies,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
            base_mu: self.base_mu,
            seed_interaction: self.seed_interaction,
            output: self.output,
        }
    }

    /// Attach the real-axis energy grid
    pub(crate) fn with_energies<Energies>(
        self,
        energies: &Energies,
    ) -> OuterLoopBuilder<RefConvergenceSettings, RefLocalModel, RefMatsubara, &Energies> {
        OuterLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            energies,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
            base_mu: self.base_mu,
            seed_interaction: self.seed_interaction,
            output: self.output,
        }
    }

    /// Hand over the impurity solver ensemble
    pub(crate) fn with_solver_ensemble(mut self, ensemble: SolverEnsemble) -> Self {
        self.ensemble = Some(ensemble);
        self
    }

    /// Per-impurity target occupancies
    pub(crate) fn with_occupancy_targets(mut self, occupancy_targets: Vec<f64>) -> Self {
        self.occupancy_targets = occupancy_targets;
        self
    }

    /// The base chemical potential the sweep offsets are measured from
    pub(crate) fn with_base_mu(mut self, base_mu: f64) -> Self {
        self.base_mu = base_mu;
        self
    }

    /// Static interaction seed for the initial hybridization guess
    pub(crate) fn with_seed_interaction(mut self, seed_interaction: f64) -> Self {
        self.seed_interaction = seed_interaction;
        self
    }

    /// Artifact destinations
    pub(crate) fn with_output(mut self, output: OutputLayout) -> Self {
        self.output = Some(output);
        self
    }
}

impl<'a> OuterLoopBuilder<&'a Convergence, &'a LocalModel<'a>, &'a MatsubaraSpace, &'a EnergySpace> {
    /// Build out the OuterLoop, checking the pieces line up
    pub(crate) fn build(self) -> Result<OuterLoop<'a>, BuildError> {
        let ensemble = self.ensemble.ok_or_else(|| {
            BuildError::Configuration("the outer loop needs a solver ensemble".into())
        })?;
        let output = self.output.ok_or_else(|| {
            BuildError::Configuration("the outer loop needs an output layout".into())
        })?;
        let num_impurities = self.local_model.equivalence().num_impurities();
        if ensemble.len() != num_impurities {
            return Err(BuildError::Configuration(format!(
                "{} solvers for {} inequivalent impurities",
                ensemble.len(),
                num_impurities
            )));
        }
        if self.occupancy_targets.len() != num_impurities {
            return Err(BuildError::Configuration(format!(
                "{} occupancy targets for {} inequivalent impurities",
                self.occupancy_targets.len(),
                num_impurities
            )));
        }
        Ok(OuterLoop {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            energies: self.energies,
            ensemble,
            occupancy_targets: self.occupancy_targets,
            base_mu: self.base_mu,
            seed_interaction: self.seed_interaction,
            output,
        })
    }
}
