//! The inner loop closes the DMFT self-consistency at a fixed candidate
//! chemical potential: alternating solver fits and lattice updates of the
//! hybridization function until the change in Δ falls below tolerance or the
//! iteration budget runs out. The engine's state is an explicit value threaded
//! through every call so its transitions stay auditable.

mod methods;

pub(crate) use methods::Dmft;

use crate::{
    impurity::SolverEnsemble, outer_loop::Convergence, self_energy::LocalModel,
    spectral::MatsubaraSpace,
};
use ndarray::Array2;
use num_complex::Complex;

/// The mutable state of one DMFT solve, owned by the caller.
///
/// `delta` holds the current hybridization samples, one row per inequivalent
/// impurity. `budget` is the iteration ceiling the next [`Dmft::solve`] call
/// honors; the sweep controller extends it between retries. `base_mu` is the
/// grid point's candidate chemical potential, the anchor the adaptive-μ search
/// measures its shifts from.
#[derive(Debug, Clone)]
pub(crate) struct DmftState {
    pub(crate) iteration: usize,
    pub(crate) budget: usize,
    pub(crate) base_mu: f64,
    pub(crate) mu: f64,
    pub(crate) delta: Array2<Complex<f64>>,
}

/// Terminal report of a [`Dmft::solve`] call. Non-convergence is a normal
/// outcome, never an error.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DmftOutcome {
    /// The change in Δ fell below tolerance
    Converged {
        /// Total iterations spent when the metric was met
        iterations: usize,
    },
    /// The iteration budget ran out first
    BudgetExhausted {
        /// The convergence metric at the last iteration
        residual: f64,
    },
}

/// A structure holding the information to carry out one DMFT self-consistency
pub(crate) struct InnerLoop<'a> {
    /// Convergence information shared with the spawning outer loop
    convergence_settings: &'a Convergence,
    /// The static lattice block and hybridization table
    local_model: &'a LocalModel<'a>,
    /// The imaginary-frequency grid the self-consistency runs on
    matsubara: &'a MatsubaraSpace,
    /// The impurity solvers, one per inequivalent orbital
    ensemble: &'a mut SolverEnsemble,
    /// Per-impurity target occupancies for the adaptive-μ search
    occupancy_targets: &'a [f64],
}

/// Builder struct for the inner loop
pub(crate) struct InnerLoopBuilder<
    RefConvergenceSettings,
    RefLocalModel,
    RefMatsubara,
    RefEnsemble,
    RefTargets,
> {
    convergence_settings: RefConvergenceSettings,
    local_model: RefLocalModel,
    matsubara: RefMatsubara,
    ensemble: RefEnsemble,
    occupancy_targets: RefTargets,
}

impl InnerLoopBuilder<(), (), (), (), ()> {
    pub(crate) fn new() -> Self {
        Self {
            convergence_settings: (),
            local_model: (),
            matsubara: (),
            ensemble: (),
            occupancy_targets: (),
        }
    }
}

impl<RefConvergenceSettings, RefLocalModel, RefMatsubara, RefEnsemble, RefTargets>
    InnerLoopBuilder<RefConvergenceSettings, RefLocalModel, RefMatsubara, RefEnsemble, RefTargets>
{
    pub(crate) fn with_convergence_settings<ConvergenceSettings>(
        self,
        convergence_settings: &ConvergenceSettings,
    ) -> InnerLoopBuilder<&ConvergenceSettings, RefLocalModel, RefMatsubara, RefEnsemble, RefTargets>
    {
        InnerLoopBuilder {
            convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
        }
    }

    pub(crate) fn with_local_model<LocalModel>(
        self,
        local_model: &LocalModel,
    ) -> InnerLoopBuilder<RefConvergenceSettings, &LocalModel, RefMatsubara, RefEnsemble, RefTargets>
    {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model,
            matsubara: self.matsubara,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
        }
    }

    pub(crate) fn with_matsubara<Matsubara>(
        self,
        matsubara: &Matsubara,
    ) -> InnerLoopBuilder<RefConvergenceSettings, RefLocalModel, &Matsubara, RefEnsemble, RefTargets>
    {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
        }
    }

    pub(crate) fn with_solver_ensemble<Ensemble>(
        self,
        ensemble: &mut Ensemble,
    ) -> InnerLoopBuilder<RefConvergenceSettings, RefLocalModel, RefMatsubara, &mut Ensemble, RefTargets>
    {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            ensemble,
            occupancy_targets: self.occupancy_targets,
        }
    }

    pub(crate) fn with_occupancy_targets<Targets: ?Sized>(
        self,
        occupancy_targets: &Targets,
    ) -> InnerLoopBuilder<RefConvergenceSettings, RefLocalModel, RefMatsubara, RefEnsemble, &Targets>
    {
        InnerLoopBuilder {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            ensemble: self.ensemble,
            occupancy_targets,
        }
    }
}

impl<'a>
    InnerLoopBuilder<&'a Convergence, &'a LocalModel<'a>, &'a MatsubaraSpace, &'a mut SolverEnsemble, &'a [f64]>
{
    pub(crate) fn build(self) -> InnerLoop<'a> {
        InnerLoop {
            convergence_settings: self.convergence_settings,
            local_model: self.local_model,
            matsubara: self.matsubara,
            ensemble: self.ensemble,
            occupancy_targets: self.occupancy_targets,
        }
    }
}
