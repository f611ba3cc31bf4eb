//! Impurity solvers sit behind a capability interface so the heavy
//! exact-diagonalization machinery stays replaceable: the engine only ever
//! asks a solver to fit itself to a sampled hybridization and to report the
//! resulting self-energy. One independent solver is held per inequivalent
//! impurity; no solver reads or writes another's state.

mod bath;

pub use bath::BathFitSolver;

use crate::{spectral::MatsubaraSpace, BuildError, SolverError};
use ndarray::{s, Array2, ArrayView1};
use num_complex::Complex;

/// A single-impurity problem: fit internal bath state to a hybridization
/// sampled on the Matsubara grid, then evaluate the impurity self-energy.
pub trait ImpuritySolver {
    /// Update the solver's private bath parameters so its effective
    /// hybridization reproduces the sampled one
    fn fit(
        &mut self,
        matsubara: &MatsubaraSpace,
        hybridization: ArrayView1<Complex<f64>>,
    ) -> Result<(), SolverError>;

    /// The impurity self-energy at frequency `z`, using the current fit
    fn self_energy(&self, z: Complex<f64>) -> Complex<f64>;
}

/// Aggregates one solver per inequivalent impurity behind a uniform interface
pub struct SolverEnsemble {
    solvers: Vec<Box<dyn ImpuritySolver>>,
}

impl SolverEnsemble {
    /// Wrap an explicit list of solvers, one per impurity slot
    pub fn from_solvers(solvers: Vec<Box<dyn ImpuritySolver>>) -> Self {
        Self { solvers }
    }

    /// Number of impurity slots
    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    /// Whether the ensemble holds no solvers
    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    /// Fit every solver to its row of the sampled hybridization
    pub fn fit_all(
        &mut self,
        matsubara: &MatsubaraSpace,
        delta: &Array2<Complex<f64>>,
    ) -> Result<(), SolverError> {
        if delta.shape()[0] != self.solvers.len() {
            return Err(SolverError::Dimensions {
                expected: self.solvers.len(),
                got: delta.shape()[0],
            });
        }
        for (slot, solver) in self.solvers.iter_mut().enumerate() {
            solver.fit(matsubara, delta.slice(s![slot, ..]))?;
        }
        Ok(())
    }

    /// The per-impurity self-energies at a single frequency
    pub fn self_energies(&self, z: Complex<f64>) -> Vec<Complex<f64>> {
        self.solvers.iter().map(|s| s.self_energy(z)).collect()
    }

    /// The per-impurity self-energies sampled on the whole Matsubara grid,
    /// one row per impurity
    pub fn matsubara_self_energies(&self, matsubara: &MatsubaraSpace) -> Array2<Complex<f64>> {
        let mut out = Array2::zeros((self.solvers.len(), matsubara.num_points()));
        for (n, &z) in matsubara.frequencies().iter().enumerate() {
            for (slot, solver) in self.solvers.iter().enumerate() {
                out[[slot, n]] = solver.self_energy(z);
            }
        }
        out
    }
}

/// Builds a [`SolverEnsemble`] of [`BathFitSolver`]s, one per inequivalent
/// impurity, each parameterized by its on-site interaction and target
/// occupancy.
pub struct SolverEnsembleBuilder<'a> {
    matsubara: Option<&'a MatsubaraSpace>,
    interactions: Vec<f64>,
    occupancies: Vec<f64>,
    number_of_baths: usize,
}

impl<'a> SolverEnsembleBuilder<'a> {
    /// Start an empty builder
    pub fn new() -> Self {
        Self {
            matsubara: None,
            interactions: Vec::new(),
            occupancies: Vec::new(),
            number_of_baths: 0,
        }
    }

    /// Attach the Matsubara grid the solvers fit on
    pub fn with_matsubara(mut self, matsubara: &'a MatsubaraSpace) -> Self {
        self.matsubara = Some(matsubara);
        self
    }

    /// One on-site interaction strength per impurity slot
    pub fn with_interactions(mut self, interactions: Vec<f64>) -> Self {
        self.interactions = interactions;
        self
    }

    /// One target occupancy per impurity slot
    pub fn with_occupancies(mut self, occupancies: Vec<f64>) -> Self {
        self.occupancies = occupancies;
        self
    }

    /// Bath sites per solver
    pub fn with_number_of_baths(mut self, number_of_baths: usize) -> Self {
        self.number_of_baths = number_of_baths;
        self
    }

    /// Build the ensemble
    pub fn build(self) -> Result<SolverEnsemble, BuildError> {
        let matsubara = self
            .matsubara
            .ok_or_else(|| BuildError::Configuration("solver ensemble needs a matsubara grid".into()))?;
        if self.interactions.len() != self.occupancies.len() {
            return Err(BuildError::Configuration(format!(
                "{} interactions for {} occupancies",
                self.interactions.len(),
                self.occupancies.len()
            )));
        }
        if self.interactions.is_empty() {
            return Err(BuildError::Configuration(
                "solver ensemble needs at least one impurity".into(),
            ));
        }
        if self.number_of_baths == 0 {
            return Err(BuildError::Configuration(
                "solver ensemble needs at least one bath site".into(),
            ));
        }
        let solvers = self
            .interactions
            .iter()
            .zip(self.occupancies.iter())
            .map(|(&interaction, &occupancy)| {
                Box::new(BathFitSolver::new(
                    self.number_of_baths,
                    matsubara.num_points(),
                    interaction,
                    matsubara.beta(),
                    occupancy,
                )) as Box<dyn ImpuritySolver>
            })
            .collect();
        Ok(SolverEnsemble::from_solvers(solvers))
    }
}

impl<'a> Default for SolverEnsembleBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::{ImpuritySolver, SolverEnsemble, SolverEnsembleBuilder};
    use crate::spectral::MatsubaraSpace;
    use ndarray::{Array1, Array2, ArrayView1};
    use num_complex::Complex;

    fn matsubara(beta: f64, n: usize) -> MatsubaraSpace {
        let grid = Array1::from_iter(
            (0..n).map(|k| Complex::new(0., (2 * k + 1) as f64 * std::f64::consts::PI / beta)),
        );
        MatsubaraSpace::new(grid).unwrap()
    }

    struct Static(Complex<f64>);

    impl ImpuritySolver for Static {
        fn fit(
            &mut self,
            _matsubara: &MatsubaraSpace,
            _hybridization: ArrayView1<Complex<f64>>,
        ) -> Result<(), crate::SolverError> {
            Ok(())
        }

        fn self_energy(&self, _z: Complex<f64>) -> Complex<f64> {
            self.0
        }
    }

    #[test]
    fn ensemble_samples_one_row_per_impurity() {
        let matsubara = matsubara(40., 6);
        let ensemble = SolverEnsemble::from_solvers(vec![
            Box::new(Static(Complex::new(1., 0.))),
            Box::new(Static(Complex::new(0., -2.))),
        ]);
        let sigma = ensemble.matsubara_self_energies(&matsubara);
        assert_eq!(sigma.shape(), [2, 6]);
        assert!(sigma.row(0).iter().all(|v| *v == Complex::new(1., 0.)));
        assert!(sigma.row(1).iter().all(|v| *v == Complex::new(0., -2.)));
    }

    #[test]
    fn fitting_a_mismatched_block_is_rejected() {
        let matsubara = matsubara(40., 6);
        let mut ensemble = SolverEnsemble::from_solvers(vec![Box::new(Static(Complex::from(0.)))]);
        let delta = Array2::zeros((2, 6));
        assert!(ensemble.fit_all(&matsubara, &delta).is_err());
    }

    #[test]
    fn builder_requires_consistent_slot_counts() {
        let matsubara = matsubara(40., 6);
        let result = SolverEnsembleBuilder::new()
            .with_matsubara(&matsubara)
            .with_interactions(vec![4., 4.])
            .with_occupancies(vec![0.5])
            .with_number_of_baths(4)
            .build();
        assert!(result.is_err());
    }
}
