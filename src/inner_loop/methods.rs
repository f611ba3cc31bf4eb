use super::{DmftOutcome, DmftState, InnerLoop};
use crate::SolveError;
use ndarray::{s, Array2};
use num_complex::Complex;
use num_traits::Zero;

pub(crate) trait Dmft {
    /// Build the initial hybridization function from a static interaction seed
    /// and an optional self-energy guess, evaluated at the candidate chemical
    /// potential. Resets the iteration counter and the budget.
    fn initialize(
        &mut self,
        seed_interaction: f64,
        sigma_guess: Option<&Array2<Complex<f64>>>,
        mu: f64,
    ) -> Result<DmftState, SolveError>;

    /// Carry out a single self-consistency iteration, returning the
    /// convergence metric
    fn single_iteration(&mut self, state: &mut DmftState) -> Result<f64, SolveError>;

    /// Iterate until the metric falls below tolerance or the budget is
    /// exhausted; either way the final state is handed back to the caller
    fn solve(&mut self, state: DmftState) -> Result<(DmftState, DmftOutcome), SolveError>;
}

impl InnerLoop<'_> {
    /// Update Δ from the lattice: for every impurity, strip its one-site
    /// quantities off the local Green's function diagonal,
    /// `Δ_i(z) = z + μ - ε_i - Σ_i(z) - 1/G_ii(z)`.
    fn lattice_delta(
        &self,
        mu: f64,
        sigma: &Array2<Complex<f64>>,
    ) -> Result<Array2<Complex<f64>>, SolveError> {
        let num_impurities = self.ensemble.len();
        let representatives = self.local_model.equivalence().representatives();
        let mut delta = Array2::zeros((num_impurities, self.matsubara.num_points()));
        for (n, &z) in self.matsubara.frequencies().iter().enumerate() {
            let column = sigma.slice(s![.., n]).to_vec();
            let g = self.local_model.greens_function(z, mu, &column)?;
            for slot in 0..num_impurities {
                let orbital = representatives[slot];
                let g_local = g[(orbital, orbital)];
                if g_local.is_zero() {
                    return Err(SolveError::SingularGreensFunction(z));
                }
                delta[[slot, n]] = z + Complex::from(mu - self.local_model.onsite(slot))
                    - column[slot]
                    - Complex::from(1.) / g_local;
            }
        }
        Ok(delta)
    }

    /// Scan μ shifts within the configured window and keep the one whose total
    /// occupancy lands closest to the target.
    fn adjust_mu(
        &self,
        state: &mut DmftState,
        sigma: &Array2<Complex<f64>>,
    ) -> Result<(), SolveError> {
        let target: f64 = self.occupancy_targets.iter().sum();
        let settings = self.convergence_settings;
        let mut best_miss = f64::INFINITY;
        let mut best_mu = state.mu;
        let mut shift = settings.dmu_min();
        while shift <= settings.dmu_max() + f64::EPSILON {
            let mu = state.base_mu + shift;
            let occupancies = self.local_model.occupancies(self.matsubara, mu, sigma)?;
            let reduced = occupancies.iter().sum::<f64>();
            let miss = (reduced - target).abs();
            if miss < best_miss {
                best_miss = miss;
                best_mu = mu;
            }
            shift += settings.dmu_step();
        }
        state.mu = best_mu;
        Ok(())
    }
}

impl Dmft for InnerLoop<'_> {
    fn initialize(
        &mut self,
        seed_interaction: f64,
        sigma_guess: Option<&Array2<Complex<f64>>>,
        mu: f64,
    ) -> Result<DmftState, SolveError> {
        let num_impurities = self.ensemble.len();
        let num_frequencies = self.matsubara.num_points();
        // the seed enters as its half-filling Hartree shift
        let hartree = Complex::from(0.5 * seed_interaction);
        let mut sigma = match sigma_guess {
            Some(guess) => guess.clone(),
            None => Array2::zeros((num_impurities, num_frequencies)),
        };
        sigma.mapv_inplace(|v| v + hartree);
        let delta = self.lattice_delta(mu, &sigma)?;
        Ok(DmftState {
            iteration: 0,
            budget: self.convergence_settings.maximum_inner_iterations(),
            base_mu: mu,
            mu,
            delta,
        })
    }

    fn single_iteration(&mut self, state: &mut DmftState) -> Result<f64, SolveError> {
        self.ensemble.fit_all(self.matsubara, &state.delta)?;
        let sigma = self.ensemble.matsubara_self_energies(self.matsubara);

        if self.convergence_settings.adjust_mu() {
            self.adjust_mu(state, &sigma)?;
        }

        let delta_new = self.lattice_delta(state.mu, &sigma)?;
        let residual = delta_new
            .iter()
            .zip(state.delta.iter())
            .map(|(new, old)| (new - old).norm())
            .fold(0., f64::max);

        let alpha = self.convergence_settings.mixing();
        state
            .delta
            .zip_mut_with(&delta_new, |old, &new| *old = *old * alpha + new * (1. - alpha));
        state.iteration += 1;
        Ok(residual)
    }

    fn solve(&mut self, mut state: DmftState) -> Result<(DmftState, DmftOutcome), SolveError> {
        let tolerance = self.convergence_settings.tolerance();
        let mut residual = f64::INFINITY;
        while state.iteration < state.budget {
            residual = self.single_iteration(&mut state)?;
            tracing::debug!(
                iteration = state.iteration,
                residual,
                mu = state.mu,
                "dmft iteration"
            );
            if residual < tolerance {
                let iterations = state.iteration;
                return Ok((state, DmftOutcome::Converged { iterations }));
            }
        }
        Ok((state, DmftOutcome::BudgetExhausted { residual }))
    }
}

#[cfg(test)]
mod test {
    use super::{Dmft, DmftOutcome};
    use crate::hybridization::HybridizationTable;
    use crate::impurity::{ImpuritySolver, SolverEnsemble};
    use crate::inner_loop::InnerLoopBuilder;
    use crate::outer_loop::Convergence;
    use crate::self_energy::{EquivalenceIndex, LocalModel};
    use crate::spectral::MatsubaraSpace;
    use ndarray::{Array1, Array2, Array3, ArrayView1};
    use num_complex::Complex;

    fn matsubara(beta: f64, n: usize) -> MatsubaraSpace {
        let grid = Array1::from_iter(
            (0..n).map(|k| Complex::new(0., (2 * k + 1) as f64 * std::f64::consts::PI / beta)),
        );
        MatsubaraSpace::new(grid).unwrap()
    }

    fn flat_table(matsubara: &MatsubaraSpace, num_orbitals: usize) -> HybridizationTable {
        let points = matsubara.frequencies().iter().map(|z| z.im).collect();
        let values = Array3::from_elem(
            (matsubara.num_points(), num_orbitals, num_orbitals),
            Complex::new(0., -0.05),
        );
        HybridizationTable::from_values(points, values).unwrap()
    }

    fn settings(tolerance: f64, inner: usize, outer: usize) -> Convergence {
        Convergence {
            tolerance,
            mixing: 0.,
            maximum_inner_iterations: inner,
            maximum_outer_iterations: outer,
            adjust_mu: false,
            dmu_min: 0.,
            dmu_max: 0.,
            dmu_step: 1.,
        }
    }

    /// Always reports the same self-energy, so the lattice map is stationary
    /// after the first iteration.
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

    /// Flips its self-energy sign on every fit, so Δ oscillates forever.
    struct Oscillating(f64);

    impl ImpuritySolver for Oscillating {
        fn fit(
            &mut self,
            _matsubara: &MatsubaraSpace,
            _hybridization: ArrayView1<Complex<f64>>,
        ) -> Result<(), crate::SolverError> {
            self.0 = -self.0;
            Ok(())
        }
        fn self_energy(&self, _z: Complex<f64>) -> Complex<f64> {
            Complex::from(self.0)
        }
    }

    #[test]
    fn stationary_solver_converges_within_budget() {
        let matsubara = matsubara(40., 12);
        let table = flat_table(&matsubara, 2);
        let model = LocalModel::new(
            Array2::from_diag_elem(2, -0.1),
            &[0.5, 0.5],
            4.,
            &table,
            EquivalenceIndex::identity(2),
        )
        .unwrap();
        let settings = settings(1e-8, 10, 100);
        let mut ensemble = SolverEnsemble::from_solvers(vec![
            Box::new(Static(Complex::from(0.2))),
            Box::new(Static(Complex::from(0.2))),
        ]);
        let targets = [0.5, 0.5];
        let mut inner = InnerLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_solver_ensemble(&mut ensemble)
            .with_occupancy_targets(targets.as_slice())
            .build();

        let state = inner.initialize(4., None, 0.).unwrap();
        let (state, outcome) = inner.solve(state).unwrap();
        match outcome {
            DmftOutcome::Converged { iterations } => {
                assert!(iterations <= 10);
                assert_eq!(state.iteration, iterations);
            }
            other => panic!("expected convergence, got {:?}", other),
        }
    }

    #[test]
    fn oscillating_solver_exhausts_the_budget() {
        let matsubara = matsubara(40., 12);
        let table = flat_table(&matsubara, 1);
        let model = LocalModel::new(
            Array2::from_diag_elem(1, 0.),
            &[0.5],
            4.,
            &table,
            EquivalenceIndex::identity(1),
        )
        .unwrap();
        let settings = settings(1e-8, 5, 100);
        let mut ensemble = SolverEnsemble::from_solvers(vec![Box::new(Oscillating(1.))]);
        let targets = [0.5];
        let mut inner = InnerLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_solver_ensemble(&mut ensemble)
            .with_occupancy_targets(targets.as_slice())
            .build();

        let state = inner.initialize(4., None, 0.).unwrap();
        let (state, outcome) = inner.solve(state).unwrap();
        assert_eq!(state.iteration, 5);
        match outcome {
            DmftOutcome::BudgetExhausted { residual } => assert!(residual > 1e-8),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn adaptive_scan_selects_the_occupancy_matching_shift() {
        let matsubara = matsubara(40., 64);
        // decoupled level at +0.5, so the occupancy hits its 1/2 target
        // exactly when mu lands on the level
        let points = matsubara.frequencies().iter().map(|z| z.im).collect();
        let table = HybridizationTable::from_values(
            points,
            Array3::zeros((matsubara.num_points(), 1, 1)),
        )
        .unwrap();
        let model = LocalModel::new(
            Array2::from_diag_elem(1, 0.5),
            &[0.5],
            0.,
            &table,
            EquivalenceIndex::identity(1),
        )
        .unwrap();
        let settings = Convergence {
            tolerance: 1e-8,
            mixing: 0.,
            maximum_inner_iterations: 5,
            maximum_outer_iterations: 50,
            adjust_mu: true,
            dmu_min: 0.,
            dmu_max: 1.,
            dmu_step: 0.25,
        };
        let mut ensemble = SolverEnsemble::from_solvers(vec![Box::new(Static(Complex::from(0.)))]);
        let targets = [0.5];
        let mut inner = InnerLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_solver_ensemble(&mut ensemble)
            .with_occupancy_targets(targets.as_slice())
            .build();

        let mut state = inner.initialize(0., None, 0.).unwrap();
        inner.single_iteration(&mut state).unwrap();

        // candidates are {0, 0.25, 0.5, 0.75, 1.0}; only the 0.5 shift puts
        // mu on the level
        approx::assert_relative_eq!(state.mu, 0.5);
        let sigma = Array2::zeros((1, matsubara.num_points()));
        let occupancies = model.occupancies(&matsubara, state.mu, &sigma).unwrap();
        approx::assert_abs_diff_eq!(occupancies[0], 0.5, epsilon = 2e-2);
    }

    #[test]
    fn initialize_resets_the_counter_and_budget() {
        let matsubara = matsubara(40., 8);
        let table = flat_table(&matsubara, 1);
        let model = LocalModel::new(
            Array2::from_diag_elem(1, 0.),
            &[0.5],
            4.,
            &table,
            EquivalenceIndex::identity(1),
        )
        .unwrap();
        let settings = settings(1e-1, 7, 70);
        let mut ensemble = SolverEnsemble::from_solvers(vec![Box::new(Static(Complex::from(0.)))]);
        let targets = [0.5];
        let mut inner = InnerLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_solver_ensemble(&mut ensemble)
            .with_occupancy_targets(targets.as_slice())
            .build();

        let state = inner.initialize(4., None, 0.3).unwrap();
        assert_eq!(state.iteration, 0);
        assert_eq!(state.budget, 7);
        approx::assert_relative_eq!(state.mu, 0.3);
        approx::assert_relative_eq!(state.base_mu, 0.3);
        assert_eq!(state.delta.shape(), [1, 8]);
    }
}
