use super::{GridKey, GridPointReport, OuterLoop, OuterLoopError, SweepReport, SweepStatus};
use crate::{
    inner_loop::{Dmft, DmftOutcome, InnerLoopBuilder},
    postprocessor, IOError,
};

pub(crate) trait Sweep {
    /// Walk the chemical-potential grid, solve each point to convergence or
    /// exhaustion, and persist its artifacts
    fn run_sweep(&mut self) -> Result<SweepReport, OuterLoopError>;
}

impl Sweep for OuterLoop<'_> {
    fn run_sweep(&mut self) -> Result<SweepReport, OuterLoopError> {
        self.convergence_settings.validate()?;

        std::fs::create_dir_all(&self.output.delta_directory).map_err(IOError::from)?;
        std::fs::create_dir_all(&self.output.sigma_directory).map_err(IOError::from)?;

        let mut report = SweepReport::default();
        let mut final_mu = self.base_mu;

        for offset in self.convergence_settings.offsets() {
            let key = GridKey::from_offset(offset);
            let candidate_mu = self.base_mu + offset;
            tracing::info!(dmu = offset, mu = candidate_mu, "starting grid point");

            let (state, status) = {
                let mut inner = InnerLoopBuilder::new()
                    .with_convergence_settings(self.convergence_settings)
                    .with_local_model(self.local_model)
                    .with_matsubara(self.matsubara)
                    .with_solver_ensemble(&mut self.ensemble)
                    .with_occupancy_targets(self.occupancy_targets.as_slice())
                    .build();

                let mut state =
                    inner.initialize(self.seed_interaction, None, candidate_mu)?;
                loop {
                    if state.iteration > 0 {
                        tracing::info!("restarting");
                    }
                    let (next, outcome) = inner.solve(state)?;
                    state = next;
                    match outcome {
                        DmftOutcome::Converged { iterations } => {
                            tracing::info!(dmu = offset, iterations, "converged");
                            break (state, SweepStatus::Converged);
                        }
                        DmftOutcome::BudgetExhausted { residual } => {
                            if state.iteration
                                >= self.convergence_settings.maximum_outer_iterations()
                            {
                                tracing::warn!(
                                    dmu = offset,
                                    residual,
                                    "iteration ceiling reached, persisting stale state"
                                );
                                break (state, SweepStatus::Exhausted);
                            }
                            tracing::info!(residual, "not converged, extending budget");
                            state.budget +=
                                self.convergence_settings.maximum_inner_iterations();
                        }
                    }
                }
            };

            postprocessor::write_delta(&self.output.delta_directory, &key, &state.delta)?;

            let sigma_diagonal =
                self.local_model
                    .physical_self_energy(self.energies, state.mu, &self.ensemble);
            let sigma = postprocessor::embed_diagonal(sigma_diagonal.view());
            postprocessor::write_sigma(&self.output.sigma_directory, &key, &sigma)?;

            final_mu = state.mu;
            report.points.push(GridPointReport {
                key,
                status,
                iterations: state.iteration,
            });
        }

        if self.convergence_settings.adjust_mu() {
            postprocessor::write_mu(&self.output.mu_file, final_mu)?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::Sweep;
    use crate::hybridization::HybridizationTable;
    use crate::impurity::{ImpuritySolver, SolverEnsemble};
    use crate::outer_loop::{Convergence, OuterLoopBuilder, OutputLayout, SweepStatus};
    use crate::self_energy::{EquivalenceIndex, LocalModel};
    use crate::spectral::{EnergySpace, MatsubaraSpace};
    use ndarray::{Array1, Array2, Array3, ArrayView1};
    use num_complex::Complex;
    use std::path::Path;

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

    fn settings(inner: usize, outer: usize) -> Convergence {
        Convergence {
            tolerance: 1e-8,
            mixing: 0.,
            maximum_inner_iterations: inner,
            maximum_outer_iterations: outer,
            adjust_mu: false,
            dmu_min: 0.,
            dmu_max: 0.9,
            dmu_step: 1.,
        }
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

    fn artifact_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout {
            delta_directory: root.join("delta_folder"),
            sigma_directory: root.join("sigma_folder"),
            mu_file: root.join("mu.txt"),
        }
    }

    #[test]
    fn reference_sweep_persists_two_artifacts_per_folder() {
        let scratch = tempfile::tempdir().unwrap();
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
        let energies = EnergySpace::new(Array1::linspace(-2., 2., 11)).unwrap();
        let settings = settings(10, 1000);
        let ensemble = SolverEnsemble::from_solvers(vec![
            Box::new(Static(Complex::from(0.2))),
            Box::new(Static(Complex::from(0.2))),
        ]);
        let mut outer = OuterLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_energies(&energies)
            .with_solver_ensemble(ensemble)
            .with_occupancy_targets(vec![0.5, 0.5])
            .with_base_mu(0.)
            .with_seed_interaction(4.)
            .with_output(layout(scratch.path()))
            .build()
            .unwrap();

        let report = outer.run_sweep().unwrap();

        assert_eq!(report.points.len(), 2);
        assert!(report.all_converged());
        assert_eq!(
            artifact_names(&scratch.path().join("delta_folder")),
            vec!["dmu_0.0000.npy", "dmu_0.9000.npy"]
        );
        assert_eq!(
            artifact_names(&scratch.path().join("sigma_folder")),
            vec!["dmu_0.0000.npy", "dmu_0.9000.npy"]
        );
        // fixed-mu mode never writes the converged chemical potential
        assert!(!scratch.path().join("mu.txt").exists());
    }

    #[test]
    fn exhausted_grid_points_still_persist_artifacts() {
        let scratch = tempfile::tempdir().unwrap();
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
        let energies = EnergySpace::new(Array1::linspace(-1., 1., 5)).unwrap();
        let mut settings = settings(3, 9);
        settings.dmu_max = 0.;
        let ensemble = SolverEnsemble::from_solvers(vec![Box::new(Oscillating(1.))]);
        let mut outer = OuterLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_energies(&energies)
            .with_solver_ensemble(ensemble)
            .with_occupancy_targets(vec![0.5])
            .with_base_mu(0.)
            .with_seed_interaction(4.)
            .with_output(layout(scratch.path()))
            .build()
            .unwrap();

        let report = outer.run_sweep().unwrap();

        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points[0].status, SweepStatus::Exhausted);
        assert_eq!(report.points[0].iterations, 9);
        assert!(!report.all_converged());
        // stale output is persisted, flagged only through the report
        assert_eq!(
            artifact_names(&scratch.path().join("delta_folder")),
            vec!["dmu_0.0000.npy"]
        );
        assert_eq!(
            artifact_names(&scratch.path().join("sigma_folder")),
            vec!["dmu_0.0000.npy"]
        );
    }

    #[test]
    fn adaptive_mode_writes_the_final_chemical_potential() {
        let scratch = tempfile::tempdir().unwrap();
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
        let energies = EnergySpace::new(Array1::linspace(-1., 1., 5)).unwrap();
        let mut settings = settings(10, 1000);
        settings.adjust_mu = true;
        settings.dmu_max = 0.;
        let ensemble = SolverEnsemble::from_solvers(vec![Box::new(Static(Complex::from(0.1)))]);
        let mut outer = OuterLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_energies(&energies)
            .with_solver_ensemble(ensemble)
            .with_occupancy_targets(vec![0.5])
            .with_base_mu(0.2)
            .with_seed_interaction(4.)
            .with_output(layout(scratch.path()))
            .build()
            .unwrap();

        outer.run_sweep().unwrap();

        let written = std::fs::read_to_string(scratch.path().join("mu.txt")).unwrap();
        let mu: f64 = written.trim().parse().unwrap();
        assert!(mu.is_finite());
    }

    #[test]
    fn invalid_ceilings_abort_before_any_output() {
        let scratch = tempfile::tempdir().unwrap();
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
        let energies = EnergySpace::new(Array1::linspace(-1., 1., 5)).unwrap();
        let settings = settings(10, 5);
        let ensemble = SolverEnsemble::from_solvers(vec![Box::new(Static(Complex::from(0.)))]);
        let mut outer = OuterLoopBuilder::new()
            .with_convergence_settings(&settings)
            .with_local_model(&model)
            .with_matsubara(&matsubara)
            .with_energies(&energies)
            .with_solver_ensemble(ensemble)
            .with_occupancy_targets(vec![0.5])
            .with_base_mu(0.)
            .with_seed_interaction(4.)
            .with_output(layout(scratch.path()))
            .build()
            .unwrap();

        assert!(outer.run_sweep().is_err());
        assert!(!scratch.path().join("delta_folder").exists());
        assert!(!scratch.path().join("sigma_folder").exists());
    }
}
