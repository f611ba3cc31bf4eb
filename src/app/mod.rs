//! The command line interface and the wiring from a run configuration to a
//! finished chemical-potential sweep.

mod configuration;
mod telemetry;
pub(crate) use configuration::Configuration;

use crate::{
    device::Device,
    hybridization::HybridizationTable,
    impurity::SolverEnsembleBuilder,
    outer_loop::{Convergence, OuterLoopBuilder, OutputLayout, Sweep, SweepStatus},
    self_energy::{EquivalenceIndex, LocalModel},
    spectral::{EnergySpace, MatsubaraSpace},
};
use clap::{ArgEnum, Parser};
use color_eyre::eyre::eyre;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use num_complex::Complex;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct App {
    file_path: Option<PathBuf>,
    #[clap(arg_enum, short, long, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ArgEnum)]
enum LogLevel {
    Trace,
    Info,
    Debug,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
        };
        write!(f, "{}", level)
    }
}

/// Entry point: parse the command line, initialise telemetry, load the run
/// configuration and drive the sweep to completion.
pub fn run() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = App::parse();

    let (subscriber, _guard) = telemetry::get_subscriber(cli.log_level);
    telemetry::init_subscriber(subscriber);

    let path = cli
        .file_path
        .ok_or(eyre!("A configuration file path needs to be passed."))?;
    let configuration = Configuration::build(path)?;

    build_and_run(configuration)
}

fn build_and_run(configuration: Configuration) -> color_eyre::Result<()> {
    let data = &configuration.data;

    let device = Device::build(data.device.clone())?;
    let scattering_region: Array1<i64> = ndarray_npy::read_npy(&data.scattering_region)?;
    let scattering_region: Vec<usize> = scattering_region.iter().map(|&i| i as usize).collect();
    let device = device.restrict(&scattering_region)?;
    let active = device.active_indices(&data.active_species);
    tracing::info!(
        "{} scattering-region atoms, {} chemically active ({})",
        scattering_region.len(),
        active.len(),
        data.active_species.iter().join(", ")
    );

    let energies: Array1<f64> = ndarray_npy::read_npy(&data.energies)?;
    let matsubara_energies: Array1<Complex<f64>> = ndarray_npy::read_npy(&data.matsubara_energies)?;
    let flat_hybridization: Array1<Complex<f64>> =
        ndarray_npy::read_npy(&data.matsubara_hybridization)?;
    let hamiltonian: Array2<Complex<f64>> = ndarray_npy::read_npy(&data.hamiltonian)?;
    let hamiltonian = hamiltonian.mapv(|z| z.re);
    let occupancies: Array1<f64> = ndarray_npy::read_npy(&data.occupancies)?;

    let base_mu = match &data.mu {
        Some(path) => std::fs::read_to_string(path)?
            .trim()
            .parse::<f64>()
            .map_err(|e| eyre!("failed to parse the chemical potential file: {}", e))?,
        None => 0.,
    };

    let num_orbitals = occupancies.len();
    let energies = EnergySpace::new(energies)?;
    let matsubara = MatsubaraSpace::new(matsubara_energies)?;
    tracing::info!(
        "{} correlated orbitals on a {}-point Matsubara grid at beta = {}",
        num_orbitals,
        matsubara.num_points(),
        matsubara.beta()
    );

    let hybridization = HybridizationTable::from_flat(&matsubara, flat_hybridization, num_orbitals)?;
    let equivalence = EquivalenceIndex::identity(num_orbitals);
    let occupancy_slice: Vec<f64> = occupancies.to_vec();
    let model = LocalModel::new(
        hamiltonian,
        &occupancy_slice,
        configuration.dmft.interaction,
        &hybridization,
        equivalence,
    )?;

    let num_impurities = model.equivalence().num_impurities();
    let occupancy_targets = model.equivalence().reduce(&occupancy_slice);
    let ensemble = SolverEnsembleBuilder::new()
        .with_matsubara(&matsubara)
        .with_interactions(vec![configuration.dmft.interaction; num_impurities])
        .with_occupancies(occupancy_targets.clone())
        .with_number_of_baths(configuration.dmft.number_of_baths)
        .build()?;

    let convergence = Convergence {
        tolerance: configuration.dmft.tolerance,
        mixing: configuration.dmft.alpha,
        maximum_inner_iterations: configuration.dmft.maximum_inner_iterations,
        maximum_outer_iterations: configuration.dmft.maximum_outer_iterations,
        adjust_mu: configuration.dmft.adjust_mu,
        dmu_min: configuration.sweep.dmu_min,
        dmu_max: configuration.sweep.dmu_max,
        dmu_step: configuration.sweep.dmu_step,
    };

    let mut outer_loop = OuterLoopBuilder::new()
        .with_convergence_settings(&convergence)
        .with_local_model(&model)
        .with_matsubara(&matsubara)
        .with_energies(&energies)
        .with_solver_ensemble(ensemble)
        .with_occupancy_targets(occupancy_targets)
        .with_base_mu(base_mu)
        .with_seed_interaction(configuration.dmft.interaction)
        .with_output(OutputLayout {
            delta_directory: configuration.output.delta_directory.clone(),
            sigma_directory: configuration.output.sigma_directory.clone(),
            mu_file: configuration.output.mu_file.clone(),
        })
        .build()?;

    let report = outer_loop.run_sweep()?;
    for point in &report.points {
        match point.status {
            SweepStatus::Converged => tracing::info!(
                "offset {}: converged in {} iterations",
                point.key.label(),
                point.iterations
            ),
            SweepStatus::Exhausted => tracing::warn!(
                "offset {}: iteration ceiling reached after {} iterations",
                point.key.label(),
                point.iterations
            ),
        }
    }
    if report.all_converged() {
        tracing::info!("sweep complete, all grid points converged");
    } else {
        tracing::warn!("sweep complete with unconverged grid points");
    }

    Ok(())
}
