use color_eyre::eyre::eyre;
use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;

/// The full run description, deserialized from the TOML file named on the
/// command line.
#[derive(Debug, Deserialize)]
pub(crate) struct Configuration {
    pub(crate) dmft: DmftConfiguration,
    pub(crate) sweep: SweepConfiguration,
    pub(crate) data: DataConfiguration,
    #[serde(default)]
    pub(crate) output: OutputConfiguration,
}

/// Solver and convergence parameters
#[derive(Debug, Deserialize)]
pub(crate) struct DmftConfiguration {
    /// On-site interaction strength U
    pub(crate) interaction: f64,
    /// Bath sites per impurity solver
    pub(crate) number_of_baths: usize,
    /// Convergence tolerance on the change in the hybridization function
    pub(crate) tolerance: f64,
    /// Mixing parameter damping the Δ update
    pub(crate) alpha: f64,
    /// Search for the chemical potential matching the target occupancy
    #[serde(default)]
    pub(crate) adjust_mu: bool,
    /// Iteration budget of a single solve call
    pub(crate) maximum_inner_iterations: usize,
    /// Absolute iteration ceiling across retries of one grid point
    pub(crate) maximum_outer_iterations: usize,
}

/// The chemical-potential window walked by the sweep
#[derive(Debug, Deserialize)]
pub(crate) struct SweepConfiguration {
    pub(crate) dmu_min: f64,
    pub(crate) dmu_max: f64,
    pub(crate) dmu_step: f64,
}

/// Paths to the arrays produced by the upstream pipeline stages
#[derive(Debug, Deserialize)]
pub(crate) struct DataConfiguration {
    /// TOML device structure
    pub(crate) device: PathBuf,
    /// `.npy` of scattering-region atom indices
    pub(crate) scattering_region: PathBuf,
    /// Chemically active species symbols
    pub(crate) active_species: Vec<String>,
    /// `.npy` real-axis energy grid
    pub(crate) energies: PathBuf,
    /// `.npy` Matsubara frequency grid
    pub(crate) matsubara_energies: PathBuf,
    /// `.npy` flat Matsubara hybridization buffer
    pub(crate) matsubara_hybridization: PathBuf,
    /// `.npy` Hamiltonian block of the active orbitals
    pub(crate) hamiltonian: PathBuf,
    /// `.npy` per-orbital occupancies
    pub(crate) occupancies: PathBuf,
    /// Plain-text chemical potential from an earlier adaptive run; zero when
    /// absent
    #[serde(default)]
    pub(crate) mu: Option<PathBuf>,
}

/// Artifact destinations, with the conventional defaults of the pipeline
#[derive(Debug, Deserialize)]
pub(crate) struct OutputConfiguration {
    #[serde(default = "default_delta_directory")]
    pub(crate) delta_directory: PathBuf,
    #[serde(default = "default_sigma_directory")]
    pub(crate) sigma_directory: PathBuf,
    #[serde(default = "default_mu_file")]
    pub(crate) mu_file: PathBuf,
}

fn default_delta_directory() -> PathBuf {
    PathBuf::from("delta_folder")
}

fn default_sigma_directory() -> PathBuf {
    PathBuf::from("sigma_folder")
}

fn default_mu_file() -> PathBuf {
    PathBuf::from("mu.txt")
}

impl Default for OutputConfiguration {
    fn default() -> Self {
        Self {
            delta_directory: default_delta_directory(),
            sigma_directory: default_sigma_directory(),
            mu_file: default_mu_file(),
        }
    }
}

impl Configuration {
    pub(crate) fn build(path: PathBuf) -> color_eyre::Result<Self> {
        let s = Config::builder().add_source(File::from(path)).build()?;
        s.try_deserialize()
            .map_err(|e| eyre!("Failed to deserialize the run configuration: {:?}", e))
    }
}
