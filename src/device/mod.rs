//! The device atomic structure the upstream DFT stage worked on. The sweep
//! only uses it to restrict attention to the scattering region and to the
//! chemically active species; the orbital count itself is fixed by the
//! occupancy vector handed over alongside.

use crate::BuildError;
use color_eyre::eyre::eyre;
use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;

/// One atom of the device structure
#[derive(Debug, Clone, Deserialize)]
pub struct Atom {
    /// Chemical symbol
    pub symbol: String,
    /// Cartesian position in Angstrom
    pub position: [f64; 3],
}

/// The device atomic structure
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    /// All atoms, in the order the DFT stage indexed them
    pub atoms: Vec<Atom>,
}

impl Device {
    /// Deserialize the structure from a TOML description
    pub fn build(path: PathBuf) -> color_eyre::Result<Self> {
        let s = Config::builder().add_source(File::from(path)).build()?;
        s.try_deserialize()
            .map_err(|e| eyre!("Failed to deserialize device: {:?}", e))
    }

    /// Keep only the atoms inside the scattering region
    pub fn restrict(&self, scattering_region: &[usize]) -> Result<Device, BuildError> {
        let atoms = scattering_region
            .iter()
            .map(|&index| {
                self.atoms.get(index).cloned().ok_or_else(|| {
                    BuildError::Configuration(format!(
                        "scattering region index {} out of range for {} atoms",
                        index,
                        self.atoms.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Device { atoms })
    }

    /// Indices of the atoms whose species is chemically active
    pub fn active_indices(&self, species: &[String]) -> Vec<usize> {
        self.atoms
            .iter()
            .enumerate()
            .filter(|(_, atom)| species.contains(&atom.symbol))
            .map(|(index, _)| index)
            .collect()
    }
}
