//! The local lattice model: the double-counting-corrected Hamiltonian block,
//! the orbital equivalence index, and the local Green's function the DMFT
//! engine closes its self-consistency against. Also assembles the physical
//! self-energy handed on to the transmission stage.

use crate::{
    hybridization::HybridizationTable,
    impurity::SolverEnsemble,
    spectral::{EnergySpace, MatsubaraSpace},
    BuildError, SolveError,
};
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2};
use num_complex::Complex;

/// Maps the `L` physical orbitals onto their inequivalent impurity
/// representatives and back.
///
/// `representatives[j]` is the orbital standing for impurity slot `j`;
/// `inverse[i]` is the slot orbital `i` draws its self-energy from. Together
/// they form a surjection from orbitals onto slots, so expanding a
/// per-impurity quantity to all orbitals and reducing it back is lossless.
#[derive(Debug, Clone)]
pub struct EquivalenceIndex {
    representatives: Vec<usize>,
    inverse: Vec<usize>,
}

impl EquivalenceIndex {
    /// The trivial index: every orbital is its own representative
    pub fn identity(num_orbitals: usize) -> Self {
        Self {
            representatives: (0..num_orbitals).collect(),
            inverse: (0..num_orbitals).collect(),
        }
    }

    /// Build from explicit maps, validating that they form a surjection
    pub fn new(representatives: Vec<usize>, inverse: Vec<usize>) -> Result<Self, BuildError> {
        let num_impurities = representatives.len();
        let num_orbitals = inverse.len();
        if num_impurities == 0 || num_orbitals < num_impurities {
            return Err(BuildError::Index(format!(
                "{} impurity slots for {} orbitals",
                num_impurities, num_orbitals
            )));
        }
        if let Some(&slot) = inverse.iter().find(|&&slot| slot >= num_impurities) {
            return Err(BuildError::Index(format!(
                "orbital mapped to slot {} but only {} slots exist",
                slot, num_impurities
            )));
        }
        let mut hit = vec![false; num_impurities];
        for &slot in &inverse {
            hit[slot] = true;
        }
        if hit.iter().any(|covered| !covered) {
            return Err(BuildError::Index(
                "equivalence index must map onto every impurity slot".into(),
            ));
        }
        for (slot, &orbital) in representatives.iter().enumerate() {
            if orbital >= num_orbitals {
                return Err(BuildError::Index(format!(
                    "representative orbital {} out of range for {} orbitals",
                    orbital, num_orbitals
                )));
            }
            if inverse[orbital] != slot {
                return Err(BuildError::Index(format!(
                    "representative of slot {} does not map back to its own slot",
                    slot
                )));
            }
        }
        Ok(Self {
            representatives,
            inverse,
        })
    }

    /// Number of inequivalent impurities
    pub fn num_impurities(&self) -> usize {
        self.representatives.len()
    }

    /// Number of physical orbitals `L`
    pub fn num_orbitals(&self) -> usize {
        self.inverse.len()
    }

    /// The representative orbital for each impurity slot
    pub fn representatives(&self) -> &[usize] {
        &self.representatives
    }

    /// Gather one value per impurity out to all `L` orbitals
    pub fn expand<T: Copy>(&self, per_impurity: &[T]) -> Vec<T> {
        self.inverse.iter().map(|&slot| per_impurity[slot]).collect()
    }

    /// Gather one value per orbital back down to the representatives
    pub fn reduce<T: Copy>(&self, per_orbital: &[T]) -> Vec<T> {
        self.representatives
            .iter()
            .map(|&orbital| per_orbital[orbital])
            .collect()
    }
}

/// The `gfloc` analogue: the static lattice block seen by the DMFT engine.
///
/// Owns `H - DC` (the double-counting-corrected Hamiltonian, real part only),
/// an implicit identity overlap, the tabulated hybridization, and the
/// equivalence index. The chemical potential is not stored here; callers
/// thread it through every evaluation explicitly.
pub struct LocalModel<'a> {
    hamiltonian: Array2<f64>,
    double_counting: Array1<f64>,
    hybridization: &'a HybridizationTable,
    equivalence: EquivalenceIndex,
}

impl<'a> LocalModel<'a> {
    /// Assemble the corrected lattice block.
    ///
    /// The double counting is the static mean-field part of the interaction,
    /// `DC_ii = U * (n_i - 1/2)`, seeded by the per-orbital occupancies.
    pub fn new(
        hamiltonian: Array2<f64>,
        occupancies: &[f64],
        interaction: f64,
        hybridization: &'a HybridizationTable,
        equivalence: EquivalenceIndex,
    ) -> Result<Self, BuildError> {
        let l = equivalence.num_orbitals();
        if hamiltonian.shape() != [l, l] {
            return Err(BuildError::Configuration(format!(
                "hamiltonian block is {:?}, expected [{}, {}]",
                hamiltonian.shape(),
                l,
                l
            )));
        }
        if occupancies.len() != l || hybridization.num_orbitals() != l {
            return Err(BuildError::Configuration(format!(
                "{} occupancies and {} hybridized orbitals for {} orbitals",
                occupancies.len(),
                hybridization.num_orbitals(),
                l
            )));
        }
        let double_counting =
            Array1::from_iter(occupancies.iter().map(|n| interaction * (n - 0.5)));
        let mut hamiltonian = hamiltonian;
        for i in 0..l {
            hamiltonian[[i, i]] -= double_counting[i];
        }
        Ok(Self {
            hamiltonian,
            double_counting,
            hybridization,
            equivalence,
        })
    }

    /// Number of physical orbitals `L`
    pub fn num_orbitals(&self) -> usize {
        self.equivalence.num_orbitals()
    }

    /// The orbital equivalence index
    pub fn equivalence(&self) -> &EquivalenceIndex {
        &self.equivalence
    }

    /// On-site energy of the representative orbital of impurity `slot`,
    /// double counting included
    pub fn onsite(&self, slot: usize) -> f64 {
        let orbital = self.equivalence.representatives[slot];
        self.hamiltonian[[orbital, orbital]]
    }

    /// The diagonal double-counting correction
    pub fn double_counting(&self) -> &Array1<f64> {
        &self.double_counting
    }

    /// The local lattice Green's function at frequency `z`,
    /// `G(z) = [(z + mu) I - (H - DC) - Delta(z) - diag(Sigma)]^{-1}`,
    /// with the per-impurity self-energy expanded out to all orbitals.
    pub fn greens_function(
        &self,
        z: Complex<f64>,
        mu: f64,
        sigma: &[Complex<f64>],
    ) -> Result<DMatrix<Complex<f64>>, SolveError> {
        let l = self.num_orbitals();
        let delta = self.hybridization.sample(z);
        let expanded = self.equivalence.expand(sigma);
        let matrix = DMatrix::from_fn(l, l, |i, j| {
            let mut value = -Complex::from(self.hamiltonian[[i, j]]) - delta[[i, j]];
            if i == j {
                value += z + Complex::from(mu) - expanded[i];
            }
            value
        });
        matrix
            .try_inverse()
            .ok_or(SolveError::SingularGreensFunction(z))
    }

    /// Per-impurity occupancies from the Matsubara sum over the local
    /// Green's function, `n = 1/2 + (2/beta) sum_n Re G(i w_n)`.
    pub fn occupancies(
        &self,
        matsubara: &MatsubaraSpace,
        mu: f64,
        sigma: &Array2<Complex<f64>>,
    ) -> Result<Vec<f64>, SolveError> {
        let num_impurities = self.equivalence.num_impurities();
        let mut sums = vec![0.; num_impurities];
        for (n, &z) in matsubara.frequencies().iter().enumerate() {
            let column = sigma.slice(s![.., n]).to_vec();
            let g = self.greens_function(z, mu, &column)?;
            for (slot, &orbital) in self.equivalence.representatives.iter().enumerate() {
                sums[slot] += g[(orbital, orbital)].re;
            }
        }
        Ok(sums
            .into_iter()
            .map(|s| 0.5 + 2. / matsubara.beta() * s)
            .collect())
    }

    /// The physical self-energy handed to the transmission stage, sampled on
    /// the real-axis grid: `Sigma_i(E) = -DC_ii - mu + Sigma_model(E)` with the
    /// per-impurity model self-energy gathered by the equivalence index.
    /// Returned in diagonal representation, one row per orbital.
    pub fn physical_self_energy(
        &self,
        energies: &EnergySpace,
        mu: f64,
        ensemble: &SolverEnsemble,
    ) -> Array2<Complex<f64>> {
        let l = self.num_orbitals();
        let mut out = Array2::zeros((l, energies.num_points()));
        for (n, energy) in energies.points().enumerate() {
            let model = ensemble.self_energies(Complex::from(energy));
            let expanded = self.equivalence.expand(&model);
            for i in 0..l {
                out[[i, n]] = expanded[i] - Complex::from(self.double_counting[i] + mu);
            }
        }
        out
    }
}
