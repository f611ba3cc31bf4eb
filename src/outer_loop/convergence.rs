use crate::BuildError;

/// Convergence and sweep-window settings shared by the outer loop and the
/// DMFT engines it spawns.
pub(crate) struct Convergence {
    pub(crate) tolerance: f64,
    pub(crate) mixing: f64,
    pub(crate) maximum_inner_iterations: usize,
    pub(crate) maximum_outer_iterations: usize,
    pub(crate) adjust_mu: bool,
    pub(crate) dmu_min: f64,
    pub(crate) dmu_max: f64,
    pub(crate) dmu_step: f64,
}

impl Convergence {
    pub(crate) fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub(crate) fn mixing(&self) -> f64 {
        self.mixing
    }

    pub(crate) fn maximum_inner_iterations(&self) -> usize {
        self.maximum_inner_iterations
    }

    pub(crate) fn maximum_outer_iterations(&self) -> usize {
        self.maximum_outer_iterations
    }

    pub(crate) fn adjust_mu(&self) -> bool {
        self.adjust_mu
    }

    pub(crate) fn dmu_min(&self) -> f64 {
        self.dmu_min
    }

    pub(crate) fn dmu_max(&self) -> f64 {
        self.dmu_max
    }

    pub(crate) fn dmu_step(&self) -> f64 {
        self.dmu_step
    }

    /// Reject inconsistent settings before any solver work begins
    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if self.maximum_outer_iterations < self.maximum_inner_iterations {
            return Err(BuildError::Configuration(
                "absolute maximum iterations must be greater than internal DMFT maximum iterations"
                    .into(),
            ));
        }
        if self.dmu_step <= 0. {
            return Err(BuildError::Configuration(format!(
                "chemical potential step must be positive, got {}",
                self.dmu_step
            )));
        }
        if self.dmu_max < self.dmu_min {
            return Err(BuildError::Configuration(format!(
                "chemical potential window [{}, {}] is empty",
                self.dmu_min, self.dmu_max
            )));
        }
        Ok(())
    }

    /// Number of equally spaced grid points spanning the sweep window
    pub(crate) fn number_of_steps(&self) -> usize {
        ((self.dmu_max - self.dmu_min) / self.dmu_step).round() as usize + 1
    }

    /// The chemical-potential offsets visited by the sweep
    pub(crate) fn offsets(&self) -> Vec<f64> {
        let steps = self.number_of_steps();
        if steps == 1 {
            return vec![self.dmu_min];
        }
        let spacing = (self.dmu_max - self.dmu_min) / (steps - 1) as f64;
        (0..steps).map(|k| self.dmu_min + k as f64 * spacing).collect()
    }
}
