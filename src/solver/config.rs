//! Solver configuration.

use crate::error::{NodalError, Result};

use super::{
    DEFAULT_CONVERGENCE_TOLERANCE, DEFAULT_DECOMPOSITION_LIMIT, DEFAULT_MIN_LINEARIZATION_POTENTIAL,
    DEFAULT_MINOR_STEP_LIMIT,
};

/// Configuration data for a network solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Network name, used in logs and errors.
    pub name: String,
    /// Sum of absolute node potential changes below which a minor step
    /// counts as converged.
    pub convergence_tolerance: f64,
    /// Lower bound links use when linearizing about a potential.
    pub min_linearization_potential: f64,
    /// Maximum minor steps per major step.
    pub minor_step_limit: u32,
    /// Maximum decompositions per major step.
    pub decomposition_limit: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            name: "network".to_string(),
            convergence_tolerance: DEFAULT_CONVERGENCE_TOLERANCE,
            min_linearization_potential: DEFAULT_MIN_LINEARIZATION_POTENTIAL,
            minor_step_limit: DEFAULT_MINOR_STEP_LIMIT,
            decomposition_limit: DEFAULT_DECOMPOSITION_LIMIT,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the convergence tolerance.
    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    /// Set the minimum linearization potential.
    pub fn with_min_linearization_potential(mut self, potential: f64) -> Self {
        self.min_linearization_potential = potential;
        self
    }

    /// Set the minor step limit.
    pub fn with_minor_step_limit(mut self, limit: u32) -> Self {
        self.minor_step_limit = limit;
        self
    }

    /// Set the decomposition limit.
    ///
    /// A linear network needs 1. Non-linear networks whose links change
    /// admittance every minor step need as many as the minor step limit.
    pub fn with_decomposition_limit(mut self, limit: u32) -> Self {
        self.decomposition_limit = limit;
        self
    }

    /// Check the configuration values.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| Err(NodalError::invalid_config(&self.name, message));

        if !(self.convergence_tolerance.is_finite() && self.convergence_tolerance > 0.0) {
            return fail("convergence tolerance must be a positive number");
        }
        if !(self.min_linearization_potential.is_finite() && self.min_linearization_potential > 0.0) {
            return fail("minimum linearization potential must be a positive number");
        }
        if self.minor_step_limit < 1 {
            return fail("minor step limit must be at least 1");
        }
        if self.decomposition_limit < 1 {
            return fail("decomposition limit must be at least 1");
        }
        Ok(())
    }
}
