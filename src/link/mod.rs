//! The link contribution contract.
//!
//! A link is any network element that contributes equations to the system.
//! Each link exposes a small `ports x ports` admittance sub-matrix, a
//! `ports`-long source sub-vector and a node map translating its local ports
//! to global [`NodeId`]s. The solver sums these contributions into the global
//! system, solves it and hands the potentials back through read-only
//! [`Potentials`] views.
//!
//! Links only ever write their own contribution slices, so assembly never
//! needs synchronization between links.

use std::fmt;

use crate::network::NodeId;

/// A link's verdict on a minor-step solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolutionResult {
    /// The solution is acceptable
    #[default]
    Confirm,
    /// The link's operating point assumption was wrong; roll back and retry
    Reject,
    /// Undecided, keep iterating without rolling back
    Delay,
}

impl fmt::Display for SolutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolutionResult::Confirm => write!(f, "CONFIRM"),
            SolutionResult::Reject => write!(f, "REJECT"),
            SolutionResult::Delay => write!(f, "DELAY"),
        }
    }
}

/// Read-only view of the network potentials, ground included.
#[derive(Debug, Clone, Copy)]
pub struct Potentials<'a> {
    values: &'a [f64],
    ground: f64,
}

impl<'a> Potentials<'a> {
    pub fn new(values: &'a [f64], ground: f64) -> Self {
        Self { values, ground }
    }

    /// Potential at a node. Ground and unknown nodes read the ground potential.
    pub fn at(&self, node: NodeId) -> f64 {
        node.index()
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or(self.ground)
    }

    /// Potential drop from `from` to `to`.
    pub fn across(&self, from: NodeId, to: NodeId) -> f64 {
        self.at(from) - self.at(to)
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.values
    }
}

/// Everything a link sees while it updates its contributions.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Major step time step
    pub dt: f64,
    /// 1-based minor step within the current major step
    pub minor_step: u32,
    /// Lower bound links should use when linearizing about a potential
    pub min_linearization_potential: f64,
    /// Potentials from the previous minor step (or major step)
    pub potentials: Potentials<'a>,
}

/// A network element contributing to `[A]{x} = {b}`.
pub trait Link: Send + Sync {
    /// Link name for diagnostics.
    fn name(&self) -> &str;

    /// Number of ports.
    fn num_ports(&self) -> usize {
        self.node_map().len()
    }

    /// Row-major symmetric `ports x ports` admittance contribution.
    fn admittance(&self) -> &[f64];

    /// `ports`-long source contribution.
    fn source(&self) -> &[f64];

    /// Global node of each port.
    fn node_map(&self) -> &[NodeId];

    /// Per-port override flags. `true` fixes that port's node at its current
    /// node potential. An empty slice means no overrides.
    fn overrides(&self) -> &[bool] {
        &[]
    }

    /// The link's own initialization check.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Whether the link needs minor-step iteration.
    fn is_non_linear(&self) -> bool {
        false
    }

    /// Whether the admittance changed during the last `step`/`minor_step`.
    fn needs_admittance_update(&self) -> bool;

    /// Update contributions at the start of a major step.
    fn step(&mut self, ctx: &StepContext<'_>);

    /// Update contributions for a subsequent minor step.
    fn minor_step(&mut self, _ctx: &StepContext<'_>) {}

    /// Judge the solution of `absolute_step`.
    fn confirm_solution_acceptance(
        &mut self,
        _converged_step: u32,
        _absolute_step: u32,
        _potentials: &Potentials<'_>,
    ) -> SolutionResult {
        SolutionResult::Confirm
    }

    /// Restore link state to what it was at `converged_step`. Returns false
    /// when that state cannot be recovered.
    fn reset_last_minor_step(&mut self, _converged_step: u32, _absolute_step: u32) -> bool {
        true
    }

    /// Compute flows from the final potentials of a major step.
    fn compute_flows(&mut self, _ctx: &StepContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_potentials_view_reads_ground() {
        let values = [3.0, 1.0];
        let view = Potentials::new(&values, 0.25);

        assert_eq!(view.at(NodeId(0)), 3.0);
        assert_eq!(view.at(NodeId::GROUND), 0.25);
        assert_eq!(view.across(NodeId(0), NodeId(1)), 2.0);
    }
}
