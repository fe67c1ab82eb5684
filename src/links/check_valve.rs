//! One-way valve.
//!
//! Piecewise linear: a high conductance when open, a low one when closed.
//! The state is assumed at the start of a major step from the previous
//! potentials. When a solution contradicts the assumed state the valve
//! rejects it and takes the other state on the next minor step.

use crate::link::{Link, Potentials, SolutionResult, StepContext};
use crate::network::NodeId;

use super::TwoPort;

#[derive(Debug, Clone)]
pub struct CheckValve {
    port: TwoPort,
    pub open_conductance: f64,
    pub closed_conductance: f64,
    open: bool,
    /// State at the last converged minor step
    converged_open: bool,
    /// State to take at the next minor step after a rejection
    pending: Option<bool>,
    /// State changes within the current major step
    flips: u32,
    /// Flux from port 0 to port 1 after the last major step
    pub flux: f64,
}

impl CheckValve {
    /// State changes allowed per major step before the valve stops rejecting.
    pub const MAX_FLIPS: u32 = 4;

    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], open_conductance: f64) -> Self {
        let mut valve = Self {
            port: TwoPort::new(name, nodes),
            open_conductance: open_conductance.max(0.0),
            closed_conductance: 0.0,
            open: false,
            converged_open: false,
            pending: None,
            flips: 0,
            flux: 0.0,
        };
        valve.apply_state();
        valve.port.admittance_changed = false;
        valve
    }

    /// Set the leak conductance when closed.
    pub fn with_closed_conductance(mut self, conductance: f64) -> Self {
        self.closed_conductance = conductance.max(0.0);
        self.apply_state();
        self.port.admittance_changed = false;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn apply_state(&mut self) {
        let g = if self.open {
            self.open_conductance
        } else {
            self.closed_conductance
        };
        self.port.set_conductance(g);
    }

    /// State the potentials call for.
    fn wanted_state(&self, potentials: &Potentials<'_>) -> bool {
        self.port.across(potentials) > 0.0
    }
}

impl Link for CheckValve {
    fn name(&self) -> &str {
        &self.port.name
    }

    fn admittance(&self) -> &[f64] {
        &self.port.admittance
    }

    fn source(&self) -> &[f64] {
        &self.port.source
    }

    fn node_map(&self) -> &[NodeId] {
        &self.port.nodes
    }

    fn is_non_linear(&self) -> bool {
        true
    }

    fn needs_admittance_update(&self) -> bool {
        self.port.admittance_changed
    }

    fn step(&mut self, ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
        self.flips = 0;
        self.pending = None;
        self.open = self.wanted_state(&ctx.potentials);
        self.converged_open = self.open;
        self.apply_state();
    }

    fn minor_step(&mut self, _ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
        if let Some(open) = self.pending.take() {
            self.open = open;
            self.apply_state();
        }
    }

    fn confirm_solution_acceptance(
        &mut self,
        _converged_step: u32,
        _absolute_step: u32,
        potentials: &Potentials<'_>,
    ) -> SolutionResult {
        let wanted = self.wanted_state(potentials);
        if wanted != self.open && self.flips < Self::MAX_FLIPS {
            self.flips += 1;
            self.pending = Some(wanted);
            return SolutionResult::Reject;
        }
        self.converged_open = self.open;
        SolutionResult::Confirm
    }

    fn reset_last_minor_step(&mut self, _converged_step: u32, _absolute_step: u32) -> bool {
        // A pending change of our own survives the rollback
        if self.pending.is_none() && self.open != self.converged_open {
            self.pending = Some(self.converged_open);
        }
        true
    }

    fn compute_flows(&mut self, ctx: &StepContext<'_>) {
        self.flux = self.port.conductance() * self.port.across(&ctx.potentials);
    }
}
