//! Capacitance between two nodes.
//!
//! Discretized with backward Euler:
//!   flux(n) = (C/dt) * (dP(n) - dP(n-1))
//!
//! giving a companion conductance `C/dt` and a history source
//! `(C/dt) * dP(n-1)` that pushes flux back into port 0.

use crate::link::{Link, StepContext};
use crate::network::NodeId;

use super::TwoPort;

#[derive(Debug, Clone)]
pub struct Capacitor {
    port: TwoPort,
    pub capacitance: f64,
    /// Potential drop at the end of the previous major step
    pub last_potential: f64,
    /// Flux from port 0 to port 1 over the last major step
    pub flux: f64,
}

impl Capacitor {
    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], capacitance: f64) -> Self {
        Self {
            port: TwoPort::new(name, nodes),
            capacitance: capacitance.max(0.0),
            last_potential: 0.0,
            flux: 0.0,
        }
    }

    /// Capacitance from `node` to ground.
    pub fn to_ground(name: impl Into<String>, node: NodeId, capacitance: f64) -> Self {
        Self::new(name, [node, NodeId::GROUND], capacitance)
    }

    /// Companion conductance for `dt`.
    pub fn conductance(&self, dt: f64) -> f64 {
        if dt > 0.0 {
            self.capacitance / dt
        } else {
            0.0
        }
    }
}

impl Link for Capacitor {
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

    fn needs_admittance_update(&self) -> bool {
        self.port.admittance_changed
    }

    fn step(&mut self, ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
        let g = self.conductance(ctx.dt);
        self.port.set_conductance(g);
        self.last_potential = self.port.across(&ctx.potentials);
        self.port.set_flux(-g * self.last_potential);
    }

    fn minor_step(&mut self, _ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
    }

    fn compute_flows(&mut self, ctx: &StepContext<'_>) {
        let dp = self.port.across(&ctx.potentials);
        self.flux = self.conductance(ctx.dt) * (dp - self.last_potential);
    }
}
