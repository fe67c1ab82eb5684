//! Linear conductance between two nodes.

use crate::link::{Link, StepContext};
use crate::network::NodeId;

use super::TwoPort;

/// A fixed (or externally adjusted) conductance.
#[derive(Debug, Clone)]
pub struct Conductor {
    port: TwoPort,
    /// Conductance to apply at the next step
    conductance: f64,
    /// Flux from port 0 to port 1 after the last major step
    pub flux: f64,
}

impl Conductor {
    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], conductance: f64) -> Self {
        let conductance = conductance.max(0.0);
        let mut port = TwoPort::new(name, nodes);
        port.set_conductance(conductance);
        port.admittance_changed = false;
        Self {
            port,
            conductance,
            flux: 0.0,
        }
    }

    /// Change the conductance. Takes effect at the next major step.
    pub fn set_conductance(&mut self, conductance: f64) {
        self.conductance = conductance.max(0.0);
    }

    pub fn conductance(&self) -> f64 {
        self.port.conductance()
    }
}

impl Link for Conductor {
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

    fn step(&mut self, _ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
        self.port.set_conductance(self.conductance);
    }

    fn minor_step(&mut self, _ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
    }

    fn compute_flows(&mut self, ctx: &StepContext<'_>) {
        self.flux = self.port.conductance() * self.port.across(&ctx.potentials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Potentials;
    use approx::assert_relative_eq;

    fn ctx(potentials: &[f64]) -> StepContext<'_> {
        StepContext {
            dt: 0.1,
            minor_step: 1,
            min_linearization_potential: 1e-6,
            potentials: Potentials::new(potentials, 0.0),
        }
    }

    #[test]
    fn test_conductance_change_applies_next_step() {
        let mut g = Conductor::new("G1", [NodeId(0), NodeId(1)], 2.0);
        assert!(!g.needs_admittance_update());

        g.set_conductance(4.0);
        assert_eq!(g.admittance(), &[2.0, -2.0, -2.0, 2.0]);

        g.step(&ctx(&[0.0, 0.0]));
        assert!(g.needs_admittance_update());
        assert_eq!(g.admittance(), &[4.0, -4.0, -4.0, 4.0]);

        g.step(&ctx(&[0.0, 0.0]));
        assert!(!g.needs_admittance_update());
    }

    #[test]
    fn test_flux_follows_potential_drop() {
        let mut g = Conductor::new("G1", [NodeId(0), NodeId::GROUND], 0.5);
        g.compute_flows(&ctx(&[3.0]));
        assert_relative_eq!(g.flux, 1.5);
    }

    #[test]
    fn test_negative_conductance_is_clamped() {
        let g = Conductor::new("G1", [NodeId(0), NodeId(1)], -1.0);
        assert_eq!(g.conductance(), 0.0);
    }
}
