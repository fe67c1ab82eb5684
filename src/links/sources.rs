//! Flux and potential sources.

use crate::link::{Link, StepContext};
use crate::network::NodeId;

use super::TwoPort;

/// A flux source driving flux from port 0 into port 1.
///
/// Adds only to the source vector.
#[derive(Debug, Clone)]
pub struct FluxSource {
    port: TwoPort,
    flux: f64,
}

impl FluxSource {
    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], flux: f64) -> Self {
        let mut port = TwoPort::new(name, nodes);
        port.set_flux(flux);
        Self { port, flux }
    }

    pub fn set_flux(&mut self, flux: f64) {
        self.flux = flux;
    }

    pub fn flux(&self) -> f64 {
        self.flux
    }
}

impl Link for FluxSource {
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
        false
    }

    fn step(&mut self, _ctx: &StepContext<'_>) {
        self.port.set_flux(self.flux);
    }
}

/// A potential source, modeled as its Norton equivalent.
///
/// Holds port 1 at `potential` above port 0 through a stiff conductance.
#[derive(Debug, Clone)]
pub struct PotentialSource {
    port: TwoPort,
    potential: f64,
    conductance: f64,
    /// Flux from port 0 to port 1 after the last major step
    pub flux: f64,
}

impl PotentialSource {
    /// Default internal conductance.
    pub const DEFAULT_CONDUCTANCE: f64 = 1.0e6;

    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], potential: f64) -> Self {
        let mut source = Self {
            port: TwoPort::new(name, nodes),
            potential,
            conductance: Self::DEFAULT_CONDUCTANCE,
            flux: 0.0,
        };
        source.stamp();
        source.port.admittance_changed = false;
        source
    }

    /// Set the internal conductance.
    pub fn with_conductance(mut self, conductance: f64) -> Self {
        self.conductance = conductance.max(f64::MIN_POSITIVE);
        self.stamp();
        self.port.admittance_changed = false;
        self
    }

    pub fn set_potential(&mut self, potential: f64) {
        self.potential = potential;
    }

    pub fn potential(&self) -> f64 {
        self.potential
    }

    fn stamp(&mut self) {
        self.port.set_conductance(self.conductance);
        self.port.set_flux(self.conductance * self.potential);
    }
}

impl Link for PotentialSource {
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
        self.stamp();
    }

    fn minor_step(&mut self, _ctx: &StepContext<'_>) {
        self.port.admittance_changed = false;
    }

    fn compute_flows(&mut self, ctx: &StepContext<'_>) {
        // Source flux minus what leaks back through the conductance
        let dp = ctx.potentials.across(self.port.nodes[1], self.port.nodes[0]);
        self.flux = self.conductance * (self.potential - dp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flux_source_stamps_only_source() {
        let f = FluxSource::new("F1", [NodeId(0), NodeId(1)], 3.0);
        assert_eq!(f.source(), &[-3.0, 3.0]);
        assert!(f.admittance().iter().all(|&a| a == 0.0));
        assert!(!f.needs_admittance_update());
    }

    #[test]
    fn test_potential_source_norton_equivalent() {
        let v = PotentialSource::new("V1", [NodeId::GROUND, NodeId(0)], 10.0).with_conductance(100.0);
        assert_eq!(v.admittance(), &[100.0, -100.0, -100.0, 100.0]);
        assert_eq!(v.source(), &[-1000.0, 1000.0]);
        assert!(!v.needs_admittance_update());
    }
}
