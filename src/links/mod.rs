//! Reference link models.
//!
//! All of these are two-port links between a pair of nodes, either of which
//! may be [`NodeId::GROUND`]. Flux is positive from port 0 to port 1.

mod capacitor;
mod check_valve;
mod conductor;
mod diode;
mod sources;

pub use capacitor::Capacitor;
pub use check_valve::CheckValve;
pub use conductor::Conductor;
pub use diode::{Diode, DiodeParams};
pub use sources::{FluxSource, PotentialSource};

use crate::link::Potentials;
use crate::network::NodeId;

/// Contribution arrays shared by the two-port links.
#[derive(Debug, Clone)]
pub(crate) struct TwoPort {
    pub name: String,
    pub nodes: [NodeId; 2],
    pub admittance: [f64; 4],
    pub source: [f64; 2],
    /// Set when the admittance changed in the current step or minor step
    pub admittance_changed: bool,
}

impl TwoPort {
    pub fn new(name: impl Into<String>, nodes: [NodeId; 2]) -> Self {
        Self {
            name: name.into(),
            nodes,
            admittance: [0.0; 4],
            source: [0.0; 2],
            admittance_changed: false,
        }
    }

    /// Conductance currently stamped between the ports.
    pub fn conductance(&self) -> f64 {
        self.admittance[0]
    }

    pub fn set_conductance(&mut self, g: f64) {
        if g != self.admittance[0] {
            self.admittance = [g, -g, -g, g];
            self.admittance_changed = true;
        }
    }

    /// Constant flux driven from port 0 into port 1.
    pub fn set_flux(&mut self, flux: f64) {
        self.source = [-flux, flux];
    }

    /// Potential drop from port 0 to port 1.
    pub fn across(&self, potentials: &Potentials<'_>) -> f64 {
        potentials.across(self.nodes[0], self.nodes[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conductance_change_is_flagged_once() {
        let mut port = TwoPort::new("p", [NodeId(0), NodeId::GROUND]);
        port.set_conductance(2.0);
        assert!(port.admittance_changed);
        assert_eq!(port.admittance, [2.0, -2.0, -2.0, 2.0]);

        port.admittance_changed = false;
        port.set_conductance(2.0);
        assert!(!port.admittance_changed);
    }
}
