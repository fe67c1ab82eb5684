//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! Each minor step linearizes about the last solved potential drop:
//!   I ≈ G_d * V + I_eq
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt)) and I_eq = I(V0) - G_d * V0

use crate::link::{Link, StepContext};
use crate::network::NodeId;

use super::TwoPort;

/// Thermal voltage at room temperature.
pub const THERMAL_VOLTAGE: f64 = 0.0258;

/// Smallest conductance a linearized diode stamps.
const MIN_CONDUCTANCE: f64 = 1e-12;

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is)
    pub is: f64,
    /// Ideality factor (n)
    pub n: f64,
    /// Drop above which the exponential is extrapolated linearly
    pub v_crit: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            v_crit: 0.7,
        }
    }
}

impl DiodeParams {
    /// Parameters for a germanium diode.
    pub fn germanium() -> Self {
        Self {
            is: 1e-9,
            n: 1.5,
            v_crit: 0.5,
        }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }

    /// Forward flux at drop `v`.
    pub fn current(&self, v: f64) -> f64 {
        let n_vt = self.n_vt();
        if v > self.v_crit {
            let i_crit = self.is * ((self.v_crit / n_vt).exp() - 1.0);
            i_crit + self.conductance(self.v_crit) * (v - self.v_crit)
        } else if v < -5.0 * n_vt {
            -self.is
        } else {
            self.is * ((v / n_vt).exp() - 1.0)
        }
    }

    /// dI/dV at drop `v`.
    pub fn conductance(&self, v: f64) -> f64 {
        let n_vt = self.n_vt();
        if v < -5.0 * n_vt {
            return MIN_CONDUCTANCE;
        }
        let v = v.min(self.v_crit);
        (self.is / n_vt * (v / n_vt).exp()).max(MIN_CONDUCTANCE)
    }
}

/// A junction diode from anode (port 0) to cathode (port 1).
#[derive(Debug, Clone)]
pub struct Diode {
    port: TwoPort,
    pub params: DiodeParams,
    /// Drop the current linearization is taken about
    pub v_op: f64,
    /// `(minor step, v_op)` of each minor step of the current major step,
    /// with minor step 0 holding the operating point it started from
    history: Vec<(u32, f64)>,
    /// Set when a reset re-stamped the admittance
    reset_changed: bool,
    /// Forward flux after the last major step
    pub flux: f64,
}

impl Diode {
    pub fn new(name: impl Into<String>, nodes: [NodeId; 2], params: DiodeParams) -> Self {
        let mut diode = Self {
            port: TwoPort::new(name, nodes),
            params,
            v_op: 0.0,
            history: Vec::new(),
            reset_changed: false,
            flux: 0.0,
        };
        diode.linearize(0.0);
        diode.port.admittance_changed = false;
        diode
    }

    fn linearize(&mut self, v: f64) {
        let g = self.params.conductance(v);
        let i_eq = self.params.current(v) - g * v;
        self.v_op = v;
        self.port.set_conductance(g);
        self.port.set_flux(i_eq);
    }

    /// Limit the change of the operating point per minor step so the
    /// exponential cannot overshoot.
    fn limit_step(&self, v_new: f64) -> f64 {
        let max_step = self.params.v_crit.max(0.5);
        v_new.clamp(self.v_op - max_step, self.v_op + max_step)
    }

    fn update(&mut self, ctx: &StepContext<'_>) {
        self.port.admittance_changed = std::mem::take(&mut self.reset_changed);
        let v = self.limit_step(self.port.across(&ctx.potentials));
        if (v - self.v_op).abs() >= ctx.min_linearization_potential {
            self.linearize(v);
        }
        self.history.push((ctx.minor_step, self.v_op));
    }
}

impl Link for Diode {
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
        self.history.clear();
        self.history.push((0, self.v_op));
        self.update(ctx);
    }

    fn minor_step(&mut self, ctx: &StepContext<'_>) {
        self.update(ctx);
    }

    fn reset_last_minor_step(&mut self, converged_step: u32, _absolute_step: u32) -> bool {
        let Some(&(_, v_op)) = self.history.iter().rev().find(|(step, _)| *step == converged_step) else {
            return false;
        };
        self.port.admittance_changed = false;
        self.linearize(v_op);
        self.reset_changed |= self.port.admittance_changed;
        true
    }

    fn compute_flows(&mut self, ctx: &StepContext<'_>) {
        self.flux = self.params.current(self.port.across(&ctx.potentials));
    }
}
