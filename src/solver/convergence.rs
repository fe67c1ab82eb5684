//! Minor-step convergence for non-linear networks.
//!
//! Each minor step assembles, decomposes (when the admittance changed) and
//! solves the system, then checks it:
//!
//! ```text
//! ASSEMBLING -> DECOMPOSING -> SOLVED -> CHECKING -> CONVERGED
//!                                                 -> RETRY  (next minor step)
//!                                                 -> FAILED (limit reached)
//! ```
//!
//! A step converges when the summed absolute change of the node potentials
//! since the previous minor step is below the tolerance and every link
//! confirms the solution. A rejecting link rolls all links back to the last
//! converged minor step before the retry.

use crate::error::Result;
use crate::link::{Link, Potentials, SolutionResult, StepContext};
use crate::network::NodeList;

use super::counters::PerformanceCounters;
use super::engine::SolveEngine;

/// Where a minor step currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinorStepState {
    #[default]
    Assembling,
    Decomposing,
    Solved,
    Checking,
    Converged,
    Retry,
    Failed,
}

/// Why a major step did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    MinorStepLimit,
    DecompositionLimit,
    /// No solve group could be factored, so nothing was solved
    Decomposition,
}

/// Outcome of a major step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Run mode is paused, nothing happened
    Paused,
    /// Dummy or slave mode, no solve
    PassThrough,
    /// Solution accepted
    Converged,
    /// Limits reached, best available potentials were output
    Failed(FailReason),
}

/// Per-minor-step record, reset every major step.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceState {
    pub state: MinorStepState,
    pub minor_step: u32,
    /// Last minor step whose solution met the tolerance without rejection
    pub converged_step: u32,
    /// Link verdicts from the last confirmation round
    pub link_results: Vec<SolutionResult>,
    /// Per-node potential change over the last minor step
    pub delta_potentials: Vec<f64>,
    /// Sum of absolute `delta_potentials`
    pub delta_sum: f64,
    /// `delta_sum` of every minor step, in order
    pub delta_history: Vec<f64>,
}

impl ConvergenceState {
    fn reset(&mut self, nodes: usize, links: usize) {
        self.state = MinorStepState::Assembling;
        self.minor_step = 0;
        self.converged_step = 0;
        self.link_results.clear();
        self.link_results.resize(links, SolutionResult::Confirm);
        self.delta_potentials.clear();
        self.delta_potentials.resize(nodes, 0.0);
        self.delta_sum = 0.0;
        self.delta_history.clear();
    }
}

/// Summary of one convergence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub outcome: StepOutcome,
    pub minor_steps: u32,
    pub decompositions: u32,
    pub decomposition_failures: u32,
}

/// Inputs shared by every minor step of one major step.
#[derive(Debug, Clone, Copy)]
pub struct MajorStepInput {
    pub dt: f64,
    pub min_linearization_potential: f64,
}

/// Drives minor steps until the network converges or a limit is hit.
#[derive(Debug, Clone)]
pub struct ConvergenceController {
    pub tolerance: f64,
    pub minor_step_limit: u32,
    pub decomposition_limit: u32,
    /// Keep decomposing up to the minor step limit after convergence
    pub worst_case_timing: bool,
    state: ConvergenceState,
}

impl ConvergenceController {
    pub fn new(tolerance: f64, minor_step_limit: u32, decomposition_limit: u32) -> Self {
        Self {
            tolerance,
            minor_step_limit,
            decomposition_limit,
            worst_case_timing: false,
            state: ConvergenceState::default(),
        }
    }

    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// Per-node delta between `current` and `previous`; true when the summed
    /// absolute delta is within tolerance.
    pub fn check_system_convergence(&mut self, minor_step: u32, current: &[f64], previous: &[f64]) -> bool {
        let mut sum = 0.0;
        for ((delta, x), prev) in self.state.delta_potentials.iter_mut().zip(current).zip(previous) {
            *delta = x - prev;
            sum += delta.abs();
        }
        self.state.delta_sum = sum;
        self.state.delta_history.push(sum);
        tracing::debug!(minor_step, delta_sum = sum, "convergence check");
        sum < self.tolerance
    }

    /// Ask every link to judge the solution of `minor_step`. Returns the
    /// overall verdict: any reject wins, then any delay.
    pub fn confirm_links(
        &mut self,
        links: &mut [Box<dyn Link>],
        minor_step: u32,
        potentials: &Potentials<'_>,
    ) -> SolutionResult {
        let converged_step = self.state.converged_step;
        let mut verdict = SolutionResult::Confirm;
        for (link, result) in links.iter_mut().zip(self.state.link_results.iter_mut()) {
            *result = link.confirm_solution_acceptance(converged_step, minor_step, potentials);
            match (*result, verdict) {
                (SolutionResult::Reject, _) => verdict = SolutionResult::Reject,
                (SolutionResult::Delay, SolutionResult::Confirm) => verdict = SolutionResult::Delay,
                _ => {}
            }
        }
        verdict
    }

    /// Roll every link back to the last converged minor step. Returns the
    /// number of links that could not be reset.
    pub fn reset_links_to_minor_step(&self, links: &mut [Box<dyn Link>], minor_step: u32) -> u64 {
        let converged_step = self.state.converged_step;
        let mut failures = 0;
        for link in links.iter_mut() {
            if !link.reset_last_minor_step(converged_step, minor_step) {
                tracing::warn!(link = link.name(), converged_step, minor_step, "link reset failed");
                failures += 1;
            }
        }
        failures
    }

    /// Run the minor steps of one major step.
    ///
    /// The engine's potential vector holds the previous major step's
    /// solution on entry and the best available solution on exit.
    pub fn run(
        &mut self,
        links: &mut [Box<dyn Link>],
        engine: &mut SolveEngine,
        nodes: &NodeList,
        input: MajorStepInput,
        counters: &mut PerformanceCounters,
    ) -> Result<ConvergenceReport> {
        let non_linear = links.iter().any(|l| l.is_non_linear());
        let limit = if non_linear { self.minor_step_limit } else { 1 };
        let ground = nodes.ground_potential();

        self.state.reset(engine.size(), links.len());
        engine.begin_major_step();

        // Potentials the links linearize about, and the solution they are
        // compared against for convergence.
        let mut link_view = engine.potential.clone();
        let mut previous = engine.potential.clone();
        let mut converged_snapshot = engine.potential.clone();

        let mut report = ConvergenceReport {
            outcome: StepOutcome::Failed(FailReason::MinorStepLimit),
            minor_steps: 0,
            decompositions: 0,
            decomposition_failures: 0,
        };

        // Set while the last factorization left every group unsolved
        let mut unsolved = false;

        for minor_step in 1..=limit {
            self.state.minor_step = minor_step;
            self.state.state = MinorStepState::Assembling;
            let _span = tracing::debug_span!("minor_step", minor_step).entered();

            let ctx = StepContext {
                dt: input.dt,
                minor_step,
                min_linearization_potential: input.min_linearization_potential,
                potentials: Potentials::new(&link_view, ground),
            };
            for link in links.iter_mut() {
                if minor_step == 1 {
                    link.step(&ctx);
                } else {
                    link.minor_step(&ctx);
                }
            }

            engine.assemble(links, nodes)?;

            // Only a new factorization can recover an unsolved step
            if unsolved && !engine.needs_decomposition() {
                break;
            }

            if engine.needs_decomposition() {
                if engine.decompositions_this_step() >= self.decomposition_limit {
                    tracing::warn!(minor_step, limit = self.decomposition_limit, "decomposition limit reached");
                    report.outcome = StepOutcome::Failed(FailReason::DecompositionLimit);
                    break;
                }
                self.state.state = MinorStepState::Decomposing;
                let pass = engine.decompose();
                report.decompositions += 1;
                report.decomposition_failures += pass.failures as u32;
                counters.update(|c| {
                    c.decomposition_count += 1;
                    c.decomposition_fail_count += pass.failures as u64;
                });
            }

            let solved_groups = engine.solve();
            report.minor_steps = minor_step;
            if solved_groups == 0 {
                tracing::warn!(minor_step, "no island could be solved");
                report.outcome = StepOutcome::Failed(FailReason::Decomposition);
                unsolved = true;
                if !non_linear {
                    break;
                }
                self.state.state = MinorStepState::Retry;
                continue;
            }
            unsolved = false;
            report.outcome = StepOutcome::Failed(FailReason::MinorStepLimit);
            self.state.state = MinorStepState::Solved;

            if !non_linear {
                self.state.state = MinorStepState::Converged;
                report.outcome = StepOutcome::Converged;
                break;
            }

            self.state.state = MinorStepState::Checking;
            let within_tolerance = self.check_system_convergence(minor_step, &engine.potential, &previous);
            let solved = Potentials::new(&engine.potential, ground);
            let verdict = self.confirm_links(links, minor_step, &solved);
            previous.copy_from_slice(&engine.potential);

            match (within_tolerance, verdict) {
                (true, SolutionResult::Confirm) => {
                    self.state.converged_step = minor_step;
                    self.state.state = MinorStepState::Converged;
                    report.outcome = StepOutcome::Converged;
                    break;
                }
                (_, SolutionResult::Reject) => {
                    let failures = self.reset_links_to_minor_step(links, minor_step);
                    counters.update(|c| {
                        c.rejected_step_count += 1;
                        c.link_reset_step_fail_count += failures;
                    });
                    link_view.copy_from_slice(&converged_snapshot);
                    tracing::debug!(minor_step, converged_step = self.state.converged_step, "link rejected solution");
                }
                (true, SolutionResult::Delay) => {
                    self.state.converged_step = minor_step;
                    converged_snapshot.copy_from_slice(&engine.potential);
                    link_view.copy_from_slice(&engine.potential);
                }
                (false, _) => {
                    link_view.copy_from_slice(&engine.potential);
                }
            }
            self.state.state = MinorStepState::Retry;
        }

        match report.outcome {
            StepOutcome::Converged => {
                if self.worst_case_timing {
                    self.burn_worst_case(engine, &mut report, counters);
                }
            }
            StepOutcome::Failed(reason) => {
                self.state.state = MinorStepState::Failed;
                counters.update(|c| c.convergence_fail_count += 1);
                tracing::warn!(?reason, minor_steps = report.minor_steps, "major step did not converge");
            }
            StepOutcome::Paused | StepOutcome::PassThrough => {}
        }

        counters.update(|c| {
            c.minor_step_count += report.minor_steps as u64;
            c.max_minor_steps = c.max_minor_steps.max(report.minor_steps);
        });
        Ok(report)
    }

    /// Re-decompose the current matrix for the remaining minor steps so the
    /// step costs as much as the worst case. The solution is unchanged.
    fn burn_worst_case(&self, engine: &mut SolveEngine, report: &mut ConvergenceReport, counters: &mut PerformanceCounters) {
        for _ in report.minor_steps..self.minor_step_limit {
            if engine.decompositions_this_step() >= self.decomposition_limit {
                break;
            }
            engine.invalidate();
            engine.decompose();
            report.decompositions += 1;
            counters.update(|c| c.decomposition_count += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_convergence_check_sums_absolute_deltas() {
        let mut controller = ConvergenceController::new(0.1, 5, 5);
        controller.state.reset(3, 0);

        assert!(!controller.check_system_convergence(1, &[1.0, -1.0, 0.0], &[0.5, -0.5, 0.0]));
        assert_relative_eq!(controller.state().delta_sum, 1.0);

        assert!(controller.check_system_convergence(2, &[1.0, -1.0, 0.0], &[1.0, -0.95, 0.0]));
        assert_relative_eq!(controller.state().delta_potentials[1], -0.05, epsilon = 1e-12);
        assert_eq!(controller.state().delta_history.len(), 2);
    }
}
