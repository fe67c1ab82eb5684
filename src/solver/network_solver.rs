//! The top-level network solver.

use std::time::{Duration, Instant};

use crate::error::{NodalError, Result};
use crate::link::{Link, Potentials, SolutionResult, StepContext};
use crate::network::{validate_link, LinkId, NodeId, NodeList};

use super::config::SolverConfig;
use super::convergence::{ConvergenceController, ConvergenceReport, MajorStepInput, StepOutcome};
use super::counters::{PerformanceCounters, StepCounters, Timing};
use super::decompose::GpuMode;
use super::engine::SolveEngine;
use super::islands::{Island, IslandMode};
use super::matrix::{AdmittanceMatrix, SourceVector};

/// How the solver produces potentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverMode {
    /// Solve the network
    #[default]
    Normal,
    /// Links manage potentials themselves; no solve
    Dummy,
    /// Potentials come from [`NetworkSolver::set_slave_potential_vector`]
    Slave,
}

/// Whether `step()` does anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Run,
    Pause,
}

/// What a major step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub minor_steps: u32,
    pub decompositions: u32,
    pub decomposition_failures: u32,
}

impl StepReport {
    fn without_solve(outcome: StepOutcome) -> Self {
        Self {
            outcome,
            minor_steps: 0,
            decompositions: 0,
            decomposition_failures: 0,
        }
    }

    pub fn converged(&self) -> bool {
        self.outcome == StepOutcome::Converged
    }
}

impl From<ConvergenceReport> for StepReport {
    fn from(report: ConvergenceReport) -> Self {
        Self {
            outcome: report.outcome,
            minor_steps: report.minor_steps,
            decompositions: report.decompositions,
            decomposition_failures: report.decomposition_failures,
        }
    }
}

/// Solves one nodal network, one major step per [`step`](Self::step) call.
///
/// Lifecycle: [`initialize_nodes`](Self::initialize_nodes), then
/// [`initialize`](Self::initialize), then repeated `step()` calls.
/// The solver owns the node list and the link arena; links reach nodes
/// through [`NodeId`] indices only.
pub struct NetworkSolver {
    config: SolverConfig,
    nodes: Option<NodeList>,
    links: Vec<Box<dyn Link>>,
    engine: SolveEngine,
    controller: ConvergenceController,
    counters: PerformanceCounters,
    solver_mode: SolverMode,
    run_mode: RunMode,
    slave_potentials: Option<Vec<f64>>,
    initialized: bool,
}

impl Default for NetworkSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSolver {
    /// Create an uninitialized solver.
    pub fn new() -> Self {
        let config = SolverConfig::default();
        let controller = ConvergenceController::new(
            config.convergence_tolerance,
            config.minor_step_limit,
            config.decomposition_limit,
        );
        Self {
            config,
            nodes: None,
            links: Vec::new(),
            engine: SolveEngine::new(0),
            controller,
            counters: PerformanceCounters::default(),
            solver_mode: SolverMode::Normal,
            run_mode: RunMode::Run,
            slave_potentials: None,
            initialized: false,
        }
    }

    /// Bind the node array.
    pub fn initialize_nodes(&mut self, nodes: NodeList) {
        self.nodes = Some(nodes);
        self.initialized = false;
    }

    /// Validate the configuration and links and allocate the solver arrays.
    ///
    /// On error the solver stays uninitialized and `step()` refuses to run.
    pub fn initialize(&mut self, config: SolverConfig, links: Vec<Box<dyn Link>>) -> Result<()> {
        self.initialized = false;
        config.validate()?;

        let size = match &self.nodes {
            Some(nodes) if !nodes.is_empty() => nodes.len(),
            _ => {
                return Err(NodalError::NodesNotBound {
                    network: config.name.clone(),
                })
            }
        };
        if links.is_empty() {
            return Err(NodalError::EmptyLinks {
                network: config.name.clone(),
            });
        }
        for link in &links {
            validate_link(link.as_ref(), size)?;
        }

        let (island_mode, (gpu_mode, gpu_threshold)) = (self.engine.island_mode(), self.engine.gpu_options());
        self.engine = SolveEngine::new(size);
        self.engine.set_island_mode(island_mode);
        self.engine.set_gpu_options(gpu_mode, gpu_threshold);

        let worst_case_timing = self.controller.worst_case_timing;
        self.controller = ConvergenceController::new(
            config.convergence_tolerance,
            config.minor_step_limit,
            config.decomposition_limit,
        );
        self.controller.worst_case_timing = worst_case_timing;

        tracing::info!(
            network = %config.name,
            nodes = size,
            links = links.len(),
            "network initialized"
        );
        self.links = links;
        self.config = config;
        self.counters = PerformanceCounters::default();
        self.slave_potentials = None;
        self.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Re-establish internal sizes and caches after a state reload.
    ///
    /// Configuration is not validated again. Since-restart counters reset.
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let size = self.nodes.as_ref().map(NodeList::len).unwrap_or(0);
        self.engine.restart(size);
        if let Some(slave) = &self.slave_potentials {
            if slave.len() != size {
                self.slave_potentials = None;
            }
        }
        self.counters.restart();
        tracing::info!(network = %self.config.name, nodes = size, "network restarted");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(NodalError::NotInitialized {
                network: self.config.name.clone(),
            })
        }
    }

    /// Run one major step of `dt`.
    ///
    /// Only configuration problems are returned as errors. Decomposition and
    /// convergence failures are recorded in the counters and the report.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        self.ensure_initialized()?;
        if self.run_mode == RunMode::Pause {
            return Ok(StepReport::without_solve(StepOutcome::Paused));
        }

        let start = Instant::now();
        let step = self.counters.since_init.major_step_count + 1;
        let _span = tracing::info_span!("major_step", network = %self.config.name, step).entered();

        let Self {
            nodes,
            links,
            engine,
            controller,
            counters,
            config,
            solver_mode,
            slave_potentials,
            ..
        } = &mut *self;
        let Some(nodes) = nodes.as_mut() else {
            return Err(NodalError::NodesNotBound {
                network: config.name.clone(),
            });
        };

        for (x, node) in engine.potential.iter_mut().zip(nodes.iter()) {
            *x = node.potential;
        }

        let input = MajorStepInput {
            dt,
            min_linearization_potential: config.min_linearization_potential,
        };

        let mut solve_time = Duration::ZERO;
        let report = match *solver_mode {
            SolverMode::Normal => {
                let solve_start = Instant::now();
                let report = controller.run(links, engine, nodes, input, counters)?;
                solve_time = solve_start.elapsed();
                StepReport::from(report)
            }
            SolverMode::Dummy => {
                step_links(links, engine, nodes, input);
                StepReport::without_solve(StepOutcome::PassThrough)
            }
            SolverMode::Slave => {
                step_links(links, engine, nodes, input);
                if let Some(slave) = slave_potentials.as_ref() {
                    engine.potential.copy_from_slice(slave);
                }
                StepReport::without_solve(StepOutcome::PassThrough)
            }
        };

        let islands = engine.islands();
        for ((node, &x), &island) in nodes
            .nodes_mut()
            .iter_mut()
            .zip(&engine.potential)
            .zip(islands.node_islands())
        {
            node.potential = x;
            node.island = island;
        }

        if *solver_mode == SolverMode::Normal {
            compute_network_capacitance(engine, nodes, dt);
        }

        let ctx = StepContext {
            dt,
            minor_step: report.minor_steps.max(1),
            min_linearization_potential: input.min_linearization_potential,
            potentials: Potentials::new(&engine.potential, nodes.ground_potential()),
        };
        for link in links.iter_mut() {
            link.compute_flows(&ctx);
        }

        counters.update(|c| c.major_step_count += 1);
        counters.timing.record(solve_time, start.elapsed());
        Ok(report)
    }

    // ============ Modes ============

    pub fn set_normal_mode(&mut self) {
        self.solver_mode = SolverMode::Normal;
    }

    pub fn set_dummy_mode(&mut self) {
        self.solver_mode = SolverMode::Dummy;
    }

    pub fn set_slave_mode(&mut self) {
        self.solver_mode = SolverMode::Slave;
    }

    pub fn solver_mode(&self) -> SolverMode {
        self.solver_mode
    }

    /// Supply the potential vector used in slave mode.
    pub fn set_slave_potential_vector(&mut self, potentials: &[f64]) -> Result<()> {
        let expected = self.engine.size();
        if potentials.len() != expected {
            return Err(NodalError::InvalidSlaveVector {
                expected,
                actual: potentials.len(),
            });
        }
        self.slave_potentials = Some(potentials.to_vec());
        Ok(())
    }

    pub fn set_island_mode(&mut self, mode: IslandMode) {
        self.engine.set_island_mode(mode);
    }

    pub fn island_mode(&self) -> IslandMode {
        self.engine.island_mode()
    }

    /// Enable offload decomposition for islands of at least `threshold` nodes.
    pub fn set_gpu_options(&mut self, mode: GpuMode, threshold: usize) {
        self.engine.set_gpu_options(mode, threshold);
    }

    pub fn set_run_mode(&mut self) {
        self.run_mode = RunMode::Run;
    }

    pub fn set_pause_mode(&mut self) {
        self.run_mode = RunMode::Pause;
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn set_worst_case_timing(&mut self, enabled: bool) {
        self.controller.worst_case_timing = enabled;
    }

    // ============ Network access ============

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.engine.size()
    }

    pub fn nodes(&self) -> Option<&NodeList> {
        self.nodes.as_ref()
    }

    /// Set a node's potential, e.g. a boundary held by an overriding link.
    pub fn set_node_potential(&mut self, node: NodeId, potential: f64) -> bool {
        match self.nodes.as_mut().and_then(|n| n.get_mut(node)) {
            Some(n) => {
                n.potential = potential;
                true
            }
            None => false,
        }
    }

    /// Request a network capacitance computation at `node` with `flux`.
    pub fn request_network_capacitance(&mut self, node: NodeId, flux: f64) -> bool {
        match self.nodes.as_mut().and_then(|n| n.get_mut(node)) {
            Some(n) => {
                n.network_capacitance_request = flux;
                true
            }
            None => false,
        }
    }

    /// Solved potential vector.
    pub fn potentials(&self) -> &[f64] {
        self.engine.potential()
    }

    pub fn potential(&self, node: NodeId) -> f64 {
        match self.nodes.as_ref() {
            Some(nodes) => nodes.potential(node),
            None => 0.0,
        }
    }

    pub fn links(&self) -> &[Box<dyn Link>] {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut [Box<dyn Link>] {
        &mut self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&dyn Link> {
        self.links.get(id.0).map(|l| l.as_ref())
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Box<dyn Link>> {
        self.links.get_mut(id.0)
    }

    // ============ Diagnostics ============

    pub fn counters(&self) -> &PerformanceCounters {
        &self.counters
    }

    pub fn since_init(&self) -> &StepCounters {
        &self.counters.since_init
    }

    pub fn since_restart(&self) -> &StepCounters {
        &self.counters.since_restart
    }

    pub fn timing(&self) -> Timing {
        self.counters.timing
    }

    /// Link verdicts from the last minor step's confirmation round.
    pub fn last_minor_step_link_results(&self) -> &[SolutionResult] {
        &self.controller.state().link_results
    }

    /// Per-node potential change over the last minor step.
    pub fn last_minor_step_delta_potentials(&self) -> &[f64] {
        &self.controller.state().delta_potentials
    }

    /// Summed absolute potential change of every minor step of the last
    /// major step.
    pub fn minor_step_delta_history(&self) -> &[f64] {
        &self.controller.state().delta_history
    }

    pub fn islands(&self) -> &[Island] {
        self.engine.islands().islands()
    }

    /// Island index of each node.
    pub fn islands_by_node(&self) -> &[usize] {
        self.engine.islands().node_islands()
    }

    pub fn island_count(&self) -> usize {
        self.engine.islands().island_count()
    }

    pub fn largest_island_size(&self) -> usize {
        self.engine.islands().largest_island_size()
    }

    pub fn admittance_matrix(&self) -> &AdmittanceMatrix {
        self.engine.admittance()
    }

    pub fn source_vector(&self) -> &SourceVector {
        self.engine.source()
    }
}

/// Step links without solving, for dummy and slave modes.
fn step_links(links: &mut [Box<dyn Link>], engine: &SolveEngine, nodes: &NodeList, input: MajorStepInput) {
    let ctx = StepContext {
        dt: input.dt,
        minor_step: 1,
        min_linearization_potential: input.min_linearization_potential,
        potentials: Potentials::new(&engine.potential, nodes.ground_potential()),
    };
    for link in links.iter_mut() {
        link.step(&ctx);
    }
}

/// Answer every node's network capacitance request from the current
/// factorization: `C = flux * dt / dP`.
fn compute_network_capacitance(engine: &SolveEngine, nodes: &mut NodeList, dt: f64) {
    for (index, node) in nodes.nodes_mut().iter_mut().enumerate() {
        let flux = node.network_capacitance_request;
        if flux <= 0.0 {
            continue;
        }
        node.network_capacitance_request = 0.0;
        node.network_capacitance = 0.0;
        node.network_capacitance_delta_potentials.clear();

        if let Some(response) = engine.flux_response(index, flux) {
            let dp = response[index];
            if dp > f64::EPSILON {
                node.network_capacitance = flux * dt / dp;
            }
            node.network_capacitance_delta_potentials = response;
        }
    }
}
