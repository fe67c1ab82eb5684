//! Integration tests for linear networks: initialize -> step -> inspect.

use approx::assert_relative_eq;
use nodal_core::links::{Capacitor, Conductor, FluxSource};
use nodal_core::solver::{residual, FailReason, RunMode, SolverMode};
use nodal_core::{
    IslandMode, Link, NetworkSolver, NodalError, NodeId, NodeList, SolverConfig, StepContext,
    StepOutcome,
};

fn solver_with(nodes: usize, links: Vec<Box<dyn Link>>) -> NetworkSolver {
    let mut solver = NetworkSolver::new();
    solver.initialize_nodes(NodeList::with_count(nodes));
    solver
        .initialize(SolverConfig::new("test"), links)
        .expect("initialize failed");
    solver
}

fn chain() -> Vec<Box<dyn Link>> {
    vec![
        Box::new(FluxSource::new("F0", [NodeId::GROUND, NodeId(0)], 10.0)),
        Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 1.0)),
        Box::new(Conductor::new("G12", [NodeId(1), NodeId(2)], 1.0)),
        Box::new(Conductor::new("G2g", [NodeId(2), NodeId::GROUND], 1.0)),
    ]
}

fn two_islands() -> Vec<Box<dyn Link>> {
    vec![
        Box::new(FluxSource::new("F0", [NodeId::GROUND, NodeId(0)], 2.0)),
        Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 1.0)),
        Box::new(Conductor::new("G1g", [NodeId(1), NodeId::GROUND], 2.0)),
        Box::new(FluxSource::new("F2", [NodeId::GROUND, NodeId(2)], 1.0)),
        Box::new(Conductor::new("G23", [NodeId(2), NodeId(3)], 4.0)),
        Box::new(Conductor::new("G3g", [NodeId(3), NodeId::GROUND], 0.5)),
    ]
}

// ── Basic Solves ────────────────────────────────────────────────────

#[test]
fn test_single_conductor_to_ground() {
    let links: Vec<Box<dyn Link>> = vec![
        Box::new(Conductor::new("G0g", [NodeId(0), NodeId::GROUND], 1.0)),
        Box::new(FluxSource::new("F0", [NodeId::GROUND, NodeId(0)], 5.0)),
    ];
    let mut solver = solver_with(2, links);
    let report = solver.step(0.1).unwrap();

    assert_eq!(report.outcome, StepOutcome::Converged);
    assert_eq!(report.minor_steps, 1);
    assert_relative_eq!(solver.potential(NodeId(0)), 5.0, epsilon = 1e-12);
    // Unconnected node gets a tiny diagonal and no source
    assert_eq!(solver.potential(NodeId(1)), 0.0);
}

#[test]
fn test_chain_residual_is_small() {
    let mut solver = solver_with(3, chain());
    solver.step(0.1).unwrap();

    let r = residual(
        solver.admittance_matrix(),
        solver.potentials(),
        &solver.source_vector().b,
    );
    assert!(r < 1e-9, "residual {r}");
    assert_relative_eq!(solver.potentials()[0], 30.0, epsilon = 1e-9);
    assert_relative_eq!(solver.potentials()[1], 20.0, epsilon = 1e-9);
    assert_relative_eq!(solver.potentials()[2], 10.0, epsilon = 1e-9);
}

#[test]
fn test_admittance_matrix_is_symmetric() {
    let mut solver = solver_with(4, two_islands());
    solver.step(0.1).unwrap();
    assert!(solver.admittance_matrix().is_symmetric(0.0));
}

#[test]
fn test_closed_network_conserves_flux() {
    // Flux only moves between nodes; the capacitances start empty, so no
    // net flux ever reaches ground
    let links: Vec<Box<dyn Link>> = vec![
        Box::new(Capacitor::to_ground("C0", NodeId(0), 1.0)),
        Box::new(Capacitor::to_ground("C1", NodeId(1), 1.0)),
        Box::new(Capacitor::new("C01", [NodeId(0), NodeId(1)], 0.5)),
        Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 1.0)),
        Box::new(FluxSource::new("F01", [NodeId(0), NodeId(1)], 1.0)),
    ];
    let mut solver = solver_with(2, links);

    solver.step(1.0).unwrap();
    let x = solver.potentials();
    // 2.5 x0 - 1.5 x1 = -1, -1.5 x0 + 2.5 x1 = 1
    assert_relative_eq!(x[0], -0.25, epsilon = 1e-12);
    assert_relative_eq!(x[1], 0.25, epsilon = 1e-12);

    for _ in 0..5 {
        solver.step(1.0).unwrap();
        let b = &solver.source_vector().b;
        let x = solver.potentials();
        assert_relative_eq!(b.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(x[0] + x[1], 0.0, epsilon = 1e-12);
        let r = residual(solver.admittance_matrix(), x, b);
        assert!(r < 1e-9, "residual {r}");
    }
}

#[test]
fn test_singular_network_reports_failure() {
    let links: Vec<Box<dyn Link>> = vec![
        Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 1.0)),
        Box::new(FluxSource::new("F01", [NodeId(0), NodeId(1)], 1.0)),
    ];
    let mut solver = solver_with(2, links);
    solver.set_node_potential(NodeId(0), 2.0);
    let report = solver.step(0.1).unwrap();

    assert_eq!(report.outcome, StepOutcome::Failed(FailReason::Decomposition));
    assert_eq!(solver.since_init().convergence_fail_count, 1);
    // Last good potentials are kept
    assert_eq!(solver.potentials(), &[2.0, 0.0]);
}

/// Holds one node at its current potential.
struct Boundary {
    node: [NodeId; 1],
}

impl Link for Boundary {
    fn name(&self) -> &str {
        "boundary"
    }

    fn admittance(&self) -> &[f64] {
        &[0.0]
    }

    fn source(&self) -> &[f64] {
        &[0.0]
    }

    fn node_map(&self) -> &[NodeId] {
        &self.node
    }

    fn overrides(&self) -> &[bool] {
        &[true]
    }

    fn needs_admittance_update(&self) -> bool {
        false
    }

    fn step(&mut self, _ctx: &StepContext<'_>) {}
}

#[test]
fn test_overridden_node_holds_its_potential() {
    let links: Vec<Box<dyn Link>> = vec![
        Box::new(Boundary { node: [NodeId(0)] }),
        Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 1.0)),
        Box::new(Conductor::new("G1g", [NodeId(1), NodeId::GROUND], 1.0)),
        Box::new(FluxSource::new("F0", [NodeId::GROUND, NodeId(0)], 100.0)),
    ];
    let mut solver = solver_with(2, links);
    solver.set_node_potential(NodeId(0), 7.0);
    solver.step(0.1).unwrap();

    // The source into node 0 is ignored, node 1 divides the fixed potential
    assert_eq!(solver.potential(NodeId(0)), 7.0);
    assert_relative_eq!(solver.potential(NodeId(1)), 3.5, epsilon = 1e-12);
    assert!(solver.admittance_matrix().is_symmetric(0.0));
    assert_eq!(solver.admittance_matrix().overridden(), &[0]);

    solver.set_node_potential(NodeId(0), 2.0);
    solver.step(0.1).unwrap();
    assert_eq!(solver.potential(NodeId(0)), 2.0);
    assert_relative_eq!(solver.potential(NodeId(1)), 1.0, epsilon = 1e-12);
}

// ── Islands ─────────────────────────────────────────────────────────

#[test]
fn test_island_solve_matches_full_solve() {
    let mut whole = solver_with(4, two_islands());
    whole.step(0.1).unwrap();

    let mut split = NetworkSolver::new();
    split.set_island_mode(IslandMode::Solve);
    split.initialize_nodes(NodeList::with_count(4));
    split.initialize(SolverConfig::new("split"), two_islands()).unwrap();
    split.step(0.1).unwrap();

    assert_eq!(split.island_count(), 2);
    assert_eq!(split.largest_island_size(), 2);
    for i in 0..4 {
        assert_relative_eq!(whole.potentials()[i], split.potentials()[i], epsilon = 1e-12);
    }
}

#[test]
fn test_islands_partition_nodes() {
    let mut solver = NetworkSolver::new();
    solver.set_island_mode(IslandMode::Find);
    solver.initialize_nodes(NodeList::with_count(5));
    solver.initialize(SolverConfig::new("find"), two_islands()).unwrap();
    solver.step(0.1).unwrap();

    // Node 4 is on its own
    assert_eq!(solver.island_count(), 3);
    let mut seen: Vec<usize> = solver.islands().iter().flat_map(|i| i.nodes.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    let nodes = solver.nodes().unwrap();
    let by_node: Vec<usize> = nodes.iter().map(|n| n.island).collect();
    assert_eq!(by_node, solver.islands_by_node());
    assert_eq!(by_node[0], by_node[1]);
    assert_ne!(by_node[0], by_node[2]);
}

// ── Network Capacitance ─────────────────────────────────────────────

#[test]
fn test_network_capacitance_request() {
    let links: Vec<Box<dyn Link>> = vec![
        Box::new(Conductor::new("G0g", [NodeId(0), NodeId::GROUND], 4.0)),
        Box::new(Capacitor::to_ground("C0", NodeId(0), 2.0)),
    ];
    let mut solver = solver_with(1, links);
    assert!(solver.request_network_capacitance(NodeId(0), 1.0));
    solver.step(0.1).unwrap();

    let node = solver.nodes().unwrap().get(NodeId(0)).unwrap();
    // 4 + 2/0.1 = 24 total admittance
    assert_relative_eq!(node.network_capacitance, 2.4, epsilon = 1e-12);
    assert_relative_eq!(node.network_capacitance_delta_potentials[0], 1.0 / 24.0, epsilon = 1e-12);
    assert_eq!(node.network_capacitance_request, 0.0);
}

// ── Initialization ──────────────────────────────────────────────────

#[test]
fn test_empty_links_fail_initialization() {
    let mut solver = NetworkSolver::new();
    solver.initialize_nodes(NodeList::with_count(2));
    let err = solver.initialize(SolverConfig::new("empty"), Vec::new()).unwrap_err();

    assert!(matches!(err, NodalError::EmptyLinks { .. }));
    assert!(!solver.is_initialized());
    assert!(matches!(solver.step(0.1), Err(NodalError::NotInitialized { .. })));
}

#[test]
fn test_unbound_nodes_fail_initialization() {
    let mut solver = NetworkSolver::new();
    let err = solver.initialize(SolverConfig::new("n"), chain()).unwrap_err();
    assert!(matches!(err, NodalError::NodesNotBound { .. }));
    assert!(!solver.is_initialized());
}

#[test]
fn test_node_map_out_of_range_fails_initialization() {
    let mut solver = NetworkSolver::new();
    solver.initialize_nodes(NodeList::with_count(2));
    let err = solver.initialize(SolverConfig::new("n"), chain()).unwrap_err();
    assert!(matches!(err, NodalError::NodeMapOutOfRange { node: 2, size: 2, .. }));
}

#[test]
fn test_invalid_config_fails_initialization() {
    let mut solver = NetworkSolver::new();
    solver.initialize_nodes(NodeList::with_count(3));
    let config = SolverConfig::new("n").with_minor_step_limit(0);
    let err = solver.initialize(config, chain()).unwrap_err();
    assert!(err.is_configuration());
    assert!(!solver.is_initialized());
}

// ── Modes ───────────────────────────────────────────────────────────

#[test]
fn test_pause_mode_skips_step() {
    let mut solver = solver_with(3, chain());
    solver.set_pause_mode();
    assert_eq!(solver.run_mode(), RunMode::Pause);

    let report = solver.step(0.1).unwrap();
    assert_eq!(report.outcome, StepOutcome::Paused);
    assert_eq!(solver.since_init().major_step_count, 0);
    assert_eq!(solver.potentials(), &[0.0, 0.0, 0.0]);

    solver.set_run_mode();
    solver.step(0.1).unwrap();
    assert_eq!(solver.since_init().major_step_count, 1);
}

#[test]
fn test_dummy_mode_does_not_solve() {
    let mut solver = solver_with(3, chain());
    solver.set_dummy_mode();
    assert_eq!(solver.solver_mode(), SolverMode::Dummy);
    solver.set_node_potential(NodeId(1), 4.0);

    let report = solver.step(0.1).unwrap();
    assert_eq!(report.outcome, StepOutcome::PassThrough);
    assert_eq!(solver.potentials(), &[0.0, 4.0, 0.0]);
    assert_eq!(solver.since_init().decomposition_count, 0);
    assert_eq!(solver.since_init().major_step_count, 1);
}

#[test]
fn test_slave_mode_uses_supplied_potentials() {
    let mut solver = solver_with(3, chain());
    solver.set_slave_mode();

    let err = solver.set_slave_potential_vector(&[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, NodalError::InvalidSlaveVector { expected: 3, actual: 2 }));

    solver.set_slave_potential_vector(&[1.0, 2.0, 3.0]).unwrap();
    solver.step(0.1).unwrap();
    assert_eq!(solver.potentials(), &[1.0, 2.0, 3.0]);
    assert_eq!(solver.potential(NodeId(2)), 3.0);

    solver.set_normal_mode();
    solver.step(0.1).unwrap();
    assert_relative_eq!(solver.potentials()[0], 30.0, epsilon = 1e-9);
}

// ── Counters and Restart ────────────────────────────────────────────

#[test]
fn test_counters_never_decrease() {
    let mut solver = solver_with(3, chain());
    let mut last = solver.since_init().clone();
    for _ in 0..5 {
        solver.step(0.1).unwrap();
        let now = solver.since_init().clone();
        assert!(now.major_step_count > last.major_step_count);
        assert!(now.minor_step_count >= last.minor_step_count);
        assert!(now.decomposition_count >= last.decomposition_count);
        last = now;
    }
    // Unchanged admittance is factored once
    assert_eq!(last.decomposition_count, 1);
    assert_eq!(last.max_minor_steps, 1);
    assert_relative_eq!(last.avg_minor_steps(), 1.0);
}

#[test]
fn test_restart_resets_only_since_restart() {
    let mut solver = solver_with(3, chain());
    solver.step(0.1).unwrap();
    solver.step(0.1).unwrap();
    let before = solver.potentials().to_vec();

    solver.restart().unwrap();
    assert_eq!(solver.since_init().major_step_count, 2);
    assert_eq!(solver.since_restart().major_step_count, 0);

    solver.restart().unwrap();
    solver.step(0.1).unwrap();
    assert_eq!(solver.since_restart().major_step_count, 1);
    assert_eq!(solver.since_restart().decomposition_count, 1);
    assert_eq!(solver.potentials(), before.as_slice());
}

#[test]
fn test_restart_before_initialize_fails() {
    let mut solver = NetworkSolver::new();
    assert!(matches!(solver.restart(), Err(NodalError::NotInitialized { .. })));
}
