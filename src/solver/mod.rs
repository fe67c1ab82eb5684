//! Nodal network solver.
//!
//! Each major step solves `[A]{x} = {b}` where:
//! - `[A]` is the symmetric admittance matrix stamped by the links
//! - `{b}` is the source vector of fluxes into each node
//! - `{x}` is the vector of node potentials
//!
//! Ground is implicit and never appears in the system. Non-linear networks
//! repeat the assemble/decompose/solve cycle in minor steps until the
//! potentials settle and every link accepts the solution.

mod config;
mod convergence;
mod counters;
mod decompose;
mod engine;
mod islands;
mod matrix;
mod network_solver;
mod shared;

pub use config::SolverConfig;
pub use convergence::{
    ConvergenceController, ConvergenceReport, ConvergenceState, FailReason, MajorStepInput, MinorStepState,
    StepOutcome,
};
pub use counters::{PerformanceCounters, StepCounters, Timing};
pub use decompose::{
    select_strategy, strategy_for, CpuCholesky, DecompositionStrategy, DenseCholesky, Factor, GpuMode, SparseCholesky,
    Strategy,
};
pub use engine::{DecompositionPass, SolveEngine};
pub use islands::{Island, IslandFinder, IslandMode};
pub use matrix::{
    apply_override_sources, apply_overrides, build_admittance_matrix, build_source_vector, clean_potential_vector,
    collect_overrides, condition_admittance_matrix, needs_admittance_rebuild, residual, AdmittanceMatrix,
    SourceVector,
};
pub use network_solver::{NetworkSolver, RunMode, SolverMode, StepReport};
pub use shared::{PotentialSnapshot, SharedSolver};

/// Diagonal given to nodes with no admittance so the matrix stays positive
/// definite.
pub const MIN_ADMITTANCE: f64 = 1e-12;

/// Smallest allowed ratio of a Cholesky pivot to its original diagonal.
pub const PIVOT_RATIO_LIMIT: f64 = 1e-14;

/// Solved potentials smaller than this in magnitude are set to zero.
pub const POTENTIAL_EPSILON: f64 = f64::EPSILON;

/// Island size at which offload decomposition is used by default.
pub const DEFAULT_GPU_SIZE_THRESHOLD: usize = 100;

pub const DEFAULT_CONVERGENCE_TOLERANCE: f64 = 1e-6;

pub const DEFAULT_MIN_LINEARIZATION_POTENTIAL: f64 = 1e-6;

pub const DEFAULT_MINOR_STEP_LIMIT: u32 = 10;

pub const DEFAULT_DECOMPOSITION_LIMIT: u32 = 10;
