//! # Nodal Core
//!
//! A general-purpose nodal network solver.
//!
//! A network is a set of nodes joined by links. Each link contributes a
//! small admittance matrix and source vector; the solver assembles them into
//! `[A]{x} = {b}`, factors `[A]` with a Cholesky decomposition and solves for
//! the node potentials `{x}` once per major step. Non-linear networks iterate
//! in minor steps until the potentials settle and every link accepts the
//! solution.
//!
//! ## Architecture
//!
//! - [`link`] - The [`Link`] contract every network element implements
//! - [`links`] - Reference links (conductor, capacitor, sources, diode, check valve)
//! - [`network`] - Nodes, identifiers and link validation
//! - [`solver`] - Assembly, islands, decomposition, convergence and the
//!   [`NetworkSolver`] orchestrator
//!
//! ## Usage
//!
//! ```
//! use nodal_core::links::{Conductor, FluxSource};
//! use nodal_core::{Link, NetworkSolver, NodeId, NodeList, SolverConfig};
//!
//! let mut solver = NetworkSolver::new();
//! solver.initialize_nodes(NodeList::with_count(1));
//! let links: Vec<Box<dyn Link>> = vec![
//!     Box::new(FluxSource::new("F", [NodeId::GROUND, NodeId(0)], 2.0)),
//!     Box::new(Conductor::new("G", [NodeId(0), NodeId::GROUND], 4.0)),
//! ];
//! solver.initialize(SolverConfig::new("example"), links)?;
//! solver.step(0.1)?;
//! assert!((solver.potential(NodeId(0)) - 0.5).abs() < 1e-12);
//! # Ok::<(), nodal_core::NodalError>(())
//! ```

pub mod error;
pub mod link;
pub mod links;
pub mod network;
pub mod solver;

// Re-export main types for convenience
pub use error::{NodalError, Result};
pub use link::{Link, Potentials, SolutionResult, StepContext};
pub use network::{LinkId, Node, NodeId, NodeList};
pub use solver::{
    GpuMode, IslandMode, NetworkSolver, SharedSolver, SolverConfig, StepCounters, StepOutcome, StepReport,
};
