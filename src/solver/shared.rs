//! Thread-shared access to a solver.

use std::sync::{Arc, RwLock};

use crate::error::{NodalError, Result};

use super::counters::PerformanceCounters;
use super::network_solver::{NetworkSolver, StepReport};

/// Copy of the solver outputs taken under the read lock.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialSnapshot {
    pub potentials: Vec<f64>,
    /// Island index of each node
    pub islands: Vec<usize>,
    pub counters: PerformanceCounters,
}

/// A [`NetworkSolver`] behind a read-write lock.
///
/// Stepping takes the write lock, so readers always see the potentials of a
/// whole major step.
#[derive(Clone)]
pub struct SharedSolver {
    inner: Arc<RwLock<NetworkSolver>>,
}

impl SharedSolver {
    pub fn new(solver: NetworkSolver) -> Self {
        Self {
            inner: Arc::new(RwLock::new(solver)),
        }
    }

    /// Run one major step under the write lock.
    pub fn step(&self, dt: f64) -> Result<StepReport> {
        let mut solver = self.inner.write().map_err(|_| NodalError::LockPoisoned)?;
        solver.step(dt)
    }

    /// Copy the current outputs under the read lock.
    pub fn snapshot(&self) -> Result<PotentialSnapshot> {
        let solver = self.inner.read().map_err(|_| NodalError::LockPoisoned)?;
        Ok(PotentialSnapshot {
            potentials: solver.potentials().to_vec(),
            islands: solver.islands_by_node().to_vec(),
            counters: solver.counters().clone(),
        })
    }

    /// Run `f` with exclusive access, e.g. to change modes between steps.
    pub fn with_solver<R>(&self, f: impl FnOnce(&mut NetworkSolver) -> R) -> Result<R> {
        let mut solver = self.inner.write().map_err(|_| NodalError::LockPoisoned)?;
        Ok(f(&mut solver))
    }
}
