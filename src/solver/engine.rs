//! Assembly, island bookkeeping, decomposition and solve for one network.

use crate::error::Result;
use crate::link::Link;
use crate::network::NodeList;

use super::decompose::{select_strategy, strategy_for, Factor, GpuMode};
use super::islands::{Island, IslandFinder, IslandMode};
use super::matrix::{
    apply_override_sources, apply_overrides, build_admittance_matrix, build_source_vector,
    clean_potential_vector, collect_overrides, condition_admittance_matrix, needs_admittance_rebuild,
    AdmittanceMatrix, SourceVector,
};
use super::{DEFAULT_GPU_SIZE_THRESHOLD, POTENTIAL_EPSILON};

/// Result of one decomposition pass over all solve groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompositionPass {
    /// Groups that were factored
    pub groups: usize,
    /// Groups whose factorization failed
    pub failures: usize,
}

/// Owns `[A]`, `{b}`, `{x}` and the cached factorizations of a network.
#[derive(Debug)]
pub struct SolveEngine {
    pub(crate) admittance: AdmittanceMatrix,
    pub(crate) source: SourceVector,
    pub(crate) potential: Vec<f64>,
    islands: IslandFinder,
    /// All nodes as one group, used unless islands are solved separately
    whole: Vec<Island>,
    /// One factor per solve group, `None` when that group failed
    factors: Vec<Option<Box<dyn Factor>>>,
    factors_valid: bool,
    built: bool,
    islands_fresh: bool,
    overridden: Vec<usize>,
    island_mode: IslandMode,
    gpu_mode: GpuMode,
    gpu_threshold: usize,
    decompositions_this_step: u32,
}

impl SolveEngine {
    /// Allocate all arrays for a network of `size` nodes.
    pub fn new(size: usize) -> Self {
        Self {
            admittance: AdmittanceMatrix::new(size),
            source: SourceVector::new(size),
            potential: vec![0.0; size],
            islands: IslandFinder::new(size),
            whole: vec![Island {
                nodes: (0..size).collect(),
            }],
            factors: Vec::new(),
            factors_valid: false,
            built: false,
            islands_fresh: false,
            overridden: Vec::new(),
            island_mode: IslandMode::Off,
            gpu_mode: GpuMode::Off,
            gpu_threshold: DEFAULT_GPU_SIZE_THRESHOLD,
            decompositions_this_step: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.admittance.size
    }

    /// Re-derive buffers for `size` nodes and force a full rebuild on the
    /// next assembly. Potentials survive when the size is unchanged.
    pub fn restart(&mut self, size: usize) {
        if size != self.size() {
            let modes = (self.island_mode, self.gpu_mode, self.gpu_threshold);
            *self = Self::new(size);
            (self.island_mode, self.gpu_mode, self.gpu_threshold) = modes;
        }
        self.invalidate();
        self.built = false;
    }

    pub fn set_island_mode(&mut self, mode: IslandMode) {
        if mode != self.island_mode {
            self.island_mode = mode;
            self.islands_fresh = false;
            self.invalidate();
        }
    }

    pub fn island_mode(&self) -> IslandMode {
        self.island_mode
    }

    pub fn set_gpu_options(&mut self, mode: GpuMode, threshold: usize) {
        self.gpu_mode = mode;
        self.gpu_threshold = threshold;
        self.invalidate();
    }

    pub fn gpu_options(&self) -> (GpuMode, usize) {
        (self.gpu_mode, self.gpu_threshold)
    }

    /// Drop cached factorizations.
    pub fn invalidate(&mut self) {
        self.factors.clear();
        self.factors_valid = false;
    }

    pub fn begin_major_step(&mut self) {
        self.decompositions_this_step = 0;
        self.islands_fresh = false;
    }

    pub fn decompositions_this_step(&self) -> u32 {
        self.decompositions_this_step
    }

    /// Assemble `[A]` (when something changed) and `{b}`.
    ///
    /// Returns whether the admittance matrix was rebuilt.
    pub fn assemble(&mut self, links: &[Box<dyn Link>], nodes: &NodeList) -> Result<bool> {
        let overridden = collect_overrides(links);
        let rebuild = !self.built || needs_admittance_rebuild(links) || overridden != self.overridden;

        if rebuild {
            build_admittance_matrix(links, &mut self.admittance)?;
            apply_overrides(&mut self.admittance, &overridden);
            condition_admittance_matrix(&mut self.admittance);
            self.overridden = overridden;
            self.built = true;
            self.invalidate();
            self.refresh_islands();
        } else if !self.islands_fresh {
            self.refresh_islands();
        }

        build_source_vector(links, &mut self.source)?;
        apply_override_sources(&self.admittance, &mut self.source, nodes);
        Ok(rebuild)
    }

    fn refresh_islands(&mut self) {
        let size = self.size();
        match self.island_mode {
            IslandMode::Off => self.islands.single(size),
            IslandMode::Find | IslandMode::Solve => self.islands.build(&self.admittance),
        }
        self.islands_fresh = true;
    }

    fn groups(&self) -> &[Island] {
        match self.island_mode {
            IslandMode::Solve => self.islands.islands(),
            IslandMode::Off | IslandMode::Find => &self.whole,
        }
    }

    pub fn needs_decomposition(&self) -> bool {
        !self.factors_valid
    }

    /// Factor every solve group. Failed groups keep no factor, so their
    /// potentials stay at the last good values.
    pub fn decompose(&mut self) -> DecompositionPass {
        let mut factors = Vec::with_capacity(self.groups().len());
        let mut pass = DecompositionPass::default();

        for (index, group) in self.groups().iter().enumerate() {
            let size = group.len();
            let strategy = select_strategy(self.gpu_mode, size, self.gpu_threshold);
            let sub = if group.len() == self.size() {
                self.admittance.a.clone()
            } else {
                self.admittance.sub_matrix(&group.nodes)
            };

            pass.groups += 1;
            match strategy_for(strategy).decompose(&sub, size) {
                Ok(factor) => {
                    tracing::debug!(island = index, size, %strategy, "decomposed");
                    factors.push(Some(factor));
                }
                Err(e) => {
                    tracing::warn!(island = index, size, %strategy, error = %e, "decomposition failed");
                    pass.failures += 1;
                    factors.push(None);
                }
            }
        }

        self.factors = factors;
        self.factors_valid = true;
        self.decompositions_this_step += 1;
        pass
    }

    /// Solve every factored group into the potential vector.
    ///
    /// Returns the number of groups solved. Zero means no potential moved.
    pub fn solve(&mut self) -> usize {
        let mut solved = 0;
        let mut b = Vec::new();
        let mut x = Vec::new();
        let groups = match self.island_mode {
            IslandMode::Solve => self.islands.islands(),
            IslandMode::Off | IslandMode::Find => &self.whole,
        };

        for (group, factor) in groups.iter().zip(&self.factors) {
            let Some(factor) = factor else { continue };
            b.clear();
            b.extend(group.nodes.iter().map(|&n| self.source.b[n]));
            x.clear();
            x.resize(group.len(), 0.0);
            factor.solve(&b, &mut x);
            for (&node, &value) in group.nodes.iter().zip(&x) {
                self.potential[node] = value;
            }
            solved += 1;
        }
        clean_potential_vector(&mut self.potential, POTENTIAL_EPSILON);
        solved
    }

    /// Potential response of every node to `flux` injected at `node`,
    /// using the current factorization.
    pub fn flux_response(&self, node: usize, flux: f64) -> Option<Vec<f64>> {
        if !self.factors_valid || node >= self.size() {
            return None;
        }
        let groups = self.groups();
        let index = match self.island_mode {
            IslandMode::Solve => self.islands.island_of(node)?,
            IslandMode::Off | IslandMode::Find => 0,
        };
        let group = groups.get(index)?;
        let factor = self.factors.get(index)?.as_ref()?;

        let b: Vec<f64> = group
            .nodes
            .iter()
            .map(|&n| if n == node { flux } else { 0.0 })
            .collect();
        let mut x = vec![0.0; group.len()];
        factor.solve(&b, &mut x);

        let mut response = vec![0.0; self.size()];
        for (&n, &value) in group.nodes.iter().zip(&x) {
            response[n] = value;
        }
        Some(response)
    }

    pub fn islands(&self) -> &IslandFinder {
        &self.islands
    }

    pub fn admittance(&self) -> &AdmittanceMatrix {
        &self.admittance
    }

    pub fn source(&self) -> &SourceVector {
        &self.source
    }

    pub fn potential(&self) -> &[f64] {
        &self.potential
    }
}
