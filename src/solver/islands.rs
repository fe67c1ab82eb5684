//! Connectivity islands of the admittance matrix.
//!
//! Two nodes share an island when a chain of nonzero off-diagonal
//! admittances connects them. Islands can be decomposed independently, which
//! keeps factorizations small when the network is sparse or split apart by
//! closed valves, open switches and the like.

use std::mem;

use super::matrix::AdmittanceMatrix;

/// How the solver uses islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IslandMode {
    /// The whole network is one island
    #[default]
    Off,
    /// Islands are found and published, the whole matrix is solved at once
    Find,
    /// Islands are found and each one is decomposed and solved on its own
    Solve,
}

/// One connected set of nodes, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    pub nodes: Vec<usize>,
}

impl Island {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Partitions the node set into islands.
///
/// Island ids are node indices: an island is identified by its lowest node,
/// because merges always move the higher id into the lower one.
#[derive(Debug, Clone)]
pub struct IslandFinder {
    /// Island id of each node
    node_island: Vec<usize>,
    /// Members of each island id, empty once merged away
    members: Vec<Vec<usize>>,
    /// Non-empty islands ordered by lowest node
    islands: Vec<Island>,
    /// Index into `islands` for each node
    island_index: Vec<usize>,
}

impl IslandFinder {
    /// Create a finder for `size` nodes, initially one island.
    pub fn new(size: usize) -> Self {
        let mut finder = Self {
            node_island: Vec::with_capacity(size),
            members: Vec::with_capacity(size),
            islands: Vec::new(),
            island_index: vec![0; size],
        };
        finder.single(size);
        finder
    }

    /// Put every node in its own island.
    fn reset(&mut self, size: usize) {
        self.node_island.clear();
        self.node_island.extend(0..size);
        self.members.clear();
        self.members.extend((0..size).map(|n| vec![n]));
    }

    /// Treat the whole network as one island (island mode off).
    pub fn single(&mut self, size: usize) {
        self.reset(size);
        for from in 1..size {
            self.merge_islands(from, 0);
        }
        self.compact();
    }

    /// Find islands from the nonzero structure of `matrix`.
    pub fn build(&mut self, matrix: &AdmittanceMatrix) {
        let n = matrix.size;
        self.reset(n);

        for i in 0..n {
            for j in (i + 1)..n {
                if matrix.get(i, j) == 0.0 && matrix.get(j, i) == 0.0 {
                    continue;
                }
                let a = self.node_island[i];
                let b = self.node_island[j];
                if a != b {
                    self.merge_islands(a.max(b), a.min(b));
                }
            }
        }
        self.compact();
    }

    /// Move every node of island `from` into island `to`.
    ///
    /// Merging an island into itself, or merging an island that is already
    /// empty, does nothing.
    pub fn merge_islands(&mut self, from: usize, to: usize) {
        if from == to || from >= self.members.len() || to >= self.members.len() {
            return;
        }
        let moved = mem::take(&mut self.members[from]);
        for &node in &moved {
            self.node_island[node] = to;
        }
        self.members[to].extend(moved);
    }

    /// Rebuild the published island list from the merge state.
    fn compact(&mut self) {
        self.islands.clear();
        self.island_index.resize(self.node_island.len(), 0);
        for members in self.members.iter().filter(|m| !m.is_empty()) {
            let mut nodes = members.clone();
            nodes.sort_unstable();
            let index = self.islands.len();
            for &node in &nodes {
                self.island_index[node] = index;
            }
            self.islands.push(Island { nodes });
        }
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Size of the largest island.
    pub fn largest_island_size(&self) -> usize {
        self.islands.iter().map(Island::len).max().unwrap_or(0)
    }

    /// Island number of `node` in [`islands`](Self::islands).
    pub fn island_of(&self, node: usize) -> Option<usize> {
        self.island_index.get(node).copied()
    }

    /// Node to island-number map.
    pub fn node_islands(&self) -> &[usize] {
        &self.island_index
    }
}
