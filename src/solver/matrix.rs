//! Admittance matrix and source vector assembly.

use crate::error::Result;
use crate::link::Link;
use crate::network::{validate_node_map, validate_port_sizes, NodeId, NodeList};

use super::MIN_ADMITTANCE;

/// Global admittance matrix `[A]` (dense, row-major, symmetric).
#[derive(Debug, Clone)]
pub struct AdmittanceMatrix {
    /// Matrix entries (row-major)
    pub a: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// Couplings removed from non-overridden rows by [`apply_overrides`],
    /// as `(row, overridden node, admittance)`
    override_couplings: Vec<(usize, usize, f64)>,
    /// Overridden nodes
    overridden: Vec<usize>,
}

impl AdmittanceMatrix {
    /// Create a zero matrix of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            size,
            override_couplings: Vec::new(),
            overridden: Vec::new(),
        }
    }

    /// Clear the matrix to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.override_couplings.clear();
        self.overridden.clear();
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Set matrix element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] = value;
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add one link's sub-matrix at the rows/columns of its node map.
    /// Ground ports are skipped.
    pub fn stamp_link(&mut self, link: &dyn Link) {
        let ports = link.num_ports();
        let admittance = link.admittance();
        let map = link.node_map();

        for (p, row_node) in map.iter().enumerate() {
            let Some(row) = row_node.index() else { continue };
            for (q, col_node) in map.iter().enumerate() {
                let Some(col) = col_node.index() else { continue };
                self.add(row, col, admittance[p * ports + q]);
            }
        }
    }

    /// Whether `A[i][j] == A[j][i]` for every pair, within `tolerance`.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                if (self.get(i, j) - self.get(j, i)).abs() > tolerance {
                    return false;
                }
            }
        }
        true
    }

    /// Dense copy of the sub-matrix formed by `nodes` rows and columns.
    pub fn sub_matrix(&self, nodes: &[usize]) -> Vec<f64> {
        let n = nodes.len();
        let mut sub = vec![0.0; n * n];
        for (r, &row) in nodes.iter().enumerate() {
            for (c, &col) in nodes.iter().enumerate() {
                sub[r * n + c] = self.get(row, col);
            }
        }
        sub
    }

    /// Number of nonzero entries.
    pub fn nonzeros(&self) -> usize {
        self.a.iter().filter(|v| **v != 0.0).count()
    }

    /// Overridden nodes recorded by the last [`apply_overrides`].
    pub fn overridden(&self) -> &[usize] {
        &self.overridden
    }
}

/// Global source vector `{b}`.
#[derive(Debug, Clone)]
pub struct SourceVector {
    pub b: Vec<f64>,
}

impl SourceVector {
    pub fn new(size: usize) -> Self {
        Self { b: vec![0.0; size] }
    }

    pub fn clear(&mut self) {
        self.b.fill(0.0);
    }

    /// Add one link's source contribution.
    pub fn stamp_link(&mut self, link: &dyn Link) {
        for (node, value) in link.node_map().iter().zip(link.source()) {
            if let Some(row) = node.index() {
                self.b[row] += value;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }
}

/// Zero `matrix` and accumulate every link's admittance contribution.
///
/// Slice sizes are checked again here since links may change them after
/// initialization.
pub fn build_admittance_matrix(links: &[Box<dyn Link>], matrix: &mut AdmittanceMatrix) -> Result<()> {
    matrix.clear();
    for link in links {
        validate_port_sizes(link.as_ref())?;
        validate_node_map(link.as_ref(), matrix.size)?;
        matrix.stamp_link(link.as_ref());
    }
    Ok(())
}

/// Zero `source` and accumulate every link's source contribution.
pub fn build_source_vector(links: &[Box<dyn Link>], source: &mut SourceVector) -> Result<()> {
    source.clear();
    let size = source.len();
    for link in links {
        validate_port_sizes(link.as_ref())?;
        validate_node_map(link.as_ref(), size)?;
        source.stamp_link(link.as_ref());
    }
    Ok(())
}

/// Whether any link changed its admittance since the last build.
pub fn needs_admittance_rebuild(links: &[Box<dyn Link>]) -> bool {
    links.iter().any(|link| link.needs_admittance_update())
}

/// Sorted list of nodes some link currently overrides.
pub fn collect_overrides(links: &[Box<dyn Link>]) -> Vec<usize> {
    let mut nodes: Vec<usize> = links
        .iter()
        .flat_map(|link| {
            link.node_map()
                .iter()
                .zip(link.overrides())
                .filter(|(_, fixed)| **fixed)
                .filter_map(|(node, _)| node.index())
                .collect::<Vec<_>>()
        })
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

/// Decouple overridden nodes from the matrix.
///
/// Row and column of each overridden node become the identity, so the solve
/// returns its fixed potential. The removed couplings are remembered so that
/// [`apply_override_sources`] can move them onto the source vector; the
/// matrix stays symmetric. `overridden` must be sorted.
pub fn apply_overrides(matrix: &mut AdmittanceMatrix, overridden: &[usize]) {
    matrix.override_couplings.clear();
    matrix.overridden.clear();
    let n = matrix.size;

    for &node in overridden {
        for row in 0..n {
            if row == node || overridden.binary_search(&row).is_ok() {
                continue;
            }
            let coupling = matrix.get(row, node);
            if coupling != 0.0 {
                matrix.override_couplings.push((row, node, coupling));
            }
        }
        for k in 0..n {
            matrix.set(node, k, 0.0);
            matrix.set(k, node, 0.0);
        }
        matrix.set(node, node, 1.0);
        matrix.overridden.push(node);
    }
}

/// Apply the override couplings recorded in `matrix` to a freshly built
/// source vector, fixing each overridden node at its current node potential.
pub fn apply_override_sources(matrix: &AdmittanceMatrix, source: &mut SourceVector, nodes: &NodeList) {
    for &(row, node, coupling) in &matrix.override_couplings {
        source.b[row] -= coupling * nodes.potential(NodeId(node));
    }
    for &node in &matrix.overridden {
        source.b[node] = nodes.potential(NodeId(node));
    }
}

/// Correct foreseeable causes of ill-conditioning before decomposition.
///
/// - Averages `A[i][j]` and `A[j][i]` to remove assembly round-off asymmetry
/// - Drops off-diagonals negligible next to the larger of their diagonals
/// - Gives isolated nodes (non-positive diagonal) a tiny self-admittance
pub fn condition_admittance_matrix(matrix: &mut AdmittanceMatrix) {
    let n = matrix.size;
    for i in 0..n {
        for j in (i + 1)..n {
            let mut avg = 0.5 * (matrix.get(i, j) + matrix.get(j, i));
            let scale = matrix.get(i, i).abs().max(matrix.get(j, j).abs());
            if avg.abs() < f64::EPSILON * scale {
                avg = 0.0;
            }
            matrix.set(i, j, avg);
            matrix.set(j, i, avg);
        }
    }

    for i in 0..n {
        if matrix.get(i, i) < MIN_ADMITTANCE {
            let off_diagonal = (0..n)
                .filter(|&j| j != i)
                .any(|j| matrix.get(i, j) != 0.0);
            if !off_diagonal {
                matrix.set(i, i, MIN_ADMITTANCE);
            }
        }
    }
}

/// Snap potentials within `epsilon` of zero to exactly zero.
pub fn clean_potential_vector(potential: &mut [f64], epsilon: f64) {
    for x in potential.iter_mut() {
        if x.abs() < epsilon {
            *x = 0.0;
        }
    }
}

/// Largest `|A x - b|` over all rows.
pub fn residual(matrix: &AdmittanceMatrix, potential: &[f64], source: &[f64]) -> f64 {
    let n = matrix.size;
    let mut max_residual = 0.0f64;
    for i in 0..n {
        let row: f64 = (0..n).map(|j| matrix.get(i, j) * potential[j]).sum();
        max_residual = max_residual.max((row - source[i]).abs());
    }
    max_residual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{Conductor, FluxSource};
    use crate::network::NodeId;

    fn links() -> Vec<Box<dyn Link>> {
        vec![
            Box::new(Conductor::new("G01", [NodeId(0), NodeId(1)], 2.0)),
            Box::new(Conductor::new("G12", [NodeId(1), NodeId(2)], 0.5)),
            Box::new(Conductor::new("G2g", [NodeId(2), NodeId::GROUND], 1.0)),
            Box::new(FluxSource::new("F0", [NodeId::GROUND, NodeId(0)], 3.0)),
        ]
    }

    #[test]
    fn test_assembly_accumulates_shared_nodes() {
        let mut matrix = AdmittanceMatrix::new(3);
        build_admittance_matrix(&links(), &mut matrix).unwrap();

        assert_eq!(matrix.get(0, 0), 2.0);
        assert_eq!(matrix.get(1, 1), 2.5);
        assert_eq!(matrix.get(2, 2), 1.5);
        assert_eq!(matrix.get(0, 1), -2.0);
        assert_eq!(matrix.get(1, 2), -0.5);
        assert_eq!(matrix.get(0, 2), 0.0);
        assert!(matrix.is_symmetric(0.0));
    }

    #[test]
    fn test_source_assembly_skips_ground() {
        let mut source = SourceVector::new(3);
        build_source_vector(&links(), &mut source).unwrap();
        assert_eq!(source.b, vec![3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_malformed_node_map_is_fatal() {
        let bad: Vec<Box<dyn Link>> =
            vec![Box::new(Conductor::new("G", [NodeId(0), NodeId(7)], 1.0))];
        let mut matrix = AdmittanceMatrix::new(2);
        assert!(build_admittance_matrix(&bad, &mut matrix).is_err());
    }

    /// Two ports but a one-entry admittance.
    struct Truncated {
        nodes: [NodeId; 2],
    }

    impl Link for Truncated {
        fn name(&self) -> &str {
            "truncated"
        }

        fn admittance(&self) -> &[f64] {
            &[1.0]
        }

        fn source(&self) -> &[f64] {
            &[0.0, 0.0]
        }

        fn node_map(&self) -> &[NodeId] {
            &self.nodes
        }

        fn needs_admittance_update(&self) -> bool {
            true
        }

        fn step(&mut self, _ctx: &crate::link::StepContext<'_>) {}
    }

    #[test]
    fn test_wrong_slice_size_is_an_error_not_a_panic() {
        let bad: Vec<Box<dyn Link>> = vec![Box::new(Truncated {
            nodes: [NodeId(0), NodeId(1)],
        })];
        let mut matrix = AdmittanceMatrix::new(2);
        let err = build_admittance_matrix(&bad, &mut matrix).unwrap_err();
        assert!(matches!(
            err,
            crate::error::NodalError::PortSizeMismatch { ports: 2, len: 1, .. }
        ));
    }

    #[test]
    fn test_override_keeps_symmetry_and_moves_coupling() {
        let mut matrix = AdmittanceMatrix::new(3);
        build_admittance_matrix(&links(), &mut matrix).unwrap();
        let mut nodes = NodeList::with_count(3);
        nodes.get_mut(NodeId(1)).unwrap().potential = 4.0;

        apply_overrides(&mut matrix, &[1]);
        assert!(matrix.is_symmetric(0.0));
        assert_eq!(matrix.get(1, 1), 1.0);
        assert_eq!(matrix.get(0, 1), 0.0);

        let mut source = SourceVector::new(3);
        build_source_vector(&links(), &mut source).unwrap();
        apply_override_sources(&matrix, &mut source, &nodes);
        // row 0: 3 - (-2 * 4), row 2: 0 - (-0.5 * 4)
        assert_eq!(source.b, vec![11.0, 4.0, 2.0]);
    }

    #[test]
    fn test_conditioning_fixes_isolated_node() {
        let mut matrix = AdmittanceMatrix::new(2);
        matrix.set(0, 0, 1.0);
        matrix.set(0, 1, 1e-300);
        matrix.set(1, 0, 0.0);
        condition_admittance_matrix(&mut matrix);

        assert_eq!(matrix.get(1, 1), MIN_ADMITTANCE);
        assert_eq!(matrix.get(0, 1), 0.0);
        assert!(matrix.is_symmetric(0.0));
    }

    #[test]
    fn test_clean_potential_vector() {
        let mut x = vec![1e-20, -1e-19, 0.5, -2.0];
        clean_potential_vector(&mut x, 1e-16);
        assert_eq!(x, vec![0.0, 0.0, 0.5, -2.0]);
    }

    #[test]
    fn test_sub_matrix_extracts_rows_and_columns() {
        let mut matrix = AdmittanceMatrix::new(3);
        build_admittance_matrix(&links(), &mut matrix).unwrap();
        let sub = matrix.sub_matrix(&[1, 2]);
        assert_eq!(sub, vec![2.5, -0.5, -0.5, 1.5]);
    }
}
