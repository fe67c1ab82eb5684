//! Symmetric positive-definite decomposition and solve.
//!
//! Three strategies share the [`DecompositionStrategy`] interface:
//!
//! - [`CpuCholesky`]: in-place Cholesky on the row-major slice
//! - [`DenseCholesky`]: dense offload backend (nalgebra)
//! - [`SparseCholesky`]: sparse offload backend (nalgebra-sparse, CSC)
//!
//! [`select_strategy`] picks one from the configured [`GpuMode`], the island
//! size and the size threshold. Every strategy completes its factorization
//! before `decompose()` returns.

use std::fmt;

use nalgebra::{DMatrix, DVector, Dyn};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::error::{NodalError, Result};

use super::PIVOT_RATIO_LIMIT;

/// Offload configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuMode {
    /// Always decompose on the CPU
    #[default]
    Off,
    /// Dense offload for islands at or above the threshold
    Dense,
    /// Sparse offload for islands at or above the threshold
    Sparse,
}

/// Which decomposition strategy produced a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Cpu,
    GpuDense,
    GpuSparse,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Cpu => write!(f, "cpu"),
            Strategy::GpuDense => write!(f, "gpu-dense"),
            Strategy::GpuSparse => write!(f, "gpu-sparse"),
        }
    }
}

/// A completed factorization of one matrix.
pub trait Factor: Send + Sync + fmt::Debug {
    /// Dimension of the factored matrix.
    fn size(&self) -> usize;

    /// Strategy that produced this factor.
    fn strategy(&self) -> Strategy;

    /// Solve `A x = b` for `x`.
    fn solve(&self, b: &[f64], x: &mut [f64]);
}

/// A way of factoring a symmetric positive-definite matrix.
pub trait DecompositionStrategy: Sync {
    fn kind(&self) -> Strategy;

    /// Factor the row-major `size x size` matrix `a`.
    fn decompose(&self, a: &[f64], size: usize) -> Result<Box<dyn Factor>>;
}

/// Pick the strategy for an island of `size` nodes.
///
/// Offload is only used when enabled and `size >= threshold`.
pub fn select_strategy(mode: GpuMode, size: usize, threshold: usize) -> Strategy {
    match mode {
        GpuMode::Off => Strategy::Cpu,
        _ if size < threshold => Strategy::Cpu,
        GpuMode::Dense => Strategy::GpuDense,
        GpuMode::Sparse => Strategy::GpuSparse,
    }
}

/// The shared instance implementing `kind`.
pub fn strategy_for(kind: Strategy) -> &'static dyn DecompositionStrategy {
    static CPU: CpuCholesky = CpuCholesky;
    static DENSE: DenseCholesky = DenseCholesky;
    static SPARSE: SparseCholesky = SparseCholesky;
    match kind {
        Strategy::Cpu => &CPU,
        Strategy::GpuDense => &DENSE,
        Strategy::GpuSparse => &SPARSE,
    }
}

/// Reject pivots that lost almost all of their original diagonal.
fn check_pivot(pivot_sq: f64, diagonal: f64, row: usize, size: usize) -> Result<()> {
    if !pivot_sq.is_finite() || pivot_sq <= 0.0 || pivot_sq <= PIVOT_RATIO_LIMIT * diagonal.abs() {
        return Err(NodalError::decomposition_failed(
            size,
            format!("matrix is not positive definite at row {row} (pivot {pivot_sq:.3e})"),
        ));
    }
    Ok(())
}

fn check_dimensions(a: &[f64], size: usize) -> Result<()> {
    if a.len() != size * size {
        return Err(NodalError::decomposition_failed(
            size,
            format!("expected {} entries, got {}", size * size, a.len()),
        ));
    }
    Ok(())
}

// ============ CPU ============

/// In-place Cholesky decomposition `A = L Lᵗ`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCholesky;

/// Lower-triangular Cholesky factor, row-major.
#[derive(Debug, Clone)]
pub struct CpuFactor {
    l: Vec<f64>,
    size: usize,
}

impl DecompositionStrategy for CpuCholesky {
    fn kind(&self) -> Strategy {
        Strategy::Cpu
    }

    fn decompose(&self, a: &[f64], size: usize) -> Result<Box<dyn Factor>> {
        check_dimensions(a, size)?;
        let n = size;
        let mut l = vec![0.0; n * n];

        for j in 0..n {
            let mut d = a[j * n + j];
            for k in 0..j {
                d -= l[j * n + k] * l[j * n + k];
            }
            check_pivot(d, a[j * n + j], j, n)?;
            let pivot = d.sqrt();
            l[j * n + j] = pivot;

            for i in (j + 1)..n {
                let mut s = a[i * n + j];
                for k in 0..j {
                    s -= l[i * n + k] * l[j * n + k];
                }
                l[i * n + j] = s / pivot;
            }
        }

        Ok(Box::new(CpuFactor { l, size }))
    }
}

impl Factor for CpuFactor {
    fn size(&self) -> usize {
        self.size
    }

    fn strategy(&self) -> Strategy {
        Strategy::Cpu
    }

    fn solve(&self, b: &[f64], x: &mut [f64]) {
        let n = self.size;
        let l = &self.l;

        // Forward substitution (L y = b)
        for i in 0..n {
            let mut s = b[i];
            for k in 0..i {
                s -= l[i * n + k] * x[k];
            }
            x[i] = s / l[i * n + i];
        }

        // Back substitution (Lᵗ x = y)
        for i in (0..n).rev() {
            let mut s = x[i];
            for k in (i + 1)..n {
                s -= l[k * n + i] * x[k];
            }
            x[i] = s / l[i * n + i];
        }
    }
}

// ============ Dense offload ============

/// Dense Cholesky through nalgebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseCholesky;

pub struct DenseFactor {
    cholesky: nalgebra::Cholesky<f64, Dyn>,
    size: usize,
}

impl fmt::Debug for DenseFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseFactor").field("size", &self.size).finish()
    }
}

impl DecompositionStrategy for DenseCholesky {
    fn kind(&self) -> Strategy {
        Strategy::GpuDense
    }

    fn decompose(&self, a: &[f64], size: usize) -> Result<Box<dyn Factor>> {
        check_dimensions(a, size)?;
        let matrix = DMatrix::from_row_slice(size, size, a);
        let cholesky = matrix.cholesky().ok_or_else(|| {
            NodalError::decomposition_failed(size, "dense factorization found a non-positive pivot")
        })?;

        let l = cholesky.l_dirty();
        for j in 0..size {
            let pivot = l[(j, j)];
            check_pivot(pivot * pivot, a[j * size + j], j, size)?;
        }

        Ok(Box::new(DenseFactor { cholesky, size }))
    }
}

impl Factor for DenseFactor {
    fn size(&self) -> usize {
        self.size
    }

    fn strategy(&self) -> Strategy {
        Strategy::GpuDense
    }

    fn solve(&self, b: &[f64], x: &mut [f64]) {
        let rhs = DVector::from_column_slice(&b[..self.size]);
        let solution = self.cholesky.solve(&rhs);
        x[..self.size].copy_from_slice(solution.as_slice());
    }
}

// ============ Sparse offload ============

/// Sparse Cholesky through nalgebra-sparse.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCholesky;

pub struct SparseFactor {
    cholesky: CscCholesky<f64>,
    size: usize,
}

impl fmt::Debug for SparseFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseFactor")
            .field("size", &self.size)
            .field("factor_nnz", &self.cholesky.l().nnz())
            .finish()
    }
}

impl DecompositionStrategy for SparseCholesky {
    fn kind(&self) -> Strategy {
        Strategy::GpuSparse
    }

    fn decompose(&self, a: &[f64], size: usize) -> Result<Box<dyn Factor>> {
        check_dimensions(a, size)?;
        let mut coo = CooMatrix::new(size, size);
        for row in 0..size {
            for col in 0..size {
                let value = a[row * size + col];
                if value != 0.0 {
                    coo.push(row, col, value);
                }
            }
        }
        let csc = CscMatrix::from(&coo);

        let cholesky = CscCholesky::factor(&csc).map_err(|e| {
            NodalError::decomposition_failed(size, format!("sparse factorization failed: {e:?}"))
        })?;

        for (row, col, value) in cholesky.l().triplet_iter() {
            if row == col {
                check_pivot(value * value, a[row * size + row], row, size)?;
            }
        }

        Ok(Box::new(SparseFactor { cholesky, size }))
    }
}

impl Factor for SparseFactor {
    fn size(&self) -> usize {
        self.size
    }

    fn strategy(&self) -> Strategy {
        Strategy::GpuSparse
    }

    fn solve(&self, b: &[f64], x: &mut [f64]) {
        let mut rhs = DMatrix::from_column_slice(self.size, 1, &b[..self.size]);
        self.cholesky.solve_mut(&mut rhs);
        x[..self.size].copy_from_slice(rhs.as_slice());
    }
}
