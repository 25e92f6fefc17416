//! Narrow linear-algebra surface used by the fusion and partitioning stages.
//!
//! Everything library-specific (nalgebra's symmetric eigensolver and SVD)
//! stays behind these functions so the graph logic only sees plain
//! `DMatrix<f64>` values, `Vec<f64>` spectra and [`Result`].

use log::trace;
use nalgebra::{DMatrix, SymmetricEigen, SVD};

use crate::error::{OmicsNetError, Result};

pub const EIGEN_EPS: f64 = 1e-12;
pub const EIGEN_MAX_ITERS: usize = 10_000;

/// Eigenpairs of a symmetric matrix, ascending by eigenvalue.
#[derive(Debug, Clone)]
pub struct EigenPairs {
    pub values: Vec<f64>,
    /// Column `c` is the eigenvector for `values[c]`.
    pub vectors: DMatrix<f64>,
}

/// Decompose a symmetric matrix and sort the pairs.
///
/// `by_magnitude` orders by |λ| instead of λ. Ties keep the solver's column
/// order, so the output is reproducible for identical inputs.
pub fn symmetric_eigen(m: &DMatrix<f64>, by_magnitude: bool) -> Result<EigenPairs> {
    if !m.is_square() {
        return Err(OmicsNetError::mismatch("eigen input columns", m.nrows(), m.ncols()));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(OmicsNetError::NumericalFailure(
            "eigendecomposition input contains non-finite values".into(),
        ));
    }

    let eig = SymmetricEigen::try_new(m.clone(), EIGEN_EPS, EIGEN_MAX_ITERS).ok_or_else(|| {
        OmicsNetError::NumericalFailure(format!(
            "symmetric eigendecomposition of {}×{} matrix did not converge",
            m.nrows(),
            m.ncols()
        ))
    })?;

    let key = |v: f64| if by_magnitude { v.abs() } else { v };
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        key(eig.eigenvalues[a])
            .total_cmp(&key(eig.eigenvalues[b]))
            .then(a.cmp(&b))
    });

    let values: Vec<f64> = order.iter().map(|&c| eig.eigenvalues[c]).collect();
    let vectors = DMatrix::from_fn(m.nrows(), order.len(), |r, c| {
        eig.eigenvectors[(r, order[c])]
    });
    trace!("eigenvalues (sorted): {:?}", values);

    Ok(EigenPairs { values, vectors })
}

/// Thin SVD `m = U Σ Vᵀ`; returns `(U, σ, Vᵀ)`.
pub fn svd(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<f64>, DMatrix<f64>)> {
    let dec = SVD::try_new(m.clone(), true, true, EIGEN_EPS, EIGEN_MAX_ITERS).ok_or_else(|| {
        OmicsNetError::NumericalFailure(format!(
            "SVD of {}×{} matrix did not converge",
            m.nrows(),
            m.ncols()
        ))
    })?;
    let sigma = dec.singular_values.iter().copied().collect();
    match (dec.u, dec.v_t) {
        (Some(u), Some(v_t)) => Ok((u, sigma, v_t)),
        _ => Err(OmicsNetError::NumericalFailure(
            "SVD did not produce singular vectors".into(),
        )),
    }
}

/// Largest |row sum − 1| over all rows.
pub fn row_sum_deviation(m: &DMatrix<f64>) -> f64 {
    (0..m.nrows())
        .map(|i| (m.row(i).sum() - 1.0).abs())
        .fold(0.0, f64::max)
}

/// `(m + mᵀ) / 2`
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}
