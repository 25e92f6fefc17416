//! Rotation-based discretisation of a spectral embedding (Yu & Shi 2003).
//!
//! Rather than grouping the rows of the eigenvector embedding by distance to
//! centres, this searches for the rotation R that best aligns `U · R` with a
//! one-hot cluster indicator X. Alternating steps:
//!
//! ```text
//! X ← one_hot(argmax_row(U · R))
//! Xᵀ U = A Σ Bᵀ           (SVD)
//! R ← B Aᵀ
//! ```
//!
//! with objective `2 (n − tr Σ)`. The loop is a bounded fixed point: it stops
//! when the objective stops moving or after `max_iterations`.

use log::{debug, warn};
use nalgebra::DMatrix;

use crate::error::{OmicsNetError, Result};
use crate::linalg;

#[derive(Debug, Clone)]
pub struct Discretisation {
    /// Column index of the winning indicator for each row.
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub objective: f64,
    pub converged: bool,
}

/// Scale every row to unit L2 norm; all-zero rows are left as they are.
pub fn normalize_rows(u: &mut DMatrix<f64>) {
    for i in 0..u.nrows() {
        let norm = u.row(i).norm();
        if norm > f64::EPSILON {
            u.row_mut(i).scale_mut(1.0 / norm);
        }
    }
}

pub fn discretise(embedding: &DMatrix<f64>, max_iterations: usize) -> Result<Discretisation> {
    let (n, k) = embedding.shape();
    if n == 0 || k == 0 {
        return Err(OmicsNetError::InvalidInput(
            "cannot discretise an empty embedding".into(),
        ));
    }
    if max_iterations < 1 {
        return Err(OmicsNetError::parameter(
            "max_discretisation_iters",
            "must be at least 1",
        ));
    }

    let mut u = embedding.clone();
    normalize_rows(&mut u);

    let mut r = initial_rotation(&u);

    let mut last_objective = 0.0f64;
    let mut assignments = Vec::new();
    let mut objective = f64::INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..max_iterations {
        iterations = iter + 1;
        let projected = &u * &r;
        assignments = row_argmax(&projected);
        let x = one_hot(&assignments, n, k);

        let (a, sigma, b_t) = linalg::svd(&(x.transpose() * &u))?;
        objective = 2.0 * (n as f64 - sigma.iter().sum::<f64>());

        if (objective - last_objective).abs() < f64::EPSILON {
            converged = true;
            break;
        }
        last_objective = objective;
        r = b_t.transpose() * a.transpose();
    }

    if converged {
        debug!(
            "discretisation converged after {} iteration(s), ncut objective={:.6}",
            iterations, objective
        );
    } else {
        warn!(
            "discretisation hit its cap of {} iterations (objective={:.6})",
            max_iterations, objective
        );
    }

    Ok(Discretisation {
        assignments,
        iterations,
        objective,
        converged,
    })
}

/// First column is the middle row of `u`; each next column is the row least
/// aligned with the columns chosen so far (accumulated |U·r|, first minimum).
fn initial_rotation(u: &DMatrix<f64>) -> DMatrix<f64> {
    let (n, k) = u.shape();
    let mut r = DMatrix::<f64>::zeros(k, k);
    r.set_column(0, &u.row(n / 2).transpose());

    let mut acc = vec![0.0f64; n];
    for j in 1..k {
        let proj = u * r.column(j - 1);
        for (a, p) in acc.iter_mut().zip(proj.iter()) {
            *a += p.abs();
        }
        let mut best = 0;
        for i in 1..n {
            if acc[i] < acc[best] {
                best = i;
            }
        }
        r.set_column(j, &u.row(best).transpose());
    }
    r
}

/// Index of the maximum of each row; the first maximum wins ties.
pub fn row_argmax(m: &DMatrix<f64>) -> Vec<usize> {
    (0..m.nrows())
        .map(|i| {
            let mut best = 0;
            for j in 1..m.ncols() {
                if m[(i, j)] > m[(i, best)] {
                    best = j;
                }
            }
            best
        })
        .collect()
}

fn one_hot(assignments: &[usize], n: usize, k: usize) -> DMatrix<f64> {
    let mut x = DMatrix::<f64>::zeros(n, k);
    for (i, &c) in assignments.iter().enumerate() {
        x[(i, c)] = 1.0;
    }
    x
}
