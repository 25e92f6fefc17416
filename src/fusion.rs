//! Cross-diffusion of per-view similarity graphs into one fused graph.
//!
//! For every view v two matrices are derived from its affinity W_v:
//!   * status  P_v = half-normalise(W_v)                           (global, dense)
//!   * kernel  S_v = top-K entries of each row of W_v, renormalised (local, sparse)
//!
//! Half-normalising a matrix scales the off-diagonal entries of every row to
//! sum to ½ and sets the diagonal to ½, so rows still sum to one and every
//! patient keeps half of its own mass. Each iteration replaces every status
//! matrix with
//!
//! ```text
//! P_v ← half-normalise( S_v · mean_{u≠v}(P_u) · S_vᵀ )
//! ```
//!
//! so each view's local neighbourhoods pull messages from every other view's
//! global structure. All updates of one iteration read the same frozen
//! snapshot of the previous iteration; the new matrices are built into a
//! separate buffer and swapped in only once every view is done.
//!
//! After T iterations the status matrices are averaged, symmetrised and
//! balanced to a symmetric doubly stochastic matrix. The balancing vector is
//! found with the Knight–Ruiz inexact Newton iteration (conjugate gradient
//! inner solves).

use log::{debug, info, trace, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};

use crate::error::{OmicsNetError, Result};
use crate::linalg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Neighbours kept per row of each local kernel S_v (typical 10–30).
    pub k_neighbors: usize,

    /// Number of cross-diffusion iterations T (typical 10–20).
    pub iterations: usize,

    /// Target max |row sum − 1| of the balanced fused graph.
    pub sinkhorn_tolerance: f64,

    /// Cap on outer Newton steps of the balancing. Reaching it is not an
    /// error: the best scaling found is kept and a warning is logged.
    pub sinkhorn_max_iterations: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 20,
            iterations: 20,
            sinkhorn_tolerance: 1e-10,
            sinkhorn_max_iterations: 200,
        }
    }
}

impl FusionConfig {
    pub fn new(k_neighbors: usize, iterations: usize) -> Self {
        Self {
            k_neighbors,
            iterations,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k_neighbors < 1 {
            return Err(OmicsNetError::parameter("k_neighbors", "must be at least 1"));
        }
        if self.iterations < 1 {
            return Err(OmicsNetError::parameter("iterations", "must be at least 1"));
        }
        if !(self.sinkhorn_tolerance.is_finite() && self.sinkhorn_tolerance > 0.0) {
            return Err(OmicsNetError::parameter(
                "sinkhorn_tolerance",
                "must be a positive finite number",
            ));
        }
        if self.sinkhorn_max_iterations < 1 {
            return Err(OmicsNetError::parameter(
                "sinkhorn_max_iterations",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Per-iteration diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    /// Largest |row sum − 1| across all status matrices after this iteration.
    pub max_row_deviation: f64,
    /// Largest absolute entry change of any status matrix in this iteration.
    pub max_change: f64,
}

#[derive(Debug, Clone)]
pub struct FusionOutput {
    /// Symmetric n×n fused graph, rows summing to one.
    pub fused: DMatrix<f64>,
    pub n_views: usize,
    pub iterations: usize,
    /// Final status matrices P_v, in input order.
    pub status: Vec<DMatrix<f64>>,
    pub trace: Vec<IterationStats>,
    pub sinkhorn_iterations: usize,
    /// max |row sum − 1| of `fused`.
    pub row_sum_residual: f64,
}

impl FusionOutput {
    pub fn summary(&self) -> String {
        format!(
            "FusionOutput: n={}, views={}, T={}, balancing steps={}, row residual={:.2e}",
            self.fused.nrows(),
            self.n_views,
            self.iterations,
            self.sinkhorn_iterations,
            self.row_sum_residual
        )
    }
}

pub struct NetworkFusion {
    pub config: FusionConfig,
}

impl NetworkFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FusionConfig::default())
    }

    pub fn fuse(&self, affinities: &[DMatrix<f64>]) -> Result<FusionOutput> {
        self.config.validate()?;
        let n = check_graphs(affinities)?;
        let n_views = affinities.len();
        let k = self.config.k_neighbors.min(n - 1);

        info!("╔═══════════════════════════════════════════════════════╗");
        info!("║  NETWORK FUSION                                       ║");
        info!("╚═══════════════════════════════════════════════════════╝");
        info!(
            "  • views={}, n={}, k={} (requested {}), T={}",
            n_views, n, k, self.config.k_neighbors, self.config.iterations
        );

        // ── Step 1: status and kernel matrices per view ─────────────────────
        let mut status: Vec<DMatrix<f64>> = Vec::with_capacity(n_views);
        let mut kernels: Vec<CsMat<f64>> = Vec::with_capacity(n_views);
        for (v, w) in affinities.iter().enumerate() {
            let mut p = w.clone();
            half_normalize(&mut p, &format!("status matrix of view {}", v))?;
            status.push(p);
            kernels.push(local_kernel(w, k, v)?);
        }
        debug!(
            "Step 1/3: {} status matrices and {} kernels ({} nnz each)",
            status.len(),
            kernels.len(),
            kernels[0].nnz()
        );

        // ── Step 2: cross-diffusion ─────────────────────────────────────────
        let mut trace_stats = Vec::with_capacity(self.config.iterations);
        for t in 1..=self.config.iterations {
            let snapshot = &status;
            let updated: Vec<Result<DMatrix<f64>>> = (0..n_views)
                .into_par_iter()
                .map(|v| {
                    let others = mean_of_others(snapshot, v);
                    let mut next = diffuse(&kernels[v], &others);
                    half_normalize(
                        &mut next,
                        &format!("status matrix of view {} at iteration {}", v, t),
                    )?;
                    Ok(next)
                })
                .collect();

            let mut next_status = Vec::with_capacity(n_views);
            for r in updated {
                next_status.push(r?);
            }

            let max_change = next_status
                .iter()
                .zip(status.iter())
                .map(|(a, b)| (a - b).amax())
                .fold(0.0, f64::max);
            let max_row_deviation = next_status
                .iter()
                .map(linalg::row_sum_deviation)
                .fold(0.0, f64::max);

            status = next_status;
            trace!(
                "iteration {}/{}: max change={:.3e}, row deviation={:.3e}",
                t,
                self.config.iterations,
                max_change,
                max_row_deviation
            );
            trace_stats.push(IterationStats {
                iteration: t,
                max_row_deviation,
                max_change,
            });
        }
        debug!("Step 2/3: {} diffusion iterations done", self.config.iterations);

        // ── Step 3: average, symmetrise, balance ────────────────────────────
        let mut mean = DMatrix::<f64>::zeros(n, n);
        for p in &status {
            mean += p;
        }
        mean /= n_views as f64;
        let symmetric = linalg::symmetrize(&mean);

        let (fused, steps) = symmetric_sinkhorn(
            &symmetric,
            self.config.sinkhorn_tolerance,
            self.config.sinkhorn_max_iterations,
        )?;
        let row_sum_residual = linalg::row_sum_deviation(&fused);
        debug!(
            "Step 3/3: balanced fused graph in {} Newton step(s) (residual {:.2e})",
            steps, row_sum_residual
        );

        let out = FusionOutput {
            fused,
            n_views,
            iterations: self.config.iterations,
            status,
            trace: trace_stats,
            sinkhorn_iterations: steps,
            row_sum_residual,
        };
        info!("  ✓ {}", out.summary());
        Ok(out)
    }
}

/// Sparse local kernel: each row keeps its `k` largest off-diagonal weights
/// (ties go to the lower column index) and is renormalised to sum one.
pub fn local_kernel(w: &DMatrix<f64>, k: usize, view: usize) -> Result<CsMat<f64>> {
    let n = w.nrows();
    let mut tri = TriMat::with_capacity((n, n), n * k);

    for i in 0..n {
        let mut scored: Vec<(usize, f64)> =
            (0..n).filter(|&j| j != i).map(|j| (j, w[(i, j)])).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        let total: f64 = scored.iter().map(|(_, v)| v).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(OmicsNetError::NumericalFailure(format!(
                "kernel of view {}: row {} has no positive neighbour weight",
                view, i
            )));
        }
        for (j, v) in scored {
            tri.add_triplet(i, j, v / total);
        }
    }
    Ok(tri.to_csr())
}

fn mean_of_others(status: &[DMatrix<f64>], v: usize) -> DMatrix<f64> {
    let n = status[v].nrows();
    let mut acc = DMatrix::<f64>::zeros(n, n);
    for (u, p) in status.iter().enumerate() {
        if u != v {
            acc += p;
        }
    }
    acc / (status.len() - 1) as f64
}

/// `S · M · Sᵀ` for a CSR kernel `S` and dense `M`, in O(n²·k).
pub fn diffuse(kernel: &CsMat<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();

    let mut left = DMatrix::<f64>::zeros(n, n);
    for (i, row) in kernel.outer_iterator().enumerate() {
        for (a, &s) in row.iter() {
            for c in 0..n {
                left[(i, c)] += s * m[(a, c)];
            }
        }
    }

    let mut out = DMatrix::<f64>::zeros(n, n);
    for (l, row) in kernel.outer_iterator().enumerate() {
        for (b, &s) in row.iter() {
            for i in 0..n {
                out[(i, l)] += left[(i, b)] * s;
            }
        }
    }
    out
}

/// Scale the off-diagonal part of every row to sum to ½ and set the diagonal
/// to ½. A row without positive off-diagonal mass is a `NumericalFailure`;
/// `what` names the matrix in the message.
pub fn half_normalize(m: &mut DMatrix<f64>, what: &str) -> Result<()> {
    for i in 0..m.nrows() {
        let off = m.row(i).sum() - m[(i, i)];
        if !(off.is_finite() && off > 0.0) {
            return Err(OmicsNetError::NumericalFailure(format!(
                "{}: row {} has off-diagonal mass {}, cannot normalise",
                what, i, off
            )));
        }
        m.row_mut(i).scale_mut(0.5 / off);
        m[(i, i)] = 0.5;
    }
    Ok(())
}

// Knight–Ruiz step bounds: each Newton update may scale an entry of x by at
// most these factors.
const KR_LOWER: f64 = 0.1;
const KR_UPPER: f64 = 3.0;

/// Symmetric matrix balancing: find x > 0 with diag(x)·A·diag(x) doubly
/// stochastic (Knight & Ruiz 2013, inexact Newton with CG inner solves).
///
/// Returns the balanced matrix and the number of outer steps. When the step
/// cap is reached before `tolerance`, the scaling with the smallest residual
/// is kept and a warning is logged; only rows without any positive weight or
/// a non-finite scaling are errors.
pub fn symmetric_sinkhorn(
    a: &DMatrix<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<(DMatrix<f64>, usize)> {
    let n = a.nrows();
    if let Some(i) = (0..n).find(|&i| !(a.row(i).sum() > 0.0)) {
        return Err(OmicsNetError::NumericalFailure(format!(
            "balancing: row {} of the fused graph is entirely zero",
            i
        )));
    }

    let ones = DVector::<f64>::from_element(n, 1.0);
    let mut x = ones.clone();
    let mut v = x.component_mul(&(a * &x));
    let mut rk = &ones - &v;
    let mut rho_km1 = rk.dot(&rk);
    let mut rout = rho_km1;
    let mut rold = rout;

    let rt = tolerance * tolerance;
    let stop_tol = 0.5 * tolerance;
    let (g, eta_max) = (0.9, 0.1);
    let mut eta = eta_max;

    let mut best_x = x.clone();
    let mut best_residual = rk.amax();
    let mut steps = 0;

    while best_residual >= tolerance && steps < max_iterations {
        steps += 1;
        let mut y = ones.clone();
        let inner_tol = (eta * eta * rout).max(rt);

        // conjugate gradient on (diag(x)·A·diag(x) + diag(v)) y = rk
        let mut z = rk.component_div(&v);
        let mut p = z.clone();
        let mut rho_km2 = rho_km1;
        let mut k = 0;
        while rho_km1 > inner_tol {
            k += 1;
            if k == 1 {
                rho_km1 = rk.dot(&z);
            } else {
                let beta = rho_km1 / rho_km2;
                p = &z + &p * beta;
            }
            let w = x.component_mul(&(a * x.component_mul(&p))) + v.component_mul(&p);
            let curvature = p.dot(&w);
            if !(curvature.is_finite() && curvature > 0.0) {
                break;
            }
            let alpha = rho_km1 / curvature;
            let ap = &p * alpha;
            let y_new = &y + &ap;

            if y_new.min() <= KR_LOWER {
                let gamma = (0..n)
                    .filter(|&i| ap[i] < 0.0)
                    .map(|i| (KR_LOWER - y[i]) / ap[i])
                    .fold(f64::INFINITY, f64::min);
                if gamma.is_finite() {
                    y += &ap * gamma;
                }
                break;
            }
            if y_new.max() >= KR_UPPER {
                let gamma = (0..n)
                    .filter(|&i| y_new[i] > KR_UPPER)
                    .map(|i| (KR_UPPER - y[i]) / ap[i])
                    .fold(f64::INFINITY, f64::min);
                if gamma.is_finite() {
                    y += &ap * gamma;
                }
                break;
            }
            y = y_new;
            rk -= &w * alpha;
            rho_km2 = rho_km1;
            z = rk.component_div(&v);
            rho_km1 = rk.dot(&z);
        }

        x.component_mul_assign(&y);
        v = x.component_mul(&(a * &x));
        rk = &ones - &v;
        rho_km1 = rk.dot(&rk);
        rout = rho_km1;

        let residual = rk.amax();
        if !residual.is_finite() {
            return Err(OmicsNetError::NumericalFailure(
                "balancing produced a non-finite scaling".into(),
            ));
        }
        trace!("balancing step {}: residual={:.3e}, cg steps={}", steps, residual, k);
        if residual < best_residual {
            best_residual = residual;
            best_x = x.clone();
        }

        let rat = rout / rold;
        rold = rout;
        let eta_prev = eta;
        eta = g * rat;
        if g * eta_prev * eta_prev > 0.1 {
            eta = eta.max(g * eta_prev * eta_prev);
        }
        eta = eta.min(eta_max).max(stop_tol / rout.sqrt().max(f64::MIN_POSITIVE));
    }

    if best_residual >= tolerance {
        warn!(
            "balancing stopped after {} step(s) with residual {:.3e} (target {:.1e})",
            steps, best_residual, tolerance
        );
    }

    let balanced = DMatrix::from_fn(n, n, |i, j| best_x[i] * a[(i, j)] * best_x[j]);
    Ok((linalg::symmetrize(&balanced), steps))
}

fn check_graphs(affinities: &[DMatrix<f64>]) -> Result<usize> {
    if affinities.len() < 2 {
        return Err(OmicsNetError::InvalidInput(format!(
            "fusion needs at least 2 views, got {}",
            affinities.len()
        )));
    }
    let n = affinities[0].nrows();
    if n < 2 {
        return Err(OmicsNetError::InvalidInput(format!(
            "affinity matrices have {} patient(s), at least 2 are required",
            n
        )));
    }
    for (v, w) in affinities.iter().enumerate() {
        if w.nrows() != n {
            return Err(OmicsNetError::mismatch(
                format!("patient count of affinity {}", v),
                n,
                w.nrows(),
            ));
        }
        if w.ncols() != n {
            return Err(OmicsNetError::mismatch(
                format!("columns of affinity {}", v),
                n,
                w.ncols(),
            ));
        }
        if let Some(bad) = w.iter().find(|x| !x.is_finite() || **x < 0.0) {
            return Err(OmicsNetError::InvalidInput(format!(
                "affinity {} contains invalid weight {}",
                v, bad
            )));
        }
    }
    Ok(n)
}
