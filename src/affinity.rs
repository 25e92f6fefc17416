//! Locally scaled patient-similarity graph from a distance matrix.
//!
//! Every patient gets its own scale ε_i, the mean distance to its K nearest
//! neighbours. A pair's bandwidth blends both endpoints' scales with the pair
//! distance itself:
//!
//! ```text
//! σ_ij = (ε_i + ε_j) / 3 + D_ij / 3
//! W_ij = exp(−D_ij² / (2 (α σ_ij)²))
//! ```
//!
//! Since σ_ij ≥ D_ij / 3 the exponent is bounded by 9 / (2α²), so entries stay
//! strictly positive for any sane α; a `f64::MIN_POSITIVE` floor covers the
//! rest.
//!
//! The diagonal is damped to `f64::EPSILON` instead of 1 so self-similarity
//! does not dominate the row normalisation done by the fusion stage.

use log::{debug, info, trace};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsNetError, Result};

/// Value written on the affinity diagonal.
pub const DIAGONAL_DAMPING: f64 = f64::EPSILON;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// Neighbourhood size for the local scale (typical 10–30).
    /// Values ≥ n−1 use every other patient.
    pub k_neighbors: usize,

    /// Kernel temperature (typical 0.3–0.8). Smaller values sharpen the graph.
    pub alpha: f64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 20,
            alpha: 0.5,
        }
    }
}

impl AffinityConfig {
    pub fn new(k_neighbors: usize, alpha: f64) -> Self {
        Self { k_neighbors, alpha }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k_neighbors < 1 {
            return Err(OmicsNetError::parameter("k_neighbors", "must be at least 1"));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(OmicsNetError::parameter(
                "alpha",
                format!("must be a positive finite number, got {}", self.alpha),
            ));
        }
        Ok(())
    }
}

pub struct AffinityBuilder {
    pub config: AffinityConfig,
}

impl AffinityBuilder {
    pub fn new(config: AffinityConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(AffinityConfig::default())
    }

    pub fn build(&self, distances: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.config.validate()?;
        check_distances(distances)?;

        let n = distances.nrows();
        let k = self.config.k_neighbors.min(n - 1);
        let alpha = self.config.alpha;

        info!(
            "Affinity builder: n={}, k={} (requested {}), alpha={}",
            n, k, self.config.k_neighbors, alpha
        );

        let d = symmetrised(distances);
        let scales = local_scales(&d, k);
        trace!("local scales: {:?}", scales);

        let mut w = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            w[(i, i)] = DIAGONAL_DAMPING;
            for j in (i + 1)..n {
                let dij = d[(i, j)];
                let sigma = ((scales[i] + scales[j]) / 3.0 + dij / 3.0 + f64::EPSILON)
                    .max(f64::EPSILON);
                let bw = alpha * sigma;
                let v = (-(dij * dij) / (2.0 * bw * bw))
                    .exp()
                    .clamp(f64::MIN_POSITIVE, 1.0);
                w[(i, j)] = v;
                w[(j, i)] = v;
            }
        }

        debug!(
            "  ✓ affinity complete: min={:.3e}, max={:.3e}",
            w.min(),
            w.max()
        );
        Ok(w)
    }
}

/// Mean distance from each patient to its `k` nearest other patients,
/// plus machine epsilon so a duplicated patient never gets a zero scale.
pub fn local_scales(d: &DMatrix<f64>, k: usize) -> Vec<f64> {
    let n = d.nrows();
    let k = k.clamp(1, n.saturating_sub(1).max(1));
    (0..n)
        .map(|i| {
            let mut row: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| d[(i, j)]).collect();
            row.sort_by(|a, b| a.total_cmp(b));
            let take = k.min(row.len());
            row[..take].iter().sum::<f64>() / take as f64 + f64::EPSILON
        })
        .collect()
}

fn symmetrised(d: &DMatrix<f64>) -> DMatrix<f64> {
    let mut s = (d + d.transpose()) * 0.5;
    s.fill_diagonal(0.0);
    s
}

fn check_distances(d: &DMatrix<f64>) -> Result<()> {
    if !d.is_square() {
        return Err(OmicsNetError::mismatch(
            "distance matrix columns",
            d.nrows(),
            d.ncols(),
        ));
    }
    if d.nrows() < 2 {
        return Err(OmicsNetError::InvalidInput(format!(
            "distance matrix has {} patient(s), at least 2 are required",
            d.nrows()
        )));
    }
    if let Some(bad) = d.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(OmicsNetError::InvalidInput(format!(
            "distance matrix contains invalid entry {}",
            bad
        )));
    }
    Ok(())
}
