//! Pairwise patient dissimilarities for one view.
//!
//! Each view keeps its native scale here. Scale differences between views are
//! absorbed later by the per-patient local scaling in [`crate::affinity`].

use log::{debug, info};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsNetError, Result};
use crate::view::View;

/// Guard added to the chi-squared denominator.
pub const CHI_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// ‖x_i − x_j‖²
    #[default]
    SquaredEuclidean,
    /// ½ Σ_k (x_ik − x_jk)² / (x_ik + x_jk), for non-negative count data.
    ChiSquared,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DistanceMetric::SquaredEuclidean => write!(f, "squared-euclidean"),
            DistanceMetric::ChiSquared => write!(f, "chi-squared"),
        }
    }
}

pub fn pairwise_distances(view: &View, metric: DistanceMetric) -> Result<DMatrix<f64>> {
    match metric {
        DistanceMetric::SquaredEuclidean => squared_euclidean(view),
        DistanceMetric::ChiSquared => chi_squared(view),
    }
}

/// n×n squared Euclidean distances; symmetric with an exact zero diagonal.
pub fn squared_euclidean(view: &View) -> Result<DMatrix<f64>> {
    build(view, DistanceMetric::SquaredEuclidean, |a, b| {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    })
}

/// n×n chi-squared distances; symmetric with an exact zero diagonal.
pub fn chi_squared(view: &View) -> Result<DMatrix<f64>> {
    build(view, DistanceMetric::ChiSquared, |a, b| {
        0.5 * a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y) / (x + y + CHI_EPS))
            .sum::<f64>()
    })
}

fn build<F>(view: &View, metric: DistanceMetric, kernel: F) -> Result<DMatrix<f64>>
where
    F: Fn(&[f64], &[f64]) -> f64 + Sync,
{
    view.validate()?;
    let n = view.n_patients();
    if n < 2 {
        return Err(OmicsNetError::InvalidInput(format!(
            "view `{}` has {} patient(s), at least 2 are required",
            view.name(),
            n
        )));
    }

    info!(
        "Distance engine: view `{}` ({}×{}), metric={}",
        view.name(),
        n,
        view.n_features(),
        metric
    );

    let rows: Vec<Vec<f64>> = (0..n).map(|i| view.row(i)).collect();

    // Upper triangle only; the lower half is a mirror so symmetry is exact.
    let upper: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let rows = &rows;
            let kernel = &kernel;
            ((i + 1)..n).map(move |j| (i, j, kernel(&rows[i], &rows[j])))
        })
        .collect();

    let mut d = DMatrix::<f64>::zeros(n, n);
    for (i, j, v) in upper {
        d[(i, j)] = v;
        d[(j, i)] = v;
    }

    debug!(
        "  ✓ {} pairwise distances, max={:.4e}",
        n * (n - 1) / 2,
        d.max()
    );
    Ok(d)
}
