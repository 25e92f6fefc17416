//! Eigengap scoring of candidate cluster counts.
//!
//! The graph is symmetrised, its diagonal dropped, and the eigenvalues
//! λ₁ ≤ λ₂ ≤ … of its normalised Laplacian are computed once. A candidate
//! count c is scored by the gap λ_{c+1} − λ_c (1-based): a large gap means the
//! first c eigenvectors span a stable c-way partition. The relative gap
//! additionally weighs the gap by (1 − λ_c) / (1 − λ_{c+1}).
//!
//! The result is advisory. The caller still picks C.

use log::{debug, info};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsNetError, Result};
use crate::laplacian::{GraphLaplacian, LaplacianConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountScore {
    pub n_clusters: usize,
    /// λ_{c+1} − λ_c; larger is better.
    pub eigengap: f64,
    /// eigengap · (1 − λ_c) / (1 − λ_{c+1}).
    pub relative_gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCountEstimate {
    /// One entry per candidate, in the order supplied.
    pub scores: Vec<CountScore>,
    /// Full ascending spectrum of the normalised Laplacian.
    pub eigenvalues: Vec<f64>,
}

impl ClusterCountEstimate {
    fn ranked(&self) -> Vec<CountScore> {
        let mut ranked = self.scores.clone();
        ranked.sort_by(|a, b| {
            b.eigengap
                .total_cmp(&a.eigengap)
                .then(a.n_clusters.cmp(&b.n_clusters))
        });
        ranked
    }

    /// Candidate with the largest eigengap; ties go to the smaller count.
    pub fn best(&self) -> usize {
        self.ranked()[0].n_clusters
    }

    /// Runner-up by eigengap, if more than one candidate was scored.
    pub fn second_best(&self) -> Option<usize> {
        self.ranked().get(1).map(|s| s.n_clusters)
    }

    pub fn score_for(&self, n_clusters: usize) -> Option<&CountScore> {
        self.scores.iter().find(|s| s.n_clusters == n_clusters)
    }
}

pub fn estimate_cluster_counts(
    graph: &DMatrix<f64>,
    candidates: &[usize],
) -> Result<ClusterCountEstimate> {
    let n = graph.nrows();
    if candidates.is_empty() {
        return Err(OmicsNetError::parameter(
            "candidates",
            "at least one candidate count is required",
        ));
    }
    if let Some(&bad) = candidates.iter().find(|&&c| c < 2 || c >= n) {
        return Err(OmicsNetError::parameter(
            "candidates",
            format!("count {} is outside 2..{} for {} patients", bad, n, n),
        ));
    }

    info!(
        "Cluster count estimator: n={}, candidates={:?}",
        n, candidates
    );

    let lap = GraphLaplacian::build(
        graph,
        &LaplacianConfig {
            normalize: true,
            drop_self_loops: true,
        },
    )?;
    let eigenvalues = lap.spectrum()?;

    let scores: Vec<CountScore> = candidates
        .iter()
        .map(|&c| {
            let lo = eigenvalues[c - 1];
            let hi = eigenvalues[c];
            let eigengap = (hi - lo).abs();
            let denom = 1.0 - hi;
            let relative_gap = if denom.abs() > f64::EPSILON {
                eigengap * (1.0 - lo) / denom
            } else {
                f64::INFINITY
            };
            debug!(
                "  • C={}: λ_c={:.5}, λ_c+1={:.5}, gap={:.5}",
                c, lo, hi, eigengap
            );
            CountScore {
                n_clusters: c,
                eigengap,
                relative_gap,
            }
        })
        .collect();

    let estimate = ClusterCountEstimate {
        scores,
        eigenvalues,
    };
    info!(
        "  ✓ best C={} (runner-up {:?})",
        estimate.best(),
        estimate.second_best()
    );
    Ok(estimate)
}
