//! Spectral partitioning of a patient graph into C hard clusters.
//!
//! Works on the fused graph or on a single view's affinity, so integrated and
//! single-view clusterings can be compared on the same footing.
//!
//! Pipeline:
//!   graph W → L_sym = I − D^{-½} W D^{-½}
//!           → C eigenvectors of smallest |λ| after the trivial one,
//!             sign-canonicalised
//!           → row-normalised n×C embedding
//!           → rotation discretisation ([`discretize`])
//!           → labels renumbered by first appearance
//!
//! Nothing here is random; two runs on the same graph and C return the same
//! labeling.
//!
//! A graph with more than C (near-)connected components is not special-cased:
//! a warning is logged and the discretisation proceeds with the C requested
//! eigenvectors.

pub mod discretize;

use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsNetError, Result};
use crate::laplacian::{GraphLaplacian, LaplacianConfig};
use crate::linalg;

/// Hard assignment of every patient to a cluster id in `0..n_clusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLabels {
    labels: Vec<usize>,
    n_clusters: usize,
}

impl ClusterLabels {
    pub fn new(labels: Vec<usize>, n_clusters: usize) -> Result<Self> {
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_clusters) {
            return Err(OmicsNetError::InvalidInput(format!(
                "label {} is outside 0..{}",
                bad, n_clusters
            )));
        }
        Ok(Self { labels, n_clusters })
    }

    /// Renumber ids in order of first appearance, so patient 0 is always in
    /// cluster 0.
    pub fn canonical(raw: &[usize], n_clusters: usize) -> Self {
        let mut map = vec![usize::MAX; raw.iter().copied().max().map_or(0, |m| m + 1)];
        let mut next = 0;
        let labels = raw
            .iter()
            .map(|&l| {
                if map[l] == usize::MAX {
                    map[l] = next;
                    next += 1;
                }
                map[l]
            })
            .collect();
        Self {
            labels,
            n_clusters: n_clusters.max(next),
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Requested cluster count C.
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Patients per cluster id.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Number of ids that actually hold at least one patient.
    pub fn distinct(&self) -> usize {
        self.sizes().iter().filter(|&&s| s > 0).count()
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.labels
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Cap on rotation-discretisation iterations.
    pub max_discretisation_iters: usize,

    /// Keep the trivial null eigenvector (D^{½}·1) in the embedding and use
    /// the C smallest overall. By default it is skipped and the C
    /// eigenvectors after it are embedded.
    pub include_trivial_eigenvector: bool,

    /// |λ| below this counts as a null direction when checking connectivity.
    pub null_tolerance: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            max_discretisation_iters: 20,
            include_trivial_eigenvector: false,
            null_tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpectralOutput {
    pub labels: ClusterLabels,
    /// |λ|-ascending eigenvalues used for the embedding.
    pub eigenvalues: Vec<f64>,
    /// Row-normalised n×C embedding fed to the discretisation.
    pub embedding: DMatrix<f64>,
    pub discretisation_iterations: usize,
    pub converged: bool,
}

pub struct SpectralPartitioner {
    pub config: SpectralConfig,
}

impl SpectralPartitioner {
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SpectralConfig::default())
    }

    pub fn partition(&self, graph: &DMatrix<f64>, n_clusters: usize) -> Result<ClusterLabels> {
        Ok(self.partition_detailed(graph, n_clusters)?.labels)
    }

    pub fn partition_detailed(
        &self,
        graph: &DMatrix<f64>,
        n_clusters: usize,
    ) -> Result<SpectralOutput> {
        let n = graph.nrows();
        let offset = usize::from(!self.config.include_trivial_eigenvector);
        if n_clusters < 2 {
            return Err(OmicsNetError::parameter(
                "n_clusters",
                format!("must be at least 2, got {}", n_clusters),
            ));
        }
        if n_clusters + offset > n {
            return Err(OmicsNetError::parameter(
                "n_clusters",
                format!(
                    "{} clusters need at least {} patients, graph has {}",
                    n_clusters,
                    n_clusters + offset,
                    n
                ),
            ));
        }

        info!(
            "Spectral partition: n={}, C={}, include_trivial={}",
            n, n_clusters, self.config.include_trivial_eigenvector
        );

        let lap = GraphLaplacian::build(
            graph,
            &LaplacianConfig {
                normalize: true,
                drop_self_loops: false,
            },
        )?;
        let eig = linalg::symmetric_eigen(&lap.matrix, true)?;

        let null_dim = GraphLaplacian::near_null_dimension(&eig.values, self.config.null_tolerance);
        if null_dim > n_clusters {
            warn!(
                "graph has {} near-null Laplacian directions but only {} clusters were requested",
                null_dim, n_clusters
            );
        }

        let mut embedding = DMatrix::<f64>::zeros(n, n_clusters);
        for c in 0..n_clusters {
            let mut v = eig.vectors.column(c + offset).clone_owned();
            canonical_sign(v.as_mut_slice());
            embedding.set_column(c, &v);
        }
        discretize::normalize_rows(&mut embedding);

        let disc = discretize::discretise(&embedding, self.config.max_discretisation_iters)?;
        let labels = ClusterLabels::canonical(&disc.assignments, n_clusters);

        debug!(
            "  ✓ {} distinct cluster(s), sizes={:?}",
            labels.distinct(),
            labels.sizes()
        );

        Ok(SpectralOutput {
            labels,
            eigenvalues: eig.values[offset..offset + n_clusters].to_vec(),
            embedding,
            discretisation_iterations: disc.iterations,
            converged: disc.converged,
        })
    }
}

/// Flip a vector so its largest-magnitude entry is positive.
fn canonical_sign(v: &mut [f64]) {
    let mut pivot = 0;
    for i in 1..v.len() {
        if v[i].abs() > v[pivot].abs() {
            pivot = i;
        }
    }
    if v.get(pivot).is_some_and(|&x| x < 0.0) {
        v.iter_mut().for_each(|x| *x = -*x);
    }
}
