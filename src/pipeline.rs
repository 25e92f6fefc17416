//! End-to-end analysis context.
//!
//! `OmicsNet` owns the configuration of every stage and nothing else; each
//! call takes its inputs and hands back fresh artifacts, so there is no shared
//! "current analysis" state to mutate. The stages can be driven one at a time
//! (`affinities` → `fuse` → `estimate` → `partition` → `rank`) or all at once
//! with [`OmicsNet::run`].
//!
//! ```ignore
//! let net = OmicsNetBuilder::new()
//!     .with_affinity(20, 0.5)
//!     .with_fusion(20, 20)
//!     .with_candidate_counts(vec![2, 3, 4, 5])
//!     .with_importance_top_k(10)
//!     .build()?;
//! let result = net.run(&[expression, methylation, mirna], 3)?;
//! ```

use log::{debug, info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::affinity::{AffinityBuilder, AffinityConfig};
use crate::concordance;
use crate::distance::{self, DistanceMetric};
use crate::error::{OmicsNetError, Result};
use crate::estimate::{estimate_cluster_counts, ClusterCountEstimate};
use crate::fusion::{FusionConfig, FusionOutput, NetworkFusion};
use crate::ranking::{Discretization, FeatureRanker, FeatureRanking, FeatureScore, RankingConfig};
use crate::spectral::{ClusterLabels, SpectralConfig, SpectralPartitioner};
use crate::view::{self, View};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmicsNetConfig {
    pub metric: DistanceMetric,
    /// Z-score every column before distances are computed.
    pub standardize: bool,
    pub affinity: AffinityConfig,
    pub fusion: FusionConfig,
    pub spectral: SpectralConfig,
    pub ranking: RankingConfig,
    /// Cluster counts scored by the estimator; empty skips estimation.
    pub candidate_counts: Vec<usize>,
    /// How many features per view `run` keeps in `top_features`.
    pub top_k: usize,
}

impl Default for OmicsNetConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::SquaredEuclidean,
            standardize: false,
            affinity: AffinityConfig::default(),
            fusion: FusionConfig::default(),
            spectral: SpectralConfig::default(),
            ranking: RankingConfig::default(),
            candidate_counts: vec![2, 3, 4, 5],
            top_k: 10,
        }
    }
}

impl OmicsNetConfig {
    pub fn validate(&self) -> Result<()> {
        self.affinity.validate()?;
        self.fusion.validate()?;
        if self.top_k < 1 {
            return Err(OmicsNetError::parameter("top_k", "must be at least 1"));
        }
        if let Some(&bad) = self.candidate_counts.iter().find(|&&c| c < 2) {
            return Err(OmicsNetError::parameter(
                "candidate_counts",
                format!("count {} is below 2", bad),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OmicsNetBuilder {
    config: OmicsNetConfig,
}

impl OmicsNetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: OmicsNetConfig) -> Self {
        Self { config }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.metric = metric;
        self
    }

    pub fn with_standardization(mut self, on: bool) -> Self {
        self.config.standardize = on;
        self
    }

    /// Neighbourhood size and kernel temperature of the per-view graphs.
    pub fn with_affinity(mut self, k_neighbors: usize, alpha: f64) -> Self {
        self.config.affinity = AffinityConfig::new(k_neighbors, alpha);
        self
    }

    /// Kernel neighbourhood size and iteration count of cross-diffusion.
    pub fn with_fusion(mut self, k_neighbors: usize, iterations: usize) -> Self {
        self.config.fusion = FusionConfig {
            k_neighbors,
            iterations,
            ..self.config.fusion
        };
        self
    }

    pub fn with_spectral(mut self, spectral: SpectralConfig) -> Self {
        self.config.spectral = spectral;
        self
    }

    pub fn with_ranking(mut self, discretization: Discretization) -> Self {
        self.config.ranking.discretization = discretization;
        self
    }

    pub fn with_candidate_counts(mut self, candidates: Vec<usize>) -> Self {
        self.config.candidate_counts = candidates;
        self
    }

    pub fn with_importance_top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn build(self) -> Result<OmicsNet> {
        self.config.validate()?;
        debug!("OmicsNet configured: {:?}", self.config);
        Ok(OmicsNet {
            config: self.config,
        })
    }
}

/// Everything one `run` produces.
#[derive(Debug, Clone)]
pub struct IntegrationResult {
    /// Per-view affinity matrices, in input order.
    pub affinities: Vec<DMatrix<f64>>,
    pub fusion: FusionOutput,
    /// `None` when no configured candidate count is below the patient count.
    pub estimate: Option<ClusterCountEstimate>,
    pub labels: ClusterLabels,
    pub rankings: Vec<FeatureRanking>,
    /// First `top_k` entries of every ranking.
    pub top_features: Vec<Vec<FeatureScore>>,
}

impl IntegrationResult {
    pub fn fused(&self) -> &DMatrix<f64> {
        &self.fusion.fused
    }
}

#[derive(Debug, Clone)]
pub struct OmicsNet {
    config: OmicsNetConfig,
}

impl OmicsNet {
    pub fn config(&self) -> &OmicsNetConfig {
        &self.config
    }

    /// Distance → affinity for every view. Views are processed in parallel,
    /// results keep input order.
    pub fn affinities(&self, views: &[View]) -> Result<Vec<DMatrix<f64>>> {
        check_views(views)?;
        let builder = AffinityBuilder::new(self.config.affinity.clone());
        let metric = self.config.metric;
        let standardize = self.config.standardize;

        let built: Vec<Result<DMatrix<f64>>> = views
            .par_iter()
            .map(|v| {
                let d = if standardize {
                    distance::pairwise_distances(&v.standardized()?, metric)?
                } else {
                    distance::pairwise_distances(v, metric)?
                };
                builder.build(&d)
            })
            .collect();
        built.into_iter().collect()
    }

    pub fn fuse(&self, affinities: &[DMatrix<f64>]) -> Result<FusionOutput> {
        NetworkFusion::new(self.config.fusion.clone()).fuse(affinities)
    }

    /// Eigengap estimate over the configured candidates that fit the graph
    /// (counts ≥ n are skipped).
    pub fn estimate(&self, graph: &DMatrix<f64>) -> Result<ClusterCountEstimate> {
        estimate_cluster_counts(graph, &self.usable_candidates(graph.nrows()))
    }

    pub fn partition(&self, graph: &DMatrix<f64>, n_clusters: usize) -> Result<ClusterLabels> {
        SpectralPartitioner::new(self.config.spectral.clone()).partition(graph, n_clusters)
    }

    pub fn rank(&self, views: &[View], labels: &ClusterLabels) -> Result<Vec<FeatureRanking>> {
        FeatureRanker::new(self.ranking_config()).rank(views, labels)
    }

    /// NMI agreement between the C-way partitions of the given graphs.
    pub fn concordance(&self, graphs: &[DMatrix<f64>], n_clusters: usize) -> Result<DMatrix<f64>> {
        let partitioner = SpectralPartitioner::new(self.config.spectral.clone());
        concordance::concordance_nmi(&partitioner, graphs, n_clusters)
    }

    pub fn run(&self, views: &[View], n_clusters: usize) -> Result<IntegrationResult> {
        let n = check_views(views)?;
        info!(
            "OmicsNet run: {} views, {} patients, C={}",
            views.len(),
            n,
            n_clusters
        );

        let affinities = self.affinities(views)?;
        let fusion = self.fuse(&affinities)?;

        let estimate = if self.usable_candidates(n).is_empty() {
            if !self.config.candidate_counts.is_empty() {
                warn!(
                    "no candidate cluster count in {:?} fits {} patients, skipping estimate",
                    self.config.candidate_counts, n
                );
            }
            None
        } else {
            Some(self.estimate(&fusion.fused)?)
        };

        let labels = self.partition(&fusion.fused, n_clusters)?;
        let rankings = self.rank(views, &labels)?;
        let top_features = rankings
            .iter()
            .map(|r| r.top(self.config.top_k).map(|s| s.to_vec()))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "  ✓ run complete: cluster sizes={:?}, estimate={:?}",
            labels.sizes(),
            estimate.as_ref().map(|e| e.best())
        );

        Ok(IntegrationResult {
            affinities,
            fusion,
            estimate,
            labels,
            rankings,
            top_features,
        })
    }

    fn usable_candidates(&self, n: usize) -> Vec<usize> {
        self.config
            .candidate_counts
            .iter()
            .copied()
            .filter(|&c| c < n)
            .collect()
    }

    fn ranking_config(&self) -> RankingConfig {
        RankingConfig {
            spectral: self.config.spectral.clone(),
            ..self.config.ranking.clone()
        }
    }
}

fn check_views(views: &[View]) -> Result<usize> {
    if views.len() < 2 {
        return Err(OmicsNetError::InvalidInput(format!(
            "integration needs at least 2 views, got {}",
            views.len()
        )));
    }
    let n = view::check_alignment(views)?;
    for v in views {
        v.validate()?;
    }
    Ok(n)
}
