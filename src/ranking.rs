//! Ranks each view's features by how much they explain the fused partition.
//!
//! Each feature column is discretised into groups, and the NMI between those
//! groups and the fused cluster labeling becomes the feature's score. Scores
//! are sorted descending; ties keep ascending feature index.
//!
//! Binning policy is explicit in [`Discretization`]:
//!   * `EqualWidth` / `EqualFrequency`: histogram bins over the column
//!   * `Sturges`: equal-width with ⌈log₂ n⌉ + 1 bins (the default)
//!   * `SpectralSingleFeature`: build a one-feature affinity graph and
//!     partition it into C groups, the same grouping the fused graph gets
//!
//! A feature that is constant across patients always scores 0.

use log::{debug, info};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::affinity::{AffinityBuilder, AffinityConfig};
use crate::distance;
use crate::error::{OmicsNetError, Result};
use crate::estimate::estimate_cluster_counts;
use crate::nmi;
use crate::spectral::{ClusterLabels, SpectralConfig, SpectralPartitioner};
use crate::view::View;

/// Candidate counts tried when the fused cluster count is not supplied.
pub const DEFAULT_CANDIDATES: [usize; 4] = [2, 3, 4, 5];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Discretization {
    EqualWidth {
        bins: usize,
    },
    EqualFrequency {
        bins: usize,
    },
    #[default]
    Sturges,
    SpectralSingleFeature {
        k_neighbors: usize,
        alpha: f64,
    },
}

impl std::fmt::Display for Discretization {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Discretization::EqualWidth { bins } => write!(f, "EqualWidth({})", bins),
            Discretization::EqualFrequency { bins } => write!(f, "EqualFrequency({})", bins),
            Discretization::Sturges => write!(f, "Sturges"),
            Discretization::SpectralSingleFeature { k_neighbors, alpha } => {
                write!(f, "SpectralSingleFeature(k={}, alpha={})", k_neighbors, alpha)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub discretization: Discretization,
    /// Used by `SpectralSingleFeature` and by `rank_by_graph`.
    pub spectral: SpectralConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    /// Column index in the original view.
    pub index: usize,
    pub nmi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRanking {
    pub view: String,
    /// Descending by `nmi`, ties by ascending `index`.
    pub scores: Vec<FeatureScore>,
}

impl FeatureRanking {
    /// The `k` best features (all of them when the view has fewer).
    pub fn top(&self, k: usize) -> Result<&[FeatureScore]> {
        if k < 1 {
            return Err(OmicsNetError::parameter("top_k", "must be at least 1"));
        }
        Ok(&self.scores[..k.min(self.scores.len())])
    }

    /// 0-based position of a feature in the ranking.
    pub fn rank_of(&self, index: usize) -> Option<usize> {
        self.scores.iter().position(|s| s.index == index)
    }

    pub fn score_of(&self, index: usize) -> Option<f64> {
        self.scores.iter().find(|s| s.index == index).map(|s| s.nmi)
    }
}

pub struct FeatureRanker {
    pub config: RankingConfig,
}

impl FeatureRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RankingConfig::default())
    }

    pub fn rank(&self, views: &[View], labels: &ClusterLabels) -> Result<Vec<FeatureRanking>> {
        info!(
            "Feature ranker: {} view(s), {} patients, C={}, binning={}",
            views.len(),
            labels.len(),
            labels.n_clusters(),
            self.config.discretization
        );
        views.iter().map(|v| self.rank_view(v, labels)).collect()
    }

    /// Partition `fused` first, then rank against that labeling. Without an
    /// explicit count, the eigengap estimate over [`DEFAULT_CANDIDATES`] is used.
    pub fn rank_by_graph(
        &self,
        views: &[View],
        fused: &DMatrix<f64>,
        n_clusters: Option<usize>,
    ) -> Result<Vec<FeatureRanking>> {
        let c = match n_clusters {
            Some(c) => c,
            None => {
                let candidates: Vec<usize> = DEFAULT_CANDIDATES
                    .iter()
                    .copied()
                    .filter(|&c| c < fused.nrows())
                    .collect();
                estimate_cluster_counts(fused, &candidates)?.best()
            }
        };
        let labels = SpectralPartitioner::new(self.config.spectral.clone()).partition(fused, c)?;
        self.rank(views, &labels)
    }

    pub fn rank_view(&self, view: &View, labels: &ClusterLabels) -> Result<FeatureRanking> {
        view.validate()?;
        if view.n_patients() != labels.len() {
            return Err(OmicsNetError::mismatch(
                format!("patient count of view `{}` vs labeling", view.name()),
                labels.len(),
                view.n_patients(),
            ));
        }

        let scored: Vec<Result<FeatureScore>> = (0..view.n_features())
            .into_par_iter()
            .map(|j| {
                let column = view.column(j);
                let nmi = self.score_feature(&column, labels)?;
                Ok(FeatureScore { index: j, nmi })
            })
            .collect();

        let mut scores = Vec::with_capacity(scored.len());
        for s in scored {
            scores.push(s?);
        }
        scores.sort_by(|a, b| b.nmi.total_cmp(&a.nmi).then(a.index.cmp(&b.index)));

        debug!(
            "  ✓ view `{}`: best feature {:?}",
            view.name(),
            scores.first()
        );
        Ok(FeatureRanking {
            view: view.name().to_string(),
            scores,
        })
    }

    fn score_feature(&self, column: &[f64], labels: &ClusterLabels) -> Result<f64> {
        if is_constant(column) {
            return Ok(0.0);
        }
        let groups = self.discretise_feature(column, labels.n_clusters())?;
        nmi::normalized_mutual_information(&groups, labels.as_slice())
    }

    fn discretise_feature(&self, column: &[f64], n_clusters: usize) -> Result<Vec<usize>> {
        match &self.config.discretization {
            Discretization::EqualWidth { bins } => nmi::equal_width_bins(column, *bins),
            Discretization::EqualFrequency { bins } => nmi::equal_frequency_bins(column, *bins),
            Discretization::Sturges => {
                nmi::equal_width_bins(column, nmi::sturges_bins(column.len()))
            }
            Discretization::SpectralSingleFeature { k_neighbors, alpha } => {
                let single = View::from_row_major("feature", column.to_vec(), column.len(), 1)?;
                let d = distance::squared_euclidean(&single)?;
                let w = AffinityBuilder::new(AffinityConfig::new(*k_neighbors, *alpha)).build(&d)?;
                let labels = SpectralPartitioner::new(self.config.spectral.clone())
                    .partition(&w, n_clusters)?;
                Ok(labels.into_vec())
            }
        }
    }
}

fn is_constant(column: &[f64]) -> bool {
    match column.first() {
        Some(&first) => column.iter().all(|&v| v == first),
        None => true,
    }
}
