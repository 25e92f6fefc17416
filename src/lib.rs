//! # omicsnet
//!
//! Similarity network fusion for patient-aligned omics views.
//!
//! Three (or more) views of the same patients, e.g. gene expression, DNA
//! methylation and miRNA expression, are turned into one patient-similarity
//! graph, partitioned into clusters, and used to rank the features that best
//! explain the partition.
//!
//! ```text
//! views ─▶ distance ─▶ affinity (per view) ─▶ fusion ─▶ fused graph
//!                                                        │
//!                              ┌─────────────────────────┼──────────────┐
//!                              ▼                         ▼              │
//!                         estimate (C?)          spectral (labels) ─▶ ranking
//! ```
//!
//! Every stage is a plain function of its inputs; [`pipeline::OmicsNet`]
//! composes them. The crate does no I/O and installs no logger: stages report
//! through the `log` facade.

pub mod affinity;
pub mod concordance;
pub mod distance;
pub mod error;
pub mod estimate;
pub mod fusion;
pub mod laplacian;
pub mod linalg;
pub mod nmi;
pub mod pipeline;
pub mod ranking;
pub mod spectral;
pub mod view;

pub use affinity::{AffinityBuilder, AffinityConfig};
pub use distance::DistanceMetric;
pub use error::{OmicsNetError, Result};
pub use estimate::{estimate_cluster_counts, ClusterCountEstimate, CountScore};
pub use fusion::{FusionConfig, FusionOutput, NetworkFusion};
pub use pipeline::{IntegrationResult, OmicsNet, OmicsNetBuilder, OmicsNetConfig};
pub use ranking::{Discretization, FeatureRanker, FeatureRanking, FeatureScore, RankingConfig};
pub use spectral::{ClusterLabels, SpectralConfig, SpectralPartitioner};
pub use view::View;

#[cfg(test)]
mod tests;
