//! Agreement between clusterings of several graphs.
//!
//! Typical use: partition each per-view affinity and the fused graph into
//! the same C, then compare. Low off-diagonal values point at views whose own
//! structure disagrees with the integrated one.

use log::info;
use nalgebra::DMatrix;

use crate::error::{OmicsNetError, Result};
use crate::nmi::normalized_mutual_information;
use crate::spectral::{ClusterLabels, SpectralPartitioner};

/// Symmetric matrix of pairwise NMI between the C-way partitions of `graphs`.
/// The diagonal is 1.
pub fn concordance_nmi(
    partitioner: &SpectralPartitioner,
    graphs: &[DMatrix<f64>],
    n_clusters: usize,
) -> Result<DMatrix<f64>> {
    if graphs.is_empty() {
        return Err(OmicsNetError::InvalidInput(
            "concordance needs at least one graph".into(),
        ));
    }
    let n = graphs[0].nrows();
    if let Some(g) = graphs.iter().find(|g| g.nrows() != n) {
        return Err(OmicsNetError::mismatch("patient count of graph", n, g.nrows()));
    }

    info!(
        "Concordance: {} graph(s), n={}, C={}",
        graphs.len(),
        n,
        n_clusters
    );

    let labelings: Vec<ClusterLabels> = graphs
        .iter()
        .map(|g| partitioner.partition(g, n_clusters))
        .collect::<Result<_>>()?;

    labelings_concordance(&labelings)
}

/// Pairwise NMI between already computed labelings.
pub fn labelings_concordance(labelings: &[ClusterLabels]) -> Result<DMatrix<f64>> {
    let m = labelings.len();
    let mut out = DMatrix::<f64>::identity(m, m);
    for a in 0..m {
        for b in (a + 1)..m {
            let v = normalized_mutual_information(labelings[a].as_slice(), labelings[b].as_slice())?;
            out[(a, b)] = v;
            out[(b, a)] = v;
        }
    }
    Ok(out)
}
