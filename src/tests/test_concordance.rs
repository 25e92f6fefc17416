use nalgebra::DMatrix;

use crate::affinity::{AffinityBuilder, AffinityConfig};
use crate::concordance::{concordance_nmi, labelings_concordance};
use crate::distance::squared_euclidean;
use crate::error::OmicsNetError;
use crate::fusion::{FusionConfig, NetworkFusion};
use crate::spectral::{ClusterLabels, SpectralConfig, SpectralPartitioner};
use crate::tests::init;
use crate::tests::test_data::{block_graph, two_blob_views};

#[test]
fn test_views_agree_with_fused_graph() {
    init();
    let builder = AffinityBuilder::new(AffinityConfig::new(5, 0.5));
    let mut graphs: Vec<DMatrix<f64>> = two_blob_views(6.0, 21)
        .iter()
        .map(|v| builder.build(&squared_euclidean(v).unwrap()).unwrap())
        .collect();
    let fused = NetworkFusion::new(FusionConfig::new(5, 10))
        .fuse(&graphs)
        .unwrap()
        .fused;
    graphs.push(fused);

    let partitioner = SpectralPartitioner::new(SpectralConfig {
        include_trivial_eigenvector: true,
        ..Default::default()
    });
    let m = concordance_nmi(&partitioner, &graphs, 2).unwrap();
    assert_eq!(m.shape(), (4, 4));
    for a in 0..4 {
        assert_eq!(m[(a, a)], 1.0);
        for b in 0..4 {
            assert_eq!(m[(a, b)], m[(b, a)]);
            assert!(m[(a, b)] >= 0.99, "entry ({}, {}) = {}", a, b, m[(a, b)]);
        }
    }
}

#[test]
fn test_disagreeing_labelings() {
    let halves = ClusterLabels::new(vec![0, 0, 1, 1], 2).unwrap();
    let alternating = ClusterLabels::new(vec![0, 1, 0, 1], 2).unwrap();
    let m = labelings_concordance(&[halves.clone(), alternating, halves]).unwrap();
    assert!(m[(0, 1)].abs() < 1e-12);
    assert!((m[(0, 2)] - 1.0).abs() < 1e-12);
    assert_eq!(m[(1, 1)], 1.0);
}

#[test]
fn test_concordance_errors() {
    init();
    let p = SpectralPartitioner::with_defaults();
    let err = concordance_nmi(&p, &[], 2).unwrap_err();
    assert!(matches!(err, OmicsNetError::InvalidInput(_)));

    let graphs = [block_graph(2, 4, 1.0, 0.01, 0.0), block_graph(2, 5, 1.0, 0.01, 0.0)];
    let err = concordance_nmi(&p, &graphs, 2).unwrap_err();
    assert!(matches!(err, OmicsNetError::DimensionMismatch { .. }));
}
