use approx::assert_relative_eq;
use nalgebra::DMatrix;

use crate::affinity::{local_scales, AffinityBuilder, AffinityConfig, DIAGONAL_DAMPING};
use crate::distance::squared_euclidean;
use crate::error::OmicsNetError;
use crate::tests::init;
use crate::tests::test_data::{block_contrast, two_blob_truth, two_blob_views};

fn blob_distances() -> Vec<DMatrix<f64>> {
    two_blob_views(6.0, 11)
        .iter()
        .map(|v| squared_euclidean(v).unwrap())
        .collect()
}

#[test]
fn test_affinity_symmetric_in_unit_interval() {
    init();
    let builder = AffinityBuilder::new(AffinityConfig::new(5, 0.5));
    for d in blob_distances() {
        let w = builder.build(&d).unwrap();
        let n = w.nrows();
        for i in 0..n {
            assert_eq!(w[(i, i)], DIAGONAL_DAMPING);
            for j in 0..n {
                assert_eq!(w[(i, j)], w[(j, i)]);
                assert!(w[(i, j)] > 0.0, "entry ({}, {}) must be positive", i, j);
                assert!(w[(i, j)] <= 1.0, "entry ({}, {}) must be <= 1", i, j);
            }
        }
    }
}

#[test]
fn test_affinity_separates_blobs() {
    init();
    let truth = two_blob_truth();
    let builder = AffinityBuilder::new(AffinityConfig::new(5, 0.5));
    for d in blob_distances() {
        let w = builder.build(&d).unwrap();
        let contrast = block_contrast(&w, &truth);
        assert!(contrast > 100.0, "block contrast too low: {}", contrast);
    }
}

#[test]
fn test_local_scaling_absorbs_view_units() {
    init();
    let d = &blob_distances()[0];
    let builder = AffinityBuilder::new(AffinityConfig::new(5, 0.5));
    let w = builder.build(d).unwrap();
    let w_scaled = builder.build(&(d * 1000.0)).unwrap();

    for (a, b) in w.iter().zip(w_scaled.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9, max_relative = 1e-6);
    }
}

#[test]
fn test_k_larger_than_n_uses_all_neighbours() {
    init();
    let d = &blob_distances()[1];
    let n = d.nrows();

    let all = AffinityBuilder::new(AffinityConfig::new(n - 1, 0.5))
        .build(d)
        .unwrap();
    let too_many = AffinityBuilder::new(AffinityConfig::new(10 * n, 0.5))
        .build(d)
        .unwrap();
    assert_eq!(all, too_many);

    // every patient's scale is the mean over everyone else
    let scales = local_scales(d, 10 * n);
    let row0: f64 = (1..n).map(|j| d[(0, j)]).sum::<f64>() / (n - 1) as f64;
    assert_relative_eq!(scales[0], row0, epsilon = 1e-9);
}

#[test]
fn test_affinity_parameter_domain() {
    let d = &blob_distances()[0];
    for cfg in [
        AffinityConfig::new(0, 0.5),
        AffinityConfig::new(5, 0.0),
        AffinityConfig::new(5, -1.0),
        AffinityConfig::new(5, f64::NAN),
    ] {
        let err = AffinityBuilder::new(cfg).build(d).unwrap_err();
        assert!(matches!(err, OmicsNetError::InvalidParameter { .. }));
    }
}

#[test]
fn test_affinity_rejects_non_square() {
    let d = DMatrix::<f64>::zeros(3, 4);
    let err = AffinityBuilder::with_defaults().build(&d).unwrap_err();
    assert!(matches!(err, OmicsNetError::DimensionMismatch { .. }));
}
