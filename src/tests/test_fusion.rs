use approx::assert_relative_eq;
use nalgebra::DMatrix;

use crate::affinity::{AffinityBuilder, AffinityConfig};
use crate::distance::squared_euclidean;
use crate::error::OmicsNetError;
use crate::fusion::{
    diffuse, half_normalize, local_kernel, symmetric_sinkhorn, FusionConfig, NetworkFusion,
};
use crate::linalg::row_sum_deviation;
use crate::tests::init;
use crate::tests::test_data::{block_contrast, two_blob_truth, two_blob_views};
use crate::view::View;

fn blob_affinities(seed: u64) -> Vec<DMatrix<f64>> {
    let builder = AffinityBuilder::new(AffinityConfig::new(5, 0.5));
    two_blob_views(6.0, seed)
        .iter()
        .map(|v| builder.build(&squared_euclidean(v).unwrap()).unwrap())
        .collect()
}

#[test]
fn test_local_kernel_keeps_top_k() {
    init();
    let w = &blob_affinities(3)[0];
    let s = local_kernel(w, 4, 0).unwrap();
    assert_eq!(s.rows(), w.nrows());

    for (i, row) in s.outer_iterator().enumerate() {
        assert_eq!(row.nnz(), 4);
        let total: f64 = row.iter().map(|(_, &v)| v).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(row.iter().all(|(j, _)| j != i), "self is never a neighbour");

        // all kept weights dominate every dropped one
        let kept_min = row
            .iter()
            .map(|(j, _)| w[(i, j)])
            .fold(f64::INFINITY, f64::min);
        for j in 0..w.ncols() {
            if j != i && row.get(j).is_none() {
                assert!(w[(i, j)] <= kept_min);
            }
        }
    }
}

#[test]
fn test_diffuse_matches_dense_product() {
    init();
    let w = &blob_affinities(4)[1];
    let s = local_kernel(w, 3, 1).unwrap();
    let m = DMatrix::from_fn(w.nrows(), w.ncols(), |i, j| ((i * 7 + j * 3) % 11) as f64 + 1.0);

    let dense_s: DMatrix<f64> = {
        let mut out = DMatrix::zeros(w.nrows(), w.ncols());
        for (i, row) in s.outer_iterator().enumerate() {
            for (j, &v) in row.iter() {
                out[(i, j)] = v;
            }
        }
        out
    };
    let expected = &dense_s * &m * dense_s.transpose();
    let got = diffuse(&s, &m);
    for (a, b) in got.iter().zip(expected.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
}

#[test]
fn test_row_sums_after_every_iteration() {
    init();
    let out = NetworkFusion::new(FusionConfig::new(5, 12))
        .fuse(&blob_affinities(5))
        .unwrap();

    assert_eq!(out.trace.len(), 12);
    for stats in &out.trace {
        assert!(
            stats.max_row_deviation < 1e-10,
            "iteration {} row deviation {}",
            stats.iteration,
            stats.max_row_deviation
        );
    }
    for p in &out.status {
        assert!(row_sum_deviation(p) < 1e-10);
    }
    assert!(out.row_sum_residual < 1e-8);
    assert!(row_sum_deviation(&out.fused) < 1e-8);

    let n = out.fused.nrows();
    for i in 0..n {
        for j in 0..n {
            assert_eq!(out.fused[(i, j)], out.fused[(j, i)]);
            assert!(out.fused[(i, j)] >= 0.0);
        }
    }
}

#[test]
fn test_fusion_invariant_to_view_order() {
    init();
    let w = blob_affinities(6);
    let fusion = NetworkFusion::new(FusionConfig::new(5, 10));

    let forward = fusion.fuse(&w).unwrap();
    let rotated = fusion
        .fuse(&[w[2].clone(), w[0].clone(), w[1].clone()])
        .unwrap();
    let reversed = fusion
        .fuse(&[w[2].clone(), w[1].clone(), w[0].clone()])
        .unwrap();

    for other in [&rotated, &reversed] {
        for (a, b) in forward.fused.iter().zip(other.fused.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-8);
        }
    }
}

#[test]
fn test_fusion_is_reproducible() {
    init();
    let w = blob_affinities(8);
    let fusion = NetworkFusion::new(FusionConfig::new(5, 8));
    let a = fusion.fuse(&w).unwrap();
    let b = fusion.fuse(&w).unwrap();
    assert_eq!(a.fused, b.fused);
}

#[test]
fn test_fused_graph_has_block_structure() {
    init();
    let truth = two_blob_truth();
    let out = NetworkFusion::new(FusionConfig::new(5, 20))
        .fuse(&blob_affinities(9))
        .unwrap();
    let contrast = block_contrast(&out.fused, &truth);
    assert!(contrast > 100.0, "fused block contrast {}", contrast);
}

#[test]
fn test_block_contrast_grows_with_iterations() {
    init();
    let truth = two_blob_truth();
    let w = blob_affinities(9);

    let mut previous = 0.0;
    for t in 1..=20 {
        let out = NetworkFusion::new(FusionConfig::new(5, t)).fuse(&w).unwrap();
        assert_eq!(out.iterations, t);
        assert!(out.row_sum_residual < 1e-8);
        let contrast = block_contrast(&out.fused, &truth);
        assert!(
            contrast >= previous,
            "T={} contrast {:.4e} fell below T={} contrast {:.4e}",
            t,
            contrast,
            t - 1,
            previous
        );
        previous = contrast;
    }
}

#[test]
fn test_half_normalize() {
    let mut m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 3.0, 2.0, 0.0, 2.0, 5.0, 5.0, 9.0]);
    half_normalize(&mut m, "toy").unwrap();
    for i in 0..3 {
        assert_eq!(m[(i, i)], 0.5);
        assert_relative_eq!(m.row(i).sum(), 1.0, epsilon = 1e-15);
    }
    // off-diagonal proportions are kept
    assert_relative_eq!(m[(0, 1)], 0.125, epsilon = 1e-15);
    assert_relative_eq!(m[(0, 2)], 0.375, epsilon = 1e-15);

    // a row with weight only on the diagonal cannot be normalised
    let mut lonely = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
    let err = half_normalize(&mut lonely, "lonely").unwrap_err();
    assert!(matches!(err, OmicsNetError::NumericalFailure(_)));
}

#[test]
fn test_tight_patient_pair_balances() {
    init();
    let builder = AffinityBuilder::new(AffinityConfig::new(2, 0.5));
    let w: Vec<DMatrix<f64>> = [
        [0.0, 0.1, 5.0, 5.1, 5.2],
        [0.0, 0.2, 4.0, 4.1, 4.3],
    ]
    .iter()
    .map(|col| {
        let view = View::from_row_major("tight", col.to_vec(), 5, 1).unwrap();
        builder.build(&squared_euclidean(&view).unwrap()).unwrap()
    })
    .collect();

    for t in [1, 5] {
        let out = NetworkFusion::new(FusionConfig::new(2, t)).fuse(&w).unwrap();
        assert!(out.row_sum_residual < 1e-8, "T={} residual {}", t, out.row_sum_residual);
        assert!(out.sinkhorn_iterations < 200);
    }
}

#[test]
fn test_k_larger_than_n_behaves_as_all_neighbours() {
    init();
    let w = blob_affinities(12);
    let n = w[0].nrows();
    let exact = NetworkFusion::new(FusionConfig::new(n - 1, 3)).fuse(&w).unwrap();
    let over = NetworkFusion::new(FusionConfig::new(5 * n, 3)).fuse(&w).unwrap();
    assert_eq!(exact.fused, over.fused);
}

#[test]
fn test_fusion_errors() {
    init();
    let w = blob_affinities(13);

    // a single view is rejected rather than passed through
    let err = NetworkFusion::with_defaults().fuse(&w[..1]).unwrap_err();
    assert!(matches!(err, OmicsNetError::InvalidInput(_)));

    let err = NetworkFusion::new(FusionConfig::new(5, 0))
        .fuse(&w)
        .unwrap_err();
    assert!(matches!(err, OmicsNetError::InvalidParameter { .. }));

    let small = DMatrix::<f64>::from_element(5, 5, 0.5);
    let err = NetworkFusion::with_defaults()
        .fuse(&[w[0].clone(), small])
        .unwrap_err();
    assert!(matches!(err, OmicsNetError::DimensionMismatch { .. }));

    // an all-zero similarity row cannot be normalised; the run aborts
    let mut broken = w[1].clone();
    broken.row_mut(3).fill(0.0);
    broken.column_mut(3).fill(0.0);
    let err = NetworkFusion::new(FusionConfig::new(5, 2))
        .fuse(&[w[0].clone(), broken, w[2].clone()])
        .unwrap_err();
    assert!(matches!(err, OmicsNetError::NumericalFailure(_)));
}

#[test]
fn test_balancing_step_cap_is_not_fatal() {
    init();
    let a = DMatrix::from_fn(5, 5, |i, j| if i == j { 1.0 } else { 1e-3 * (1 + i + j) as f64 });
    let (b, steps) = symmetric_sinkhorn(&a, 1e-14, 1).unwrap();
    assert_eq!(steps, 1);
    assert_eq!(b, b.transpose());
    assert!(b.iter().all(|v| v.is_finite() && *v >= 0.0));

    let zero_row = DMatrix::from_fn(3, 3, |i, j| if i == 1 || j == 1 { 0.0 } else { 1.0 });
    let err = symmetric_sinkhorn(&zero_row, 1e-10, 50).unwrap_err();
    assert!(matches!(err, OmicsNetError::NumericalFailure(_)));
}

#[test]
fn test_symmetric_sinkhorn_balances() {
    init();
    let a = DMatrix::from_fn(6, 6, |i, j| 1.0 + ((i + j) % 4) as f64);
    let (b, steps) = symmetric_sinkhorn(&a, 1e-12, 200).unwrap();
    assert!(steps < 200);
    assert!(row_sum_deviation(&b) < 1e-10);
    assert!(row_sum_deviation(&b.transpose()) < 1e-10);
}
