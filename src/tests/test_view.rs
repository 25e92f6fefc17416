use approx::assert_relative_eq;

use crate::error::OmicsNetError;
use crate::tests::init;
use crate::view::{check_alignment, View};

#[test]
fn test_from_rows_shape_and_access() {
    init();
    let v = View::from_rows("expr", &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
    assert_eq!(v.name(), "expr");
    assert_eq!(v.n_patients(), 2);
    assert_eq!(v.n_features(), 3);
    assert_eq!(v.value(1, 2), 6.0);
    assert_eq!(v.row(0), vec![1.0, 2.0, 3.0]);
    assert_eq!(v.column(1), vec![2.0, 5.0]);
}

#[test]
fn test_ragged_rows_rejected() {
    let err = View::from_rows("bad", &[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
    assert!(matches!(err, OmicsNetError::DimensionMismatch { .. }));
}

#[test]
fn test_empty_and_non_finite_views_rejected() {
    let err = View::from_rows("empty", &[]).unwrap_err();
    assert!(matches!(err, OmicsNetError::InvalidInput(_)));

    let v = View::from_rows("nan", &[vec![1.0, f64::NAN], vec![0.0, 0.0]]).unwrap();
    assert!(matches!(v.validate(), Err(OmicsNetError::InvalidInput(_))));
}

#[test]
fn test_standardized_columns() {
    init();
    let v = View::from_rows(
        "mixed",
        &[
            vec![1.0, 7.0],
            vec![2.0, 7.0],
            vec![3.0, 7.0],
            vec![6.0, 7.0],
        ],
    )
    .unwrap();
    let z = v.standardized().unwrap();

    let col = z.column(0);
    let mean = col.iter().sum::<f64>() / 4.0;
    let var = col.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 3.0;
    assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
    assert_relative_eq!(var, 1.0, epsilon = 1e-12);

    // zero-variance column collapses to zeros, never NaN
    assert!(z.column(1).iter().all(|&x| x == 0.0));
}

#[test]
fn test_alignment_check() {
    let a = View::from_rows("a", &[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
    let b = View::from_rows("b", &[vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]]).unwrap();
    let c = View::from_rows("c", &[vec![1.0], vec![2.0]]).unwrap();

    assert_eq!(check_alignment(&[a.clone(), b]).unwrap(), 3);
    match check_alignment(&[a, c]).unwrap_err() {
        OmicsNetError::DimensionMismatch { expected, found, .. } => {
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
}
