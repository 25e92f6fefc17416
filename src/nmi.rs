//! Histogram-based entropy, mutual information and NMI.
//!
//! All quantities are in nats and estimated from plug-in frequencies.
//! Normalisation follows `I(X;Y) / sqrt(H(X)·H(Y))`, which lies in [0, 1] and
//! is defined as 0 when either variable is constant.

use std::collections::BTreeMap;

use crate::error::{OmicsNetError, Result};

pub fn entropy(labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let n = labels.len() as f64;
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &l in labels {
        *counts.entry(l).or_default() += 1;
    }
    -counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            p * p.ln()
        })
        .sum::<f64>()
}

pub fn mutual_information(a: &[usize], b: &[usize]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(OmicsNetError::mismatch("labeling length", a.len(), b.len()));
    }
    if a.is_empty() {
        return Ok(0.0);
    }
    let n = a.len() as f64;

    let mut joint: BTreeMap<(usize, usize), usize> = BTreeMap::new();
    let mut pa: BTreeMap<usize, usize> = BTreeMap::new();
    let mut pb: BTreeMap<usize, usize> = BTreeMap::new();
    for (&x, &y) in a.iter().zip(b) {
        *joint.entry((x, y)).or_default() += 1;
        *pa.entry(x).or_default() += 1;
        *pb.entry(y).or_default() += 1;
    }

    let mi = joint
        .iter()
        .map(|(&(x, y), &c)| {
            let pxy = c as f64 / n;
            let px = pa[&x] as f64 / n;
            let py = pb[&y] as f64 / n;
            pxy * (pxy / (px * py)).ln()
        })
        .sum::<f64>();
    Ok(mi.max(0.0))
}

/// NMI between two labelings of the same patients, in [0, 1].
pub fn normalized_mutual_information(a: &[usize], b: &[usize]) -> Result<f64> {
    let mi = mutual_information(a, b)?;
    let ha = entropy(a);
    let hb = entropy(b);
    if ha <= f64::EPSILON || hb <= f64::EPSILON {
        return Ok(0.0);
    }
    Ok((mi / (ha * hb).sqrt()).clamp(0.0, 1.0))
}

/// Sturges' rule: ⌈log₂ n⌉ + 1 bins.
pub fn sturges_bins(n: usize) -> usize {
    if n < 2 {
        return 1;
    }
    (n as f64).log2().ceil() as usize + 1
}

/// Equal-width bins over [min, max]. A constant column maps to bin 0.
pub fn equal_width_bins(values: &[f64], bins: usize) -> Result<Vec<usize>> {
    check_values(values, bins)?;
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if span <= f64::EPSILON * max.abs().max(1.0) {
        return Ok(vec![0; values.len()]);
    }
    Ok(values
        .iter()
        .map(|&v| (((v - min) / span * bins as f64).floor() as usize).min(bins - 1))
        .collect())
}

/// Quantile bins by rank. Equal values always share a bin, so a constant
/// column maps to bin 0.
pub fn equal_frequency_bins(values: &[f64], bins: usize) -> Result<Vec<usize>> {
    check_values(values, bins)?;
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    let mut out = vec![0usize; n];
    let mut group_bin = 0usize;
    for (rank, &idx) in order.iter().enumerate() {
        let tied = rank > 0 && values[order[rank - 1]] == values[idx];
        if !tied {
            group_bin = (rank * bins / n).min(bins - 1);
        }
        out[idx] = group_bin;
    }
    Ok(out)
}

fn check_values(values: &[f64], bins: usize) -> Result<()> {
    if bins < 1 {
        return Err(OmicsNetError::parameter("bins", "must be at least 1"));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(OmicsNetError::InvalidInput(format!(
            "cannot bin non-finite value {}",
            bad
        )));
    }
    Ok(())
}
