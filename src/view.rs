//! One omics modality as a patient × feature matrix.
//!
//! Rows are patients and must be order-aligned across every view handed to a
//! single run; columns are the view's own features (genes, CpG probes,
//! miRNAs). Views are immutable once built: preprocessing such as
//! [`View::standardized`] returns a new view.

use log::{debug, trace};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{OmicsNetError, Result};

#[derive(Debug, Clone)]
pub struct View {
    name: String,
    data: DenseMatrix<f64>,
}

impl View {
    pub fn new(name: impl Into<String>, data: DenseMatrix<f64>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Build from one `Vec` per patient. Rows must all have the same length.
    pub fn from_rows(name: impl Into<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let name = name.into();
        if rows.is_empty() || rows[0].is_empty() {
            return Err(OmicsNetError::InvalidInput(format!(
                "view `{}` is empty",
                name
            )));
        }
        let p = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != p) {
            return Err(OmicsNetError::mismatch(
                format!("row length of view `{}`", name),
                p,
                bad.len(),
            ));
        }
        let data = DenseMatrix::from_2d_vec(&rows.to_vec())
            .map_err(|e| OmicsNetError::InvalidInput(format!("view `{}`: {}", name, e)))?;
        Ok(Self { name, data })
    }

    /// Build from a flat row-major buffer of `n * p` values.
    pub fn from_row_major(
        name: impl Into<String>,
        values: Vec<f64>,
        n: usize,
        p: usize,
    ) -> Result<Self> {
        let name = name.into();
        if values.len() != n * p {
            return Err(OmicsNetError::mismatch(
                format!("buffer length of view `{}`", name),
                n * p,
                values.len(),
            ));
        }
        let data = DenseMatrix::new(n, p, values, false)
            .map_err(|e| OmicsNetError::InvalidInput(format!("view `{}`: {}", name, e)))?;
        Ok(Self { name, data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matrix(&self) -> &DenseMatrix<f64> {
        &self.data
    }

    pub fn n_patients(&self) -> usize {
        self.data.shape().0
    }

    pub fn n_features(&self) -> usize {
        self.data.shape().1
    }

    #[inline]
    pub fn value(&self, patient: usize, feature: usize) -> f64 {
        *self.data.get((patient, feature))
    }

    pub fn row(&self, patient: usize) -> Vec<f64> {
        (0..self.n_features())
            .map(|j| self.value(patient, j))
            .collect()
    }

    pub fn column(&self, feature: usize) -> Vec<f64> {
        (0..self.n_patients())
            .map(|i| self.value(i, feature))
            .collect()
    }

    /// Reject empty views and non-finite entries.
    pub fn validate(&self) -> Result<()> {
        let (n, p) = self.data.shape();
        if n == 0 || p == 0 {
            return Err(OmicsNetError::InvalidInput(format!(
                "view `{}` is empty ({}×{})",
                self.name, n, p
            )));
        }
        for i in 0..n {
            for j in 0..p {
                let v = self.value(i, j);
                if !v.is_finite() {
                    return Err(OmicsNetError::InvalidInput(format!(
                        "view `{}` has non-finite value {} at ({}, {})",
                        self.name, v, i, j
                    )));
                }
            }
        }
        trace!("view `{}` validated ({}×{})", self.name, n, p);
        Ok(())
    }

    /// Column-wise z-score using the sample standard deviation.
    ///
    /// Zero-variance columns become all zeros instead of NaN.
    pub fn standardized(&self) -> Result<View> {
        self.validate()?;
        let (n, p) = self.data.shape();
        let mut out = vec![0.0f64; n * p];

        for j in 0..p {
            let col = self.column(j);
            let mean = col.iter().sum::<f64>() / n as f64;
            let var = if n > 1 {
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
            } else {
                0.0
            };
            let sd = var.sqrt();
            for (i, v) in col.iter().enumerate() {
                out[i * p + j] = if sd > f64::EPSILON { (v - mean) / sd } else { 0.0 };
            }
        }

        debug!("standardized view `{}` ({} features)", self.name, p);
        View::from_row_major(self.name.clone(), out, n, p)
    }
}

/// Check that every view has the same patient count and return it.
pub fn check_alignment(views: &[View]) -> Result<usize> {
    let first = views
        .first()
        .ok_or_else(|| OmicsNetError::InvalidInput("no views supplied".into()))?;
    let n = first.n_patients();
    for v in views.iter().skip(1) {
        if v.n_patients() != n {
            return Err(OmicsNetError::mismatch(
                format!("patient count of view `{}`", v.name()),
                n,
                v.n_patients(),
            ));
        }
    }
    Ok(n)
}
