//! Patient-graph Laplacian shared by the count estimator and the partitioner.
//!
//! Two conventions are supported:
//!   unnormalised        L = D − W
//!   symmetric normalised L_sym = I − D^{-½} W D^{-½}
//!
//! The normalised form has eigenvalues in [0, 2] regardless of degree and is
//! the one Normalised Cut works with; the unnormalised one is kept for
//! debugging and comparisons. Degrees equal to zero are replaced by machine
//! epsilon so isolated patients never yield NaN.

use log::{debug, info};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{OmicsNetError, Result};
use crate::linalg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaplacianConfig {
    /// Build `I − D^{-½} W D^{-½}` when true, `D − W` otherwise.
    pub normalize: bool,

    /// Zero the graph diagonal before computing degrees.
    pub drop_self_loops: bool,
}

impl Default for LaplacianConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            drop_self_loops: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphLaplacian {
    pub matrix: DMatrix<f64>,
    /// Per-node degree D_ii of the (symmetrised) graph.
    pub degrees: Vec<f64>,
    pub normalized: bool,
}

impl GraphLaplacian {
    /// Symmetrises `graph` and builds its Laplacian.
    pub fn build(graph: &DMatrix<f64>, config: &LaplacianConfig) -> Result<Self> {
        if !graph.is_square() {
            return Err(OmicsNetError::mismatch(
                "graph columns",
                graph.nrows(),
                graph.ncols(),
            ));
        }
        if graph.nrows() < 2 {
            return Err(OmicsNetError::InvalidInput(format!(
                "graph has {} node(s), at least 2 are required",
                graph.nrows()
            )));
        }
        if let Some(bad) = graph.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(OmicsNetError::InvalidInput(format!(
                "graph contains invalid weight {}",
                bad
            )));
        }

        let n = graph.nrows();
        let mut w = linalg::symmetrize(graph);
        if config.drop_self_loops {
            w.fill_diagonal(0.0);
        }

        let degrees: Vec<f64> = (0..n)
            .map(|i| {
                let d = w.row(i).sum();
                if d > 0.0 {
                    d
                } else {
                    f64::EPSILON
                }
            })
            .collect();

        let matrix = if config.normalize {
            let inv_sqrt: Vec<f64> = degrees.iter().map(|d| 1.0 / d.sqrt()).collect();
            DMatrix::from_fn(n, n, |i, j| {
                let off = w[(i, j)] * inv_sqrt[i] * inv_sqrt[j];
                if i == j {
                    1.0 - off
                } else {
                    -off
                }
            })
        } else {
            DMatrix::from_fn(n, n, |i, j| {
                if i == j {
                    degrees[i] - w[(i, i)]
                } else {
                    -w[(i, j)]
                }
            })
        };

        debug!(
            "Laplacian built: n={}, normalized={}, min degree={:.3e}",
            n,
            config.normalize,
            degrees.iter().copied().fold(f64::INFINITY, f64::min)
        );

        Ok(Self {
            matrix,
            degrees,
            normalized: config.normalize,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.matrix.nrows()
    }

    /// Eigenvalues in ascending order.
    pub fn spectrum(&self) -> Result<Vec<f64>> {
        Ok(linalg::symmetric_eigen(&self.matrix, false)?.values)
    }

    /// Count of eigenvalues below `tol`: the number of (near-)connected components.
    pub fn near_null_dimension(values: &[f64], tol: f64) -> usize {
        values.iter().filter(|v| v.abs() < tol).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "GraphLaplacian: n={}, normalized={}, total degree={:.4}",
            self.n_nodes(),
            self.normalized,
            self.degrees.iter().sum::<f64>()
        )
    }
}

/// Shortcut for the normalised Laplacian built on the graph as given.
pub fn normalized(graph: &DMatrix<f64>) -> Result<GraphLaplacian> {
    let lap = GraphLaplacian::build(graph, &LaplacianConfig::default())?;
    info!("{}", lap.summary());
    Ok(lap)
}
