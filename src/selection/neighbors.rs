//! Nearest Neighbors
//!
//! Brute-force exact k-NN over a fitted reference matrix, Euclidean distance.
//! Used to snap free cluster centers onto actual samples and by the k-NN
//! tester.

use ndarray::{Array2, Axis};

use crate::selection::kmeans::squared_distance;
use crate::utils::error::{ActiveSslError, Result};

/// Exact nearest-neighbor lookup over a reference matrix
#[derive(Debug, Clone)]
pub struct NearestNeighbors {
    data: Array2<f32>,
}

impl NearestNeighbors {
    /// Fit over the reference rows
    pub fn fit(data: Array2<f32>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(ActiveSslError::Config(
                "cannot fit nearest neighbors on empty data".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// Row indices of the `k` nearest reference rows for each query row,
    /// closest first
    pub fn kneighbors(&self, queries: &Array2<f32>, k: usize) -> Result<Vec<Vec<usize>>> {
        if k == 0 || k > self.data.nrows() {
            return Err(ActiveSslError::Config(format!(
                "k must be in 1..={}, got {}",
                self.data.nrows(),
                k
            )));
        }
        if queries.ncols() != self.data.ncols() {
            return Err(ActiveSslError::Config(format!(
                "query dim {} does not match fitted dim {}",
                queries.ncols(),
                self.data.ncols()
            )));
        }

        let mut results = Vec::with_capacity(queries.nrows());
        for query in queries.axis_iter(Axis(0)) {
            let mut distances: Vec<(usize, f32)> = self
                .data
                .axis_iter(Axis(0))
                .enumerate()
                .map(|(i, row)| (i, squared_distance(&query, &row)))
                .collect();
            distances.sort_by(|a, b| a.1.total_cmp(&b.1));
            results.push(distances.into_iter().take(k).map(|(i, _)| i).collect());
        }

        Ok(results)
    }

    /// Single nearest reference row per query row
    pub fn nearest(&self, queries: &Array2<f32>) -> Result<Vec<usize>> {
        Ok(self
            .kneighbors(queries, 1)?
            .into_iter()
            .map(|mut hits| hits.remove(0))
            .collect())
    }

    /// Number of fitted reference rows
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }
}
