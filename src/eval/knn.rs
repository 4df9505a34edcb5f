//! k-NN Classifier Tester
//!
//! Evaluates embedding quality by majority vote over the k nearest training
//! embeddings. Ties go to the smaller class index so scoring stays
//! deterministic.

use ndarray::Array2;

use crate::selection::neighbors::NearestNeighbors;
use crate::utils::error::{ActiveSslError, Result};

/// Majority-vote classifier over fitted embeddings
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    neighbors: NearestNeighbors,
    labels: Vec<usize>,
    num_classes: usize,
}

impl KnnClassifier {
    /// Fit over training embeddings and their hard labels
    pub fn fit(embeddings: Array2<f32>, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if labels.len() != embeddings.nrows() {
            return Err(ActiveSslError::LengthMismatch {
                expected: embeddings.nrows(),
                actual: labels.len(),
            });
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(ActiveSslError::Config(format!(
                "label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        Ok(Self {
            neighbors: NearestNeighbors::fit(embeddings)?,
            labels,
            num_classes,
        })
    }

    /// Predicted class per query row, majority vote over the `k` nearest
    pub fn predict(&self, queries: &Array2<f32>, k: usize) -> Result<Vec<usize>> {
        let hits = self.neighbors.kneighbors(queries, k)?;

        let mut predictions = Vec::with_capacity(hits.len());
        for neighbor_rows in hits {
            let mut votes = vec![0usize; self.num_classes];
            for row in neighbor_rows {
                votes[self.labels[row]] += 1;
            }
            // Strict comparison keeps the smaller class on ties.
            let mut winner = 0;
            for (class, &count) in votes.iter().enumerate() {
                if count > votes[winner] {
                    winner = class;
                }
            }
            predictions.push(winner);
        }

        Ok(predictions)
    }

    /// Fraction of queries whose prediction matches the given label
    pub fn score(&self, queries: &Array2<f32>, labels: &[usize], k: usize) -> Result<f64> {
        if labels.len() != queries.nrows() {
            return Err(ActiveSslError::LengthMismatch {
                expected: queries.nrows(),
                actual: labels.len(),
            });
        }

        let predictions = self.predict(queries, k)?;
        let correct = predictions
            .iter()
            .zip(labels.iter())
            .filter(|(p, l)| p == l)
            .count();
        Ok(correct as f64 / labels.len() as f64)
    }
}
