//! Soft-Label Store
//!
//! Holds one probability vector per unpooled train sample. Row `i` of the
//! matrix belongs to the `i`-th unpool index in ascending order; that
//! alignment is the store's central invariant and must be re-established
//! whenever the unpool set changes (see [`SoftLabelStore::realign`]).
//!
//! The matrix is persisted to the run root after initialization and after
//! every update. Updates are full-matrix overwrites with a durable write, so
//! callers should update once per epoch of interest, not per mini-batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::{BatchSizes, SemiSupervisedConfig};
use crate::utils::error::{ActiveSslError, Result};
use crate::SOFT_LABELS_FILE;

/// Probability-vector storage for the unpool set
#[derive(Debug, Clone)]
pub struct SoftLabelStore {
    /// `[unpool_set_size, num_classes]`, each row an L1-normalized distribution
    matrix: Array2<f32>,
    /// Absolute train index -> row rank in `matrix`
    ranks: HashMap<usize, usize>,
    /// Fixed batch shape expected by `fetch_rows`
    unpool_batch_size: usize,
    num_classes: usize,
    save_path: PathBuf,
}

impl SoftLabelStore {
    /// Load the matrix from the configured reference, or randomize a fresh
    /// one, then persist it.
    ///
    /// `unpool_indices` must be the current ascending unpool index list.
    pub fn initialize(
        config: &SemiSupervisedConfig,
        batch_sizes: &BatchSizes,
        unpool_indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<Self> {
        let expected = (unpool_indices.len(), config.num_classes);

        let matrix = match &config.soft_labels_ref {
            Some(reference) => {
                info!("soft_labels_ref was given, loading {}", reference.display());
                let matrix = load_matrix(reference)?;
                if matrix.dim() != expected {
                    return Err(ActiveSslError::ShapeMismatch {
                        expected,
                        actual: matrix.dim(),
                    });
                }
                matrix
            }
            None => {
                info!("soft_labels_ref is None, randomizing new probabilities");
                random_probability_rows(expected.0, expected.1, rng)
            }
        };

        let store = Self {
            matrix,
            ranks: build_ranks(unpool_indices),
            unpool_batch_size: batch_sizes.unpool_batch_size,
            num_classes: config.num_classes,
            save_path: config.root_dir.join(SOFT_LABELS_FILE),
        };
        store.save()?;

        Ok(store)
    }

    /// Replace the whole matrix and persist it
    ///
    /// Fails with `ShapeMismatch` (leaving the stored matrix unchanged) if the
    /// new matrix disagrees with the current shape.
    pub fn update(&mut self, new_matrix: Array2<f32>, step: usize) -> Result<()> {
        if new_matrix.dim() != self.matrix.dim() {
            return Err(ActiveSslError::ShapeMismatch {
                expected: self.matrix.dim(),
                actual: new_matrix.dim(),
            });
        }

        let audit_rows = self.matrix.nrows().min(5);
        let old_head = self
            .matrix
            .slice(ndarray::s![..audit_rows, ..])
            .to_owned();

        info!("updating the unpool soft labels for global_step={}", step);
        self.matrix = new_matrix;

        info!(
            "first {} unpool soft labels:\n old_values = {:?}\n new_values = {:?}",
            audit_rows,
            old_head,
            self.matrix.slice(ndarray::s![..audit_rows, ..])
        );

        self.save()
    }

    /// Fetch the probability rows for a batch of absolute train indices
    ///
    /// The batch must have exactly the configured unpool batch length, and
    /// every index must currently be in the unpool set.
    pub fn fetch_rows(&self, batch_unpool_indices: &[usize]) -> Result<Array2<f32>> {
        if batch_unpool_indices.len() != self.unpool_batch_size {
            return Err(ActiveSslError::LengthMismatch {
                expected: self.unpool_batch_size,
                actual: batch_unpool_indices.len(),
            });
        }

        let mut rows = Array2::zeros((batch_unpool_indices.len(), self.num_classes));
        for (i, &idx) in batch_unpool_indices.iter().enumerate() {
            let rank = self.ranks.get(&idx).ok_or_else(|| {
                ActiveSslError::InvariantViolation(format!(
                    "index {} is not in the unpool set",
                    idx
                ))
            })?;
            rows.row_mut(i).assign(&self.matrix.row(*rank));
        }

        Ok(rows)
    }

    /// Re-establish row alignment after the unpool set changed
    ///
    /// Rows for surviving indices are carried over (permuted as needed); rows
    /// for samples that left the unpool set are dropped. The rank map is
    /// rebuilt and the resized matrix persisted.
    pub fn realign(&mut self, new_unpool_indices: &[usize]) -> Result<()> {
        let mut new_matrix = Array2::zeros((new_unpool_indices.len(), self.num_classes));
        for (row, &idx) in new_unpool_indices.iter().enumerate() {
            let old_rank = self.ranks.get(&idx).ok_or_else(|| {
                ActiveSslError::InvariantViolation(format!(
                    "index {} entered the unpool set without a soft-label row",
                    idx
                ))
            })?;
            new_matrix.row_mut(row).assign(&self.matrix.row(*old_rank));
        }

        info!(
            "realigning soft labels: {} -> {} unpool rows",
            self.matrix.nrows(),
            new_matrix.nrows()
        );

        self.matrix = new_matrix;
        self.ranks = build_ranks(new_unpool_indices);
        self.save()
    }

    /// Current matrix shape `(unpool_set_size, num_classes)`
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.dim()
    }

    /// Read access to the full matrix
    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// Path of the persisted soft-label file
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.save_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.matrix)
            .map_err(|e| ActiveSslError::Serde(e.to_string()))?;
        std::fs::write(&self.save_path, json)?;
        info!("saved soft labels to {}", self.save_path.display());
        Ok(())
    }
}

/// Load a persisted soft-label matrix
pub fn load_matrix(path: &Path) -> Result<Array2<f32>> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| ActiveSslError::Serde(e.to_string()))
}

fn build_ranks(unpool_indices: &[usize]) -> HashMap<usize, usize> {
    unpool_indices
        .iter()
        .enumerate()
        .map(|(rank, &idx)| (idx, rank))
        .collect()
}

/// Uniform random rows, L1-normalized so each row is a valid distribution.
/// A degenerate all-zero row falls back to the uniform distribution.
fn random_probability_rows(rows: usize, num_classes: usize, rng: &mut ChaCha8Rng) -> Array2<f32> {
    let mut matrix = Array2::zeros((rows, num_classes));
    for mut row in matrix.rows_mut() {
        for value in row.iter_mut() {
            *value = rng.gen::<f32>();
        }
        let sum: f32 = row.sum();
        if sum <= f32::EPSILON {
            row.fill(1.0 / num_classes as f32);
        } else {
            row.mapv_inplace(|v| v / sum);
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn test_config(dir: &Path, num_classes: usize) -> SemiSupervisedConfig {
        SemiSupervisedConfig {
            num_classes,
            root_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn test_batch_sizes(unpool_batch_size: usize) -> BatchSizes {
        BatchSizes {
            pool_batch_size: 4,
            unpool_batch_size,
        }
    }

    fn build_store(dir: &Path, unpool_indices: &[usize]) -> SoftLabelStore {
        let config = test_config(dir, 3);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        SoftLabelStore::initialize(&config, &test_batch_sizes(2), unpool_indices, &mut rng)
            .unwrap()
    }

    #[test]
    fn test_rows_sum_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), &[0, 2, 4, 6, 8]);

        assert_eq!(store.shape(), (5, 3));
        for row in store.matrix().rows() {
            let sum: f32 = row.sum();
            assert!((sum - 1.0).abs() < 1e-6, "row sums to {}", sum);
            assert!(row.iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn test_update_shape_mismatch_keeps_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = build_store(dir.path(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);

        let before = store.matrix().clone();
        let err = store.update(Array2::zeros((10, 3)), 100).unwrap_err();
        assert!(matches!(err, ActiveSslError::ShapeMismatch { .. }));
        assert_eq!(store.matrix(), &before);
    }

    #[test]
    fn test_update_replaces_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = build_store(dir.path(), &[1, 3, 5, 7, 9]);

        let mut replacement = Array2::zeros((5, 3));
        replacement.column_mut(0).fill(1.0);
        store.update(replacement.clone(), 7).unwrap();

        assert_eq!(store.matrix(), &replacement);
        let reloaded = load_matrix(store.save_path()).unwrap();
        assert_eq!(reloaded, replacement);
    }

    #[test]
    fn test_fetch_rows_maps_by_rank() {
        let dir = tempfile::tempdir().unwrap();
        let unpool = [10usize, 20, 30, 40];
        let config = test_config(dir.path(), 3);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let store =
            SoftLabelStore::initialize(&config, &test_batch_sizes(2), &unpool, &mut rng).unwrap();

        let rows = store.fetch_rows(&[30, 10]).unwrap();
        assert_eq!(rows.row(0), store.matrix().row(2));
        assert_eq!(rows.row(1), store.matrix().row(0));
    }

    #[test]
    fn test_fetch_rows_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), &[0, 1, 2, 3]);

        let err = store.fetch_rows(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, ActiveSslError::LengthMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_fetch_rows_unknown_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path(), &[0, 1, 2, 3]);

        let err = store.fetch_rows(&[0, 99]).unwrap_err();
        assert!(matches!(err, ActiveSslError::InvariantViolation(_)));
    }

    #[test]
    fn test_realign_keeps_surviving_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = build_store(dir.path(), &[0, 1, 2, 3, 4]);

        let row_for_1 = store.matrix().row(1).to_owned();
        let row_for_4 = store.matrix().row(4).to_owned();

        // Samples 0, 2 and 3 were pooled; 1 and 4 remain unpooled.
        store.realign(&[1, 4]).unwrap();

        assert_eq!(store.shape(), (2, 3));
        assert_eq!(store.matrix().row(0), row_for_1);
        assert_eq!(store.matrix().row(1), row_for_4);

        let reloaded = load_matrix(store.save_path()).unwrap();
        assert_eq!(&reloaded, store.matrix());
    }

    #[test]
    fn test_initialize_from_reference_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let unpool = [0usize, 1, 2, 3, 4];

        let first = build_store(dir.path(), &unpool);
        let persisted = first.matrix().clone();

        let second_dir = tempfile::tempdir().unwrap();
        let config = SemiSupervisedConfig {
            num_classes: 3,
            soft_labels_ref: Some(first.save_path().to_path_buf()),
            root_dir: second_dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let second =
            SoftLabelStore::initialize(&config, &test_batch_sizes(2), &unpool, &mut rng).unwrap();

        assert_eq!(second.matrix(), &persisted);
    }

    #[test]
    fn test_initialize_from_reference_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let first = build_store(dir.path(), &[0, 1, 2, 3, 4]);

        let second_dir = tempfile::tempdir().unwrap();
        let config = SemiSupervisedConfig {
            num_classes: 3,
            soft_labels_ref: Some(first.save_path().to_path_buf()),
            root_dir: second_dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let err =
            SoftLabelStore::initialize(&config, &test_batch_sizes(2), &[0, 1, 2], &mut rng)
                .unwrap_err();
        assert!(matches!(err, ActiveSslError::ShapeMismatch { .. }));
    }
}
