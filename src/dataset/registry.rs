//! Sample Registry and Pool/Unpool Partitioner
//!
//! Per-sample bookkeeping for the active/semi-supervised split. Every sample
//! of the original dataset gets exactly one record at build time; the pool
//! flag is the only thing that ever changes afterwards. The pool and unpool
//! views are always derived from the records, never cached.

use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{ActiveSslError, Result};

/// Which dataset a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetTag {
    Train,
    Test,
}

/// Bookkeeping record for a single sample
///
/// `in_pool` is meaningful only for train records; test records keep it false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Stable 0-based index within the sample's dataset
    pub index: usize,
    /// Dataset membership
    pub dataset: DatasetTag,
    /// Whether the sample is in the labeled pool
    pub in_pool: bool,
}

/// Registry of all sample records, created once at dataset-build time
///
/// Mutated only by the initial partition and by pool growth; never shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRegistry {
    records: Vec<SampleRecord>,
    train_set_size: usize,
    test_set_size: usize,
}

impl SampleRegistry {
    /// Build one record per train and test sample, all unpooled
    pub fn new(train_set_size: usize, test_set_size: usize) -> Self {
        let mut records = Vec::with_capacity(train_set_size + test_set_size);
        for index in 0..train_set_size {
            records.push(SampleRecord {
                index,
                dataset: DatasetTag::Train,
                in_pool: false,
            });
        }
        for index in 0..test_set_size {
            records.push(SampleRecord {
                index,
                dataset: DatasetTag::Test,
                in_pool: false,
            });
        }

        Self {
            records,
            train_set_size,
            test_set_size,
        }
    }

    /// Select `pool_set_size` train indices without replacement and mark them
    /// pooled; every other train record becomes unpooled.
    ///
    /// Deterministic for a given seeded generator.
    pub fn initialize_pool(
        &mut self,
        pool_set_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        if pool_set_size > self.train_set_size {
            return Err(ActiveSslError::Config(format!(
                "pool_set_size {} exceeds train set size {}",
                pool_set_size, self.train_set_size
            )));
        }

        for record in self.records.iter_mut() {
            record.in_pool = false;
        }

        let chosen = index::sample(rng, self.train_set_size, pool_set_size);
        for i in chosen.iter() {
            self.records[i].in_pool = true;
        }

        Ok(())
    }

    /// Ascending train indices currently in the pool
    pub fn pool_indices(&self) -> Vec<usize> {
        self.train_indices_where(true)
    }

    /// Ascending train indices currently outside the pool
    pub fn unpool_indices(&self) -> Vec<usize> {
        self.train_indices_where(false)
    }

    // Train records are stored in index order, so the scan yields sorted
    // indices without an extra sort.
    fn train_indices_where(&self, pooled: bool) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.dataset == DatasetTag::Train && r.in_pool == pooled)
            .map(|r| r.index)
            .collect()
    }

    /// Mark previously-unpooled train indices as pooled
    ///
    /// The whole call is validated before any record changes, so a failed
    /// call leaves the registry untouched.
    pub fn grow_pool(&mut self, new_indices: &[usize]) -> Result<()> {
        let mut seen = std::collections::HashSet::with_capacity(new_indices.len());
        for &idx in new_indices {
            if idx >= self.train_set_size {
                return Err(ActiveSslError::InvariantViolation(format!(
                    "index {} is not a train index (train set size is {})",
                    idx, self.train_set_size
                )));
            }
            if self.records[idx].in_pool {
                return Err(ActiveSslError::InvariantViolation(format!(
                    "index {} is already in the pool",
                    idx
                )));
            }
            if !seen.insert(idx) {
                return Err(ActiveSslError::InvariantViolation(format!(
                    "index {} appears twice in one grow_pool call",
                    idx
                )));
            }
        }

        for &idx in new_indices {
            self.records[idx].in_pool = true;
        }

        Ok(())
    }

    /// Whether a train index is currently pooled
    pub fn is_pooled(&self, train_index: usize) -> bool {
        train_index < self.train_set_size && self.records[train_index].in_pool
    }

    /// Current pool size
    pub fn pool_size(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.dataset == DatasetTag::Train && r.in_pool)
            .count()
    }

    /// Current unpool size
    pub fn unpool_size(&self) -> usize {
        self.train_set_size - self.pool_size()
    }

    pub fn train_set_size(&self) -> usize {
        self.train_set_size
    }

    pub fn test_set_size(&self) -> usize {
        self.test_set_size
    }
}
