//! Dataset Wrapper
//!
//! The single owner of the mutable partition state: the sample registry, the
//! optional soft-label store, and the batch fetcher. Every partitioning
//! strategy goes through the same `build` / `set_data_info` / `set_datasets`
//! lifecycle; the strategy only decides how the initial split is sized and
//! whether a soft-label store exists.
//!
//! All mutation happens between training steps from one caller; nothing here
//! is shared across threads.

use ndarray::Array2;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::{BatchSizes, PartitionSizes, PartitionerKind, SemiSupervisedConfig};
use crate::dataset::fetcher::{BatchFetcher, ImageShape, TrainBatch};
use crate::dataset::registry::SampleRegistry;
use crate::dataset::soft_labels::SoftLabelStore;
use crate::utils::error::{ActiveSslError, Result};

/// Owns the registry, fetcher and (for semi-supervised runs) the soft labels
#[derive(Debug)]
pub struct DatasetWrapper {
    kind: PartitionerKind,
    config: SemiSupervisedConfig,
    partition_sizes: PartitionSizes,
    batch_sizes: BatchSizes,
    train_batch_size: usize,
    registry: SampleRegistry,
    soft_labels: Option<SoftLabelStore>,
    fetcher: Option<BatchFetcher>,
    rng: ChaCha8Rng,
}

impl DatasetWrapper {
    /// Create the wrapper and run the full build lifecycle: the initial
    /// pool/unpool split, then (for semi-supervised runs) the soft-label
    /// store. Image data arrives later via [`DatasetWrapper::set_datasets`].
    pub fn build(
        kind: PartitionerKind,
        config: SemiSupervisedConfig,
        train_set_size: usize,
        test_set_size: usize,
        train_batch_size: usize,
    ) -> Result<Self> {
        config.validate()?;

        // Plain runs have no unpool side at all; the percentage split only
        // applies to the partitioned strategies.
        let partition_sizes = match kind {
            PartitionerKind::Plain => PartitionSizes {
                pool_set_size: train_set_size,
                unpool_set_size: 0,
            },
            _ => PartitionSizes::new(train_set_size, &config),
        };
        let batch_sizes = match kind {
            PartitionerKind::Plain => BatchSizes {
                pool_batch_size: train_batch_size,
                unpool_batch_size: 0,
            },
            _ => BatchSizes::new(train_batch_size, &config),
        };

        let mut wrapper = Self {
            kind,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            partition_sizes,
            batch_sizes,
            train_batch_size,
            registry: SampleRegistry::new(train_set_size, test_set_size),
            soft_labels: None,
            fetcher: None,
        };

        wrapper.set_data_info()?;

        if wrapper.kind == PartitionerKind::SemiSupervised {
            let unpool = wrapper.registry.unpool_indices();
            wrapper.soft_labels = Some(SoftLabelStore::initialize(
                &wrapper.config,
                &wrapper.batch_sizes,
                &unpool,
                &mut wrapper.rng,
            )?);
        }

        info!("built dataset wrapper: {}", wrapper.describe());
        Ok(wrapper)
    }

    /// Select the initial pool without replacement from the train indices
    fn set_data_info(&mut self) -> Result<()> {
        self.registry
            .initialize_pool(self.partition_sizes.pool_set_size, &mut self.rng)
    }

    /// Attach the actual train images and labels
    pub fn set_datasets(
        &mut self,
        images: Array2<f32>,
        labels: Vec<usize>,
        shape: ImageShape,
    ) -> Result<()> {
        if images.nrows() != self.registry.train_set_size() {
            return Err(ActiveSslError::LengthMismatch {
                expected: self.registry.train_set_size(),
                actual: images.nrows(),
            });
        }
        self.fetcher = Some(BatchFetcher::new(
            images,
            labels,
            shape,
            self.batch_sizes,
            self.config.seed,
        )?);
        Ok(())
    }

    /// Draw one training mini-batch from the current split
    pub fn fetch_batch(&mut self) -> Result<TrainBatch> {
        let registry = &self.registry;
        match self.fetcher.as_mut() {
            Some(fetcher) => fetcher.fetch(registry),
            None => Err(ActiveSslError::InvariantViolation(
                "fetch_batch called before set_datasets".to_string(),
            )),
        }
    }

    /// Deterministic fetch of raw images and labels for an explicit index list
    pub fn fetch_eval(&self, indices: &[usize]) -> Result<(Array2<f32>, Vec<usize>)> {
        match self.fetcher.as_ref() {
            Some(fetcher) => fetcher.fetch_eval(indices),
            None => Err(ActiveSslError::InvariantViolation(
                "fetch_eval called before set_datasets".to_string(),
            )),
        }
    }

    /// Grow the pool with explicitly chosen indices (the selection engine's
    /// path), keeping the soft labels aligned
    pub fn grow_pool(&mut self, new_indices: &[usize]) -> Result<()> {
        self.registry.grow_pool(new_indices)?;
        self.realign_soft_labels()
    }

    /// Grow the pool with `n` uniform random draws from the unpool set
    pub fn update_pool_random(&mut self, n: usize) -> Result<Vec<usize>> {
        let unpool = self.registry.unpool_indices();
        if n > unpool.len() {
            return Err(ActiveSslError::InsufficientSamples {
                requested: n,
                available: unpool.len(),
            });
        }

        let drawn: Vec<usize> = index::sample(&mut self.rng, unpool.len(), n)
            .iter()
            .map(|i| unpool[i])
            .collect();
        self.registry.grow_pool(&drawn)?;
        self.realign_soft_labels()?;

        info!("randomly grew pool by {} to {}", n, self.registry.pool_size());
        Ok(drawn)
    }

    /// Re-establish soft-label row alignment after the registry was mutated
    /// directly (e.g. by a selection round)
    pub fn realign_soft_labels(&mut self) -> Result<()> {
        if let Some(store) = self.soft_labels.as_mut() {
            store.realign(&self.registry.unpool_indices())?;
        }
        Ok(())
    }

    /// Soft-label rows for a batch of absolute unpool indices
    pub fn fetch_soft_labels(&self, batch_unpool_indices: &[usize]) -> Result<Array2<f32>> {
        self.soft_labels_store()?.fetch_rows(batch_unpool_indices)
    }

    /// Replace the whole soft-label matrix (persisted immediately)
    pub fn update_soft_labels(&mut self, new_matrix: Array2<f32>, step: usize) -> Result<()> {
        match self.soft_labels.as_mut() {
            Some(store) => store.update(new_matrix, step),
            None => Err(ActiveSslError::InvariantViolation(format!(
                "{} partitioner carries no soft labels",
                self.kind
            ))),
        }
    }

    fn soft_labels_store(&self) -> Result<&SoftLabelStore> {
        self.soft_labels.as_ref().ok_or_else(|| {
            ActiveSslError::InvariantViolation(format!(
                "{} partitioner carries no soft labels",
                self.kind
            ))
        })
    }

    pub fn registry(&self) -> &SampleRegistry {
        &self.registry
    }

    /// Mutable registry access for the selection engine's round; callers must
    /// follow up with a batch fetch or soft-label realignment as needed
    pub fn registry_mut(&mut self) -> &mut SampleRegistry {
        &mut self.registry
    }

    pub fn soft_labels(&self) -> Option<&SoftLabelStore> {
        self.soft_labels.as_ref()
    }

    pub fn kind(&self) -> PartitionerKind {
        self.kind
    }

    pub fn pool_size(&self) -> usize {
        self.registry.pool_size()
    }

    pub fn unpool_size(&self) -> usize {
        self.registry.unpool_size()
    }

    pub fn batch_sizes(&self) -> BatchSizes {
        self.batch_sizes
    }

    pub fn partition_sizes(&self) -> PartitionSizes {
        self.partition_sizes
    }

    fn describe(&self) -> String {
        format!(
            "kind={} train={} test={} pool={}/{} batch={}+{} of {}",
            self.kind,
            self.registry.train_set_size(),
            self.registry.test_set_size(),
            self.partition_sizes.pool_set_size,
            self.registry.train_set_size(),
            self.batch_sizes.pool_batch_size,
            self.batch_sizes.unpool_batch_size,
            self.train_batch_size
        )
    }
}

impl std::fmt::Display for DatasetWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}
