//! Configuration Module
//!
//! Defines the configuration structs for dataset partitioning. Every
//! component receives its configuration explicitly at construction; there is
//! no global parameter lookup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ActiveSslError, Result};

/// Configuration for the semi-supervised pool/unpool partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemiSupervisedConfig {
    /// Percentage of the train set treated as unlabeled (0-100)
    pub unsupervised_percentage: u32,

    /// Percentage of each train batch drawn from the unpool set (0-100)
    pub unsupervised_percentage_batch: u32,

    /// Number of classes in the dataset
    pub num_classes: usize,

    /// Optional reference to previously persisted soft labels
    pub soft_labels_ref: Option<PathBuf>,

    /// Run root directory for persisted artifacts (soft labels, scalars)
    pub root_dir: PathBuf,

    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SemiSupervisedConfig {
    fn default() -> Self {
        Self {
            unsupervised_percentage: 50,
            unsupervised_percentage_batch: 50,
            num_classes: 10,
            soft_labels_ref: None,
            root_dir: PathBuf::from("output/run"),
            seed: 42,
        }
    }
}

impl SemiSupervisedConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.unsupervised_percentage > 100 {
            return Err(ActiveSslError::Config(format!(
                "unsupervised_percentage must be in 0-100, got {}",
                self.unsupervised_percentage
            )));
        }

        if self.unsupervised_percentage_batch > 100 {
            return Err(ActiveSslError::Config(format!(
                "unsupervised_percentage_batch must be in 0-100, got {}",
                self.unsupervised_percentage_batch
            )));
        }

        if self.num_classes == 0 {
            return Err(ActiveSslError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ActiveSslError::Serde(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| ActiveSslError::Serde(e.to_string()))
    }
}

/// Derived pool/unpool set sizes for the whole train set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSizes {
    pub pool_set_size: usize,
    pub unpool_set_size: usize,
}

impl PartitionSizes {
    /// Split a train set by the configured unsupervised percentage.
    /// The unpool size is floored; the pool takes the remainder.
    pub fn new(train_set_size: usize, config: &SemiSupervisedConfig) -> Self {
        let unpool_set_size =
            config.unsupervised_percentage as usize * train_set_size / 100;
        Self {
            pool_set_size: train_set_size - unpool_set_size,
            unpool_set_size,
        }
    }
}

/// Derived pool/unpool sizes for one train mini-batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizes {
    pub pool_batch_size: usize,
    pub unpool_batch_size: usize,
}

impl BatchSizes {
    /// Split a train batch by the configured batch unsupervised percentage
    pub fn new(train_batch_size: usize, config: &SemiSupervisedConfig) -> Self {
        let unpool_batch_size =
            config.unsupervised_percentage_batch as usize * train_batch_size / 100;
        Self {
            pool_batch_size: train_batch_size - unpool_batch_size,
            unpool_batch_size,
        }
    }

    /// Total batch size across both halves
    pub fn total(&self) -> usize {
        self.pool_batch_size + self.unpool_batch_size
    }
}

/// Configuration for one active selection round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// New pool members per round (the `clusters` knob)
    pub clusters_per_round: usize,

    /// Maximum Lloyd iterations per clustering run
    pub max_iter: usize,

    /// Convergence tolerance on free-center movement
    pub tol: f32,

    /// Free-center initialization strategy
    pub init: crate::selection::kmeans::InitStrategy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            clusters_per_round: 100,
            max_iter: 300,
            tol: 1e-4,
            init: crate::selection::kmeans::InitStrategy::KMeansPlusPlus,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.clusters_per_round == 0 {
            return Err(ActiveSslError::Config(
                "clusters_per_round must be greater than 0".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(ActiveSslError::Config(
                "max_iter must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pool-size-driven training schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Learning rate before the first scheduled boundary
    pub initial_learning_rate: f64,

    /// Epoch boundaries at which the learning rate changes
    pub scheduled_epochs: Vec<usize>,

    /// Learning rates taking effect at the matching boundary
    pub scheduled_learning_rates: Vec<f64>,

    /// Target pool size; also the epoch denominator while the pool grows
    pub cap: usize,

    /// Epochs to train between pool growth rounds
    pub active_epochs: usize,

    /// Samples per training mini-batch
    pub train_batch_size: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        // The CIFAR ResNet staging: /5 at 60, /25 at 120, /125 at 160.
        Self {
            initial_learning_rate: 0.1,
            scheduled_epochs: vec![60, 120, 160],
            scheduled_learning_rates: vec![0.1 / 5.0, 0.1 / 25.0, 0.1 / 125.0],
            cap: 50_000,
            active_epochs: 50,
            train_batch_size: 270,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scheduled_epochs.len() != self.scheduled_learning_rates.len() {
            return Err(ActiveSslError::Config(format!(
                "scheduled_epochs ({:?}) and scheduled_learning_rates ({:?}) must have the same lengths",
                self.scheduled_epochs, self.scheduled_learning_rates
            )));
        }
        if self.cap == 0 || self.train_batch_size == 0 {
            return Err(ActiveSslError::Config(
                "cap and train_batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dataset partitioning strategy
///
/// Selected by name at startup; unknown names fail fast instead of being
/// carried around as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionerKind {
    /// No split: the whole train set is pooled
    Plain,
    /// Pool grows by uniform random draws from the unpool set
    Random,
    /// Pool grows via embedding-space selection rounds
    Active,
    /// Percentage-driven split with a soft-label store for the unpool set
    SemiSupervised,
}

impl PartitionerKind {
    /// Resolve a configured strategy name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "plain" => Ok(Self::Plain),
            "random" => Ok(Self::Random),
            "active" => Ok(Self::Active),
            "semi_supervised" => Ok(Self::SemiSupervised),
            other => Err(ActiveSslError::Config(format!(
                "unknown partitioner '{}'. Available: plain, random, active, semi_supervised",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PartitionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Random => write!(f, "random"),
            Self::Active => write!(f, "active"),
            Self::SemiSupervised => write!(f, "semi_supervised"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_sizes_sum_to_train_set() {
        let config = SemiSupervisedConfig {
            unsupervised_percentage: 93,
            ..Default::default()
        };

        for train_set_size in [1usize, 7, 100, 50_000] {
            let sizes = PartitionSizes::new(train_set_size, &config);
            assert_eq!(sizes.pool_set_size + sizes.unpool_set_size, train_set_size);
        }
    }

    #[test]
    fn test_batch_sizes_sum_to_batch() {
        let config = SemiSupervisedConfig {
            unsupervised_percentage_batch: 37,
            ..Default::default()
        };

        for train_batch_size in [1usize, 64, 270] {
            let sizes = BatchSizes::new(train_batch_size, &config);
            assert_eq!(
                sizes.pool_batch_size + sizes.unpool_batch_size,
                train_batch_size
            );
        }
    }

    #[test]
    fn test_unpool_size_is_floored() {
        let config = SemiSupervisedConfig {
            unsupervised_percentage: 50,
            ..Default::default()
        };

        // 50% of 101 floors to 50
        let sizes = PartitionSizes::new(101, &config);
        assert_eq!(sizes.unpool_set_size, 50);
        assert_eq!(sizes.pool_set_size, 51);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SemiSupervisedConfig::default();
        assert!(config.validate().is_ok());

        config.unsupervised_percentage = 101;
        assert!(config.validate().is_err());

        config = SemiSupervisedConfig::default();
        config.num_classes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_selection_config_validation() {
        let config = SelectionConfig::default();
        assert!(config.validate().is_ok());

        let config = SelectionConfig {
            clusters_per_round: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_schedule_config_rejects_unequal_lists() {
        let config = ScheduleConfig {
            scheduled_epochs: vec![60, 120],
            scheduled_learning_rates: vec![0.01],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partitioner_from_name() {
        assert_eq!(
            PartitionerKind::from_name("active").unwrap(),
            PartitionerKind::Active
        );
        assert_eq!(
            PartitionerKind::from_name("semi_supervised").unwrap(),
            PartitionerKind::SemiSupervised
        );
        assert!(PartitionerKind::from_name("boosted").is_err());
    }
}
