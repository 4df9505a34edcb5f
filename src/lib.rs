//! # Active Semi-Supervised Learning Harness
//!
//! A Rust library for studying active learning and semi-supervised learning
//! strategies on image classifiers (CIFAR-10/100, MNIST variants). Training
//! incrementally grows a labeled "pool" from an "unpool" set using
//! embedding-space selection, while soft labels track the unpooled samples.
//!
//! ## Modules
//!
//! - `config`: explicit configuration structs and partition arithmetic
//! - `dataset`: sample registry, soft-label store, batch fetcher, and the
//!   wrapper that owns them
//! - `selection`: fixed-center k-means, nearest-neighbor snapping, and the
//!   selection engine that grows the pool
//! - `training`: pool-driven learning-rate schedule and trainer orchestration
//! - `eval`: k-NN tester over learned embeddings
//! - `utils`: error taxonomy, logging, scalar metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use active_ssl::config::{PartitionerKind, SemiSupervisedConfig};
//! use active_ssl::dataset::DatasetWrapper;
//!
//! let config = SemiSupervisedConfig::default();
//! let wrapper = DatasetWrapper::build(
//!     PartitionerKind::SemiSupervised, config, 50_000, 10_000, 270)?;
//! // ... attach data, train, run selection rounds
//! ```

pub mod config;
pub mod dataset;
pub mod eval;
pub mod selection;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{
    BatchSizes, PartitionSizes, PartitionerKind, ScheduleConfig, SelectionConfig,
    SemiSupervisedConfig,
};
pub use dataset::fetcher::{BatchFetcher, BatchHalf, ImageShape, TrainBatch};
pub use dataset::registry::{DatasetTag, SampleRecord, SampleRegistry};
pub use dataset::soft_labels::SoftLabelStore;
pub use dataset::wrapper::DatasetWrapper;
pub use eval::knn::KnnClassifier;
pub use selection::engine::{ActiveSelectionEngine, SelectionOutcome};
pub use selection::kmeans::{FixedCenterKMeans, InitStrategy, KMeansFit};
pub use selection::neighbors::NearestNeighbors;
pub use training::schedule::FixedScheduleSetter;
pub use training::trainer::{ActiveTrainer, EmbeddingSource, LearnMode, RoundReport, TrainStep};
pub use utils::error::{ActiveSslError, Result};
pub use utils::metrics::{MetricsSink, ScalarWriter};

/// File name for persisted soft labels under the run root
pub const SOFT_LABELS_FILE: &str = "soft_labels.json";

/// File name for the scalar metrics CSV under the run root
pub const SCALARS_FILE: &str = "scalars.csv";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
