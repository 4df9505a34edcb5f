//! Trainer Orchestration
//!
//! Drives the train → embed → select → realign loop. The neural network is an
//! external collaborator reached through two traits: [`TrainStep`] consumes
//! mini-batches, and [`EmbeddingSource`] produces per-sample embeddings for
//! the selection rounds. Everything runs strictly sequentially: training
//! pauses, the full-set embedding sweep runs to completion, one selection
//! round runs to completion, then training resumes with the grown pool.

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::{ScheduleConfig, SelectionConfig};
use crate::dataset::fetcher::TrainBatch;
use crate::dataset::wrapper::DatasetWrapper;
use crate::selection::engine::{ActiveSelectionEngine, SelectionOutcome};
use crate::training::schedule::FixedScheduleSetter;
use crate::utils::error::{ActiveSslError, Result};
use crate::utils::logging::ProgressLogger;
use crate::utils::metrics::MetricsSink;

/// How the pool is grown over the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnMode {
    /// Fill the pool to the cap up front, then train on it
    Passive,
    /// Alternate training bursts with uniform random pool growth
    RandSteps,
    /// Alternate training bursts with embedding-based selection rounds
    Active,
}

impl LearnMode {
    /// Resolve a configured mode name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "passive" => Ok(Self::Passive),
            "rand_steps" => Ok(Self::RandSteps),
            "active" => Ok(Self::Active),
            other => Err(ActiveSslError::Config(format!(
                "unknown learn mode '{}'. Available: passive, rand_steps, active",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LearnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passive => write!(f, "passive"),
            Self::RandSteps => write!(f, "rand_steps"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// External model in training mode: consumes one mini-batch per step
pub trait TrainStep {
    /// Run one optimization step, returning the step's loss
    fn run_step(&mut self, batch: &TrainBatch, learning_rate: f64) -> Result<f64>;
}

/// External model in inference mode: per-sample embeddings for an index batch
pub trait EmbeddingSource {
    /// Embedding matrix `[len(indices), D]`, row-aligned to `indices`
    fn evaluate(&self, indices: &[usize]) -> Result<Array2<f32>>;
}

/// What one training round did
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub steps_run: usize,
    pub mean_loss: f64,
    pub pool_size: usize,
    /// Present only when an active selection round ran
    pub selection: Option<SelectionOutcome>,
}

/// Owns the dataset wrapper and drives rounds until the pool reaches the cap
pub struct ActiveTrainer {
    mode: LearnMode,
    wrapper: DatasetWrapper,
    engine: ActiveSelectionEngine,
    schedule: FixedScheduleSetter,
    /// Chunk size for the full-set embedding sweep
    eval_batch_size: usize,
    global_step: usize,
    rng: ChaCha8Rng,
}

impl ActiveTrainer {
    pub fn new(
        mode: LearnMode,
        wrapper: DatasetWrapper,
        selection_config: SelectionConfig,
        schedule_config: ScheduleConfig,
        eval_batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if eval_batch_size == 0 {
            return Err(ActiveSslError::Config(
                "eval_batch_size must be greater than 0".to_string(),
            ));
        }

        let mut trainer = Self {
            mode,
            wrapper,
            engine: ActiveSelectionEngine::new(selection_config)?,
            schedule: FixedScheduleSetter::new(schedule_config)?,
            eval_batch_size,
            global_step: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };

        if trainer.mode == LearnMode::Passive {
            trainer.fill_pool_to_cap()?;
        }

        info!(
            "trainer ready: mode={} pool={} {}",
            trainer.mode,
            trainer.wrapper.pool_size(),
            trainer.schedule.description()
        );
        Ok(trainer)
    }

    /// Passive mode grows the pool to the cap before any training happens
    fn fill_pool_to_cap(&mut self) -> Result<()> {
        let cap = self.schedule.config().cap;
        let growth = self.engine.config().clusters_per_round;
        while self.wrapper.pool_size() < cap {
            let remaining = cap - self.wrapper.pool_size();
            self.wrapper.update_pool_random(growth.min(remaining))?;
        }
        Ok(())
    }

    /// One round: a training burst sized to the current pool, then (below the
    /// cap) one pool growth step in the configured mode.
    pub fn run_round(
        &mut self,
        model: &mut dyn TrainStep,
        embeddings: &dyn EmbeddingSource,
        metrics: &mut dyn MetricsSink,
    ) -> Result<RoundReport> {
        let pool_size = self.wrapper.pool_size();
        let at_cap = pool_size >= self.schedule.config().cap;
        let steps = self.schedule.steps_for_pool(pool_size);

        let mut loss_sum = 0.0;
        for _ in 0..steps {
            let batch = self.wrapper.fetch_batch()?;
            let lr = self.schedule.lr_for_step(self.global_step);
            loss_sum += model.run_step(&batch, lr)?;
            self.global_step += 1;
        }
        let mean_loss = if steps > 0 { loss_sum / steps as f64 } else { 0.0 };

        let selection = if at_cap {
            None
        } else {
            match self.mode {
                LearnMode::Passive => None,
                LearnMode::RandSteps => {
                    self.wrapper
                        .update_pool_random(self.engine.config().clusters_per_round)?;
                    None
                }
                LearnMode::Active => {
                    let full = self.collect_embeddings(embeddings)?;
                    let outcome =
                        self.engine
                            .select(&full, self.wrapper.registry_mut(), &mut self.rng)?;
                    self.wrapper.realign_soft_labels()?;
                    Some(outcome)
                }
            }
        };

        let pool_size = self.wrapper.pool_size();
        metrics.write_scalar("pool_size", self.global_step, pool_size as f64)?;
        metrics.write_scalar("train_loss", self.global_step, mean_loss)?;

        Ok(RoundReport {
            steps_run: steps,
            mean_loss,
            pool_size,
            selection,
        })
    }

    /// Run rounds until the pool reaches the cap, then one final burst
    pub fn run(
        &mut self,
        model: &mut dyn TrainStep,
        embeddings: &dyn EmbeddingSource,
        metrics: &mut dyn MetricsSink,
    ) -> Result<Vec<RoundReport>> {
        let cap = self.schedule.config().cap;
        let mut reports = Vec::new();

        loop {
            let at_cap = self.wrapper.pool_size() >= cap;
            reports.push(self.run_round(model, embeddings, metrics)?);
            if at_cap {
                break;
            }
        }

        Ok(reports)
    }

    /// Sweep the whole train set in `eval_batch_size` chunks and assemble the
    /// `[train_set_size, D]` embedding matrix
    pub fn collect_embeddings(&self, source: &dyn EmbeddingSource) -> Result<Array2<f32>> {
        let n = self.wrapper.registry().train_set_size();
        let mut full: Option<Array2<f32>> = None;
        let mut covered = 0;

        info!("start storing embeddings for the entire train set");
        let mut progress = ProgressLogger::new("embedding sweep", n);

        for start in (0..n).step_by(self.eval_batch_size) {
            let end = (start + self.eval_batch_size).min(n);
            let indices: Vec<usize> = (start..end).collect();
            let chunk = source.evaluate(&indices)?;

            if chunk.nrows() != indices.len() {
                return Err(ActiveSslError::LengthMismatch {
                    expected: indices.len(),
                    actual: chunk.nrows(),
                });
            }

            let full_matrix =
                full.get_or_insert_with(|| Array2::zeros((n, chunk.ncols())));
            if chunk.ncols() != full_matrix.ncols() {
                return Err(ActiveSslError::ShapeMismatch {
                    expected: (indices.len(), full_matrix.ncols()),
                    actual: chunk.dim(),
                });
            }

            full_matrix
                .slice_mut(ndarray::s![start..end, ..])
                .assign(&chunk);
            covered += chunk.nrows();
            progress.update(covered);
        }

        if covered != n {
            return Err(ActiveSslError::InvariantViolation(format!(
                "embedding sweep covered {} samples instead of {}",
                covered, n
            )));
        }
        progress.finish();

        full.ok_or_else(|| {
            ActiveSslError::InvariantViolation("embedding sweep over empty train set".to_string())
        })
    }

    pub fn wrapper(&self) -> &DatasetWrapper {
        &self.wrapper
    }

    pub fn wrapper_mut(&mut self) -> &mut DatasetWrapper {
        &mut self.wrapper
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    pub fn mode(&self) -> LearnMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PartitionerKind, SemiSupervisedConfig};
    use crate::dataset::fetcher::ImageShape;
    use crate::selection::kmeans::InitStrategy;

    /// Counts steps; loss is always 1.0
    struct CountingModel {
        steps: usize,
    }

    impl TrainStep for CountingModel {
        fn run_step(&mut self, batch: &TrainBatch, learning_rate: f64) -> Result<f64> {
            assert!(learning_rate > 0.0);
            assert!(!batch.pool.indices.is_empty());
            self.steps += 1;
            Ok(1.0)
        }
    }

    /// Embeds sample `i` at `(10 * i, 0)` so every sample is well separated
    struct LineEmbeddings;

    impl EmbeddingSource for LineEmbeddings {
        fn evaluate(&self, indices: &[usize]) -> Result<Array2<f32>> {
            let mut out = Array2::zeros((indices.len(), 2));
            for (row, &idx) in indices.iter().enumerate() {
                out[(row, 0)] = 10.0 * idx as f32;
            }
            Ok(out)
        }
    }

    struct NullMetrics;

    impl MetricsSink for NullMetrics {
        fn write_scalar(&mut self, _tag: &str, _step: usize, _value: f64) -> Result<()> {
            Ok(())
        }
    }

    fn build_wrapper(dir: &std::path::Path, kind: PartitionerKind) -> DatasetWrapper {
        let config = SemiSupervisedConfig {
            unsupervised_percentage: 80,
            unsupervised_percentage_batch: 50,
            num_classes: 3,
            root_dir: dir.to_path_buf(),
            ..Default::default()
        };
        let mut wrapper = DatasetWrapper::build(kind, config, 50, 0, 10).unwrap();
        let shape = ImageShape {
            channels: 1,
            height: 2,
            width: 2,
        };
        wrapper
            .set_datasets(Array2::zeros((50, 4)), vec![0; 50], shape)
            .unwrap();
        wrapper
    }

    fn configs(cap: usize, k: usize) -> (SelectionConfig, ScheduleConfig) {
        (
            SelectionConfig {
                clusters_per_round: k,
                max_iter: 100,
                tol: 1e-4,
                init: InitStrategy::KMeansPlusPlus,
            },
            ScheduleConfig {
                initial_learning_rate: 0.1,
                scheduled_epochs: vec![60, 120, 160],
                scheduled_learning_rates: vec![0.02, 0.004, 0.0008],
                cap,
                active_epochs: 2,
                train_batch_size: 10,
            },
        )
    }

    #[test]
    fn test_collect_embeddings_assembles_full_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Active);
        let (sel, sched) = configs(30, 5);
        let trainer =
            ActiveTrainer::new(LearnMode::Active, wrapper, sel, sched, 7, 42).unwrap();

        let full = trainer.collect_embeddings(&LineEmbeddings).unwrap();
        assert_eq!(full.dim(), (50, 2));
        assert_eq!(full[(13, 0)], 130.0);
        assert_eq!(full[(49, 0)], 490.0);
    }

    #[test]
    fn test_collect_embeddings_rejects_bad_source() {
        struct ShortSource;
        impl EmbeddingSource for ShortSource {
            fn evaluate(&self, indices: &[usize]) -> Result<Array2<f32>> {
                Ok(Array2::zeros((indices.len().saturating_sub(1), 2)))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Active);
        let (sel, sched) = configs(30, 5);
        let trainer =
            ActiveTrainer::new(LearnMode::Active, wrapper, sel, sched, 10, 42).unwrap();

        let err = trainer.collect_embeddings(&ShortSource).unwrap_err();
        assert!(matches!(err, ActiveSslError::LengthMismatch { .. }));
    }

    #[test]
    fn test_active_round_trains_then_grows() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Active);
        let pool_before = wrapper.pool_size(); // 10 of 50
        let (sel, sched) = configs(30, 5);
        let mut trainer =
            ActiveTrainer::new(LearnMode::Active, wrapper, sel, sched, 20, 42).unwrap();

        let mut model = CountingModel { steps: 0 };
        let report = trainer
            .run_round(&mut model, &LineEmbeddings, &mut NullMetrics)
            .unwrap();

        // 2 active epochs * 10 pool / 10 batch = 2 steps
        assert_eq!(report.steps_run, 2);
        assert_eq!(model.steps, 2);
        assert_eq!(report.pool_size, pool_before + 5);
        assert!(report.selection.is_some());
    }

    #[test]
    fn test_rand_steps_round_grows_randomly() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Random);
        let pool_before = wrapper.pool_size();
        let (sel, sched) = configs(30, 5);
        let mut trainer =
            ActiveTrainer::new(LearnMode::RandSteps, wrapper, sel, sched, 20, 42).unwrap();

        let mut model = CountingModel { steps: 0 };
        let report = trainer
            .run_round(&mut model, &LineEmbeddings, &mut NullMetrics)
            .unwrap();

        assert_eq!(report.pool_size, pool_before + 5);
        assert!(report.selection.is_none());
    }

    #[test]
    fn test_passive_fills_pool_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Random);
        let (sel, sched) = configs(30, 5);
        let trainer =
            ActiveTrainer::new(LearnMode::Passive, wrapper, sel, sched, 20, 42).unwrap();

        assert_eq!(trainer.wrapper().pool_size(), 30);
    }

    #[test]
    fn test_run_stops_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::Active);
        let (sel, sched) = configs(25, 5);
        let mut trainer =
            ActiveTrainer::new(LearnMode::Active, wrapper, sel, sched, 20, 42).unwrap();

        let mut model = CountingModel { steps: 0 };
        let reports = trainer
            .run(&mut model, &LineEmbeddings, &mut NullMetrics)
            .unwrap();

        // 10 -> 15 -> 20 -> 25, then one final burst at the cap.
        assert_eq!(trainer.wrapper().pool_size(), 25);
        assert_eq!(reports.len(), 4);
        assert!(reports.last().unwrap().selection.is_none());
    }

    #[test]
    fn test_semi_supervised_realigns_after_selection() {
        let dir = tempfile::tempdir().unwrap();
        let wrapper = build_wrapper(dir.path(), PartitionerKind::SemiSupervised);
        let (sel, sched) = configs(30, 5);
        let mut trainer =
            ActiveTrainer::new(LearnMode::Active, wrapper, sel, sched, 20, 42).unwrap();

        let unpool_before = trainer.wrapper().unpool_size();
        let mut model = CountingModel { steps: 0 };
        trainer
            .run_round(&mut model, &LineEmbeddings, &mut NullMetrics)
            .unwrap();

        let store = trainer.wrapper().soft_labels().unwrap();
        assert_eq!(store.shape().0, unpool_before - 5);
    }

    #[test]
    fn test_learn_mode_from_name() {
        assert_eq!(LearnMode::from_name("active").unwrap(), LearnMode::Active);
        assert_eq!(
            LearnMode::from_name("rand_steps").unwrap(),
            LearnMode::RandSteps
        );
        assert!(LearnMode::from_name("boosted").is_err());
    }
}
