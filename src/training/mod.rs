//! Training orchestration: the pool-driven learning-rate schedule and the
//! round-based trainer that alternates training bursts with pool growth.

pub mod schedule;
pub mod trainer;

pub use schedule::FixedScheduleSetter;
pub use trainer::{ActiveTrainer, EmbeddingSource, LearnMode, RoundReport, TrainStep};
