//! Active Semi-Supervised Learning CLI
//!
//! Thin entry point: all behavior lives in the library. The `simulate`
//! subcommand runs the full train/select loop over synthetic Gaussian blobs
//! so the selection machinery can be exercised without a real model.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use active_ssl::config::{
    PartitionerKind, ScheduleConfig, SelectionConfig, SemiSupervisedConfig,
};
use active_ssl::dataset::{DatasetWrapper, ImageShape, TrainBatch};
use active_ssl::eval::KnnClassifier;
use active_ssl::training::{ActiveTrainer, EmbeddingSource, LearnMode, TrainStep};
use active_ssl::utils::logging::{init_logging, LogConfig};
use active_ssl::utils::metrics::{MetricsSink, ScalarWriter};
use active_ssl::SCALARS_FILE;

/// Active learning and semi-supervised learning research harness
#[derive(Parser, Debug)]
#[command(name = "active_ssl")]
#[command(version = "0.1.0")]
#[command(about = "Active/semi-supervised pool selection harness", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full train/select loop over synthetic Gaussian blobs
    Simulate {
        /// Number of synthetic train samples
        #[arg(long, default_value = "1000")]
        train_size: usize,

        /// Number of blob classes
        #[arg(long, default_value = "4")]
        num_classes: usize,

        /// Learn mode: passive, rand_steps or active
        #[arg(long, default_value = "active")]
        learn_mode: String,

        /// Partitioner: plain, random, active or semi_supervised
        #[arg(long, default_value = "semi_supervised")]
        partitioner: String,

        /// Percentage of the train set treated as unlabeled (0-100)
        #[arg(long, default_value = "80")]
        unsupervised_percentage: u32,

        /// New pool members per selection round
        #[arg(long, default_value = "50")]
        clusters: usize,

        /// Target pool size
        #[arg(long, default_value = "500")]
        cap: usize,

        /// Epochs to train between pool growth rounds
        #[arg(long, default_value = "5")]
        active_epochs: usize,

        /// Samples per training mini-batch
        #[arg(short, long, default_value = "50")]
        batch_size: usize,

        /// Output directory for soft labels and scalar metrics
        #[arg(short, long, default_value = "output/simulate")]
        output_dir: PathBuf,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Synthetic per-class Gaussian blobs used both as "images" and embeddings
struct BlobData {
    embeddings: Array2<f32>,
    labels: Vec<usize>,
}

impl BlobData {
    /// Sample `n` points, class `i % num_classes`, blob centers spread on a
    /// circle so classes are well separated in embedding space
    fn generate(n: usize, num_classes: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut embeddings = Array2::zeros((n, 2));
        let mut labels = Vec::with_capacity(n);

        for i in 0..n {
            let class = i % num_classes;
            let angle = 2.0 * std::f32::consts::PI * class as f32 / num_classes as f32;
            embeddings[(i, 0)] = 10.0 * angle.cos() + rng.gen_range(-1.0..1.0);
            embeddings[(i, 1)] = 10.0 * angle.sin() + rng.gen_range(-1.0..1.0);
            labels.push(class);
        }

        Self { embeddings, labels }
    }
}

impl EmbeddingSource for BlobData {
    fn evaluate(&self, indices: &[usize]) -> active_ssl::Result<Array2<f32>> {
        Ok(self.embeddings.select(ndarray::Axis(0), indices))
    }
}

/// Stand-in for the neural network: loss decays with the step count
struct SimulatedModel {
    steps: usize,
}

impl TrainStep for SimulatedModel {
    fn run_step(&mut self, _batch: &TrainBatch, _learning_rate: f64) -> active_ssl::Result<f64> {
        self.steps += 1;
        Ok(1.0 / (1.0 + 0.01 * self.steps as f64))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Simulate {
            train_size,
            num_classes,
            learn_mode,
            partitioner,
            unsupervised_percentage,
            clusters,
            cap,
            active_epochs,
            batch_size,
            output_dir,
            seed,
        } => simulate(SimulateArgs {
            train_size,
            num_classes,
            learn_mode,
            partitioner,
            unsupervised_percentage,
            clusters,
            cap,
            active_epochs,
            batch_size,
            output_dir,
            seed,
        }),
    }
}

struct SimulateArgs {
    train_size: usize,
    num_classes: usize,
    learn_mode: String,
    partitioner: String,
    unsupervised_percentage: u32,
    clusters: usize,
    cap: usize,
    active_epochs: usize,
    batch_size: usize,
    output_dir: PathBuf,
    seed: u64,
}

fn simulate(args: SimulateArgs) -> Result<()> {
    println!("{}", "Active SSL simulation".green().bold());

    let mode = LearnMode::from_name(&args.learn_mode)?;
    let kind = PartitionerKind::from_name(&args.partitioner)?;

    let config = SemiSupervisedConfig {
        unsupervised_percentage: args.unsupervised_percentage,
        unsupervised_percentage_batch: 50,
        num_classes: args.num_classes,
        soft_labels_ref: None,
        root_dir: args.output_dir.clone(),
        seed: args.seed,
    };
    let selection = SelectionConfig {
        clusters_per_round: args.clusters,
        ..Default::default()
    };
    let initial_lr = 0.1;
    let schedule = ScheduleConfig {
        initial_learning_rate: initial_lr,
        scheduled_epochs: vec![60, 120, 160],
        scheduled_learning_rates: vec![initial_lr / 5.0, initial_lr / 25.0, initial_lr / 125.0],
        cap: args.cap,
        active_epochs: args.active_epochs,
        train_batch_size: args.batch_size,
    };

    let data = BlobData::generate(args.train_size, args.num_classes, args.seed);

    let mut wrapper =
        DatasetWrapper::build(kind, config, args.train_size, 0, args.batch_size)?;
    // The blob coordinates double as 1x1x2 "images".
    let shape = ImageShape {
        channels: 1,
        height: 1,
        width: 2,
    };
    wrapper.set_datasets(data.embeddings.clone(), data.labels.clone(), shape)?;

    info!("{}", wrapper);

    let mut trainer = ActiveTrainer::new(
        mode,
        wrapper,
        selection,
        schedule,
        (args.train_size / 4).max(1),
        args.seed,
    )?;
    let mut model = SimulatedModel { steps: 0 };
    let mut metrics = ScalarWriter::create(&args.output_dir.join(SCALARS_FILE))?;

    let reports = trainer.run(&mut model, &data, &mut metrics)?;

    // Score the final pool with the k-NN tester over the blob embeddings.
    let pool = trainer.wrapper().registry().pool_indices();
    let pool_embeddings = data.embeddings.select(ndarray::Axis(0), &pool);
    let pool_labels: Vec<usize> = pool.iter().map(|&i| data.labels[i]).collect();
    let tester = KnnClassifier::fit(pool_embeddings, pool_labels, args.num_classes)?;
    let precision = tester.score(&data.embeddings, &data.labels, 5)?;
    metrics.write_scalar("precision", trainer.global_step(), precision)?;

    println!("{}", "Simulation complete".green().bold());
    println!("  rounds:       {}", reports.len());
    println!("  global steps: {}", trainer.global_step());
    println!("  pool size:    {}", trainer.wrapper().pool_size());
    println!("  knn precision: {:.4}", precision);
    println!("  scalars:      {}", metrics.path().display());

    Ok(())
}
