//! hyperkge CLI - train and evaluate hypercomplex KGE models.
//!
//! # Usage
//!
//! ```bash
//! # Dataset summary
//! hyperkge stats --data KGs/UMLS
//!
//! # Train QMult and evaluate on the test split
//! hyperkge train --data KGs/UMLS --model qmult --epochs 100 --embedding-dim 32
//!
//! # Re-evaluate a stored run with per-relation MRR
//! hyperkge evaluate --model-dir Experiments/2024-01-01_12-00-00 --data KGs/UMLS --per-relation
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hyperkge::{
    Dataset, DatasetOptions, Experiment, ExperimentConfig, ModelConfig, ModelKind, RankMetrics,
    TrainingConfig,
};
use indicatif::ProgressBar;
use tracing::Level;

#[derive(Parser)]
#[command(name = "hyperkge")]
#[command(about = "Hypercomplex knowledge graph embeddings", long_about = None)]
struct Cli {
    /// Log debug output, including per-epoch losses
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and evaluate it on the test split
    Train(TrainArgs),

    /// Re-evaluate a stored experiment
    Evaluate {
        /// Experiment folder containing settings.json and model.safetensors
        #[arg(long)]
        model_dir: PathBuf,

        /// Dataset directory with train.txt, valid.txt and test.txt
        #[arg(long)]
        data: PathBuf,

        /// Report MRR per relation
        #[arg(long)]
        per_relation: bool,

        /// Keep reciprocal triples out of the test split
        #[arg(long)]
        tail_only: bool,
    },

    /// Show dataset statistics
    Stats {
        /// Dataset directory
        #[arg(long)]
        data: PathBuf,

        /// Do not add reciprocal relations
        #[arg(long)]
        no_reverse: bool,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// Dataset directory with train.txt, valid.txt and test.txt
    #[arg(long)]
    data: PathBuf,

    /// QMult, OMult, ConvQ or ConvO (a `Batch` suffix is accepted)
    #[arg(long, value_parser = parse_model)]
    model: ModelKind,

    /// Parent folder of experiment runs
    #[arg(long, default_value = "Experiments")]
    output: PathBuf,

    #[arg(long, default_value = "10")]
    epochs: usize,

    #[arg(long, default_value = "1024")]
    batch_size: usize,

    #[arg(long, default_value = "0.001")]
    learning_rate: f64,

    /// Label smoothing factor in [0, 1)
    #[arg(long)]
    label_smoothing: Option<f32>,

    /// Threads used to build target rows
    #[arg(long, default_value = "1")]
    num_workers: usize,

    #[arg(long, default_value = "1")]
    seed: u64,

    #[arg(long, default_value = "32")]
    embedding_dim: usize,

    #[arg(long, default_value = "0.1")]
    input_dropout: f32,

    #[arg(long, default_value = "0.1")]
    hidden_dropout: f32,

    #[arg(long, default_value = "0.1")]
    feature_map_dropout: f32,

    #[arg(long, default_value = "16")]
    num_of_output_channels: usize,

    #[arg(long, default_value = "3")]
    kernel_size: usize,

    /// Normalize relation embeddings to unit norm
    #[arg(long)]
    norm_flag: bool,

    /// Do not add reciprocal relations
    #[arg(long)]
    no_reverse: bool,

    /// Keep reciprocal triples out of the test split
    #[arg(long)]
    tail_only: bool,

    /// Export embeddings as CSV
    #[arg(long)]
    store_embeddings: bool,
}

fn parse_model(s: &str) -> std::result::Result<ModelKind, String> {
    s.parse::<ModelKind>().map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Train(args) => cmd_train(args),
        Commands::Evaluate {
            model_dir,
            data,
            per_relation,
            tail_only,
        } => cmd_evaluate(model_dir, data, per_relation, tail_only),
        Commands::Stats { data, no_reverse } => cmd_stats(data, no_reverse),
    }
}

fn load_dataset(dir: &PathBuf, options: DatasetOptions) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", dir.display()));

    let dataset = Dataset::load(dir, options)
        .with_context(|| format!("Failed to load dataset {}", dir.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(dataset)
}

fn print_metrics(metrics: &RankMetrics) {
    println!("Hits@1:  {:.4}", metrics.hits_at_1);
    println!("Hits@3:  {:.4}", metrics.hits_at_3);
    println!("Hits@10: {:.4}", metrics.hits_at_10);
    println!("MR:      {:.2}", metrics.mr);
    println!("MRR:     {:.4}", metrics.mrr);
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let options = DatasetOptions::default()
        .with_reverse(!args.no_reverse)
        .with_tail_pred_constraint(args.tail_only);
    let dataset = load_dataset(&args.data, options)?;

    let model_config = ModelConfig::default()
        .with_embedding_dim(args.embedding_dim)
        .with_dropouts(args.input_dropout, args.hidden_dropout, args.feature_map_dropout)
        .with_conv(args.num_of_output_channels, args.kernel_size)
        .with_norm_flag(args.norm_flag);
    let training = TrainingConfig::default()
        .with_epochs(args.epochs)
        .with_batch_size(args.batch_size)
        .with_learning_rate(args.learning_rate)
        .with_label_smoothing(args.label_smoothing)
        .with_num_workers(args.num_workers)
        .with_seed(args.seed);
    let config = ExperimentConfig::new(args.model)
        .with_model_config(model_config)
        .with_training(training)
        .with_storage_root(&args.output)
        .with_store_embeddings(args.store_embeddings);

    let start = Instant::now();
    let outcome = Experiment::new(dataset, config)
        .train_and_eval()
        .with_context(|| format!("Failed to run {} experiment", args.model))?;

    println!("Experiment folder: {}", outcome.storage_path.display());
    println!("Parameters:        {}", outcome.num_params);
    println!("Final loss:        {:.6}", outcome.training.final_loss);
    println!("Elapsed:           {:.2?}", start.elapsed());
    if let Some(report) = &outcome.evaluation {
        print_metrics(&report.metrics);
    }
    Ok(())
}

fn cmd_evaluate(model_dir: PathBuf, data: PathBuf, per_relation: bool, tail_only: bool) -> Result<()> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Evaluating {}...", model_dir.display()));

    let reproduction = Experiment::reproduce(&model_dir, &data, per_relation, tail_only)
        .with_context(|| format!("Failed to evaluate {}", model_dir.display()))?;
    pb.finish_with_message(format!("Evaluated in {:.2?}", start.elapsed()));

    println!("Model:      {}", reproduction.settings.model);
    println!("Parameters: {}", reproduction.num_params);
    print_metrics(&reproduction.report.metrics);
    if let Some(per_relation) = &reproduction.per_relation_mrr {
        for (relation, mrr) in per_relation {
            println!("MRR:{relation}: {mrr:.4}");
        }
    }
    Ok(())
}

fn cmd_stats(data: PathBuf, no_reverse: bool) -> Result<()> {
    let dataset = load_dataset(&data, DatasetOptions::default().with_reverse(!no_reverse))?;
    let stats = dataset.stats();

    println!("Dataset Statistics");
    println!("==================");
    println!("Entities:  {}", stats.num_entities);
    println!("Relations: {}", stats.num_relations);
    println!("Train:     {}", stats.num_train);
    println!("Valid:     {}", stats.num_valid);
    println!("Test:      {}", stats.num_test);
    Ok(())
}
