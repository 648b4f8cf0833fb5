//! Trains a multilayer perceptron on synthetic 28×28 "digits".
//!
//! Run with:
//!   cargo run --release -- --epochs 5 --save trained.json
//! Set `RUST_LOG=debug` (or pass `--debug`) for per-step output.

use clap::Parser;
use log::info;

use ferrite_grad::network::{Model, ModelSpec};
use ferrite_grad::optim::Sgd;
use ferrite_grad::train::{evaluate, synthetic_clusters, train_loop, InMemoryDataset, TrainConfig};
use ferrite_grad::Result;

const IMAGE_SIDE: usize = 28;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON training config; flags below override its values
    #[arg(long)]
    config: Option<String>,

    /// JSON model description; defaults to 784 → hidden (ReLU) → classes
    #[arg(long)]
    model_spec: Option<String>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    momentum: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Width of the hidden layer of the default model
    #[arg(long, default_value_t = 128)]
    hidden: usize,

    /// Number of classes in the synthetic dataset
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// Synthetic samples to generate (80% train, 20% test)
    #[arg(long, default_value_t = 2_000)]
    samples: usize,

    /// Per-pixel noise amplitude around each class prototype
    #[arg(long, default_value_t = 0.35)]
    noise: f64,

    /// Write the trained model to this JSON file
    #[arg(long)]
    save: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<TrainConfig> {
    let mut config = match &args.config {
        Some(path) => TrainConfig::load_json(path)?,
        None => TrainConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.learning_rate = lr;
    }
    if let Some(momentum) = args.momentum {
        config.momentum = momentum;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .target(env_logger::Target::Stderr)
        .init();

    let config = load_config(&args)?;
    let spec = match &args.model_spec {
        Some(path) => ModelSpec::load_json(path)?,
        None => ModelSpec::mlp(
            "synthetic-digits",
            &[IMAGE_SIDE * IMAGE_SIDE, args.hidden, args.classes],
        ),
    };
    let mut model = Model::from_spec(&spec, config.seed)?;

    let features = model.input_features();
    let sample_shape = if features == IMAGE_SIDE * IMAGE_SIDE {
        (IMAGE_SIDE, IMAGE_SIDE)
    } else {
        (1, features)
    };
    let classes = model.output_features();
    let (samples, labels) = synthetic_clusters(args.samples, classes, features, args.noise, config.seed);
    let split = samples.len() * 4 / 5;
    let (train_x, test_x) = samples.split_at(split);
    let (train_y, test_y) = labels.split_at(split);
    info!(
        "dataset: {} training / {} test samples, {} classes",
        train_x.len(),
        test_x.len(),
        classes
    );

    let mut train_set = InMemoryDataset::new(train_x.to_vec(), train_y.to_vec(), sample_shape, config.batch_size)?;
    if config.shuffle {
        train_set = train_set.with_shuffle(config.seed);
    }
    let mut test_set = InMemoryDataset::new(test_x.to_vec(), test_y.to_vec(), sample_shape, config.batch_size)?;

    let baseline = evaluate(&model, &mut test_set)?;
    info!(
        "before training: loss {:.4}, accuracy {:.2}%",
        baseline.loss,
        baseline.accuracy * 100.0
    );

    let mut optimizer = Sgd::with_momentum(model.parameters(), config.learning_rate, config.momentum);
    let report = train_loop(&mut model, &mut train_set, &mut optimizer, &config)?;

    let result = evaluate(&model, &mut test_set)?;
    info!(
        "after {} epochs: test loss {:.4}, accuracy {:.2}% ({} samples)",
        report.epochs_completed(),
        result.loss,
        result.accuracy * 100.0,
        result.samples
    );

    if let Some(path) = &args.save {
        model.save_json(path)?;
        info!("model saved to {}", path);
    }
    Ok(())
}
