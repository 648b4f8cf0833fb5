use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use serde::{Serialize, Deserialize};

use crate::error::{GradError, Result};
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `epochs`        — total number of full passes over the data source
/// - `batch_size`    — samples per mini-batch, used when building a dataset
/// - `learning_rate` — SGD step size
/// - `momentum`      — SGD momentum in `[0, 1)`; `0` gives the plain rule
/// - `seed`          — seeds weight initialisation and shuffling
/// - `shuffle`       — redraw the sample order every epoch
/// - `log_every`     — emit a debug line every this many steps (`0` = never)
/// - `progress_tx`   — optional channel sender; one `EpochStats` is sent per
///                     completed epoch.  If the receiver is dropped the loop
///                     terminates early (clean shutdown).
/// - `stop_flag`     — optional atomic flag; when set to `true` from another
///                     thread the loop stops at the next step boundary.
///
/// Everything except the two runtime hooks can be read from JSON; missing
/// keys fall back to `TrainConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub seed: u64,
    pub shuffle: bool,
    pub log_every: usize,
    #[serde(skip)]
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    #[serde(skip)]
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            epochs: 1,
            batch_size: 64,
            learning_rate: 0.01,
            momentum: 0.0,
            seed: 0,
            shuffle: true,
            log_every: 100,
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig` with no progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f64) -> Self {
        TrainConfig {
            epochs,
            batch_size,
            learning_rate,
            ..TrainConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(GradError::InvalidConfig("epochs must be at least 1".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(GradError::InvalidConfig("batch_size must be at least 1".to_owned()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(GradError::InvalidConfig(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(GradError::InvalidConfig(format!(
                "momentum must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        Ok(())
    }

    /// Reads a config file; the result is validated.
    pub fn load_json(path: &str) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: TrainConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}
