use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the training
/// loop sends one `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Number of optimizer steps taken this epoch.
    pub batches: usize,
    /// Loss of every batch, in the order the batches were trained.
    pub batch_losses: Vec<f64>,
    /// Mean of `batch_losses`.
    pub mean_loss: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Outcome of a whole `train_loop` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainReport {
    /// One entry per completed epoch.
    pub history: Vec<EpochStats>,
    /// Set when the stop flag or a dropped progress receiver ended the run.
    pub stopped_early: bool,
}

impl TrainReport {
    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }

    /// Mean loss of the last completed epoch.
    pub fn final_loss(&self) -> Option<f64> {
        self.history.last().map(|s| s.mean_loss)
    }
}
