use std::sync::atomic::Ordering;
use std::time::Instant;

use log::{debug, info, warn};

use crate::autograd::graph::Graph;
use crate::error::Result;
use crate::loss::nll::nll_loss;
use crate::network::model::Model;
use crate::optim::optimizer::Optimizer;
use crate::train::data::DataSource;
use crate::train::epoch_stats::{EpochStats, TrainReport};
use crate::train::train_config::TrainConfig;
use crate::train::trainer::{enter, train_step, TrainState};

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Trains `model` for `config.epochs` epochs over `source`.
///
/// Each epoch rewinds the source and runs `train_step` on every batch until
/// the source signals the end of the epoch. Any error aborts the run and is
/// returned as is; nothing is retried.
///
/// # Early termination
/// The loop stops, with `stopped_early` set in the report, if:
/// - `config.stop_flag` is set (checked before every step), **or**
/// - the `progress_tx` receiver has been dropped.
pub fn train_loop<D, O>(
    model: &mut Model,
    source: &mut D,
    optimizer: &mut O,
    config: &TrainConfig,
) -> Result<TrainReport>
where
    D: DataSource + ?Sized,
    O: Optimizer + ?Sized,
{
    config.validate()?;
    info!(
        "training '{}' for {} epochs (lr = {}, {} parameters)",
        model.name(),
        config.epochs,
        optimizer.learning_rate(),
        model.params().num_elements()
    );

    let mut report = TrainReport::default();
    let mut state = TrainState::Idle;

    'epochs: for epoch in 1..=config.epochs {
        let t_start = Instant::now();
        source.start_epoch(epoch);
        let mut batch_losses = Vec::new();

        loop {
            if stop_requested(config) {
                info!("stop requested during epoch {}", epoch);
                report.stopped_early = true;
                break 'epochs;
            }

            enter(&mut state, TrainState::Fetching);
            let Some(batch) = source.next_batch()? else {
                break;
            };

            let loss = train_step(model, optimizer, batch, &mut state)?;
            batch_losses.push(loss);

            if config.log_every > 0 && batch_losses.len() % config.log_every == 0 {
                let running = batch_losses.iter().sum::<f64>() / batch_losses.len() as f64;
                debug!(
                    "epoch {} step {}: loss {:.6}, running {:.6}",
                    epoch,
                    batch_losses.len(),
                    loss,
                    running
                );
            }
        }
        enter(&mut state, TrainState::Idle);

        if batch_losses.is_empty() {
            warn!("epoch {} produced no batches", epoch);
        }
        let mean_loss = if batch_losses.is_empty() {
            0.0
        } else {
            batch_losses.iter().sum::<f64>() / batch_losses.len() as f64
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            batches: batch_losses.len(),
            batch_losses,
            mean_loss,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            "epoch {}/{}: {} steps, mean loss {:.6} ({} ms)",
            stats.epoch, stats.total_epochs, stats.batches, stats.mean_loss, stats.elapsed_ms
        );
        report.history.push(stats.clone());

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                report.stopped_early = true;
                break;
            }
        }
    }
    if state != TrainState::Idle {
        enter(&mut state, TrainState::Idle);
    }

    Ok(report)
}

/// Loss and accuracy of `model` over one epoch of `source`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Mean negative log-likelihood per sample.
    pub loss: f64,
    /// Fraction of samples classified correctly, in `[0, 1]`.
    pub accuracy: f64,
    pub samples: usize,
}

/// Evaluates `model` without recording gradients.
///
/// The source is rewound, not restarted, so a shuffled training set keeps
/// its shuffle sequence for later epochs.
pub fn evaluate<D>(model: &Model, source: &mut D) -> Result<Evaluation>
where
    D: DataSource + ?Sized,
{
    source.rewind();
    let mut total_loss = 0.0;
    let mut correct = 0usize;
    let mut samples = 0usize;

    while let Some(batch) = source.next_batch()? {
        let mut graph = Graph::new();
        let (loss, predictions) = graph.with_no_grad(|g| -> Result<(f64, Vec<usize>)> {
            let x = g.input(batch.inputs);
            let x = model.flatten_input(g, x)?;
            let log_probs = model.forward(g, x)?;
            let loss = nll_loss(g, log_probs, &batch.targets)?;
            Ok((g.value(loss)?.item(), g.value(log_probs)?.argmax_rows()))
        })?;

        total_loss += loss * batch.targets.len() as f64;
        correct += predictions
            .iter()
            .zip(&batch.targets)
            .filter(|(p, t)| p == t)
            .count();
        samples += batch.targets.len();
    }

    if samples == 0 {
        return Ok(Evaluation { loss: 0.0, accuracy: 0.0, samples });
    }
    Ok(Evaluation {
        loss: total_loss / samples as f64,
        accuracy: correct as f64 / samples as f64,
        samples,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config
        .stop_flag
        .as_ref()
        .map_or(false, |flag| flag.load(Ordering::Relaxed))
}
