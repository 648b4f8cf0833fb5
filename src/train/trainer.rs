use log::trace;

use crate::autograd::graph::Graph;
use crate::error::Result;
use crate::loss::nll::nll_loss;
use crate::network::model::Model;
use crate::optim::optimizer::Optimizer;
use crate::train::data::Batch;

/// Phases of the training loop.
///
/// `train_loop` moves `Idle → Fetching` at each fetch, `train_step` walks
/// `Forward → LossComputed → Backward → Updated`, and the loop returns to
/// `Fetching` for the next batch or to `Idle` at the end of the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainState {
    #[default]
    Idle,
    Fetching,
    Forward,
    LossComputed,
    Backward,
    Updated,
}

pub(crate) fn enter(state: &mut TrainState, next: TrainState) {
    trace!("{:?} -> {:?}", state, next);
    *state = next;
}

/// One forward/backward/update cycle on `batch`; returns the batch loss.
///
/// `state` should hold the phase the caller is in (normally `Fetching`)
/// and is left at `Updated` on success. On error it stays at the phase
/// that failed, and the error is returned. The model must end in a
/// log-probability layer.
pub fn train_step<O>(
    model: &mut Model,
    optimizer: &mut O,
    batch: Batch,
    state: &mut TrainState,
) -> Result<f64>
where
    O: Optimizer + ?Sized,
{
    optimizer.zero_grad(model.params_mut())?;

    enter(state, TrainState::Forward);
    let mut graph = Graph::new();
    let x = graph.input(batch.inputs);
    let x = model.flatten_input(&mut graph, x)?;
    let log_probs = model.forward(&mut graph, x)?;

    let loss = nll_loss(&mut graph, log_probs, &batch.targets)?;
    let loss_value = graph.value(loss)?.item();
    enter(state, TrainState::LossComputed);

    graph.backward(loss, model.params_mut())?;
    enter(state, TrainState::Backward);

    optimizer.step(model.params_mut())?;
    enter(state, TrainState::Updated);

    Ok(loss_value)
}
