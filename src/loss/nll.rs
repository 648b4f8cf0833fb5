use crate::autograd::graph::{Graph, Var};
use crate::error::Result;

/// Mean negative log-likelihood.
///
/// `log_probs` is `[batch, classes]` and row `i` contributes
/// `-log_probs[i, targets[i]]`. Fails on a batch-size mismatch or a class
/// index outside `0..classes`.
pub fn nll_loss(graph: &mut Graph, log_probs: Var, targets: &[usize]) -> Result<Var> {
    graph.nll_loss(log_probs, targets)
}

/// Categorical cross-entropy from raw scores.
///
/// Goes through `log_softmax`, which works in log-sum-exp form, so scores
/// whose softmax probabilities underflow still give a finite loss.
pub fn cross_entropy(graph: &mut Graph, logits: Var, targets: &[usize]) -> Result<Var> {
    let log_probs = graph.log_softmax(logits)?;
    graph.nll_loss(log_probs, targets)
}
