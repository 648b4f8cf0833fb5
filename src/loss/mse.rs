use crate::autograd::graph::{Graph, Var};
use crate::error::Result;

/// Mean squared error: `mean((prediction - target)²)`, built from recorded
/// ops so it differentiates like any other expression.
pub fn mse_loss(graph: &mut Graph, prediction: Var, target: Var) -> Result<Var> {
    let diff = graph.sub(prediction, target)?;
    let squared = graph.mul(diff, diff)?;
    graph.mean(squared)
}
