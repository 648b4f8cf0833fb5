use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::autograd::graph::{Graph, Var};
use crate::error::Result;
use crate::layers::dense::Linear;
use crate::network::parameter::{ParamId, ParamStore};

/// One stage of a `Model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Linear(Linear),
    Activation(ActivationFunction),
    /// Row-wise log-probabilities over the class dimension.
    LogSoftmax,
}

impl Layer {
    pub fn forward(&self, graph: &mut Graph, params: &ParamStore, input: Var) -> Result<Var> {
        match self {
            Layer::Linear(linear) => linear.forward(graph, params, input),
            Layer::Activation(function) => graph.activation(input, *function),
            Layer::LogSoftmax => graph.log_softmax(input),
        }
    }

    /// Parameters owned by this layer, in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = ParamId> + '_ {
        match self {
            Layer::Linear(linear) => Some(linear),
            _ => None,
        }
        .into_iter()
        .flat_map(Linear::parameters)
    }
}
