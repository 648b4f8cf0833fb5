use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::autograd::graph::{Graph, Var};
use crate::error::{GradError, Result};
use crate::math::matrix::Matrix;
use crate::network::parameter::{ParamId, ParamStore};

/// Weight initialisation scheme for a `Linear` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Init {
    /// N(0, sqrt(2 / fan_in)); pairs with ReLU-family activations.
    He,
    /// N(0, sqrt(1 / fan_in)).
    Xavier,
}

/// Fully connected layer: `output = input · weightᵗ + bias`.
///
/// Shapes: input `[batch, in_features]`, weight `[out_features, in_features]`,
/// bias `[1, out_features]`, output `[batch, out_features]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: ParamId,
    pub bias: Option<ParamId>,
}

impl Linear {
    /// Registers the layer's weight (and zero bias, when `bias` is set) in
    /// `params`.
    pub fn new<R: Rng + ?Sized>(
        params: &mut ParamStore,
        name: &str,
        in_features: usize,
        out_features: usize,
        bias: bool,
        init: Init,
        rng: &mut R,
    ) -> Linear {
        let w = match init {
            Init::He => Matrix::he(out_features, in_features, in_features, rng),
            Init::Xavier => Matrix::xavier(out_features, in_features, in_features, rng),
        };
        let weight = params.register(format!("{}.weight", name), w);
        let bias = bias.then(|| params.register(format!("{}.bias", name), Matrix::zeros(1, out_features)));
        Linear { in_features, out_features, weight, bias }
    }

    pub fn forward(&self, graph: &mut Graph, params: &ParamStore, input: Var) -> Result<Var> {
        let (rows, cols) = graph.value(input)?.shape();
        if cols != self.in_features {
            return Err(GradError::ShapeMismatch {
                op: "linear",
                lhs: (rows, cols),
                rhs: (self.out_features, self.in_features),
            });
        }
        let w = graph.param(params, self.weight)?;
        let wt = graph.transpose(w)?;
        let out = graph.matmul(input, wt)?;
        match self.bias {
            Some(bias) => {
                let b = graph.param(params, bias)?;
                graph.add_row_broadcast(out, b)
            }
            None => Ok(out),
        }
    }

    /// Weight, then bias.
    pub fn parameters(&self) -> impl Iterator<Item = ParamId> {
        std::iter::once(self.weight).chain(self.bias)
    }

    /// Checks that the stored parameters have the shapes this layer expects.
    pub fn validate(&self, params: &ParamStore) -> Result<()> {
        let w = &params.get(self.weight)?.value;
        if w.shape() != (self.out_features, self.in_features) {
            return Err(GradError::ShapeMismatch {
                op: "linear weight",
                lhs: w.shape(),
                rhs: (self.out_features, self.in_features),
            });
        }
        if let Some(bias) = self.bias {
            let b = &params.get(bias)?.value;
            if b.shape() != (1, self.out_features) {
                return Err(GradError::ShapeMismatch {
                    op: "linear bias",
                    lhs: b.shape(),
                    rhs: (1, self.out_features),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn forward_computes_affine_map() {
        let mut params = ParamStore::new();
        let layer = Linear::new(&mut params, "fc", 2, 3, true, Init::Xavier, &mut StdRng::seed_from_u64(1));
        params.get_mut(layer.weight).unwrap().value =
            Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        params.get_mut(layer.bias.unwrap()).unwrap().value = Matrix::from_vec(1, 3, vec![0.5, -0.5, 0.0]).unwrap();

        let mut graph = Graph::new();
        let x = graph.input(Matrix::from_rows(vec![vec![2.0, 3.0], vec![-1.0, 4.0]]).unwrap());
        let y = layer.forward(&mut graph, &params, x).unwrap();
        assert_eq!(graph.value(y).unwrap().data, vec![2.5, 2.5, 5.0, -0.5, 3.5, 3.0]);
    }

    #[test]
    fn bias_gradient_sums_over_batch() {
        let mut params = ParamStore::new();
        let layer = Linear::new(&mut params, "fc", 2, 2, true, Init::He, &mut StdRng::seed_from_u64(3));
        let mut graph = Graph::new();
        let x = graph.input(Matrix::filled(4, 2, 1.0));
        let y = layer.forward(&mut graph, &params, x).unwrap();
        let l = graph.sum(y).unwrap();
        graph.backward(l, &mut params).unwrap();
        let bias_grad = params.get(layer.bias.unwrap()).unwrap().grad.clone().unwrap();
        assert_eq!(bias_grad.data, vec![4.0, 4.0]);
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let mut params = ParamStore::new();
        let layer = Linear::new(&mut params, "fc", 3, 2, false, Init::He, &mut StdRng::seed_from_u64(0));
        let mut graph = Graph::new();
        let x = graph.input(Matrix::zeros(1, 4));
        assert!(matches!(
            layer.forward(&mut graph, &params, x),
            Err(GradError::ShapeMismatch { op: "linear", .. })
        ));
        assert_eq!(layer.parameters().count(), 1);
    }
}
