use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};

use crate::autograd::graph::{Graph, Var};
use crate::error::{GradError, Result};
use crate::layers::dense::{Init, Linear};
use crate::layers::layer::Layer;
use crate::math::matrix::Matrix;
use crate::network::parameter::{ParamId, ParamStore};
use crate::network::spec::{LayerSpec, ModelSpec};

/// An ordered stack of layers together with the parameters they own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    name: String,
    layers: Vec<Layer>,
    params: ParamStore,
    input_features: usize,
    output_features: usize,
}

impl Model {
    /// Builds a model from `spec`, initialising weights from `seed`.
    ///
    /// A linear layer followed by a ReLU-family activation gets He weights,
    /// every other linear layer gets Xavier weights. Biases start at zero.
    pub fn from_spec(spec: &ModelSpec, seed: u64) -> Result<Model> {
        let (input_features, output_features) = spec.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = ParamStore::new();
        let mut layers = Vec::with_capacity(spec.layers.len());

        for (i, layer) in spec.layers.iter().enumerate() {
            let built = match layer {
                LayerSpec::Linear { in_features, out_features, bias } => {
                    let init = match spec.layers.get(i + 1) {
                        Some(LayerSpec::Activation { function }) if function.prefers_he_init() => Init::He,
                        _ => Init::Xavier,
                    };
                    Layer::Linear(Linear::new(
                        &mut params,
                        &format!("layers.{}", i),
                        *in_features,
                        *out_features,
                        *bias,
                        init,
                        &mut rng,
                    ))
                }
                LayerSpec::Activation { function } => Layer::Activation(*function),
                LayerSpec::LogSoftmax => Layer::LogSoftmax,
            };
            layers.push(built);
        }

        debug!(
            "built model '{}': {} layers, {} parameters ({} weights)",
            spec.name,
            layers.len(),
            params.len(),
            params.num_elements()
        );

        Ok(Model {
            name: spec.name.clone(),
            layers,
            params,
            input_features,
            output_features,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_features(&self) -> usize {
        self.input_features
    }

    pub fn output_features(&self) -> usize {
        self.output_features
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    /// Every trainable parameter, layer by layer in declaration order and
    /// in declaration order within a layer. Each call starts over.
    pub fn parameters(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.layers.iter().flat_map(Layer::parameters)
    }

    pub fn zero_grad(&mut self) {
        self.params.zero_grad();
    }

    /// Forward pass; stores every intermediate in `graph` for backprop.
    pub fn forward(&self, graph: &mut Graph, input: Var) -> Result<Var> {
        self.layers
            .iter()
            .try_fold(input, |x, layer| layer.forward(graph, &self.params, x))
    }

    /// Reshapes `input` to `[batch, input_features]` when it arrives in some
    /// other layout with a whole number of samples (e.g. stacked images).
    pub fn flatten_input(&self, graph: &mut Graph, input: Var) -> Result<Var> {
        let (rows, cols) = graph.value(input)?.shape();
        if cols == self.input_features {
            return Ok(input);
        }
        let total = rows * cols;
        if self.input_features == 0 || total % self.input_features != 0 {
            return Err(GradError::ShapeMismatch {
                op: "flatten",
                lhs: (rows, cols),
                rhs: (total / self.input_features.max(1), self.input_features),
            });
        }
        graph.reshape(input, total / self.input_features, self.input_features)
    }

    /// Raw model outputs for `inputs`, computed without recording a graph.
    pub fn infer(&self, inputs: &Matrix) -> Result<Matrix> {
        let mut graph = Graph::new();
        graph.with_no_grad(|g| {
            let x = g.input(inputs.clone());
            let x = self.flatten_input(g, x)?;
            let out = self.forward(g, x)?;
            Ok(g.value(out)?.clone())
        })
    }

    /// Class probabilities; assumes the model ends in `LogSoftmax`.
    pub fn predict_proba(&self, inputs: &Matrix) -> Result<Matrix> {
        Ok(self.infer(inputs)?.map(f64::exp))
    }

    /// Most likely class for each input row.
    pub fn classify(&self, inputs: &Matrix) -> Result<Vec<usize>> {
        Ok(self.infer(inputs)?.argmax_rows())
    }

    /// Checks that every parameter buffer is consistent, that every layer's
    /// parameters exist with the right shape, and that the linear layers
    /// chain from `input_features` to `output_features`.
    pub fn validate(&self) -> Result<()> {
        for (_, param) in self.params.iter() {
            let (rows, cols) = param.value.shape();
            if rows.checked_mul(cols) != Some(param.value.len()) {
                return Err(GradError::InvalidData(format!(
                    "parameter '{}' holds {} values for a {}x{} shape",
                    param.name,
                    param.value.len(),
                    rows,
                    cols
                )));
            }
        }

        let mut width = self.input_features;
        for (i, layer) in self.layers.iter().enumerate() {
            if let Layer::Linear(linear) = layer {
                if linear.in_features != width {
                    return Err(GradError::InvalidConfig(format!(
                        "layer {} expects {} inputs but receives {}",
                        i, linear.in_features, width
                    )));
                }
                linear.validate(&self.params)?;
                width = linear.out_features;
            }
        }
        if width != self.output_features {
            return Err(GradError::InvalidConfig(format!(
                "model produces {} outputs but declares {}",
                width, self.output_features
            )));
        }
        Ok(())
    }

    /// Serializes the architecture and parameter values to pretty-printed
    /// JSON. Gradient buffers are not written.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a model previously written by `save_json`.
    pub fn load_json(path: &str) -> Result<Model> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let model: Model = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }
}
