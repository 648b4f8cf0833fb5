use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{GradError, Result};

fn default_bias() -> bool {
    true
}

/// Describes one layer in a model specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Linear {
        in_features: usize,
        out_features: usize,
        #[serde(default = "default_bias")]
        bias: bool,
    },
    Activation { function: ActivationFunction },
    LogSoftmax,
}

/// A serializable description of a model architecture.
///
/// `ModelSpec` can be saved to / loaded from JSON independently of the
/// trained weights, so architectures can be stored before training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Human-readable name used in logs and as the model file stem.
    pub name: String,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
}

impl ModelSpec {
    /// Linear/ReLU stack over `widths`, ending in `LogSoftmax`.
    ///
    /// `ModelSpec::mlp("digits", &[784, 128, 10])` gives
    /// 784 → 128 (ReLU) → 10 (LogSoftmax).
    pub fn mlp(name: impl Into<String>, widths: &[usize]) -> ModelSpec {
        let mut layers = Vec::new();
        for (i, pair) in widths.windows(2).enumerate() {
            layers.push(LayerSpec::Linear {
                in_features: pair[0],
                out_features: pair[1],
                bias: true,
            });
            if i + 2 < widths.len() {
                layers.push(LayerSpec::Activation { function: ActivationFunction::ReLU });
            }
        }
        layers.push(LayerSpec::LogSoftmax);
        ModelSpec { name: name.into(), layers }
    }

    /// Checks that consecutive linear layers chain and returns
    /// `(input_features, output_features)`.
    pub fn validate(&self) -> Result<(usize, usize)> {
        let mut input = None;
        let mut width: Option<usize> = None;
        for (i, layer) in self.layers.iter().enumerate() {
            if let LayerSpec::Linear { in_features, out_features, .. } = layer {
                if *in_features == 0 || *out_features == 0 {
                    return Err(GradError::InvalidConfig(format!(
                        "layer {} of '{}' has a zero-width dimension",
                        i, self.name
                    )));
                }
                if let Some(w) = width {
                    if w != *in_features {
                        return Err(GradError::InvalidConfig(format!(
                            "layer {} of '{}' expects {} inputs but the previous layer produces {}",
                            i, self.name, in_features, w
                        )));
                    }
                }
                input.get_or_insert(*in_features);
                width = Some(*out_features);
            }
        }
        match (input, width) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(GradError::InvalidConfig(format!(
                "model '{}' has no linear layer",
                self.name
            ))),
        }
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `ModelSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<ModelSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
