pub mod math;
pub mod error;
pub mod autograd;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use error::{GradError, Result};
pub use autograd::{Graph, Var};
pub use activation::activation::ActivationFunction;
pub use layers::{Layer, Linear};
pub use network::{Model, ModelSpec, ParamId, ParamStore};
pub use loss::{cross_entropy, mse_loss, nll_loss};
pub use optim::{Optimizer, Sgd};
pub use train::{train_loop, train_step, TrainConfig};
