pub mod mse;
pub mod nll;

pub use mse::mse_loss;
pub use nll::{cross_entropy, nll_loss};
