pub mod graph;
pub mod no_grad;

pub use graph::{Graph, Var};
pub use no_grad::NoGradGuard;
