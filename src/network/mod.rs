pub mod model;
pub mod parameter;
pub mod spec;

pub use model::Model;
pub use parameter::{ParamId, ParamStore, Parameter};
pub use spec::{LayerSpec, ModelSpec};
