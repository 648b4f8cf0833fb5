use crate::error::Result;
use crate::network::parameter::ParamStore;

/// Update rule applied to the parameters an optimizer was built for.
pub trait Optimizer {
    /// Applies one update from the current gradient buffers.
    fn step(&mut self, params: &mut ParamStore) -> Result<()>;

    /// Zeroes the gradient buffers of the owned parameters in place.
    fn zero_grad(&self, params: &mut ParamStore) -> Result<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}
