use std::collections::HashMap;

use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::network::parameter::{ParamId, ParamStore};
use crate::optim::optimizer::Optimizer;

/// Stochastic gradient descent with optional momentum.
///
/// Without momentum the update is `p ← p − lr·g`. With momentum `μ` a
/// velocity buffer per parameter tracks `v ← μ·v + g` and the update is
/// `p ← p − lr·v`. Parameters whose gradient was never allocated are
/// skipped.
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    params: Vec<ParamId>,
    velocity: HashMap<ParamId, Matrix>,
}

impl Sgd {
    pub fn new(params: impl IntoIterator<Item = ParamId>, learning_rate: f64) -> Sgd {
        Sgd::with_momentum(params, learning_rate, 0.0)
    }

    pub fn with_momentum(params: impl IntoIterator<Item = ParamId>, learning_rate: f64, momentum: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum,
            params: params.into_iter().collect(),
            velocity: HashMap::new(),
        }
    }

    /// Parameters this optimizer updates.
    pub fn params(&self) -> &[ParamId] {
        &self.params
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut ParamStore) -> Result<()> {
        for &id in &self.params {
            let param = params.get_mut(id)?;
            let Some(grad) = param.grad.as_ref() else {
                continue;
            };

            if self.momentum > 0.0 {
                let (rows, cols) = grad.shape();
                let vel = self.velocity.entry(id).or_insert_with(|| Matrix::zeros(rows, cols));
                for (v, &g) in vel.data.iter_mut().zip(grad.data.iter()) {
                    *v = self.momentum * *v + g;
                }
                param.value.axpy(-self.learning_rate, vel)?;
            } else {
                param.value.axpy(-self.learning_rate, grad)?;
            }
        }
        Ok(())
    }

    fn zero_grad(&self, params: &mut ParamStore) -> Result<()> {
        for &id in &self.params {
            params.get_mut(id)?.zero_grad();
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_grad(value: f64, grad: f64) -> (ParamStore, ParamId) {
        let mut store = ParamStore::new();
        let id = store.register("w", Matrix::filled(1, 2, value));
        store.get_mut(id).unwrap().accumulate_grad(&Matrix::filled(1, 2, grad)).unwrap();
        (store, id)
    }

    #[test]
    fn plain_step_moves_against_gradient() {
        let (mut store, id) = store_with_grad(1.0, 0.5);
        let mut sgd = Sgd::new([id], 0.1);
        sgd.step(&mut store).unwrap();
        let v = &store.get(id).unwrap().value;
        assert!(v.data.iter().all(|&x| (x - 0.95).abs() < 1e-12));
    }

    #[test]
    fn parameters_without_gradient_are_skipped() {
        let mut store = ParamStore::new();
        let id = store.register("w", Matrix::filled(2, 2, 3.0));
        let mut sgd = Sgd::new([id], 1.0);
        sgd.step(&mut store).unwrap();
        assert_eq!(store.get(id).unwrap().value.data, vec![3.0; 4]);
    }

    #[test]
    fn momentum_builds_velocity() {
        let (mut store, id) = store_with_grad(0.0, 1.0);
        let mut sgd = Sgd::with_momentum([id], 0.1, 0.9);
        sgd.step(&mut store).unwrap();
        sgd.step(&mut store).unwrap();
        // v1 = 1, v2 = 1.9 → p = -0.1 - 0.19
        let v = &store.get(id).unwrap().value;
        assert!(v.data.iter().all(|&x| (x + 0.29).abs() < 1e-12));
    }

    #[test]
    fn zero_grad_keeps_buffer() {
        let (mut store, id) = store_with_grad(0.0, 2.0);
        let sgd = Sgd::new([id], 0.1);
        sgd.zero_grad(&mut store).unwrap();
        assert_eq!(store.get(id).unwrap().grad.as_ref().unwrap().data, vec![0.0, 0.0]);
    }
}
