use serde::{Serialize, Deserialize};

use crate::error::{GradError, Result};
use crate::math::matrix::Matrix;

/// Stable identity of a parameter inside its `ParamStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub(crate) usize);

impl ParamId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A trainable matrix with its gradient buffer.
///
/// The gradient is allocated as zeros of the value's shape on the first
/// accumulation and is zeroed in place from then on. It is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: Matrix,
    #[serde(skip)]
    pub grad: Option<Matrix>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Matrix) -> Parameter {
        Parameter { name: name.into(), value, grad: None }
    }

    /// Adds `delta` into the gradient buffer, allocating it on first use.
    pub fn accumulate_grad(&mut self, delta: &Matrix) -> Result<()> {
        let (rows, cols) = self.value.shape();
        self.grad
            .get_or_insert_with(|| Matrix::zeros(rows, cols))
            .add_assign(delta)
    }

    pub fn zero_grad(&mut self) {
        if let Some(grad) = self.grad.as_mut() {
            grad.fill(0.0);
        }
    }
}

/// Arena owning every parameter of a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamStore {
    params: Vec<Parameter>,
}

impl ParamStore {
    pub fn new() -> ParamStore {
        ParamStore::default()
    }

    pub fn register(&mut self, name: impl Into<String>, value: Matrix) -> ParamId {
        self.params.push(Parameter::new(name, value));
        ParamId(self.params.len() - 1)
    }

    pub fn get(&self, id: ParamId) -> Result<&Parameter> {
        self.params.get(id.0).ok_or(GradError::UnknownParameter(id.0))
    }

    pub fn get_mut(&mut self, id: ParamId) -> Result<&mut Parameter> {
        self.params.get_mut(id.0).ok_or(GradError::UnknownParameter(id.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Parameter)> {
        self.params.iter().enumerate().map(|(i, p)| (ParamId(i), p))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar weights.
    pub fn num_elements(&self) -> usize {
        self.params.iter().map(|p| p.value.len()).sum()
    }

    pub fn zero_grad(&mut self) {
        self.params.iter_mut().for_each(Parameter::zero_grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_starts_at_zero_and_accumulates() {
        let mut store = ParamStore::new();
        let id = store.register("w", Matrix::filled(2, 2, 1.0));
        assert!(store.get(id).unwrap().grad.is_none());

        let delta = Matrix::filled(2, 2, 0.5);
        store.get_mut(id).unwrap().accumulate_grad(&delta).unwrap();
        store.get_mut(id).unwrap().accumulate_grad(&delta).unwrap();
        assert_eq!(store.get(id).unwrap().grad.as_ref().unwrap().data, vec![1.0; 4]);

        store.zero_grad();
        assert_eq!(store.get(id).unwrap().grad.as_ref().unwrap().data, vec![0.0; 4]);
    }

    #[test]
    fn accumulate_rejects_wrong_shape() {
        let mut p = Parameter::new("b", Matrix::zeros(1, 3));
        assert!(p.accumulate_grad(&Matrix::zeros(3, 1)).is_err());
    }

    #[test]
    fn unknown_ids_are_errors() {
        let store = ParamStore::new();
        assert!(matches!(store.get(ParamId(4)), Err(GradError::UnknownParameter(4))));
    }
}
