use std::collections::HashMap;

use super::update_rule::{LearnableParam, UpdateRule};
use crate::error::NetForgeError;
use crate::types::NetNumeric;

/// Stochastic Gradient Descent with optional momentum and L2 weight decay.
///
/// For every learnable parameter:
/// `history = momentum * history + lr * lr_mult * (grad + weight_decay * decay_mult * value)`,
/// then `value -= history`.
#[derive(Debug, Clone)]
pub struct SgdRule<T> {
    lr: f64,
    momentum: f64,
    weight_decay: f64,
    history: HashMap<usize, Vec<T>>,
}

impl<T: NetNumeric> SgdRule<T> {
    /// Creates a new `SgdRule`.
    ///
    /// # Arguments
    ///
    /// * `lr`: The base learning rate, scaled per parameter by `lr_mult`.
    /// * `momentum`: Momentum factor (0 disables the history).
    /// * `weight_decay`: L2 penalty, scaled per parameter by `decay_mult`.
    pub fn new(lr: f64, momentum: f64, weight_decay: f64) -> Self {
        SgdRule {
            lr,
            momentum,
            weight_decay,
            history: HashMap::new(),
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// Momentum history of learnable parameter `index`, if any update ran.
    pub fn history(&self, index: usize) -> Option<&[T]> {
        self.history.get(&index).map(Vec::as_slice)
    }
}

impl<T: NetNumeric> UpdateRule<T> for SgdRule<T> {
    fn apply(&mut self, param: &LearnableParam, value: &mut [T], grad: &[T]) -> Result<(), NetForgeError> {
        if value.len() != grad.len() {
            return Err(NetForgeError::ShapeMismatch {
                expected: vec![value.len()],
                actual: vec![grad.len()],
                operation: format!("SGD update of '{}'", param.display_name),
            });
        }
        let local_rate = T::from_f64(self.lr * param.lr_mult);
        let local_decay = T::from_f64(self.weight_decay * param.decay_mult);
        let momentum = T::from_f64(self.momentum);

        let history = self
            .history
            .entry(param.index)
            .or_insert_with(|| vec![T::zero(); value.len()]);
        if history.len() != value.len() {
            log::warn!(
                "Resetting SGD history of '{}' after a size change ({} -> {})",
                param.display_name,
                history.len(),
                value.len()
            );
            *history = vec![T::zero(); value.len()];
        }
        for ((v, &g), h) in value.iter_mut().zip(grad).zip(history.iter_mut()) {
            *h = momentum * *h + local_rate * (g + local_decay * *v);
            *v -= *h;
        }
        Ok(())
    }
}
