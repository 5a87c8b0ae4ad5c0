use std::collections::HashMap;

use super::update_rule::{LearnableParam, UpdateRule};
use crate::error::NetForgeError;
use crate::types::NetNumeric;

/// Moment estimates of one learnable parameter.
#[derive(Debug, Clone)]
struct AdamState<T> {
    m: Vec<T>,
    v: Vec<T>,
    /// Number of updates applied so far.
    t: u64,
}

impl<T: NetNumeric> AdamState<T> {
    fn zeros(len: usize) -> Self {
        AdamState {
            m: vec![T::zero(); len],
            v: vec![T::zero(); len],
            t: 0,
        }
    }
}

/// Implements the Adam update rule.
/// Reference: https://arxiv.org/abs/1412.6980
///
/// For every learnable parameter, with `g = grad + weight_decay * decay_mult * value`:
/// `m = beta1 * m + (1 - beta1) * g`, `v = beta2 * v + (1 - beta2) * g^2`,
/// then `value -= lr * lr_mult * sqrt(1 - beta2^t) / (1 - beta1^t) * m / (sqrt(v) + delta)`.
#[derive(Debug, Clone)]
pub struct AdamRule<T> {
    lr: f64,
    beta1: f64,
    beta2: f64,
    delta: f64,
    weight_decay: f64,
    state: HashMap<usize, AdamState<T>>,
}

impl<T: NetNumeric> AdamRule<T> {
    /// Creates a new `AdamRule` with `beta1 = 0.9`, `beta2 = 0.999`,
    /// `delta = 1e-8` and no weight decay.
    pub fn new(lr: f64) -> Self {
        AdamRule {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            delta: 1e-8,
            weight_decay: 0.0,
            state: HashMap::new(),
        }
    }

    /// Coefficients of the running averages of the gradient and its square.
    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Term added to the denominator.
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// L2 penalty folded into the gradient, scaled per parameter by `decay_mult`.
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }

    /// First moment estimate of learnable parameter `index`.
    pub fn first_moment(&self, index: usize) -> Option<&[T]> {
        self.state.get(&index).map(|s| s.m.as_slice())
    }

    /// Second moment estimate of learnable parameter `index`.
    pub fn second_moment(&self, index: usize) -> Option<&[T]> {
        self.state.get(&index).map(|s| s.v.as_slice())
    }

    /// Number of updates applied to learnable parameter `index`.
    pub fn steps(&self, index: usize) -> u64 {
        self.state.get(&index).map_or(0, |s| s.t)
    }
}

impl<T: NetNumeric> UpdateRule<T> for AdamRule<T> {
    fn apply(&mut self, param: &LearnableParam, value: &mut [T], grad: &[T]) -> Result<(), NetForgeError> {
        if value.len() != grad.len() {
            return Err(NetForgeError::ShapeMismatch {
                expected: vec![value.len()],
                actual: vec![grad.len()],
                operation: format!("Adam update of '{}'", param.display_name),
            });
        }
        let state = self
            .state
            .entry(param.index)
            .or_insert_with(|| AdamState::zeros(value.len()));
        if state.m.len() != value.len() {
            log::warn!(
                "Resetting Adam moments of '{}' after a size change ({} -> {})",
                param.display_name,
                state.m.len(),
                value.len()
            );
            *state = AdamState::zeros(value.len());
        }
        state.t += 1;
        let t = i32::try_from(state.t).unwrap_or(i32::MAX);
        let correction = (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        let step = T::from_f64(self.lr * param.lr_mult * correction);
        let local_decay = T::from_f64(self.weight_decay * param.decay_mult);
        let beta1 = T::from_f64(self.beta1);
        let beta2 = T::from_f64(self.beta2);
        let delta = T::from_f64(self.delta);
        let one = T::one();

        for (((x, &raw), m), v) in value.iter_mut().zip(grad).zip(state.m.iter_mut()).zip(state.v.iter_mut()) {
            let g = raw + local_decay * *x;
            *m = beta1 * *m + (one - beta1) * g;
            *v = beta2 * *v + (one - beta2) * g * g;
            *x -= step * *m / (v.sqrt() + delta);
        }
        Ok(())
    }
}
