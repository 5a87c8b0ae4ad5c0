use std::marker::PhantomData;

use rand::rngs::StdRng;

use crate::buffer::{element_count, BufferArena};
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Probabilities are clamped from below before taking the log.
const PROB_THRESHOLD: f64 = 1e-20;

/// Negative log-likelihood of integer labels under given class probabilities.
///
/// Input 0 holds probabilities `[N, C, ...]`, input 1 holds `N` labels.
/// Labels never receive gradients.
#[derive(Debug)]
pub struct MultinomialLogisticLoss<T> {
    name: String,
    num: usize,
    dim: usize,
    _marker: PhantomData<T>,
}

impl<T: NetNumeric> MultinomialLogisticLoss<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(MultinomialLogisticLoss {
            name: spec.name.clone(),
            num: 0,
            dim: 0,
            _marker: PhantomData,
        })
    }

    fn label(&self, value: T, len: usize) -> Result<usize, NetForgeError> {
        let label = value.to_usize().ok_or_else(|| NetForgeError::InvalidConfig {
            node: self.name.clone(),
            message: format!("label {:?} is not a non-negative integer", value),
        })?;
        if label >= len {
            return Err(NetForgeError::IndexOutOfRange {
                what: format!("label of node '{}'", self.name),
                index: label,
                len,
            });
        }
        Ok(label)
    }
}

impl<T: NetNumeric> Node<T> for MultinomialLogisticLoss<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "MultinomialLogisticLoss"
    }

    fn arity(&self) -> Arity {
        Arity::exact(2, 1).with_auto_outputs()
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        let shape = arena.shape(io.input(0)).to_vec();
        self.num = shape.first().copied().unwrap_or(1);
        self.dim = if shape.is_empty() { 1 } else { element_count(&shape[1..]) };
        if arena.count(io.input(1)) != self.num {
            return Err(NetForgeError::ShapeMismatch {
                expected: vec![self.num],
                actual: arena.shape(io.input(1)).to_vec(),
                operation: format!("MultinomialLogisticLoss '{}' labels", self.name),
            });
        }
        arena.reshape(io.output(0), &[])
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        let prob = arena.value(io.input(0));
        let labels = arena.value(io.input(1));
        let threshold = T::from_f64(PROB_THRESHOLD);
        let mut loss = T::zero();
        for n in 0..self.num {
            let label = self.label(labels[n], self.dim)?;
            let p = prob[n * self.dim + label].max(threshold);
            loss -= p.ln();
        }
        let num = T::from_f64(self.num.max(1) as f64);
        arena.value_mut(io.output(0))[0] = loss / num;
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if propagate_down.get(1).copied().unwrap_or(false) {
            return Err(NetForgeError::UnsupportedOperation(format!(
                "node '{}' cannot backpropagate to label inputs",
                self.name
            )));
        }
        if !propagate_down[0] {
            return Ok(());
        }
        let prob = arena.value(io.input(0)).to_vec();
        let labels = arena.value(io.input(1)).to_vec();
        let num = T::from_f64(self.num.max(1) as f64);
        let scale = -arena.grad(io.output(0))[0] / num;
        let threshold = T::from_f64(PROB_THRESHOLD);
        let mut dx = vec![T::zero(); prob.len()];
        for n in 0..self.num {
            let label = self.label(labels[n], self.dim)?;
            let idx = n * self.dim + label;
            dx[idx] = scale / prob[idx].max(threshold);
        }
        arena.grad_mut(io.input(0)).copy_from_slice(&dx);
        Ok(())
    }

    fn default_loss_weight(&self, output: usize) -> f64 {
        if output == 0 {
            1.0
        } else {
            0.0
        }
    }

    fn allow_force_backward(&self, input: usize) -> bool {
        input != 1
    }
}
