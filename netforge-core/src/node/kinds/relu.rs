use rand::rngs::StdRng;

use super::reshape_like_input;
use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Rectified linear unit, `y = max(x, 0) + negative_slope * min(x, 0)`.
///
/// Safe to run in place: the sign of the output matches the sign of the
/// input for any non-negative slope.
#[derive(Debug)]
pub struct ReLU<T> {
    name: String,
    negative_slope: T,
}

impl<T: NetNumeric> ReLU<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        let negative_slope = spec.get_f64("negative_slope")?.unwrap_or(0.0);
        if negative_slope < 0.0 {
            return Err(NetForgeError::InvalidConfig {
                node: spec.name.clone(),
                message: format!("negative_slope must be >= 0, got {}", negative_slope),
            });
        }
        Ok(ReLU {
            name: spec.name.clone(),
            negative_slope: T::from_f64(negative_slope),
        })
    }
}

impl<T: NetNumeric> Node<T> for ReLU<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ReLU"
    }

    fn arity(&self) -> Arity {
        Arity::exact(1, 1)
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        reshape_like_input(arena, io)
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        let x = arena.value(io.input(0)).to_vec();
        let zero = T::zero();
        for (y, &v) in arena.value_mut(io.output(0)).iter_mut().zip(&x) {
            *y = v.max(zero) + self.negative_slope * v.min(zero);
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down[0] {
            return Ok(());
        }
        let x = arena.value(io.input(0)).to_vec();
        let dy = arena.grad(io.output(0)).to_vec();
        let zero = T::zero();
        for ((dx, &g), &v) in arena.grad_mut(io.input(0)).iter_mut().zip(&dy).zip(&x) {
            *dx = if v > zero { g } else { g * self.negative_slope };
        }
        Ok(())
    }
}
