use rand::rngs::StdRng;

use super::reshape_like_input;
use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Affine map with fixed scalars: `y = scale * x + bias`.
#[derive(Debug)]
pub struct Scale<T> {
    name: String,
    scale: T,
    bias: T,
}

impl<T: NetNumeric> Scale<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(Scale {
            name: spec.name.clone(),
            scale: T::from_f64(spec.get_f64("scale")?.unwrap_or(1.0)),
            bias: T::from_f64(spec.get_f64("bias")?.unwrap_or(0.0)),
        })
    }
}

impl<T: NetNumeric> Node<T> for Scale<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Scale"
    }

    fn arity(&self) -> Arity {
        Arity::exact(1, 1)
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        reshape_like_input(arena, io)
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        let x = arena.value(io.input(0)).to_vec();
        for (y, &v) in arena.value_mut(io.output(0)).iter_mut().zip(&x) {
            *y = self.scale * v + self.bias;
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down[0] {
            return Ok(());
        }
        let dy = arena.grad(io.output(0)).to_vec();
        for (dx, &g) in arena.grad_mut(io.input(0)).iter_mut().zip(&dy) {
            *dx = self.scale * g;
        }
        Ok(())
    }
}
