use rand::rngs::StdRng;

use super::reshape_like_input;
use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Elementwise `y = x²`.
#[derive(Debug)]
pub struct Square<T> {
    name: String,
    /// Input values kept from forward when running in place.
    saved_input: Vec<T>,
}

impl<T: NetNumeric> Square<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(Square {
            name: spec.name.clone(),
            saved_input: Vec::new(),
        })
    }
}

impl<T: NetNumeric> Node<T> for Square<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Square"
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
            *y = v * v;
        }
        if io.input(0) == io.output(0) {
            self.saved_input = x;
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down[0] {
            return Ok(());
        }
        let x = if io.input(0) == io.output(0) {
            self.saved_input.clone()
        } else {
            arena.value(io.input(0)).to_vec()
        };
        let dy = arena.grad(io.output(0)).to_vec();
        let two = T::from_f64(2.0);
        for ((dx, &g), &v) in arena.grad_mut(io.input(0)).iter_mut().zip(&dy).zip(&x) {
            *dx = two * v * g;
        }
        Ok(())
    }
}
