use std::marker::PhantomData;

use rand::rngs::StdRng;

use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Fan-out node: every output reads the input's values, and backward sums
/// the output gradients into the input gradient.
#[derive(Debug)]
pub struct Split<T> {
    name: String,
    _marker: PhantomData<T>,
}

impl<T: NetNumeric> Split<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(Split {
            name: spec.name.clone(),
            _marker: PhantomData,
        })
    }
}

impl<T: NetNumeric> Node<T> for Split<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Split"
    }

    fn arity(&self) -> Arity {
        Arity {
            exact_inputs: Some(1),
            min_outputs: Some(1),
            ..Default::default()
        }
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        for &out in io.outputs {
            if out == io.input(0) {
                return Err(NetForgeError::InvalidConfig {
                    node: self.name.clone(),
                    message: "Split does not allow in-place computation".to_string(),
                });
            }
            arena.reshape_like(out, io.input(0))?;
            arena.share_value(out, io.input(0))?;
        }
        Ok(())
    }

    fn forward(&mut self, _arena: &mut BufferArena<T>, _io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down.first().copied().unwrap_or(false) {
            return Ok(());
        }
        let mut sum = arena.grad(io.output(0)).to_vec();
        for &out in &io.outputs[1..] {
            for (acc, &g) in sum.iter_mut().zip(arena.grad(out)) {
                *acc += g;
            }
        }
        arena.grad_mut(io.input(0)).copy_from_slice(&sum);
        Ok(())
    }
}
