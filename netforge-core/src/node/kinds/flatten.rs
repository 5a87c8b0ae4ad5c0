use std::marker::PhantomData;

use rand::rngs::StdRng;

use crate::buffer::{canonical_axis, element_count, BufferArena};
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Collapses the axes `axis..=end_axis` into one. The output aliases both the
/// value and the gradient storage of the input, so forward and backward do
/// no work.
#[derive(Debug)]
pub struct Flatten<T> {
    name: String,
    axis: isize,
    end_axis: isize,
    _marker: PhantomData<T>,
}

impl<T: NetNumeric> Flatten<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(Flatten {
            name: spec.name.clone(),
            axis: spec.get_isize("axis")?.unwrap_or(1),
            end_axis: spec.get_isize("end_axis")?.unwrap_or(-1),
            _marker: PhantomData,
        })
    }

    fn flattened_shape(&self, shape: &[usize]) -> Result<Vec<usize>, NetForgeError> {
        let resolve = |axis: isize| {
            canonical_axis(axis, shape.len()).ok_or_else(|| NetForgeError::IndexOutOfRange {
                what: format!("axis of node '{}'", self.name),
                index: axis.unsigned_abs(),
                len: shape.len(),
            })
        };
        let start = resolve(self.axis)?;
        let end = resolve(self.end_axis)?;
        if start > end {
            return Err(NetForgeError::InvalidConfig {
                node: self.name.clone(),
                message: format!("axis {} comes after end_axis {}", start, end),
            });
        }
        let mut out = shape[..start].to_vec();
        out.push(element_count(&shape[start..=end]));
        out.extend_from_slice(&shape[end + 1..]);
        Ok(out)
    }
}

impl<T: NetNumeric> Node<T> for Flatten<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Flatten"
    }

    fn arity(&self) -> Arity {
        Arity::exact(1, 1)
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        if io.input(0) == io.output(0) {
            return Err(NetForgeError::InvalidConfig {
                node: self.name.clone(),
                message: "Flatten does not allow in-place computation".to_string(),
            });
        }
        let shape = self.flattened_shape(arena.shape(io.input(0)))?;
        arena.reshape(io.output(0), &shape)?;
        arena.share_value(io.output(0), io.input(0))?;
        arena.share_grad(io.output(0), io.input(0))
    }

    fn forward(&mut self, _arena: &mut BufferArena<T>, _io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        Ok(())
    }

    fn backward(&mut self, _arena: &mut BufferArena<T>, _io: &NodeIo, _propagate_down: &[bool]) -> Result<(), NetForgeError> {
        Ok(())
    }
}
