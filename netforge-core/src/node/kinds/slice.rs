use std::marker::PhantomData;

use rand::rngs::StdRng;

use crate::buffer::{canonical_axis, element_count, BufferArena};
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Cuts the input along `axis` into one piece per output.
///
/// With `slice_points` the pieces end at the given offsets; otherwise the
/// axis is divided evenly. A single output aliases the input.
#[derive(Debug)]
pub struct Slice<T> {
    name: String,
    axis: isize,
    slice_points: Vec<usize>,
    /// Extent of every piece along the axis, filled by `compute_shape`.
    extents: Vec<usize>,
    outer: usize,
    inner: usize,
    axis_dim: usize,
    _marker: PhantomData<T>,
}

impl<T: NetNumeric> Slice<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(Slice {
            name: spec.name.clone(),
            axis: spec.get_isize("axis")?.unwrap_or(1),
            slice_points: spec.get_usize_list("slice_points")?,
            extents: Vec::new(),
            outer: 0,
            inner: 0,
            axis_dim: 0,
            _marker: PhantomData,
        })
    }

    fn invalid(&self, message: String) -> NetForgeError {
        NetForgeError::InvalidConfig {
            node: self.name.clone(),
            message,
        }
    }

    fn piece_extents(&self, dim: usize, pieces: usize) -> Result<Vec<usize>, NetForgeError> {
        if self.slice_points.is_empty() {
            if dim % pieces != 0 {
                return Err(self.invalid(format!(
                    "axis extent {} is not divisible by the number of outputs {}",
                    dim, pieces
                )));
            }
            return Ok(vec![dim / pieces; pieces]);
        }
        if self.slice_points.len() != pieces - 1 {
            return Err(self.invalid(format!(
                "{} slice points given for {} outputs",
                self.slice_points.len(),
                pieces
            )));
        }
        let mut extents = Vec::with_capacity(pieces);
        let mut prev = 0;
        for &point in &self.slice_points {
            if point <= prev || point >= dim {
                return Err(self.invalid(format!(
                    "slice points must be increasing and inside (0, {}), got {:?}",
                    dim, self.slice_points
                )));
            }
            extents.push(point - prev);
            prev = point;
        }
        extents.push(dim - prev);
        Ok(extents)
    }
}

impl<T: NetNumeric> Node<T> for Slice<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Slice"
    }

    fn arity(&self) -> Arity {
        Arity {
            exact_inputs: Some(1),
            min_outputs: Some(1),
            ..Default::default()
        }
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        let shape = arena.shape(io.input(0)).to_vec();
        let axis = canonical_axis(self.axis, shape.len()).ok_or_else(|| NetForgeError::IndexOutOfRange {
            what: format!("axis of node '{}'", self.name),
            index: self.axis.unsigned_abs(),
            len: shape.len(),
        })?;
        self.axis_dim = shape[axis];
        self.outer = element_count(&shape[..axis]);
        self.inner = element_count(&shape[axis + 1..]);
        self.extents = self.piece_extents(self.axis_dim, io.outputs.len())?;

        for (&out, &extent) in io.outputs.iter().zip(&self.extents) {
            let mut piece = shape.clone();
            piece[axis] = extent;
            arena.reshape(out, &piece)?;
        }
        if io.outputs.len() == 1 {
            arena.share_value(io.output(0), io.input(0))?;
            arena.share_grad(io.output(0), io.input(0))?;
        }
        Ok(())
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        if io.outputs.len() == 1 {
            return Ok(());
        }
        let x = arena.value(io.input(0)).to_vec();
        let mut offset = 0;
        for (&out, &extent) in io.outputs.iter().zip(&self.extents) {
            let piece = extent * self.inner;
            let y = arena.value_mut(out);
            for n in 0..self.outer {
                let src = (n * self.axis_dim + offset) * self.inner;
                y[n * piece..(n + 1) * piece].copy_from_slice(&x[src..src + piece]);
            }
            offset += extent;
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down[0] || io.outputs.len() == 1 {
            return Ok(());
        }
        let mut dx = vec![T::zero(); arena.count(io.input(0))];
        let mut offset = 0;
        for (&out, &extent) in io.outputs.iter().zip(&self.extents) {
            let piece = extent * self.inner;
            let dy = arena.grad(out);
            for n in 0..self.outer {
                let dst = (n * self.axis_dim + offset) * self.inner;
                dx[dst..dst + piece].copy_from_slice(&dy[n * piece..(n + 1) * piece]);
            }
            offset += extent;
        }
        arena.grad_mut(io.input(0)).copy_from_slice(&dx);
        Ok(())
    }
}
