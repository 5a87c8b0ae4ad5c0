use std::marker::PhantomData;

use rand::rngs::StdRng;

use crate::buffer::{canonical_axis, element_count, Buffer, BufferArena};
use crate::error::NetForgeError;
use crate::node::{Arity, Filler, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Fully connected node.
///
/// The input is viewed as an `M x K` matrix split at `axis` (leading axes
/// form `M`, the rest `K`). Parameters are the weights `[N, K]` and, when
/// `bias_term` is set, the bias `[N]`. The output shape is the leading input
/// axes followed by `num_output`.
#[derive(Debug)]
pub struct InnerProduct<T> {
    name: String,
    num_output: usize,
    axis: isize,
    bias_term: bool,
    weight_filler: Filler,
    bias_filler: Filler,
    m: usize,
    k: usize,
    _marker: PhantomData<T>,
}

impl<T: NetNumeric> InnerProduct<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        let num_output = spec.get_usize("num_output")?.ok_or_else(|| NetForgeError::InvalidConfig {
            node: spec.name.clone(),
            message: "num_output is required".to_string(),
        })?;
        let filler = |key: &str| -> Result<Filler, NetForgeError> {
            match spec.get_object(key)? {
                Some(config) => Filler::from_config(&spec.name, config),
                None => Ok(Filler::default()),
            }
        };
        Ok(InnerProduct {
            name: spec.name.clone(),
            num_output,
            axis: spec.get_isize("axis")?.unwrap_or(1),
            bias_term: spec.get_bool("bias_term")?.unwrap_or(true),
            weight_filler: filler("weight_filler")?,
            bias_filler: filler("bias_filler")?,
            m: 0,
            k: 0,
            _marker: PhantomData,
        })
    }

    fn axis_of(&self, shape: &[usize]) -> Result<usize, NetForgeError> {
        canonical_axis(self.axis, shape.len()).ok_or_else(|| NetForgeError::IndexOutOfRange {
            what: format!("axis of node '{}'", self.name),
            index: self.axis.unsigned_abs(),
            len: shape.len(),
        })
    }
}

impl<T: NetNumeric> Node<T> for InnerProduct<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "InnerProduct"
    }

    fn arity(&self) -> Arity {
        Arity::exact(1, 1)
    }

    fn configure(&mut self, input_shapes: &[Vec<usize>], rng: &mut StdRng) -> Result<Vec<Buffer<T>>, NetForgeError> {
        let shape = &input_shapes[0];
        let axis = self.axis_of(shape)?;
        self.k = element_count(&shape[axis..]);

        let mut weights = Buffer::new(&[self.num_output, self.k]);
        self.weight_filler.fill(weights.value_mut(), rng);
        let mut params = vec![weights];
        if self.bias_term {
            let mut bias = Buffer::new(&[self.num_output]);
            self.bias_filler.fill(bias.value_mut(), rng);
            params.push(bias);
        }
        Ok(params)
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        let shape = arena.shape(io.input(0)).to_vec();
        let axis = self.axis_of(&shape)?;
        let k = element_count(&shape[axis..]);
        if k != self.k {
            return Err(NetForgeError::ShapeMismatch {
                expected: vec![self.k],
                actual: vec![k],
                operation: format!("InnerProduct '{}' input size", self.name),
            });
        }
        self.m = element_count(&shape[..axis]);
        let mut out_shape = shape[..axis].to_vec();
        out_shape.push(self.num_output);
        arena.reshape(io.output(0), &out_shape)
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        let (m, k, n) = (self.m, self.k, self.num_output);
        let x = arena.value(io.input(0)).to_vec();
        let w = arena.value(io.param(0)).to_vec();
        let b = if self.bias_term {
            arena.value(io.param(1)).to_vec()
        } else {
            vec![T::zero(); n]
        };
        let y = arena.value_mut(io.output(0));
        for row in 0..m {
            let xr = &x[row * k..(row + 1) * k];
            for col in 0..n {
                let wr = &w[col * k..(col + 1) * k];
                let dot = xr.iter().zip(wr).fold(T::zero(), |acc, (&a, &c)| acc + a * c);
                y[row * n + col] = dot + b[col];
            }
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        let (m, k, n) = (self.m, self.k, self.num_output);
        let dy = arena.grad(io.output(0)).to_vec();
        let x = arena.value(io.input(0)).to_vec();

        if io.wants_param_grad(0) {
            let dw = arena.grad_mut(io.param(0));
            for row in 0..m {
                for col in 0..n {
                    let g = dy[row * n + col];
                    for i in 0..k {
                        dw[col * k + i] += g * x[row * k + i];
                    }
                }
            }
        }
        if self.bias_term && io.wants_param_grad(1) {
            let db = arena.grad_mut(io.param(1));
            for row in 0..m {
                for col in 0..n {
                    db[col] += dy[row * n + col];
                }
            }
        }
        if propagate_down[0] {
            let w = arena.value(io.param(0)).to_vec();
            let dx = arena.grad_mut(io.input(0));
            for row in 0..m {
                for i in 0..k {
                    dx[row * k + i] = (0..n).fold(T::zero(), |acc, col| acc + dy[row * n + col] * w[col * k + i]);
                }
            }
        }
        Ok(())
    }
}
