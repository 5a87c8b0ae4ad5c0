use rand::rngs::StdRng;

use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{check_same_count, Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// `loss = Σ (a - b)² / (2 N)` where `N` is the extent of the first axis.
///
/// Both inputs may receive gradients. The scalar output is the loss.
#[derive(Debug)]
pub struct EuclideanLoss<T> {
    name: String,
    diff: Vec<T>,
}

impl<T: NetNumeric> EuclideanLoss<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        Ok(EuclideanLoss {
            name: spec.name.clone(),
            diff: Vec::new(),
        })
    }

    fn batch_size(arena: &BufferArena<T>, io: &NodeIo) -> T {
        let n = arena.shape(io.input(0)).first().copied().unwrap_or(1).max(1);
        T::from_f64(n as f64)
    }
}

impl<T: NetNumeric> Node<T> for EuclideanLoss<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "EuclideanLoss"
    }

    fn arity(&self) -> Arity {
        Arity::exact(2, 1).with_auto_outputs()
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        check_same_count(arena, io.input(0), io.input(1), "EuclideanLoss inputs")?;
        arena.reshape(io.output(0), &[])
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, _rng: &mut StdRng) -> Result<(), NetForgeError> {
        let a = arena.value(io.input(0));
        let b = arena.value(io.input(1));
        self.diff = a.iter().zip(b).map(|(&x, &y)| x - y).collect();
        let sumsq = self.diff.iter().fold(T::zero(), |acc, &d| acc + d * d);
        let num = Self::batch_size(arena, io);
        arena.value_mut(io.output(0))[0] = sumsq / num / T::from_f64(2.0);
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        let top = arena.grad(io.output(0))[0];
        let num = Self::batch_size(arena, io);
        for (i, &wanted) in propagate_down.iter().enumerate().take(2) {
            if !wanted {
                continue;
            }
            let sign = if i == 0 { T::one() } else { -T::one() };
            let alpha = sign * top / num;
            for (g, &d) in arena.grad_mut(io.input(i)).iter_mut().zip(&self.diff) {
                *g = alpha * d;
            }
        }
        Ok(())
    }

    fn default_loss_weight(&self, output: usize) -> f64 {
        if output == 0 {
            1.0
        } else {
            0.0
        }
    }
}
