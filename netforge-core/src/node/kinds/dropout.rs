use rand::rngs::StdRng;
use rand::Rng;

use super::reshape_like_input;
use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::{Arity, Node, NodeIo};
use crate::spec::NodeSpec;
use crate::types::{NetNumeric, Phase};

/// Inverted dropout: in the train phase each element is kept with
/// probability `1 - ratio` and scaled by `1 / (1 - ratio)`; in the test phase
/// it is the identity.
#[derive(Debug)]
pub struct Dropout<T> {
    name: String,
    phase: Phase,
    ratio: f64,
    scale: T,
    mask: Vec<bool>,
}

impl<T: NetNumeric> Dropout<T> {
    pub fn from_spec(spec: &NodeSpec) -> Result<Self, NetForgeError> {
        let ratio = spec.get_f64("dropout_ratio")?.unwrap_or(0.5);
        if !(0.0..1.0).contains(&ratio) {
            return Err(NetForgeError::InvalidConfig {
                node: spec.name.clone(),
                message: format!("dropout_ratio must be in [0, 1), got {}", ratio),
            });
        }
        Ok(Dropout {
            name: spec.name.clone(),
            phase: spec.phase.unwrap_or_default(),
            ratio,
            scale: T::from_f64(1.0 / (1.0 - ratio)),
            mask: Vec::new(),
        })
    }
}

impl<T: NetNumeric> Node<T> for Dropout<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Dropout"
    }

    fn arity(&self) -> Arity {
        Arity::exact(1, 1)
    }

    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
        reshape_like_input(arena, io)
    }

    fn forward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, rng: &mut StdRng) -> Result<(), NetForgeError> {
        let x = arena.value(io.input(0)).to_vec();
        if self.phase == Phase::Test {
            arena.value_mut(io.output(0)).copy_from_slice(&x);
            return Ok(());
        }
        let keep = 1.0 - self.ratio;
        self.mask = (0..x.len()).map(|_| rng.gen_bool(keep)).collect();
        for ((y, &v), &kept) in arena.value_mut(io.output(0)).iter_mut().zip(&x).zip(&self.mask) {
            *y = if kept { v * self.scale } else { T::zero() };
        }
        Ok(())
    }

    fn backward(&mut self, arena: &mut BufferArena<T>, io: &NodeIo, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if !propagate_down[0] {
            return Ok(());
        }
        let dy = arena.grad(io.output(0)).to_vec();
        let dx = arena.grad_mut(io.input(0));
        if self.phase == Phase::Test {
            dx.copy_from_slice(&dy);
            return Ok(());
        }
        for ((d, &g), &kept) in dx.iter_mut().zip(&dy).zip(&self.mask) {
            *d = if kept { g * self.scale } else { T::zero() };
        }
        Ok(())
    }
}
