//! # Computation Nodes (`node`)
//!
//! A node is one computation step of a graph. Every kind implements the
//! [`Node`] capability interface and is created from a [`NodeSpec`] through
//! the process-wide [`registry`].
//!
//! Nodes never own the buffers they read or write: the graph (or a
//! [`harness::NodeHarness`] in tests) owns a [`BufferArena`] and hands each
//! call a [`NodeIo`] listing the arena slots wired to the node. The only
//! buffers a node creates are its learnable parameters, returned from
//! [`Node::configure`] and moved into the arena by the caller.
//!
//! ## Call order
//! 1. `configure` once, with the input shapes known at wiring time.
//! 2. `compute_shape` before every forward pass (inputs may have been reshaped).
//! 3. `forward` / `backward` any number of times.

use rand::rngs::StdRng;

use crate::buffer::{Buffer, BufferArena, BufferId};
use crate::error::NetForgeError;
use crate::types::NetNumeric;

pub mod arity;
pub mod filler;
pub mod harness;
pub mod kinds;
pub mod registry;

pub use arity::Arity;
pub use filler::Filler;
pub use harness::NodeHarness;
pub use registry::{create_node, register_node_kind, registered_kinds, NodeConstructor, NodeFactory};

/// Arena slots wired to one node for a single call.
#[derive(Debug, Clone, Copy)]
pub struct NodeIo<'a> {
    pub inputs: &'a [BufferId],
    pub outputs: &'a [BufferId],
    pub params: &'a [BufferId],
    /// One flag per parameter: whether its gradient must be computed.
    pub param_propagate: &'a [bool],
}

impl<'a> NodeIo<'a> {
    pub fn input(&self, i: usize) -> BufferId {
        self.inputs[i]
    }

    pub fn output(&self, i: usize) -> BufferId {
        self.outputs[i]
    }

    pub fn param(&self, i: usize) -> BufferId {
        self.params[i]
    }

    /// Whether the gradient of parameter `i` is wanted.
    pub fn wants_param_grad(&self, i: usize) -> bool {
        self.param_propagate.get(i).copied().unwrap_or(true)
    }
}

/// Capability interface every node kind implements.
///
/// Parameter gradients are accumulated (`+=`) so that several backward passes
/// can sum into them before an update. Input gradients are overwritten; fan-out
/// accumulation is the job of `Split` nodes.
pub trait Node<T: NetNumeric>: Send {
    /// Name of the node as declared in its spec.
    fn name(&self) -> &str;

    /// Registry tag of the kind.
    fn kind(&self) -> &'static str;

    fn arity(&self) -> Arity {
        Arity::default()
    }

    /// Validates the configuration against the wired input shapes and creates
    /// the learnable parameters (filled from `rng`).
    fn configure(
        &mut self,
        _input_shapes: &[Vec<usize>],
        _rng: &mut StdRng,
    ) -> Result<Vec<Buffer<T>>, NetForgeError> {
        Ok(Vec::new())
    }

    /// Reshapes the outputs from the current input shapes. Structural kinds
    /// also set up their value/gradient aliases here.
    fn compute_shape(&mut self, arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError>;

    fn forward(
        &mut self,
        arena: &mut BufferArena<T>,
        io: &NodeIo,
        rng: &mut StdRng,
    ) -> Result<(), NetForgeError>;

    /// Writes input gradients for the inputs flagged in `propagate_down` and
    /// accumulates parameter gradients selected by `io.param_propagate`.
    fn backward(
        &mut self,
        arena: &mut BufferArena<T>,
        io: &NodeIo,
        propagate_down: &[bool],
    ) -> Result<(), NetForgeError>;

    /// Loss weight of `output` when its `NodeSpec` sets none.
    fn default_loss_weight(&self, _output: usize) -> f64 {
        0.0
    }

    /// Whether `force_backward` may turn on backward for `input`.
    fn allow_force_backward(&self, _input: usize) -> bool {
        true
    }
}

/// Fails unless `a` and `b` hold the same number of elements.
pub(crate) fn check_same_count<T: NetNumeric>(
    arena: &BufferArena<T>,
    a: BufferId,
    b: BufferId,
    operation: &str,
) -> Result<(), NetForgeError> {
    if arena.count(a) != arena.count(b) {
        return Err(NetForgeError::ShapeMismatch {
            expected: arena.shape(a).to_vec(),
            actual: arena.shape(b).to_vec(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}
