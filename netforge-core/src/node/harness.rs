use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{create_node, Node, NodeIo};
use crate::buffer::{Buffer, BufferArena, BufferId};
use crate::error::NetForgeError;
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 1701;

/// One node wired to its own arena, outside of any graph.
///
/// The harness owns the input buffers it is given, one output buffer per
/// declared output (plus the kind's anonymous outputs), and the parameters
/// the node created. An output declared with the name of an input is wired
/// in place.
pub struct NodeHarness<T: NetNumeric> {
    node: Box<dyn Node<T>>,
    arena: BufferArena<T>,
    inputs: Vec<BufferId>,
    outputs: Vec<BufferId>,
    params: Vec<BufferId>,
    param_propagate: Vec<bool>,
    rng: StdRng,
}

impl<T: NetNumeric> NodeHarness<T> {
    /// Creates the node described by `spec`, configures it and shapes its
    /// outputs.
    ///
    /// # Errors
    /// Any construction error of the node kind, or an arity violation.
    pub fn new(spec: &NodeSpec, inputs: Vec<Buffer<T>>) -> Result<Self, NetForgeError> {
        Self::with_seed(spec, inputs, DEFAULT_SEED)
    }

    pub fn with_seed(spec: &NodeSpec, inputs: Vec<Buffer<T>>, seed: u64) -> Result<Self, NetForgeError> {
        let mut node = create_node::<T>(spec)?;
        let mut arena = BufferArena::new();
        let mut rng = StdRng::seed_from_u64(seed);

        let input_shapes: Vec<Vec<usize>> = inputs.iter().map(|b| b.shape().to_vec()).collect();
        let input_ids: Vec<BufferId> = inputs.into_iter().map(|b| arena.push(b)).collect();

        let declared = spec.outputs.len();
        let total = declared + node.arity().missing_outputs(declared);
        let mut output_ids = Vec::with_capacity(total);
        for j in 0..total {
            let in_place = spec
                .outputs
                .get(j)
                .and_then(|name| spec.inputs.iter().position(|input| input == name))
                .and_then(|i| input_ids.get(i).copied());
            output_ids.push(match in_place {
                Some(id) => id,
                None => arena.push(Buffer::empty()),
            });
        }
        node.arity()
            .check(&spec.name, node.kind(), input_ids.len(), output_ids.len())?;

        let params: Vec<BufferId> = node
            .configure(&input_shapes, &mut rng)?
            .into_iter()
            .map(|p| arena.push(p))
            .collect();
        let param_propagate = vec![true; params.len()];

        let mut harness = NodeHarness {
            node,
            arena,
            inputs: input_ids,
            outputs: output_ids,
            params,
            param_propagate,
            rng,
        };
        harness.compute_shape()?;
        Ok(harness)
    }

    pub fn node(&self) -> &dyn Node<T> {
        self.node.as_ref()
    }

    pub fn arena(&self) -> &BufferArena<T> {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut BufferArena<T> {
        &mut self.arena
    }

    pub fn inputs(&self) -> &[BufferId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[BufferId] {
        &self.outputs
    }

    pub fn params(&self) -> &[BufferId] {
        &self.params
    }

    /// Restarts the random stream used by stochastic kinds.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn compute_shape(&mut self) -> Result<(), NetForgeError> {
        let io = NodeIo {
            inputs: &self.inputs,
            outputs: &self.outputs,
            params: &self.params,
            param_propagate: &self.param_propagate,
        };
        self.node.compute_shape(&mut self.arena, &io)
    }

    /// Reshapes the outputs and runs the forward computation.
    pub fn forward(&mut self) -> Result<(), NetForgeError> {
        self.compute_shape()?;
        let io = NodeIo {
            inputs: &self.inputs,
            outputs: &self.outputs,
            params: &self.params,
            param_propagate: &self.param_propagate,
        };
        self.node.forward(&mut self.arena, &io, &mut self.rng)
    }

    /// Runs the backward computation. `propagate_down` must hold one flag per
    /// input.
    pub fn backward(&mut self, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        if propagate_down.len() != self.inputs.len() {
            return Err(NetForgeError::PropagateDownCount {
                node: self.node.name().to_string(),
                expected: self.inputs.len(),
                actual: propagate_down.len(),
            });
        }
        let io = NodeIo {
            inputs: &self.inputs,
            outputs: &self.outputs,
            params: &self.params,
            param_propagate: &self.param_propagate,
        };
        self.node.backward(&mut self.arena, &io, propagate_down)
    }

    /// Zeroes every parameter gradient.
    pub fn zero_param_grads(&mut self) {
        for &id in &self.params {
            self.arena.zero_grad(id);
        }
    }
}
