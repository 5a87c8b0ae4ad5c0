//! # Graph (`graph`)
//!
//! A [`Graph`] is the wired, shape-resolved and backward-annotated collection
//! of nodes built from a [`NetSpec`](crate::spec::NetSpec).
//!
//! ## Key Components:
//!
//! - **Construction** (`build.rs`): filtering, split insertion, name-based
//!   wiring with in-place detection, parameter registration and sharing, and
//!   backward-necessity analysis.
//! - **Execution** (`exec.rs`): ranged forward/backward passes, loss
//!   accumulation, parameter updates through an [`UpdateRule`], weight
//!   sharing between graphs and debug logging.
//!
//! Every buffer lives in one [`BufferArena`]; nodes refer to buffers by
//! [`BufferId`] and the graph keeps the per-node slot lists.

use std::collections::HashMap;

use log::warn;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::buffer::{BufferArena, BufferId};
use crate::node::Node;
use crate::optim::UpdateRule;
use crate::types::{NetNumeric, Phase};

mod build;
mod exec;

/// Name given to anonymous outputs added for kinds with automatic outputs.
pub const AUTOMATIC_OUTPUT: &str = "(automatic)";

/// Seed of the graph rng when the spec does not set one.
pub const DEFAULT_GRAPH_SEED: u64 = 1701;

/// Executable computation graph over element type `T`.
pub struct Graph<T: NetNumeric> {
    name: String,
    phase: Phase,

    nodes: Vec<Box<dyn Node<T>>>,
    node_names: Vec<String>,
    node_index: HashMap<String, usize>,
    node_inputs: Vec<Vec<BufferId>>,
    node_outputs: Vec<Vec<BufferId>>,
    /// Global parameter indices of every node, in the node's own order.
    node_params: Vec<Vec<usize>>,
    /// Per node, per input: whether the input gradient is computed.
    input_needs_backward: Vec<Vec<bool>>,
    node_needs_backward: Vec<bool>,
    /// Per node, per parameter: whether the parameter gradient is computed.
    param_propagate: Vec<Vec<bool>>,
    loss_weights: Vec<Vec<T>>,

    arena: BufferArena<T>,
    buffer_names: Vec<String>,
    buffer_index: HashMap<String, BufferId>,
    buffer_needs_backward: Vec<bool>,
    graph_inputs: Vec<BufferId>,
    graph_outputs: Vec<BufferId>,

    /// Every parameter buffer, owners and sharers alike.
    params: Vec<BufferId>,
    param_display_names: Vec<String>,
    /// `(node, index within node)` of every parameter.
    param_locations: Vec<(usize, usize)>,
    /// Global index of the owner, `None` for owners.
    param_owners: Vec<Option<usize>>,
    /// Sharing key to the global index of the parameter that owns it.
    param_names_index: HashMap<String, usize>,
    /// Learnable index of every parameter (the owner's for sharers).
    learnable_param_ids: Vec<usize>,
    learnable_params: Vec<BufferId>,
    /// Global parameter index of every learnable parameter.
    learnable_owners: Vec<usize>,
    params_lr: Vec<Option<f64>>,
    params_weight_decay: Vec<Option<f64>>,

    debug_info: bool,
    rng: StdRng,
}

impl<T: NetNumeric> Graph<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn arena(&self) -> &BufferArena<T> {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut BufferArena<T> {
        &mut self.arena
    }

    // --- name queries ---

    pub fn has_buffer(&self, name: &str) -> bool {
        self.buffer_index.contains_key(name)
    }

    /// Buffer produced under `name`; logs a warning for unknown names.
    pub fn buffer_id(&self, name: &str) -> Option<BufferId> {
        let id = self.buffer_index.get(name).copied();
        if id.is_none() {
            warn!("Unknown buffer name {}", name);
        }
        id
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    /// Index of node `name`; logs a warning for unknown names.
    pub fn node_index(&self, name: &str) -> Option<usize> {
        let index = self.node_index.get(name).copied();
        if index.is_none() {
            warn!("Unknown node name {}", name);
        }
        index
    }

    /// Value of the buffer named `name`.
    pub fn value(&self, name: &str) -> Option<&[T]> {
        self.buffer_id(name).map(|id| self.arena.value(id))
    }

    /// Gradient of the buffer named `name`.
    pub fn grad(&self, name: &str) -> Option<&[T]> {
        self.buffer_id(name).map(|id| self.arena.grad(id))
    }

    // --- lists ---

    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    pub fn node(&self, index: usize) -> &dyn Node<T> {
        self.nodes[index].as_ref()
    }

    pub fn node_kind(&self, index: usize) -> &'static str {
        self.nodes[index].kind()
    }

    /// Name of every buffer, indexed by `BufferId`.
    pub fn buffer_names(&self) -> &[String] {
        &self.buffer_names
    }

    pub fn buffer_name(&self, id: BufferId) -> &str {
        &self.buffer_names[id.0]
    }

    pub fn input_ids(&self) -> &[BufferId] {
        &self.graph_inputs
    }

    pub fn output_ids(&self) -> &[BufferId] {
        &self.graph_outputs
    }

    pub fn node_inputs(&self, index: usize) -> &[BufferId] {
        &self.node_inputs[index]
    }

    pub fn node_outputs(&self, index: usize) -> &[BufferId] {
        &self.node_outputs[index]
    }

    /// Parameter buffers of node `index`.
    pub fn node_params(&self, index: usize) -> Vec<BufferId> {
        self.node_params[index].iter().map(|&p| self.params[p]).collect()
    }

    /// Global parameter indices of node `index`.
    pub fn node_param_indices(&self, index: usize) -> &[usize] {
        &self.node_params[index]
    }

    pub fn node_loss_weights(&self, index: usize) -> &[T] {
        &self.loss_weights[index]
    }

    // --- backward flags ---

    pub fn node_needs_backward(&self, index: usize) -> bool {
        self.node_needs_backward[index]
    }

    /// Per input of node `index`: whether its gradient is computed.
    pub fn input_needs_backward(&self, index: usize) -> &[bool] {
        &self.input_needs_backward[index]
    }

    /// Whether some node computes a gradient into `id`.
    pub fn buffer_needs_backward(&self, id: BufferId) -> bool {
        self.buffer_needs_backward[id.0]
    }

    // --- parameters ---

    /// Every parameter buffer (owners and sharers).
    pub fn params(&self) -> &[BufferId] {
        &self.params
    }

    pub fn param_display_names(&self) -> &[String] {
        &self.param_display_names
    }

    /// Global index of the owner of parameter `param`; `None` if it owns
    /// its storage.
    pub fn param_owner(&self, param: usize) -> Option<usize> {
        self.param_owners[param]
    }

    /// Owning parameters, the ones an update rule touches.
    pub fn learnable_params(&self) -> &[BufferId] {
        &self.learnable_params
    }

    /// Learning-rate multiplier of every learnable parameter (default 1).
    pub fn params_lr(&self) -> Vec<f64> {
        self.params_lr.iter().map(|m| m.unwrap_or(1.0)).collect()
    }

    /// Weight-decay multiplier of every learnable parameter (default 1).
    pub fn params_weight_decay(&self) -> Vec<f64> {
        self.params_weight_decay.iter().map(|m| m.unwrap_or(1.0)).collect()
    }

    pub fn set_debug_info(&mut self, enabled: bool) {
        self.debug_info = enabled;
    }

    /// Restarts the graph rng (fillers are already drawn; this affects
    /// stochastic nodes only).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

/// One training iteration: clear parameter gradients, forward, backward, then
/// apply `rule`. Returns the loss of the forward pass.
pub fn train_step<T: NetNumeric>(
    graph: &mut Graph<T>,
    rule: &mut dyn UpdateRule<T>,
) -> Result<T, crate::error::NetForgeError> {
    graph.zero_param_grads();
    let loss = graph.forward()?;
    graph.backward()?;
    graph.update(rule)?;
    Ok(loss)
}
