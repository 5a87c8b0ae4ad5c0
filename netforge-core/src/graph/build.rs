use std::collections::{HashMap, HashSet};
use std::mem::size_of;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{Graph, AUTOMATIC_OUTPUT, DEFAULT_GRAPH_SEED};
use crate::buffer::{element_count, Buffer, BufferArena, BufferId};
use crate::error::NetForgeError;
use crate::node::{create_node, NodeIo};
use crate::spec::{filter_nodes, insert_splits, InputSpec, NetSpec, NodeSpec, ParamSpec, ShareMode};
use crate::types::NetNumeric;

/// Construction-time bookkeeping that does not outlive `Graph::new`.
struct Wiring {
    /// Buffer names a node may still consume (the frontier).
    available: HashSet<String>,
    /// Whether a gradient may flow into each buffer, in forward order.
    may_need_backward: Vec<bool>,
    memory_used: usize,
}

impl<T: NetNumeric> Graph<T> {
    /// Builds a graph from `spec`.
    ///
    /// The spec is filtered against its run state, multi-consumer buffers get
    /// explicit `Split` nodes, then nodes are wired in order.
    ///
    /// # Errors
    /// Any construction error aborts the build; no partial graph is returned.
    /// See [`NetForgeError`] for the possible failures (unknown input,
    /// duplicate producer, arity violation, parameter sharing mismatches...).
    pub fn new(spec: &NetSpec) -> Result<Self, NetForgeError> {
        let filtered = filter_nodes(spec)?;
        let spec = insert_splits(&filtered);
        info!(
            "Initializing graph '{}' (phase {:?}, {} nodes)",
            spec.name,
            spec.state.phase,
            spec.nodes.len()
        );

        let mut graph = Graph::empty(&spec);
        let mut wiring = Wiring {
            available: HashSet::new(),
            may_need_backward: Vec::new(),
            memory_used: 0,
        };
        for input in &spec.inputs {
            graph.append_input(input, &mut wiring)?;
        }
        for node_spec in &spec.nodes {
            graph.append_node(node_spec, &mut wiring)?;
        }
        graph.analyze_backward(spec.force_backward);

        let mut outputs: Vec<BufferId> = wiring
            .available
            .iter()
            .filter_map(|name| graph.buffer_index.get(name).copied())
            .collect();
        outputs.sort();
        for &id in &outputs {
            info!("This graph produces output {}", graph.buffer_names[id.0]);
        }
        graph.graph_outputs = outputs;

        graph.share_weights()?;
        debug!("Memory required for data: {}", wiring.memory_used);
        info!("Graph '{}' initialization done.", graph.name);
        Ok(graph)
    }

    fn empty(spec: &NetSpec) -> Self {
        Graph {
            name: spec.name.clone(),
            phase: spec.state.phase,
            nodes: Vec::new(),
            node_names: Vec::new(),
            node_index: HashMap::new(),
            node_inputs: Vec::new(),
            node_outputs: Vec::new(),
            node_params: Vec::new(),
            input_needs_backward: Vec::new(),
            node_needs_backward: Vec::new(),
            param_propagate: Vec::new(),
            loss_weights: Vec::new(),
            arena: BufferArena::new(),
            buffer_names: Vec::new(),
            buffer_index: HashMap::new(),
            buffer_needs_backward: Vec::new(),
            graph_inputs: Vec::new(),
            graph_outputs: Vec::new(),
            params: Vec::new(),
            param_display_names: Vec::new(),
            param_locations: Vec::new(),
            param_owners: Vec::new(),
            param_names_index: HashMap::new(),
            learnable_param_ids: Vec::new(),
            learnable_params: Vec::new(),
            learnable_owners: Vec::new(),
            params_lr: Vec::new(),
            params_weight_decay: Vec::new(),
            debug_info: spec.debug_info,
            rng: StdRng::seed_from_u64(spec.random_seed.unwrap_or(DEFAULT_GRAPH_SEED)),
        }
    }

    fn push_buffer(&mut self, name: &str, buffer: Buffer<T>, wiring: &mut Wiring) -> BufferId {
        wiring.memory_used += buffer.count() * size_of::<T>();
        let id = self.arena.push(buffer);
        self.buffer_names.push(name.to_string());
        wiring.may_need_backward.push(false);
        id
    }

    fn append_input(&mut self, input: &InputSpec, wiring: &mut Wiring) -> Result<(), NetForgeError> {
        if self.buffer_index.contains_key(&input.name) {
            return Err(NetForgeError::DuplicateProducer {
                name: input.name.clone(),
                node: "(input)".to_string(),
            });
        }
        info!("Input {} -> {}", self.graph_inputs.len(), input.name);
        let id = self.push_buffer(&input.name, Buffer::new(&input.shape), wiring);
        self.buffer_index.insert(input.name.clone(), id);
        wiring.available.insert(input.name.clone());
        self.graph_inputs.push(id);
        Ok(())
    }

    fn append_node(&mut self, node_spec: &NodeSpec, wiring: &mut Wiring) -> Result<(), NetForgeError> {
        let mut node_spec = node_spec.clone();
        if node_spec.phase.is_none() {
            node_spec.phase = Some(self.phase);
        }
        let name = node_spec.name.clone();
        if self.node_index.contains_key(&name) {
            return Err(NetForgeError::InvalidConfig {
                node: name,
                message: "node name is already used by an earlier node".to_string(),
            });
        }
        if !node_spec.propagate_down.is_empty() && node_spec.propagate_down.len() != node_spec.inputs.len() {
            return Err(NetForgeError::PropagateDownCount {
                node: name,
                expected: node_spec.inputs.len(),
                actual: node_spec.propagate_down.len(),
            });
        }
        info!("Creating node {}", name);
        let mut node = create_node::<T>(&node_spec)?;
        let mut need_backward = false;

        let mut inputs = Vec::with_capacity(node_spec.inputs.len());
        let mut input_flags = Vec::with_capacity(node_spec.inputs.len());
        for (j, input) in node_spec.inputs.iter().enumerate() {
            let id = match self.buffer_index.get(input) {
                Some(&id) if wiring.available.contains(input) => id,
                _ => {
                    return Err(NetForgeError::UnknownInput {
                        node: name,
                        name: input.clone(),
                        index: j,
                    })
                }
            };
            info!("{} <- {}", name, input);
            wiring.available.remove(input);
            let may_need = wiring.may_need_backward[id.0];
            input_flags.push(may_need && node_spec.propagate_down.get(j).copied().unwrap_or(true));
            need_backward |= may_need;
            inputs.push(id);
        }

        let mut outputs = Vec::with_capacity(node_spec.outputs.len());
        for output in &node_spec.outputs {
            if let Some(k) = node_spec.inputs.iter().position(|i| i == output) {
                info!("{} -> {} (in-place)", name, output);
                wiring.available.insert(output.clone());
                outputs.push(inputs[k]);
            } else if self.buffer_index.contains_key(output) {
                return Err(NetForgeError::DuplicateProducer {
                    name: output.clone(),
                    node: name,
                });
            } else {
                info!("{} -> {}", name, output);
                let id = self.push_buffer(output, Buffer::empty(), wiring);
                self.buffer_index.insert(output.clone(), id);
                wiring.available.insert(output.clone());
                outputs.push(id);
            }
        }
        let arity = node.arity();
        for _ in 0..arity.missing_outputs(outputs.len()) {
            let id = self.push_buffer(AUTOMATIC_OUTPUT, Buffer::empty(), wiring);
            outputs.push(id);
        }
        arity.check(&name, node.kind(), inputs.len(), outputs.len())?;

        let input_shapes: Vec<Vec<usize>> = inputs.iter().map(|&id| self.arena.shape(id).to_vec()).collect();
        let created = node.configure(&input_shapes, &mut self.rng)?;
        if node_spec.params.len() > created.len() {
            return Err(NetForgeError::TooManyParamSpecs {
                node: name,
                specs: node_spec.params.len(),
                owned: created.len(),
            });
        }
        let param_ids: Vec<BufferId> = created
            .into_iter()
            .map(|p| {
                wiring.memory_used += p.count() * size_of::<T>();
                self.arena.push(p)
            })
            .collect();
        // Parameters are not named buffers; keep the name table aligned.
        for _ in &param_ids {
            self.buffer_names.push(format!("{}/param", name));
            wiring.may_need_backward.push(false);
        }

        let param_propagate: Vec<bool> = (0..param_ids.len())
            .map(|k| node_spec.params.get(k).map_or(1.0, ParamSpec::lr_mult) != 0.0)
            .collect();
        need_backward |= param_propagate.iter().any(|&p| p);

        {
            let io = NodeIo {
                inputs: &inputs,
                outputs: &outputs,
                params: &param_ids,
                param_propagate: &param_propagate,
            };
            node.compute_shape(&mut self.arena, &io)?;
        }

        let weights: Vec<f64> = if node_spec.loss_weights.is_empty() {
            (0..outputs.len()).map(|j| node.default_loss_weight(j)).collect()
        } else if node_spec.loss_weights.len() == outputs.len() {
            node_spec.loss_weights.clone()
        } else {
            return Err(NetForgeError::InvalidConfig {
                node: name,
                message: format!(
                    "loss_weights must be given 0 or {} times, got {}",
                    outputs.len(),
                    node_spec.loss_weights.len()
                ),
            });
        };
        for (j, &id) in outputs.iter().enumerate() {
            let shape = self.arena.shape(id);
            info!("Output shape: {:?} ({})", shape, element_count(shape));
            if weights[j] != 0.0 {
                info!("    with loss weight {}", weights[j]);
            }
        }
        debug!("Memory required for data: {}", wiring.memory_used);

        if need_backward {
            for &id in &outputs {
                wiring.may_need_backward[id.0] = true;
            }
        }

        let index = self.nodes.len();
        self.nodes.push(node);
        self.node_names.push(name.clone());
        self.node_index.insert(name, index);
        self.node_inputs.push(inputs);
        self.node_outputs.push(outputs);
        self.node_params.push(Vec::new());
        self.input_needs_backward.push(input_flags);
        self.node_needs_backward.push(need_backward);
        self.param_propagate.push(param_propagate);
        self.loss_weights.push(weights.into_iter().map(T::from_f64).collect());

        for (k, id) in param_ids.into_iter().enumerate() {
            self.append_param(index, k, &node_spec, id)?;
        }
        Ok(())
    }

    fn append_param(&mut self, node: usize, k: usize, node_spec: &NodeSpec, id: BufferId) -> Result<(), NetForgeError> {
        let default_spec = ParamSpec::default();
        let param_spec = node_spec.params.get(k).unwrap_or(&default_spec);
        let param_name = param_spec.name.as_str();
        let global = self.params.len();

        self.params.push(id);
        self.param_display_names.push(if param_name.is_empty() {
            k.to_string()
        } else {
            param_name.to_string()
        });
        self.param_locations.push((node, k));
        self.node_params[node].push(global);

        let owner = if param_name.is_empty() {
            None
        } else {
            self.param_names_index.get(param_name).copied()
        };
        let Some(owner) = owner else {
            // Anonymous, or the first parameter declared under this name.
            self.param_owners.push(None);
            if !param_name.is_empty() {
                self.param_names_index.insert(param_name.to_string(), global);
            }
            self.learnable_param_ids.push(self.learnable_params.len());
            self.learnable_params.push(id);
            self.learnable_owners.push(global);
            self.params_lr.push(param_spec.lr_mult);
            self.params_weight_decay.push(param_spec.decay_mult);
            return Ok(());
        };

        self.param_owners.push(Some(owner));
        let (owner_node, owner_k) = self.param_locations[owner];
        info!(
            "Sharing parameters '{}' owned by node '{}', param index {}",
            param_name, self.node_names[owner_node], owner_k
        );
        let owner_id = self.params[owner];
        let owner_shape = self.arena.shape(owner_id).to_vec();
        let shape = self.arena.shape(id).to_vec();
        match param_spec.share_mode {
            ShareMode::Permissive => {
                if element_count(&owner_shape) != element_count(&shape) {
                    return Err(NetForgeError::ShareCountMismatch {
                        param: param_name.to_string(),
                        owner: self.node_names[owner_node].clone(),
                        node: node_spec.name.clone(),
                        owner_shape,
                        shape,
                    });
                }
            }
            ShareMode::Strict => {
                if owner_shape != shape {
                    return Err(NetForgeError::ShareShapeMismatch {
                        param: param_name.to_string(),
                        owner: self.node_names[owner_node].clone(),
                        node: node_spec.name.clone(),
                        owner_shape,
                        shape,
                    });
                }
            }
        }

        let learnable = self.learnable_param_ids[owner];
        self.learnable_param_ids.push(learnable);
        merge_multiplier(&mut self.params_lr[learnable], param_spec.lr_mult, param_name, "lr_mult")?;
        merge_multiplier(
            &mut self.params_weight_decay[learnable],
            param_spec.decay_mult,
            param_name,
            "decay_mult",
        )?;

        self.arena.share_value(id, owner_id)?;
        self.arena.share_grad(id, owner_id)
    }

    /// Walks the nodes backwards and turns off gradient computation wherever
    /// it cannot reach a loss, then applies `force_backward`.
    fn analyze_backward(&mut self, force_backward: bool) {
        let mut under_loss: HashSet<BufferId> = HashSet::new();
        let mut skip_backward: HashSet<BufferId> = HashSet::new();

        for i in (0..self.nodes.len()).rev() {
            let mut contributes_loss = false;
            let mut skip_propagate_down = true;
            for (j, out) in self.node_outputs[i].iter().enumerate() {
                if self.loss_weights[i][j] != T::zero() || under_loss.contains(out) {
                    contributes_loss = true;
                }
                if !skip_backward.contains(out) {
                    skip_propagate_down = false;
                }
                if contributes_loss && !skip_propagate_down {
                    break;
                }
            }
            // Every consumer skips backward: so does this node and its inputs.
            if self.node_needs_backward[i] && skip_propagate_down {
                self.node_needs_backward[i] = false;
                self.input_needs_backward[i].iter_mut().for_each(|f| *f = false);
            }
            if !contributes_loss {
                self.node_needs_backward[i] = false;
            }
            if self.node_needs_backward[i] {
                info!("{} needs backward computation.", self.node_names[i]);
            } else {
                info!("{} does not need backward computation.", self.node_names[i]);
            }
            for (j, &input) in self.node_inputs[i].iter().enumerate() {
                if contributes_loss {
                    under_loss.insert(input);
                } else {
                    self.input_needs_backward[i][j] = false;
                }
                if !self.input_needs_backward[i][j] {
                    skip_backward.insert(input);
                }
            }
        }

        if force_backward {
            for i in 0..self.nodes.len() {
                self.node_needs_backward[i] = true;
                for j in 0..self.input_needs_backward[i].len() {
                    let allowed = self.nodes[i].allow_force_backward(j);
                    self.input_needs_backward[i][j] |= allowed;
                }
                self.param_propagate[i].iter_mut().for_each(|p| *p = true);
            }
        }

        self.buffer_needs_backward = vec![false; self.arena.len()];
        for (inputs, flags) in self.node_inputs.iter().zip(&self.input_needs_backward) {
            for (&id, &flag) in inputs.iter().zip(flags) {
                if flag {
                    self.buffer_needs_backward[id.0] = true;
                }
            }
        }
    }
}

/// Records `declared` into a shared group's multiplier, or checks it against
/// the value recorded by an earlier member.
fn merge_multiplier(
    existing: &mut Option<f64>,
    declared: Option<f64>,
    param: &str,
    multiplier: &str,
) -> Result<(), NetForgeError> {
    match (declared, *existing) {
        (Some(d), Some(e)) if d != e => Err(NetForgeError::SharedMultiplierMismatch {
            param: param.to_string(),
            multiplier: multiplier.to_string(),
            declared: d,
            existing: e,
        }),
        (Some(d), None) => {
            *existing = Some(d);
            Ok(())
        }
        _ => Ok(()),
    }
}

