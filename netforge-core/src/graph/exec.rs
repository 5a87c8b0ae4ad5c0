use log::info;

use super::Graph;
use crate::buffer::BufferId;
use crate::error::NetForgeError;
use crate::node::NodeIo;
use crate::optim::{LearnableParam, UpdateRule};
use crate::types::NetNumeric;

impl<T: NetNumeric> Graph<T> {
    /// Runs nodes `start..=end` in order and returns the summed loss of their
    /// loss-weighted outputs.
    ///
    /// # Errors
    /// `IndexOutOfRange` for an invalid range, or the first error raised by
    /// a node.
    pub fn forward_range(&mut self, start: usize, end: usize) -> Result<T, NetForgeError> {
        self.check_node_index(end, "forward range end")?;
        if start > end {
            return Err(NetForgeError::IndexOutOfRange {
                what: "forward range start".to_string(),
                index: start,
                len: end + 1,
            });
        }
        if self.debug_info {
            self.input_debug_info();
        }
        let mut loss = T::zero();
        for i in start..=end {
            loss += self.forward_node(i)?;
        }
        Ok(loss)
    }

    pub fn forward_from(&mut self, start: usize) -> Result<T, NetForgeError> {
        let last = self.last_node("forward_from")?;
        self.forward_range(start, last)
    }

    pub fn forward_to(&mut self, end: usize) -> Result<T, NetForgeError> {
        self.forward_range(0, end)
    }

    /// Full forward pass. A graph without nodes has zero loss.
    pub fn forward(&mut self) -> Result<T, NetForgeError> {
        if self.nodes.is_empty() {
            return Ok(T::zero());
        }
        let loss = self.forward_range(0, self.nodes.len() - 1)?;
        if self.debug_info {
            info!("    [Forward] Loss: {}", loss.as_f64());
        }
        Ok(loss)
    }

    /// Copies one slice per declared graph input, then runs a full forward.
    pub fn forward_with(&mut self, inputs: &[&[T]]) -> Result<T, NetForgeError> {
        if inputs.len() != self.graph_inputs.len() {
            return Err(NetForgeError::ShapeMismatch {
                expected: vec![self.graph_inputs.len()],
                actual: vec![inputs.len()],
                operation: "forward_with input count".to_string(),
            });
        }
        for (&id, data) in self.graph_inputs.iter().zip(inputs) {
            self.arena.set_value(id, data)?;
        }
        self.forward()
    }

    /// Runs nodes `start` down to `end` (inclusive) in reverse order. Nodes
    /// that do not need backward are skipped and leave their input
    /// gradients untouched.
    pub fn backward_range(&mut self, start: usize, end: usize) -> Result<(), NetForgeError> {
        self.check_node_index(start, "backward range start")?;
        if end > start {
            return Err(NetForgeError::IndexOutOfRange {
                what: "backward range end".to_string(),
                index: end,
                len: start + 1,
            });
        }
        for i in (end..=start).rev() {
            if !self.node_needs_backward[i] {
                continue;
            }
            let propagate_down = self.input_needs_backward[i].clone();
            self.backward_node(i, &propagate_down)?;
            if self.debug_info {
                self.backward_debug_info(i);
            }
        }
        Ok(())
    }

    pub fn backward_from(&mut self, start: usize) -> Result<(), NetForgeError> {
        self.backward_range(start, 0)
    }

    pub fn backward_to(&mut self, end: usize) -> Result<(), NetForgeError> {
        let last = self.last_node("backward_to")?;
        self.backward_range(last, end)
    }

    /// Full backward pass.
    pub fn backward(&mut self) -> Result<(), NetForgeError> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        self.backward_range(self.nodes.len() - 1, 0)?;
        if self.debug_info {
            let (mut asum_data, mut asum_diff, mut sumsq_data, mut sumsq_diff) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
            for &id in &self.learnable_params {
                asum_data += self.arena.asum_value(id).as_f64();
                asum_diff += self.arena.asum_grad(id).as_f64();
                sumsq_data += self.arena.sumsq_value(id).as_f64();
                sumsq_diff += self.arena.sumsq_grad(id).as_f64();
            }
            info!(
                "    [Backward] All graph params (data, diff): L1 norm = ({}, {}); L2 norm = ({}, {})",
                asum_data,
                asum_diff,
                sumsq_data.sqrt(),
                sumsq_diff.sqrt()
            );
        }
        Ok(())
    }

    /// Re-runs shape computation for every node, e.g. after an input buffer
    /// was reshaped.
    pub fn reshape(&mut self) -> Result<(), NetForgeError> {
        for i in 0..self.nodes.len() {
            let params = self.node_params(i);
            let io = NodeIo {
                inputs: &self.node_inputs[i],
                outputs: &self.node_outputs[i],
                params: &params,
                param_propagate: &self.param_propagate[i],
            };
            self.nodes[i].compute_shape(&mut self.arena, &io)?;
        }
        Ok(())
    }

    /// Zeroes the gradient of every learnable parameter.
    pub fn zero_param_grads(&mut self) {
        for &id in &self.learnable_params {
            self.arena.zero_grad(id);
        }
    }

    /// Hands every owning parameter to `rule`, then re-synchronises shared
    /// parameters with their owners.
    pub fn update(&mut self, rule: &mut dyn UpdateRule<T>) -> Result<(), NetForgeError> {
        for learnable in 0..self.learnable_params.len() {
            let id = self.learnable_params[learnable];
            let global = self.learnable_owners[learnable];
            let (node, _) = self.param_locations[global];
            let param = LearnableParam {
                index: learnable,
                node: self.node_names[node].clone(),
                display_name: self.param_display_names[global].clone(),
                lr_mult: self.params_lr[learnable].unwrap_or(1.0),
                decay_mult: self.params_weight_decay[learnable].unwrap_or(1.0),
            };
            if self.debug_info {
                info!(
                    "    [Update] Node {}, param {} data: {}; diff: {}",
                    param.node,
                    param.display_name,
                    mean_abs(self.arena.value(id)),
                    mean_abs(self.arena.grad(id))
                );
            }
            let (value, grad) = self.arena.value_mut_with_grad(id);
            rule.apply(&param, value, grad)?;
        }
        self.share_weights()
    }

    /// Points every sharing parameter back at its owner's value and gradient.
    pub fn share_weights(&mut self) -> Result<(), NetForgeError> {
        for (param, owner) in self.param_owners.iter().enumerate() {
            if let Some(owner) = *owner {
                self.arena.share_value(self.params[param], self.params[owner])?;
                self.arena.share_grad(self.params[param], self.params[owner])?;
            }
        }
        Ok(())
    }

    /// Copies the parameter values of every node of `source` into the node
    /// of the same name. Nodes unknown to this graph are skipped.
    ///
    /// # Errors
    /// `SnapshotParamCount` or `SnapshotShapeMismatch` when a matched node's
    /// parameters disagree.
    pub fn copy_trained_from(&mut self, source: &Graph<T>) -> Result<(), NetForgeError> {
        for (i, name) in source.node_names.iter().enumerate() {
            let Some(&target) = self.node_index.get(name) else {
                info!("Ignoring source node {}", name);
                continue;
            };
            info!("Copying source node {}", name);
            let source_params = source.node_params(i);
            let target_params = self.node_params(target);
            if source_params.len() != target_params.len() {
                return Err(NetForgeError::SnapshotParamCount {
                    node: name.clone(),
                    saved: source_params.len(),
                    target: target_params.len(),
                });
            }
            for (k, (&from, &to)) in source_params.iter().zip(&target_params).enumerate() {
                let source_shape = source.arena.shape(from);
                let target_shape = self.arena.shape(to);
                if source_shape != target_shape {
                    return Err(NetForgeError::SnapshotShapeMismatch {
                        node: name.clone(),
                        index: k,
                        source_shape: source_shape.to_vec(),
                        target_shape: target_shape.to_vec(),
                    });
                }
                self.arena.set_value(to, source.arena.value(from))?;
            }
        }
        Ok(())
    }

    /// Shapes and runs node `index` alone, without loss bookkeeping.
    pub(crate) fn run_node_forward(&mut self, index: usize) -> Result<(), NetForgeError> {
        self.check_node_index(index, "node")?;
        let params = self.node_params(index);
        let io = NodeIo {
            inputs: &self.node_inputs[index],
            outputs: &self.node_outputs[index],
            params: &params,
            param_propagate: &self.param_propagate[index],
        };
        let node = &mut self.nodes[index];
        node.compute_shape(&mut self.arena, &io)?;
        node.forward(&mut self.arena, &io, &mut self.rng)
    }

    /// Runs the backward computation of node `index` regardless of its
    /// backward-necessity flag.
    pub(crate) fn backward_node(&mut self, index: usize, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        self.check_node_index(index, "node")?;
        if propagate_down.len() != self.node_inputs[index].len() {
            return Err(NetForgeError::PropagateDownCount {
                node: self.node_names[index].clone(),
                expected: self.node_inputs[index].len(),
                actual: propagate_down.len(),
            });
        }
        let params = self.node_params(index);
        let io = NodeIo {
            inputs: &self.node_inputs[index],
            outputs: &self.node_outputs[index],
            params: &params,
            param_propagate: &self.param_propagate[index],
        };
        self.nodes[index].backward(&mut self.arena, &io, propagate_down)
    }

    /// Forward of node `index` followed by its loss contribution: every
    /// loss-weighted output gets the weight as its gradient and adds
    /// `value · weight` to the returned loss.
    fn forward_node(&mut self, index: usize) -> Result<T, NetForgeError> {
        self.run_node_forward(index)?;
        let mut loss = T::zero();
        for (j, &out) in self.node_outputs[index].iter().enumerate() {
            let weight = self.loss_weights[index][j];
            if weight == T::zero() {
                continue;
            }
            self.arena.fill_grad(out, weight);
            loss += self
                .arena
                .value(out)
                .iter()
                .zip(self.arena.grad(out))
                .fold(T::zero(), |acc, (&v, &g)| acc + v * g);
        }
        if self.debug_info {
            self.forward_debug_info(index);
        }
        Ok(loss)
    }

    fn check_node_index(&self, index: usize, what: &str) -> Result<(), NetForgeError> {
        if index >= self.nodes.len() {
            return Err(NetForgeError::IndexOutOfRange {
                what: what.to_string(),
                index,
                len: self.nodes.len(),
            });
        }
        Ok(())
    }

    fn last_node(&self, operation: &str) -> Result<usize, NetForgeError> {
        self.nodes.len().checked_sub(1).ok_or_else(|| NetForgeError::IndexOutOfRange {
            what: format!("{} on an empty graph", operation),
            index: 0,
            len: 0,
        })
    }

    fn input_debug_info(&self) {
        for &id in &self.graph_inputs {
            info!("    [Forward] Input {} data: {}", self.buffer_names[id.0], mean_abs(self.arena.value(id)));
        }
    }

    fn forward_debug_info(&self, index: usize) {
        let name = &self.node_names[index];
        for &out in &self.node_outputs[index] {
            info!(
                "    [Forward] Node {}, output {} data: {}",
                name,
                self.buffer_names[out.0],
                mean_abs(self.arena.value(out))
            );
        }
        for (k, id) in self.node_params(index).into_iter().enumerate() {
            let global = self.node_params[index][k];
            info!(
                "    [Forward] Node {}, param {} data: {}",
                name,
                self.param_display_names[global],
                mean_abs(self.arena.value(id))
            );
        }
    }

    fn backward_debug_info(&self, index: usize) {
        let name = &self.node_names[index];
        for (j, &input) in self.node_inputs[index].iter().enumerate() {
            if !self.input_needs_backward[index][j] {
                continue;
            }
            info!(
                "    [Backward] Node {}, input {} diff: {}",
                name,
                self.buffer_names[input.0],
                mean_abs(self.arena.grad(input))
            );
        }
        for (k, &global) in self.node_params[index].iter().enumerate() {
            if !self.param_propagate[index].get(k).copied().unwrap_or(false) {
                continue;
            }
            let id: BufferId = self.params[global];
            info!(
                "    [Backward] Node {}, param {} diff: {}",
                name,
                self.param_display_names[global],
                mean_abs(self.arena.grad(id))
            );
        }
    }
}

fn mean_abs<T: NetNumeric>(data: &[T]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|v| v.as_f64().abs()).sum::<f64>() / data.len() as f64
}
