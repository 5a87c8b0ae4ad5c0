use std::fmt;

use log::{debug, warn};
use thiserror::Error;

use crate::buffer::{BufferArena, BufferId};
use crate::error::NetForgeError;
use crate::graph::Graph;
use crate::node::NodeHarness;
use crate::types::NetNumeric;

/// Seed used for every forward pass of a check unless overridden.
pub const DEFAULT_CHECK_SEED: u64 = 1701;

/// Buffer whose gradient was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckedBuffer {
    Param(usize),
    Input(usize),
}

impl fmt::Display for CheckedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckedBuffer::Param(i) => write!(f, "param {}", i),
            CheckedBuffer::Input(i) => write!(f, "input {}", i),
        }
    }
}

/// One element whose analytic gradient disagrees with the estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientMismatch {
    pub node: String,
    /// `(output, element)` of the objective, `None` for the sum-of-squares one.
    pub objective: Option<(usize, usize)>,
    pub buffer: CheckedBuffer,
    pub element: usize,
    pub analytic: f64,
    pub estimated: f64,
    pub tolerance: f64,
}

impl fmt::Display for GradientMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node '{}', {} element {}: analytic {} vs estimated {} (tolerance {})",
            self.node, self.buffer, self.element, self.analytic, self.estimated, self.tolerance
        )?;
        if let Some((output, element)) = self.objective {
            write!(f, " for output {} element {}", output, element)?;
        }
        Ok(())
    }
}

/// Error type specifically for gradient checking failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("Graph error during gradient check: {0}")]
    Graph(#[from] NetForgeError),

    #[error("Node '{0}': no buffers to check")]
    NothingToCheck(String),

    #[error("Node '{0}': exhaustive mode requires at least one output")]
    NoOutputs(String),

    #[error("Node '{node}': elementwise check not applicable: {message}")]
    NotElementwise { node: String, message: String },

    #[error("Node '{node}': objective output {output} element {element} out of range")]
    ObjectiveOutOfRange {
        node: String,
        output: usize,
        element: usize,
    },

    #[error("{} gradient mismatches, first: {}", .0.len(), first_mismatch(.0))]
    Mismatches(Vec<GradientMismatch>),
}

fn first_mismatch(mismatches: &[GradientMismatch]) -> String {
    mismatches.first().map(ToString::to_string).unwrap_or_default()
}

/// Which inputs get their gradient checked; parameters are always checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInputs {
    /// Every input the node accepts a gradient for.
    All,
    Only(usize),
    ParamsOnly,
}

/// Something the checker can drive: one node with its wired buffers.
pub trait CheckTarget<T: NetNumeric> {
    fn name(&self) -> &str;
    fn arena(&self) -> &BufferArena<T>;
    fn arena_mut(&mut self) -> &mut BufferArena<T>;
    fn inputs(&self) -> Vec<BufferId>;
    fn outputs(&self) -> Vec<BufferId>;
    fn params(&self) -> Vec<BufferId>;
    /// Whether the node can produce a gradient for `input` at all.
    fn accepts_input_grad(&self, input: usize) -> bool;
    fn reseed(&mut self, seed: u64);
    fn forward(&mut self) -> Result<(), NetForgeError>;
    fn backward(&mut self, propagate_down: &[bool]) -> Result<(), NetForgeError>;
}

impl<T: NetNumeric> CheckTarget<T> for NodeHarness<T> {
    fn name(&self) -> &str {
        self.node().name()
    }

    fn arena(&self) -> &BufferArena<T> {
        NodeHarness::arena(self)
    }

    fn arena_mut(&mut self) -> &mut BufferArena<T> {
        NodeHarness::arena_mut(self)
    }

    fn inputs(&self) -> Vec<BufferId> {
        NodeHarness::inputs(self).to_vec()
    }

    fn outputs(&self) -> Vec<BufferId> {
        NodeHarness::outputs(self).to_vec()
    }

    fn params(&self) -> Vec<BufferId> {
        NodeHarness::params(self).to_vec()
    }

    fn accepts_input_grad(&self, input: usize) -> bool {
        self.node().allow_force_backward(input)
    }

    fn reseed(&mut self, seed: u64) {
        NodeHarness::reseed(self, seed)
    }

    fn forward(&mut self) -> Result<(), NetForgeError> {
        NodeHarness::forward(self)
    }

    fn backward(&mut self, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        NodeHarness::backward(self, propagate_down)
    }
}

/// One node of a built graph, driven in isolation.
struct GraphNode<'a, T: NetNumeric> {
    graph: &'a mut Graph<T>,
    index: usize,
}

impl<T: NetNumeric> CheckTarget<T> for GraphNode<'_, T> {
    fn name(&self) -> &str {
        &self.graph.node_names()[self.index]
    }

    fn arena(&self) -> &BufferArena<T> {
        self.graph.arena()
    }

    fn arena_mut(&mut self) -> &mut BufferArena<T> {
        self.graph.arena_mut()
    }

    fn inputs(&self) -> Vec<BufferId> {
        self.graph.node_inputs(self.index).to_vec()
    }

    fn outputs(&self) -> Vec<BufferId> {
        self.graph.node_outputs(self.index).to_vec()
    }

    fn params(&self) -> Vec<BufferId> {
        self.graph.node_params(self.index)
    }

    fn accepts_input_grad(&self, input: usize) -> bool {
        self.graph.node(self.index).allow_force_backward(input)
    }

    fn reseed(&mut self, seed: u64) {
        self.graph.reseed(seed)
    }

    fn forward(&mut self) -> Result<(), NetForgeError> {
        self.graph.run_node_forward(self.index)
    }

    fn backward(&mut self, propagate_down: &[bool]) -> Result<(), NetForgeError> {
        self.graph.backward_node(self.index, propagate_down)
    }
}

/// Finite-difference gradient checker.
///
/// For every checked element `x` the estimate is
/// `(f(x + step) - f(x - step)) / (2 * step)`, and it must match the analytic
/// gradient `g` within `threshold * max(|g|, |estimate|, 1)`. Elements whose
/// magnitude lies within `kink ± kink_range` are skipped.
#[derive(Debug, Clone)]
pub struct GradientChecker {
    step: f64,
    threshold: f64,
    seed: u64,
    kink: f64,
    kink_range: f64,
}

impl GradientChecker {
    pub fn new(step: f64, threshold: f64) -> Self {
        GradientChecker {
            step,
            threshold,
            seed: DEFAULT_CHECK_SEED,
            kink: 0.0,
            kink_range: -1.0,
        }
    }

    /// Seed restored before every forward pass, so stochastic nodes see the
    /// same draws on each evaluation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Skips elements with `|x|` within `kink ± range`.
    pub fn with_kink(mut self, kink: f64, range: f64) -> Self {
        self.kink = kink;
        self.kink_range = range;
        self
    }

    /// Checks against the sum-of-squares objective over every output.
    pub fn check_gradient<T, C>(&self, target: &mut C, inputs: CheckInputs) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        self.check_gradient_single(target, inputs, None, false)
    }

    /// One check run. `objective` picks a single `(output, element)` whose
    /// value (times 2) is the objective; `None` uses half the sum of squares
    /// of every output.
    ///
    /// In elementwise mode only the element at the objective position of
    /// each checked buffer is perturbed; every other analytic gradient must
    /// be zero.
    pub fn check_gradient_single<T, C>(
        &self,
        target: &mut C,
        inputs: CheckInputs,
        objective: Option<(usize, usize)>,
        elementwise: bool,
    ) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let mut mismatches = Vec::new();
        self.run_single(target, inputs, objective, elementwise, &mut mismatches)?;
        into_result(mismatches)
    }

    /// Runs one check per output element, each with that element as the
    /// objective.
    pub fn check_gradient_exhaustive<T, C>(&self, target: &mut C, inputs: CheckInputs) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let mut mismatches = Vec::new();
        self.run_exhaustive(target, inputs, false, &mut mismatches)?;
        into_result(mismatches)
    }

    /// Exhaustive check for nodes whose output element `i` depends only on
    /// input element `i`. The node must have no parameters and every input
    /// must have as many elements as each output.
    pub fn check_gradient_eltwise<T, C>(&self, target: &mut C) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let mut mismatches = Vec::new();
        self.run_exhaustive(target, CheckInputs::All, true, &mut mismatches)?;
        into_result(mismatches)
    }

    /// Checks every node exhaustively in isolation. `inputs` are reloaded and
    /// the whole graph re-run before each node, so no node sees values left
    /// perturbed by the check of an earlier one.
    pub fn check_graph<T: NetNumeric>(&self, graph: &mut Graph<T>, inputs: &[&[T]]) -> Result<(), GradCheckError> {
        let mut mismatches = Vec::new();
        for index in 0..graph.num_nodes() {
            if graph.node_inputs(index).is_empty() && graph.node_param_indices(index).is_empty() {
                continue;
            }
            graph.forward_with(inputs)?;
            debug!("Checking node {}", graph.node_names()[index]);
            let mut node = GraphNode {
                graph: &mut *graph,
                index,
            };
            self.run_exhaustive(&mut node, CheckInputs::All, false, &mut mismatches)?;
        }
        into_result(mismatches)
    }

    fn run_exhaustive<T, C>(
        &self,
        target: &mut C,
        inputs: CheckInputs,
        elementwise: bool,
        mismatches: &mut Vec<GradientMismatch>,
    ) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let outputs = target.outputs();
        if outputs.is_empty() {
            return Err(GradCheckError::NoOutputs(target.name().to_string()));
        }
        // Shapes are only final after a forward pass.
        target.reseed(self.seed);
        target.forward()?;
        for (i, &output) in outputs.iter().enumerate() {
            for j in 0..target.arena().count(output) {
                self.run_single(target, inputs, Some((i, j)), elementwise, mismatches)?;
            }
        }
        Ok(())
    }

    fn run_single<T, C>(
        &self,
        target: &mut C,
        inputs: CheckInputs,
        objective: Option<(usize, usize)>,
        elementwise: bool,
        mismatches: &mut Vec<GradientMismatch>,
    ) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let name = target.name().to_string();
        let input_ids = target.inputs();
        let output_ids = target.outputs();
        let param_ids = target.params();

        if elementwise {
            self.check_elementwise_preconditions(target, &name, objective, &input_ids, &output_ids, &param_ids)?;
        }

        let mut checked: Vec<(CheckedBuffer, BufferId)> = Vec::new();
        let mut propagate_down = vec![false; input_ids.len()];
        for (k, &id) in param_ids.iter().enumerate() {
            target.arena_mut().zero_grad(id);
            checked.push((CheckedBuffer::Param(k), id));
        }
        match inputs {
            CheckInputs::All => {
                for (i, &id) in input_ids.iter().enumerate() {
                    if target.accepts_input_grad(i) {
                        propagate_down[i] = true;
                        checked.push((CheckedBuffer::Input(i), id));
                    }
                }
            }
            CheckInputs::Only(i) => {
                let id = *input_ids.get(i).ok_or_else(|| NetForgeError::IndexOutOfRange {
                    what: format!("inputs of node '{}'", name),
                    index: i,
                    len: input_ids.len(),
                })?;
                propagate_down[i] = true;
                checked.push((CheckedBuffer::Input(i), id));
            }
            CheckInputs::ParamsOnly => {}
        }
        if checked.is_empty() {
            return Err(GradCheckError::NothingToCheck(name));
        }

        // Analytic pass.
        target.reseed(self.seed);
        target.forward()?;
        objective_and_gradient(target.arena_mut(), &output_ids, objective, &name)?;
        target.backward(&propagate_down)?;
        let analytic: Vec<Vec<f64>> = checked
            .iter()
            .map(|&(_, id)| target.arena().grad(id).iter().map(|g| g.as_f64()).collect())
            .collect();

        let step = T::from_f64(self.step);
        let two_step = T::from_f64(2.0 * self.step);
        for (&(buffer, id), computed) in checked.iter().zip(&analytic) {
            for (element, &analytic_grad) in computed.iter().enumerate() {
                let mut estimated = 0.0;
                let perturb = match objective {
                    Some((_, position)) if elementwise => element == position,
                    _ => true,
                };
                if perturb {
                    target.arena_mut().value_mut(id)[element] += step;
                    target.reseed(self.seed);
                    target.forward()?;
                    let positive = objective_and_gradient(target.arena_mut(), &output_ids, objective, &name)?;

                    target.arena_mut().value_mut(id)[element] -= two_step;
                    target.reseed(self.seed);
                    target.forward()?;
                    let negative = objective_and_gradient(target.arena_mut(), &output_ids, objective, &name)?;

                    target.arena_mut().value_mut(id)[element] += step;
                    estimated = (positive - negative) / self.step / 2.0;
                }

                let feature = target.arena().value(id)[element].as_f64().abs();
                if self.kink - self.kink_range <= feature && feature <= self.kink + self.kink_range {
                    continue;
                }
                let scale = analytic_grad.abs().max(estimated.abs()).max(1.0);
                let tolerance = self.threshold * scale;
                if (analytic_grad - estimated).abs() > tolerance {
                    let mismatch = GradientMismatch {
                        node: name.clone(),
                        objective,
                        buffer,
                        element,
                        analytic: analytic_grad,
                        estimated,
                        tolerance,
                    };
                    warn!("Gradient check failed: {}", mismatch);
                    mismatches.push(mismatch);
                }
            }
        }
        Ok(())
    }

    fn check_elementwise_preconditions<T, C>(
        &self,
        target: &C,
        name: &str,
        objective: Option<(usize, usize)>,
        inputs: &[BufferId],
        outputs: &[BufferId],
        params: &[BufferId],
    ) -> Result<(), GradCheckError>
    where
        T: NetNumeric,
        C: CheckTarget<T>,
    {
        let not_elementwise = |message: String| GradCheckError::NotElementwise {
            node: name.to_string(),
            message,
        };
        if !params.is_empty() {
            return Err(not_elementwise(format!("node has {} parameters", params.len())));
        }
        let Some((output, _)) = objective else {
            return Err(not_elementwise("an objective element is required".to_string()));
        };
        let Some(&output_id) = outputs.get(output) else {
            return Err(not_elementwise(format!("no output {}", output)));
        };
        let count = target.arena().count(output_id);
        for (i, &input) in inputs.iter().enumerate() {
            if target.arena().count(input) != count {
                return Err(not_elementwise(format!(
                    "input {} has {} elements, output {} has {}",
                    i,
                    target.arena().count(input),
                    output,
                    count
                )));
            }
        }
        Ok(())
    }
}

/// Writes the objective's gradient into the output gradients and returns the
/// objective.
///
/// Without a target element the objective is half the sum of squares of
/// every output (gradient: the values). With `(output, element)` it is twice
/// that element (gradient 2 there, 0 elsewhere).
fn objective_and_gradient<T: NetNumeric>(
    arena: &mut BufferArena<T>,
    outputs: &[BufferId],
    objective: Option<(usize, usize)>,
    node: &str,
) -> Result<f64, GradCheckError> {
    match objective {
        None => {
            let mut loss = 0.0;
            for &id in outputs {
                let values = arena.value(id).to_vec();
                loss += values.iter().map(|v| v.as_f64() * v.as_f64()).sum::<f64>();
                arena.grad_mut(id).copy_from_slice(&values);
            }
            Ok(loss / 2.0)
        }
        Some((output, element)) => {
            let out_of_range = || GradCheckError::ObjectiveOutOfRange {
                node: node.to_string(),
                output,
                element,
            };
            let id = *outputs.get(output).ok_or_else(out_of_range)?;
            if element >= arena.count(id) {
                return Err(out_of_range());
            }
            for &other in outputs {
                arena.zero_grad(other);
            }
            let weight = 2.0;
            arena.grad_mut(id)[element] = T::from_f64(weight);
            Ok(arena.value(id)[element].as_f64() * weight)
        }
    }
}

fn into_result(mismatches: Vec<GradientMismatch>) -> Result<(), GradCheckError> {
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(GradCheckError::Mismatches(mismatches))
    }
}
