//! # Graph Specification Tree (`spec`)
//!
//! In-memory description of a graph: declared inputs, an ordered list of node
//! descriptors and the run state used to filter them. Everything derives
//! `serde` traits so a document produced elsewhere (e.g. JSON through
//! `serde_json`) can be turned into a [`NetSpec`] directly.
//!
//! Two spec-level passes run before wiring:
//! - [`filter::filter_nodes`] applies include/exclude rules against the
//!   [`NetState`].
//! - [`splits::insert_splits`] rewrites multi-consumer buffers into explicit
//!   `Split` fan-out nodes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NetForgeError;
use crate::types::Phase;

pub mod filter;
pub mod splits;

pub use filter::{filter_nodes, state_meets_rule};
pub use splits::insert_splits;

/// Run state against which include/exclude rules are evaluated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetState {
    pub phase: Phase,
    pub level: i32,
    pub stages: Vec<String>,
}

impl NetState {
    pub fn new(phase: Phase) -> Self {
        NetState {
            phase,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stages.push(stage.to_string());
        self
    }
}

/// A single include or exclude rule. Every field that is set must hold for the
/// rule to be met.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateRule {
    pub phase: Option<Phase>,
    pub min_level: Option<i32>,
    pub max_level: Option<i32>,
    /// The state must contain all of these stages.
    pub stages: Vec<String>,
    /// The state must contain none of these stages.
    pub not_stages: Vec<String>,
}

impl StateRule {
    pub fn phase(phase: Phase) -> Self {
        StateRule {
            phase: Some(phase),
            ..Default::default()
        }
    }

    pub fn stage(stage: &str) -> Self {
        StateRule {
            stages: vec![stage.to_string()],
            ..Default::default()
        }
    }
}

/// How strictly a shared parameter's shape is compared with its owner's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShareMode {
    /// Shapes must be identical.
    #[default]
    Strict,
    /// Only element counts must agree.
    Permissive,
}

/// Per-parameter options of a node: sharing name and update multipliers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSpec {
    /// Sharing key. Empty means anonymous (always owned by its node).
    pub name: String,
    pub lr_mult: Option<f64>,
    pub decay_mult: Option<f64>,
    pub share_mode: ShareMode,
}

impl ParamSpec {
    pub fn named(name: &str) -> Self {
        ParamSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_lr_mult(mut self, lr_mult: f64) -> Self {
        self.lr_mult = Some(lr_mult);
        self
    }

    pub fn with_decay_mult(mut self, decay_mult: f64) -> Self {
        self.decay_mult = Some(decay_mult);
        self
    }

    pub fn permissive(mut self) -> Self {
        self.share_mode = ShareMode::Permissive;
        self
    }

    /// Effective learning-rate multiplier (defaults to 1).
    pub fn lr_mult(&self) -> f64 {
        self.lr_mult.unwrap_or(1.0)
    }

    /// Effective weight-decay multiplier (defaults to 1).
    pub fn decay_mult(&self) -> f64 {
        self.decay_mult.unwrap_or(1.0)
    }
}

/// A declared graph input and its fixed shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

/// Descriptor of one node: kind tag, named inputs/outputs and configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSpec {
    pub name: String,
    pub kind: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// Inherits the graph phase when unset.
    pub phase: Option<Phase>,
    pub loss_weights: Vec<f64>,
    pub params: Vec<ParamSpec>,
    /// Either empty or one entry per input.
    pub propagate_down: Vec<bool>,
    pub include: Vec<StateRule>,
    pub exclude: Vec<StateRule>,
    /// Kind-specific configuration.
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(name: &str, kind: &str) -> Self {
        NodeSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn loss_weight(mut self, weight: f64) -> Self {
        self.loss_weights.push(weight);
        self
    }

    pub fn propagate_down(mut self, flags: &[bool]) -> Self {
        self.propagate_down = flags.to_vec();
        self
    }

    pub fn include(mut self, rule: StateRule) -> Self {
        self.include.push(rule);
        self
    }

    pub fn exclude(mut self, rule: StateRule) -> Self {
        self.exclude.push(rule);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets a configuration entry.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    fn invalid(&self, message: String) -> NetForgeError {
        NetForgeError::InvalidConfig {
            node: self.name.clone(),
            message,
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{}' must be a number, got {}", key, v))),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| self.invalid(format!("'{}' must be a non-negative integer, got {}", key, v))),
        }
    }

    pub fn get_isize(&self, key: &str) -> Result<Option<isize>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(|n| Some(n as isize))
                .ok_or_else(|| self.invalid(format!("'{}' must be an integer, got {}", key, v))),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{}' must be a boolean, got {}", key, v))),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{}' must be a string, got {}", key, v))),
        }
    }

    pub fn get_usize_list(&self, key: &str) -> Result<Vec<usize>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_u64()
                        .map(|n| n as usize)
                        .ok_or_else(|| self.invalid(format!("'{}' must hold non-negative integers, got {}", key, v)))
                })
                .collect(),
            Some(v) => Err(self.invalid(format!("'{}' must be a list, got {}", key, v))),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<Option<&Map<String, Value>>, NetForgeError> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_object()
                .map(Some)
                .ok_or_else(|| self.invalid(format!("'{}' must be an object, got {}", key, v))),
        }
    }
}

/// Complete declarative description of a graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetSpec {
    pub name: String,
    pub inputs: Vec<InputSpec>,
    pub nodes: Vec<NodeSpec>,
    /// Forces backward computation on every edge that allows it.
    pub force_backward: bool,
    pub state: NetState,
    /// Logs mean absolute values after each forward/backward/update step.
    pub debug_info: bool,
    /// Seed of the graph-owned rng (fillers, stochastic nodes).
    pub random_seed: Option<u64>,
}

impl NetSpec {
    pub fn new(name: &str) -> Self {
        NetSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn input(mut self, name: &str, shape: &[usize]) -> Self {
        self.inputs.push(InputSpec {
            name: name.to_string(),
            shape: shape.to_vec(),
        });
        self
    }

    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn force_backward(mut self, force: bool) -> Self {
        self.force_backward = force;
        self
    }

    pub fn with_state(mut self, state: NetState) -> Self {
        self.state = state;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Parses a JSON document into a spec.
    pub fn from_json(text: &str) -> Result<Self, NetForgeError> {
        serde_json::from_str(text).map_err(|e| NetForgeError::Serialization(e.to_string()))
    }
}
