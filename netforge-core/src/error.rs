use thiserror::Error;

/// Custom error type for the NetForge graph engine.
///
/// Construction errors abort `Graph::new` (no partially built graph is ever
/// returned); execution errors abort the current forward/backward call.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum NetForgeError {
    #[error("Unknown input buffer '{name}' (node '{node}', input index {index})")]
    UnknownInput {
        node: String,
        name: String,
        index: usize,
    },

    #[error("Output buffer '{name}' produced by multiple sources (second producer: node '{node}')")]
    DuplicateProducer { name: String, node: String },

    #[error("Node '{node}': specify either include rules or exclude rules; not both")]
    ConflictingRules { node: String },

    #[error("Node '{node}' of kind {kind}: expected {what} {expected}, got {actual}")]
    ArityViolation {
        node: String,
        kind: String,
        what: String,
        expected: String,
        actual: usize,
    },

    #[error("Unknown node kind '{0}'")]
    UnknownNodeKind(String),

    #[error("Node kind '{0}' already registered")]
    DuplicateNodeKind(String),

    #[error("Invalid configuration for node '{node}': {message}")]
    InvalidConfig { node: String, message: String },

    #[error("Node '{node}': propagate_down must be given either 0 or {expected} times, got {actual}")]
    PropagateDownCount {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("Too many param specs for node '{node}': {specs} given, node owns {owned}")]
    TooManyParamSpecs {
        node: String,
        specs: usize,
        owned: usize,
    },

    #[error("Cannot share param '{param}' owned by node '{owner}' with node '{node}'; shape mismatch. Owner shape is {owner_shape:?}; sharing node expects {shape:?}")]
    ShareShapeMismatch {
        param: String,
        owner: String,
        node: String,
        owner_shape: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Cannot share param '{param}' owned by node '{owner}' with node '{node}'; count mismatch. Owner shape is {owner_shape:?}; sharing node shape is {shape:?}")]
    ShareCountMismatch {
        param: String,
        owner: String,
        node: String,
        owner_shape: Vec<usize>,
        shape: Vec<usize>,
    },

    #[error("Shared param '{param}' has mismatched {multiplier}: {declared} vs {existing}")]
    SharedMultiplierMismatch {
        param: String,
        multiplier: String,
        declared: f64,
        existing: f64,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Index {index} out of range for {what} (len {len})")]
    IndexOutOfRange {
        what: String,
        index: usize,
        len: usize,
    },

    #[error("Unknown buffer name '{0}'")]
    UnknownBuffer(String),

    #[error("Unknown node name '{0}'")]
    UnknownNode(String),

    #[error("Cannot copy param {index} weights from node '{node}'; shape mismatch. Source param shape is {source_shape:?}; target param shape is {target_shape:?}. To learn this node's parameters from scratch rather than copying from a saved graph, rename the node.")]
    SnapshotShapeMismatch {
        node: String,
        index: usize,
        source_shape: Vec<usize>,
        target_shape: Vec<usize>,
    },

    #[error("Incompatible number of params for node '{node}': saved {saved}, target {target}")]
    SnapshotParamCount {
        node: String,
        saved: usize,
        target: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}
