// Core modules of the engine
pub mod buffer;
pub mod error;
pub mod types;

// Declarative description, node kinds and the graph built from them
pub mod graph;
pub mod node;
pub mod spec;

// Collaborators around the graph: gradient checking, update rules, persistence
pub mod autograd;
pub mod optim;
pub mod persist;

pub use buffer::{Buffer, BufferArena, BufferId};
pub use error::NetForgeError;
pub use graph::{train_step, Graph};
pub use spec::{InputSpec, NetSpec, NetState, NodeSpec, ParamSpec, ShareMode, StateRule};
pub use types::{NetNumeric, Phase};
// Re-export traits required by public functions/structs
pub use num_traits;

#[cfg(test)]
mod buffer_test;
