//! # Parameter Persistence (`persist`)
//!
//! Two encodings of trained parameters, both keyed by node name so that a
//! snapshot can be loaded into any graph with matching node names:
//!
//! - [`NetSnapshot`]: a flat list of node records, encoded with `bincode`.
//! - [`ParamTable`]: a node -> index -> blob table, encoded as JSON, with
//!   optional gradients.
//!
//! Values are widened to `f64` on save, so `f32` and `f64` graphs both
//! round-trip exactly.

use serde::{Deserialize, Serialize};

use crate::buffer::{BufferArena, BufferId};
use crate::error::NetForgeError;
use crate::types::NetNumeric;

pub mod snapshot;
pub mod table;

pub use snapshot::{NetSnapshot, NodeRecord};
pub use table::ParamTable;

/// Shape and values of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamBlob {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl ParamBlob {
    pub(crate) fn value_of<T: NetNumeric>(arena: &BufferArena<T>, id: BufferId) -> Self {
        ParamBlob {
            shape: arena.shape(id).to_vec(),
            data: arena.value(id).iter().map(|v| v.as_f64()).collect(),
        }
    }

    pub(crate) fn grad_of<T: NetNumeric>(arena: &BufferArena<T>, id: BufferId) -> Self {
        ParamBlob {
            shape: arena.shape(id).to_vec(),
            data: arena.grad(id).iter().map(|g| g.as_f64()).collect(),
        }
    }

    /// Copies the blob into the value of `id`; shapes must match exactly.
    pub(crate) fn load_into<T: NetNumeric>(
        &self,
        arena: &mut BufferArena<T>,
        id: BufferId,
        node: &str,
        index: usize,
    ) -> Result<(), NetForgeError> {
        if arena.shape(id) != self.shape.as_slice() {
            return Err(NetForgeError::SnapshotShapeMismatch {
                node: node.to_string(),
                index,
                source_shape: self.shape.clone(),
                target_shape: arena.shape(id).to_vec(),
            });
        }
        let data: Vec<T> = self.data.iter().map(|&v| T::from_f64(v)).collect();
        arena.set_value(id, &data)
    }
}

#[cfg(test)]
mod persist_test;
