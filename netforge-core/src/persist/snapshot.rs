use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::ParamBlob;
use crate::error::NetForgeError;
use crate::graph::Graph;
use crate::types::NetNumeric;

/// Parameters of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub kind: String,
    pub params: Vec<ParamBlob>,
}

/// Flat snapshot of every node's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetSnapshot {
    pub name: String,
    pub inputs: Vec<String>,
    pub nodes: Vec<NodeRecord>,
}

impl NetSnapshot {
    /// Captures the current parameter values of `graph`. Shared parameters
    /// are written under every node that uses them.
    pub fn from_graph<T: NetNumeric>(graph: &Graph<T>) -> Self {
        let nodes = (0..graph.num_nodes())
            .map(|i| NodeRecord {
                name: graph.node_names()[i].clone(),
                kind: graph.node_kind(i).to_string(),
                params: graph
                    .node_params(i)
                    .into_iter()
                    .map(|id| ParamBlob::value_of(graph.arena(), id))
                    .collect(),
            })
            .collect();
        NetSnapshot {
            name: graph.name().to_string(),
            inputs: graph
                .input_ids()
                .iter()
                .map(|&id| graph.buffer_name(id).to_string())
                .collect(),
            nodes,
        }
    }

    /// Copies every record into the graph node of the same name. Records for
    /// nodes the graph does not have are skipped.
    ///
    /// # Errors
    /// `SnapshotParamCount` when a matched node owns a different number of
    /// parameters, `SnapshotShapeMismatch` when a shape differs.
    pub fn apply_to<T: NetNumeric>(&self, graph: &mut Graph<T>) -> Result<(), NetForgeError> {
        for record in &self.nodes {
            if !graph.has_node(&record.name) {
                info!("Ignoring source node {}", record.name);
                continue;
            }
            let Some(index) = graph.node_index(&record.name) else {
                continue;
            };
            let targets = graph.node_params(index);
            if targets.len() != record.params.len() {
                return Err(NetForgeError::SnapshotParamCount {
                    node: record.name.clone(),
                    saved: record.params.len(),
                    target: targets.len(),
                });
            }
            info!("Copying source node {}", record.name);
            for (k, (blob, &id)) in record.params.iter().zip(&targets).enumerate() {
                blob.load_into(graph.arena_mut(), id, &record.name, k)?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NetForgeError> {
        bincode::serialize(self).map_err(|e| NetForgeError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetForgeError> {
        bincode::deserialize(bytes).map_err(|e| NetForgeError::Serialization(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NetForgeError> {
        let path = path.as_ref();
        info!("Snapshotting graph '{}' to {}", self.name, path.display());
        fs::write(path, self.to_bytes()?)
            .map_err(|e| NetForgeError::Serialization(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetForgeError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| NetForgeError::Serialization(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }
}
