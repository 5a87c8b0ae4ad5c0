use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::ParamBlob;
use crate::error::NetForgeError;
use crate::graph::Graph;
use crate::types::NetNumeric;

type Blobs = BTreeMap<String, BTreeMap<usize, ParamBlob>>;

/// Hierarchical parameter table: node name, then parameter index.
///
/// `data` holds owning parameters only; a shared parameter is restored
/// through its owner. `diff`, when present, holds every parameter gradient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamTable {
    pub data: Blobs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Blobs>,
}

impl ParamTable {
    pub fn from_graph<T: NetNumeric>(graph: &Graph<T>, write_diff: bool) -> Self {
        let mut data = Blobs::new();
        let mut diff = Blobs::new();
        for i in 0..graph.num_nodes() {
            let name = &graph.node_names()[i];
            let ids = graph.node_params(i);
            let mut node_data = BTreeMap::new();
            let mut node_diff = BTreeMap::new();
            for (k, (&global, &id)) in graph.node_param_indices(i).iter().zip(&ids).enumerate() {
                if graph.param_owner(global).is_none() {
                    node_data.insert(k, ParamBlob::value_of(graph.arena(), id));
                }
                if write_diff {
                    node_diff.insert(k, ParamBlob::grad_of(graph.arena(), id));
                }
            }
            data.insert(name.clone(), node_data);
            if write_diff {
                diff.insert(name.clone(), node_diff);
            }
        }
        ParamTable {
            data,
            diff: write_diff.then_some(diff),
        }
    }

    /// Loads `data` into the graph nodes of the same name.
    ///
    /// A parameter missing from the table is accepted only when the target
    /// parameter is shared; more saved parameters than the node owns is a
    /// count error.
    pub fn apply_to<T: NetNumeric>(&self, graph: &mut Graph<T>) -> Result<(), NetForgeError> {
        for (name, blobs) in &self.data {
            if !graph.has_node(name) {
                info!("Ignoring source node {}", name);
                continue;
            }
            let Some(index) = graph.node_index(name) else {
                continue;
            };
            let globals = graph.node_param_indices(index).to_vec();
            let ids = graph.node_params(index);
            let count_error = || NetForgeError::SnapshotParamCount {
                node: name.clone(),
                saved: blobs.len(),
                target: ids.len(),
            };
            if blobs.len() > ids.len() || blobs.keys().any(|&k| k >= ids.len()) {
                return Err(count_error());
            }
            info!("Copying source node {}", name);
            for (k, (&global, &id)) in globals.iter().zip(&ids).enumerate() {
                match blobs.get(&k) {
                    Some(blob) => blob.load_into(graph.arena_mut(), id, name, k)?,
                    None if graph.param_owner(global).is_some() => {}
                    None => return Err(count_error()),
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, NetForgeError> {
        serde_json::to_string_pretty(self).map_err(|e| NetForgeError::Serialization(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, NetForgeError> {
        serde_json::from_str(text).map_err(|e| NetForgeError::Serialization(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NetForgeError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .map_err(|e| NetForgeError::Serialization(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NetForgeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| NetForgeError::Serialization(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }
}
