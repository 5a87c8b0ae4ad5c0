//! Open registry mapping kind tags to node constructors.
//!
//! The map is created on first access with every built-in kind already in it.
//! Other crates add their own kinds with [`register_node_kind`] at any time
//! before building a graph that uses them; registrations do not depend on
//! each other's order.

use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;
use once_cell::sync::Lazy;

use super::kinds::{
    Dropout, EuclideanLoss, Flatten, InnerProduct, MultinomialLogisticLoss, ReLU, Scale, Slice, Split, Square,
};
use super::Node;
use crate::error::NetForgeError;
use crate::spec::NodeSpec;
use crate::types::NetNumeric;

/// Builds a node of one precision from its spec.
pub type NodeFactory<T> = fn(&NodeSpec) -> Result<Box<dyn Node<T>>, NetForgeError>;

/// Registry entry: one factory per supported precision.
#[derive(Clone, Copy)]
pub struct NodeConstructor {
    pub f32: NodeFactory<f32>,
    pub f64: NodeFactory<f64>,
}

/// Builds a [`NodeConstructor`] for a node type generic over the element
/// type and exposing `from_spec(&NodeSpec) -> Result<Self, NetForgeError>`.
#[macro_export]
macro_rules! node_constructor {
    ($node:ident) => {{
        fn build_f32(
            spec: &$crate::spec::NodeSpec,
        ) -> Result<Box<dyn $crate::node::Node<f32>>, $crate::error::NetForgeError> {
            Ok(Box::new($node::<f32>::from_spec(spec)?))
        }
        fn build_f64(
            spec: &$crate::spec::NodeSpec,
        ) -> Result<Box<dyn $crate::node::Node<f64>>, $crate::error::NetForgeError> {
            Ok(Box::new($node::<f64>::from_spec(spec)?))
        }
        $crate::node::registry::NodeConstructor {
            f32: build_f32,
            f64: build_f64,
        }
    }};
}

static REGISTRY: Lazy<RwLock<HashMap<String, NodeConstructor>>> = Lazy::new(|| RwLock::new(builtin_kinds()));

fn builtin_kinds() -> HashMap<String, NodeConstructor> {
    let mut kinds = HashMap::new();
    kinds.insert("Split".to_string(), node_constructor!(Split));
    kinds.insert("Square".to_string(), node_constructor!(Square));
    kinds.insert("ReLU".to_string(), node_constructor!(ReLU));
    kinds.insert("Scale".to_string(), node_constructor!(Scale));
    kinds.insert("InnerProduct".to_string(), node_constructor!(InnerProduct));
    kinds.insert("Flatten".to_string(), node_constructor!(Flatten));
    kinds.insert("Slice".to_string(), node_constructor!(Slice));
    kinds.insert("Dropout".to_string(), node_constructor!(Dropout));
    kinds.insert("EuclideanLoss".to_string(), node_constructor!(EuclideanLoss));
    kinds.insert("MultinomialLogisticLoss".to_string(), node_constructor!(MultinomialLogisticLoss));
    kinds
}

fn poisoned() -> NetForgeError {
    NetForgeError::InternalError("node registry lock poisoned".to_string())
}

/// Adds a kind to the registry.
///
/// # Errors
/// Returns `NetForgeError::DuplicateNodeKind` if `tag` is already registered.
pub fn register_node_kind(tag: &str, constructor: NodeConstructor) -> Result<(), NetForgeError> {
    let mut registry = REGISTRY.write().map_err(|_| poisoned())?;
    if registry.contains_key(tag) {
        return Err(NetForgeError::DuplicateNodeKind(tag.to_string()));
    }
    debug!("Registering node kind '{}'", tag);
    registry.insert(tag.to_string(), constructor);
    Ok(())
}

/// Creates the node described by `spec` at precision `T`.
///
/// # Errors
/// Returns `NetForgeError::UnknownNodeKind` for an unregistered tag, or
/// whatever the kind's constructor reports about its configuration.
pub fn create_node<T: NetNumeric>(spec: &NodeSpec) -> Result<Box<dyn Node<T>>, NetForgeError> {
    let constructor = {
        let registry = REGISTRY.read().map_err(|_| poisoned())?;
        registry
            .get(&spec.kind)
            .copied()
            .ok_or_else(|| NetForgeError::UnknownNodeKind(spec.kind.clone()))?
    };
    let factory = T::select(&constructor);
    factory(spec)
}

/// All registered tags, sorted.
pub fn registered_kinds() -> Vec<String> {
    let mut kinds: Vec<String> = match REGISTRY.read() {
        Ok(registry) => registry.keys().cloned().collect(),
        Err(_) => Vec::new(),
    };
    kinds.sort();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_present() {
        let kinds = registered_kinds();
        for tag in ["Split", "Square", "InnerProduct", "EuclideanLoss"] {
            assert!(kinds.iter().any(|k| k == tag), "missing {}", tag);
        }
    }

    #[test]
    fn test_create_node_for_both_precisions() -> Result<(), NetForgeError> {
        let spec = NodeSpec::new("sq", "Square").input("x").output("y");
        let single = create_node::<f32>(&spec)?;
        let double = create_node::<f64>(&spec)?;
        assert_eq!(single.kind(), "Square");
        assert_eq!(double.name(), "sq");
        Ok(())
    }

    #[test]
    fn test_unknown_kind() {
        let spec = NodeSpec::new("x", "NoSuchKind");
        assert_eq!(
            create_node::<f32>(&spec).err(),
            Some(NetForgeError::UnknownNodeKind("NoSuchKind".to_string()))
        );
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = register_node_kind("Square", node_constructor!(Square));
        assert_eq!(result, Err(NetForgeError::DuplicateNodeKind("Square".to_string())));
    }
}
