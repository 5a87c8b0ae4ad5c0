use num_traits::{Float, NumAssignOps, NumOps};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A trait representing numeric element types usable in graph buffers.
///
/// The whole engine is generic over this trait instead of being rebuilt per
/// precision. It is implemented for `f32` and `f64`.
pub trait NetNumeric:
    Float
    + NumAssignOps
    + NumOps
    + PartialOrd
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Converts from `f64`, saturating to the representable range.
    fn from_f64(value: f64) -> Self;

    /// Widens to `f64` for logging, comparisons and persistence.
    fn as_f64(self) -> f64;

    /// Picks the constructor matching this precision out of a registry entry.
    fn select(ctor: &crate::node::registry::NodeConstructor) -> crate::node::registry::NodeFactory<Self>;
}

impl NetNumeric for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn select(ctor: &crate::node::registry::NodeConstructor) -> crate::node::registry::NodeFactory<Self> {
        ctor.f32
    }
}

impl NetNumeric for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn select(ctor: &crate::node::registry::NodeConstructor) -> crate::node::registry::NodeFactory<Self> {
        ctor.f64
    }
}

/// Execution phase a graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Train,
    Test,
}
