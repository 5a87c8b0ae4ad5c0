use crate::error::NetForgeError;
use crate::types::NetNumeric;

/// One entry of a graph's learnable-parameter registry, as seen by an update
/// rule. Only owning parameters appear; shared ones follow their owner.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnableParam {
    /// Position in `Graph::learnable_params`.
    pub index: usize,
    /// Name of the node owning the storage.
    pub node: String,
    /// Display name: the sharing key, or the parameter index within its node.
    pub display_name: String,
    pub lr_mult: f64,
    pub decay_mult: f64,
}

/// Trait defining how parameter values are updated from their gradients.
///
/// The graph calls [`UpdateRule::apply`] once per learnable parameter during
/// `Graph::update`, then re-synchronises shared parameters.
pub trait UpdateRule<T: NetNumeric> {
    /// Updates `value` in place from the accumulated `grad`.
    fn apply(&mut self, param: &LearnableParam, value: &mut [T], grad: &[T]) -> Result<(), NetForgeError>;
}
