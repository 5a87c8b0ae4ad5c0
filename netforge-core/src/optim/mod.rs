pub mod adam;
pub mod sgd;
pub mod update_rule;

pub use adam::AdamRule;
pub use sgd::SgdRule;
pub use update_rule::{LearnableParam, UpdateRule};

#[cfg(test)]
mod sgd_test;
