//! # Gradient Checking (`autograd`)
//!
//! Validates the analytic `backward` of a node against central finite
//! differences of its `forward`. Checks run on a single node wired in a
//! [`NodeHarness`](crate::node::NodeHarness) or on every node of a built
//! [`Graph`](crate::graph::Graph).
//!
//! Every failing element is reported, not only the first one, so a broken
//! node shows its whole error pattern at once.

pub mod grad_check;

pub use grad_check::{CheckInputs, CheckTarget, CheckedBuffer, GradCheckError, GradientChecker, GradientMismatch};
