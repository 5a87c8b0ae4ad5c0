//! Built-in node kinds registered under their type name.

mod dropout;
mod euclidean_loss;
mod flatten;
mod inner_product;
mod multinomial_logistic_loss;
mod relu;
mod scale;
mod slice;
mod split;
mod square;

pub use dropout::Dropout;
pub use euclidean_loss::EuclideanLoss;
pub use flatten::Flatten;
pub use inner_product::InnerProduct;
pub use multinomial_logistic_loss::MultinomialLogisticLoss;
pub use relu::ReLU;
pub use scale::Scale;
pub use slice::Slice;
pub use split::Split;
pub use square::Square;

use crate::buffer::BufferArena;
use crate::error::NetForgeError;
use crate::node::NodeIo;
use crate::types::NetNumeric;

/// Shapes output 0 like input 0; shared by the elementwise kinds.
pub(crate) fn reshape_like_input<T: NetNumeric>(arena: &mut BufferArena<T>, io: &NodeIo) -> Result<(), NetForgeError> {
    if io.output(0) != io.input(0) {
        arena.reshape_like(io.output(0), io.input(0))?;
    }
    Ok(())
}

#[cfg(test)]
mod kinds_test;
