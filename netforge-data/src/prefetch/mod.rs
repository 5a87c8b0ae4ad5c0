//! # Prefetch pipeline
//!
//! A [`Prefetcher`] owns a fixed set of [`Batch`] buffers that circulate
//! between two bounded queues. The background worker takes a batch from the
//! free queue, fills it from the dataset and pushes it on the full queue; the
//! consumer pops a full batch, copies it into the graph inputs and hands it
//! back to the free queue. No batch is allocated after construction.

pub mod batch;
pub mod cancel;
pub mod prefetcher;

pub use batch::Batch;
pub use cancel::CancellationToken;
pub use prefetcher::{PrefetchConfig, Prefetcher};

#[cfg(test)]
mod prefetch_test;
