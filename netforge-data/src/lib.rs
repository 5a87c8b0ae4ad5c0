//! # netforge-data
//!
//! Feeds netforge graphs with batches. A [`Dataset`] yields one sample per
//! index, a [`Sampler`] decides the visiting order of each epoch, and the
//! [`Prefetcher`] fills batches on a background thread so the next batch is
//! ready while the graph runs on the current one.

pub mod datasets;
pub mod error;
pub mod prefetch;
pub mod samplers;

pub use datasets::{Dataset, VecDataset};
pub use error::DataError;
pub use prefetch::{Batch, CancellationToken, PrefetchConfig, Prefetcher};
pub use samplers::{RandomSampler, Sampler, SequentialSampler};
