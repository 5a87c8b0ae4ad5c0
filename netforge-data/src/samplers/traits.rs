use std::fmt::Debug;

/// Decides the order in which the prefetch worker visits a dataset.
///
/// The worker asks for a fresh order at the start of every epoch, so a
/// sampler may return a different permutation each time.
pub trait Sampler: Debug + Send {
    /// Returns the indices to visit during the next epoch.
    ///
    /// # Arguments
    ///
    /// * `dataset_len` - The total number of samples in the dataset.
    fn epoch_order(&mut self, dataset_len: usize) -> Vec<usize>;
}
