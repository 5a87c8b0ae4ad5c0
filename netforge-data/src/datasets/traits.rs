use crate::error::DataError;
use netforge_core::NetNumeric;

/// A source of samples addressed by index.
///
/// Each sample is split into one part per graph input (for example the
/// features and the label), and every part of a given input has the same
/// number of values across the whole dataset.
pub trait Dataset<T: NetNumeric>: Send + 'static {
    /// Number of values one sample contributes to each graph input.
    fn sample_sizes(&self) -> Vec<usize>;

    /// Writes sample `index` into `parts`, one slice per input, each of the
    /// length reported by [`sample_sizes`](Dataset::sample_sizes).
    ///
    /// # Errors
    ///
    /// Returns `DataError::IndexOutOfRange` if `index >= len()`.
    fn fill_sample(&self, index: usize, parts: &mut [&mut [T]]) -> Result<(), DataError>;

    /// Returns the total number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
