use crate::error::DataError;
use netforge_core::{Graph, NetNumeric};

/// One pre-allocated batch: a flat buffer per graph input holding
/// `batch_size` consecutive samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T: NetNumeric> {
    pub(crate) data: Vec<Vec<T>>,
    pub(crate) sample_sizes: Vec<usize>,
    pub(crate) indices: Vec<usize>,
    pub(crate) epoch: usize,
}

impl<T: NetNumeric> Batch<T> {
    pub fn new(batch_size: usize, sample_sizes: &[usize]) -> Self {
        Batch {
            data: sample_sizes.iter().map(|&s| vec![T::zero(); s * batch_size]).collect(),
            sample_sizes: sample_sizes.to_vec(),
            indices: vec![0; batch_size],
            epoch: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.indices.len()
    }

    pub fn num_inputs(&self) -> usize {
        self.data.len()
    }

    /// Values of input `k` for the whole batch.
    pub fn input(&self, k: usize) -> Option<&[T]> {
        self.data.get(k).map(|v| v.as_slice())
    }

    /// Dataset indices of the samples, in batch order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Epoch in which the last sample of this batch was drawn.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Mutable slices of slot `slot`, one per input.
    pub(crate) fn slot_mut(&mut self, slot: usize) -> Vec<&mut [T]> {
        self.data
            .iter_mut()
            .zip(&self.sample_sizes)
            .map(|(column, &size)| &mut column[slot * size..(slot + 1) * size])
            .collect()
    }

    /// Copies every input buffer into the matching graph input, in
    /// declaration order.
    pub fn load_into(&self, graph: &mut Graph<T>) -> Result<(), DataError> {
        let ids = graph.input_ids().to_vec();
        if ids.len() != self.data.len() {
            return Err(DataError::InputCount {
                provided: self.data.len(),
                declared: ids.len(),
            });
        }
        let arena = graph.arena_mut();
        for (id, values) in ids.into_iter().zip(&self.data) {
            arena.set_value(id, values)?;
        }
        Ok(())
    }
}
