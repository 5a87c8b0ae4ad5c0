use super::traits::Sampler;

/// Visits samples in index order, every epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSampler;

impl SequentialSampler {
    pub fn new() -> Self {
        SequentialSampler
    }
}

impl Sampler for SequentialSampler {
    fn epoch_order(&mut self, dataset_len: usize) -> Vec<usize> {
        (0..dataset_len).collect()
    }
}
