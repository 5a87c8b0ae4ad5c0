use super::traits::Sampler;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Visits every sample once per epoch in a shuffled order.
///
/// The generator is seeded once, so two samplers built with the same seed
/// produce the same sequence of epochs.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        RandomSampler {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn epoch_order(&mut self, dataset_len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..dataset_len).collect();
        indices.shuffle(&mut self.rng);
        indices
    }
}
