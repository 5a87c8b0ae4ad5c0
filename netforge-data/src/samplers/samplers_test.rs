#[cfg(test)]
mod tests {
    use crate::samplers::{RandomSampler, Sampler, SequentialSampler};

    #[test]
    fn test_sequential_sampler() {
        let mut sampler = SequentialSampler::new();
        assert_eq!(sampler.epoch_order(4), vec![0, 1, 2, 3]);
        assert_eq!(sampler.epoch_order(4), vec![0, 1, 2, 3]);
        assert!(sampler.epoch_order(0).is_empty());
    }

    #[test]
    fn test_random_sampler_is_a_permutation() {
        let mut sampler = RandomSampler::new(7);
        let mut order = sampler.epoch_order(10);
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_sampler_is_reproducible() {
        let mut a = RandomSampler::new(1701);
        let mut b = RandomSampler::new(1701);
        for _ in 0..3 {
            assert_eq!(a.epoch_order(16), b.epoch_order(16));
        }
    }

    #[test]
    fn test_random_sampler_reshuffles_each_epoch() {
        let mut sampler = RandomSampler::new(3);
        let epochs: Vec<Vec<usize>> = (0..4).map(|_| sampler.epoch_order(32)).collect();
        assert!(epochs.windows(2).any(|w| w[0] != w[1]));
    }
}
