#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use netforge_core::{Graph, NetSpec, NodeSpec};

    use crate::datasets::VecDataset;
    use crate::error::DataError;
    use crate::prefetch::{Batch, PrefetchConfig, Prefetcher};
    use crate::samplers::{RandomSampler, Sampler, SequentialSampler};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Sample `i` is `[i, 10 * i]` for input 0 and `[-i]` for input 1.
    fn counting_dataset(n: usize) -> VecDataset<f64> {
        let x: Vec<f64> = (0..n).flat_map(|i| [i as f64, 10.0 * i as f64]).collect();
        let t: Vec<f64> = (0..n).map(|i| -(i as f64)).collect();
        VecDataset::new(vec![(2, x), (1, t)]).expect("valid dataset")
    }

    fn next_indices(prefetcher: &mut Prefetcher<f64>) -> Result<(Vec<usize>, usize), DataError> {
        let batch = prefetcher.pop_full()?;
        let seen = (batch.indices().to_vec(), batch.epoch());
        prefetcher.recycle(batch)?;
        Ok(seen)
    }

    #[test]
    fn test_sequential_batches_cycle_through_dataset() -> Result<(), DataError> {
        init_logger();
        let mut prefetcher = Prefetcher::new(counting_dataset(5), SequentialSampler::new(), PrefetchConfig::new(2))?;
        assert_eq!(next_indices(&mut prefetcher)?, (vec![0, 1], 0));
        assert_eq!(next_indices(&mut prefetcher)?, (vec![2, 3], 0));
        assert_eq!(next_indices(&mut prefetcher)?, (vec![4, 0], 1));
        assert_eq!(next_indices(&mut prefetcher)?, (vec![1, 2], 1));
        prefetcher.stop()
    }

    #[test]
    fn test_batch_contents_follow_indices() -> Result<(), DataError> {
        let mut prefetcher = Prefetcher::new(
            counting_dataset(4),
            SequentialSampler::new(),
            PrefetchConfig::new(3).with_slots(1),
        )?;
        let _ = next_indices(&mut prefetcher)?;
        let batch = prefetcher.pop_full()?;
        assert_eq!(batch.indices(), &[3, 0, 1]);
        assert_eq!(batch.input(0), Some(&[3.0, 30.0, 0.0, 0.0, 1.0, 10.0][..]));
        assert_eq!(batch.input(1), Some(&[-3.0, 0.0, -1.0][..]));
        assert_eq!(batch.input(2), None);
        prefetcher.recycle(batch)
    }

    #[test]
    fn test_shuffled_order_is_reproducible() -> Result<(), DataError> {
        let config = PrefetchConfig::new(4);
        let mut a = Prefetcher::new(counting_dataset(8), RandomSampler::new(11), config)?;
        let mut b = Prefetcher::new(counting_dataset(8), RandomSampler::new(11), config)?;

        let mut first_epoch = Vec::new();
        for step in 0..6 {
            let (ia, ea) = next_indices(&mut a)?;
            let (ib, eb) = next_indices(&mut b)?;
            assert_eq!(ia, ib);
            assert_eq!(ea, eb);
            if step < 2 {
                first_epoch.extend(ia);
            }
        }
        first_epoch.sort_unstable();
        assert_eq!(first_epoch, (0..8).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_load_into_graph() -> Result<(), DataError> {
        init_logger();
        let spec = NetSpec::new("fed")
            .input("x", &[2, 2])
            .input("t", &[2, 1])
            .node(NodeSpec::new("ip", "InnerProduct").input("x").output("y").set("num_output", 1))
            .node(NodeSpec::new("loss", "EuclideanLoss").input("y").input("t").output("loss"));
        let mut graph = Graph::<f64>::new(&spec)?;
        let mut prefetcher = Prefetcher::new(counting_dataset(3), SequentialSampler::new(), PrefetchConfig::new(2))?;

        prefetcher.load_into(&mut graph)?;
        assert_eq!(graph.value("x"), Some(&[0.0, 0.0, 1.0, 10.0][..]));
        assert_eq!(graph.value("t"), Some(&[0.0, -1.0][..]));

        prefetcher.load_into(&mut graph)?;
        assert_eq!(graph.value("x"), Some(&[2.0, 20.0, 0.0, 0.0][..]));
        let loss = graph.forward()?;
        assert!(loss.is_finite());
        assert_relative_eq!(graph.value("t").map(|t| t[0]).unwrap_or(0.0), -2.0);
        Ok(())
    }

    #[test]
    fn test_load_into_rejects_input_count() -> Result<(), DataError> {
        let spec = NetSpec::new("single")
            .input("x", &[1, 2])
            .node(NodeSpec::new("sq", "Square").input("x").output("y"));
        let mut graph = Graph::<f64>::new(&spec)?;
        let batch = Batch::<f64>::new(1, &[2, 1]);
        assert_eq!(
            batch.load_into(&mut graph),
            Err(DataError::InputCount { provided: 2, declared: 1 })
        );

        let wrong_size = Batch::<f64>::new(2, &[2]);
        assert!(matches!(wrong_size.load_into(&mut graph), Err(DataError::Graph(_))));
        Ok(())
    }

    #[test]
    fn test_invalid_configuration() {
        let result = Prefetcher::new(counting_dataset(2), SequentialSampler::new(), PrefetchConfig::new(0));
        assert!(matches!(result, Err(DataError::InvalidConfig(_))));

        let result = Prefetcher::new(
            counting_dataset(2),
            SequentialSampler::new(),
            PrefetchConfig::new(1).with_slots(0),
        );
        assert!(matches!(result, Err(DataError::InvalidConfig(_))));

        let empty = VecDataset::<f64>::new(vec![(1, vec![])]).expect("empty but valid");
        let result = Prefetcher::new(empty, SequentialSampler::new(), PrefetchConfig::new(1));
        assert!(matches!(result, Err(DataError::EmptyDataset)));
    }

    #[test]
    fn test_stop_then_pop_is_disconnected() -> Result<(), DataError> {
        let mut prefetcher = Prefetcher::new(counting_dataset(4), SequentialSampler::new(), PrefetchConfig::new(2))?;
        let held = prefetcher.pop_full()?;
        prefetcher.stop()?;
        assert_eq!(prefetcher.pop_full(), Err(DataError::Disconnected));
        assert_eq!(prefetcher.recycle(held), Err(DataError::Disconnected));
        // Stopping twice is harmless.
        prefetcher.stop()
    }

    #[test]
    fn test_drop_with_every_batch_held() -> Result<(), DataError> {
        let config = PrefetchConfig::new(1).with_slots(2);
        let mut prefetcher = Prefetcher::new(counting_dataset(3), SequentialSampler::new(), config)?;
        let first = prefetcher.pop_full()?;
        let second = prefetcher.pop_full()?;
        assert_eq!(first.indices(), &[0]);
        assert_eq!(second.indices(), &[1]);
        // The worker is blocked on the empty free queue; dropping must not hang.
        drop(prefetcher);
        Ok(())
    }

    #[test]
    fn test_external_cancellation() -> Result<(), DataError> {
        let mut prefetcher = Prefetcher::new(counting_dataset(4), SequentialSampler::new(), PrefetchConfig::new(1))?;
        prefetcher.token().cancel();
        assert_eq!(prefetcher.pop_full(), Err(DataError::Disconnected));
        prefetcher.stop()
    }

    #[derive(Debug)]
    struct OutOfRangeSampler;

    impl Sampler for OutOfRangeSampler {
        fn epoch_order(&mut self, dataset_len: usize) -> Vec<usize> {
            vec![0, dataset_len]
        }
    }

    #[test]
    fn test_dataset_error_reaches_consumer() -> Result<(), DataError> {
        let mut prefetcher = Prefetcher::new(counting_dataset(2), OutOfRangeSampler, PrefetchConfig::new(2))?;
        assert_eq!(
            prefetcher.pop_full(),
            Err(DataError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(prefetcher.pop_full(), Err(DataError::Disconnected));
        prefetcher.stop()
    }
}
