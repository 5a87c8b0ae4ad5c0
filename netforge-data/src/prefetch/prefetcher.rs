use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use netforge_core::{Graph, NetNumeric};

use super::batch::Batch;
use super::cancel::CancellationToken;
use crate::datasets::Dataset;
use crate::error::DataError;
use crate::samplers::Sampler;

/// Number of batches kept in flight by default.
pub const DEFAULT_PREFETCH_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub batch_size: usize,
    pub slots: usize,
}

impl PrefetchConfig {
    pub fn new(batch_size: usize) -> Self {
        PrefetchConfig {
            batch_size,
            slots: DEFAULT_PREFETCH_SLOTS,
        }
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidConfig("batch_size must be positive".to_string()));
        }
        if self.slots == 0 {
            return Err(DataError::InvalidConfig("slots must be positive".to_string()));
        }
        Ok(())
    }
}

/// Fills batches on a background thread.
///
/// Dropping the prefetcher stops the worker and waits for it to exit.
pub struct Prefetcher<T: NetNumeric> {
    free_tx: Option<SyncSender<Batch<T>>>,
    full_rx: Receiver<Result<Batch<T>, DataError>>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
    config: PrefetchConfig,
    sample_sizes: Vec<usize>,
}

impl<T: NetNumeric> Prefetcher<T> {
    /// Allocates `config.slots` batches and starts the worker.
    pub fn new<D, S>(dataset: D, sampler: S, config: PrefetchConfig) -> Result<Self, DataError>
    where
        D: Dataset<T>,
        S: Sampler + 'static,
    {
        config.validate()?;
        if dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        let sample_sizes = dataset.sample_sizes();

        let (free_tx, free_rx) = sync_channel(config.slots);
        let (full_tx, full_rx) = sync_channel(config.slots);
        for _ in 0..config.slots {
            free_tx
                .send(Batch::new(config.batch_size, &sample_sizes))
                .map_err(|_| DataError::Disconnected)?;
        }

        let token = CancellationToken::new();
        let worker = Worker {
            dataset,
            sampler,
            order: Vec::new(),
            cursor: 0,
            epoch: 0,
            token: token.clone(),
            free_rx,
            full_tx,
        };
        let handle = thread::Builder::new()
            .name("netforge-prefetch".to_string())
            .spawn(move || worker.run())
            .map_err(|e| DataError::Spawn(e.to_string()))?;
        info!(
            "Prefetching batches of {} with {} slots",
            config.batch_size, config.slots
        );

        Ok(Prefetcher {
            free_tx: Some(free_tx),
            full_rx,
            token,
            worker: Some(handle),
            config,
            sample_sizes,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn sample_sizes(&self) -> &[usize] {
        &self.sample_sizes
    }

    /// Returns a handle that stops the worker when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Blocks until the worker has filled a batch.
    ///
    /// A dataset error raised while filling is returned once; later calls
    /// report `Disconnected`.
    pub fn pop_full(&mut self) -> Result<Batch<T>, DataError> {
        if self.token.is_cancelled() {
            return Err(DataError::Disconnected);
        }
        self.full_rx.recv().map_err(|_| DataError::Disconnected)?
    }

    /// Returns a consumed batch to the worker.
    pub fn recycle(&mut self, batch: Batch<T>) -> Result<(), DataError> {
        let tx = self.free_tx.as_ref().ok_or(DataError::Disconnected)?;
        tx.send(batch).map_err(|_| DataError::Disconnected)
    }

    /// Pops the next batch, copies it into the graph inputs and recycles it.
    pub fn load_into(&mut self, graph: &mut Graph<T>) -> Result<(), DataError> {
        let batch = self.pop_full()?;
        let loaded = batch.load_into(graph);
        self.recycle(batch)?;
        loaded
    }

    /// Cancels the worker, waits for it and discards queued batches.
    pub fn stop(&mut self) -> Result<(), DataError> {
        self.token.cancel();
        // Dropping the sender wakes a worker blocked on the free queue.
        self.free_tx = None;
        let joined = match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| DataError::WorkerPanicked),
            None => Ok(()),
        };
        while self.full_rx.try_recv().is_ok() {}
        joined
    }
}

impl<T: NetNumeric> Drop for Prefetcher<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Prefetch worker did not stop cleanly: {}", e);
        }
    }
}

struct Worker<T: NetNumeric, D, S> {
    dataset: D,
    sampler: S,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
    token: CancellationToken,
    free_rx: Receiver<Batch<T>>,
    full_tx: SyncSender<Result<Batch<T>, DataError>>,
}

impl<T, D, S> Worker<T, D, S>
where
    T: NetNumeric,
    D: Dataset<T>,
    S: Sampler,
{
    fn run(mut self) {
        debug!("Prefetch worker started on {} samples", self.dataset.len());
        self.order = self.sampler.epoch_order(self.dataset.len());
        while !self.token.is_cancelled() {
            let mut batch = match self.free_rx.recv() {
                Ok(batch) => batch,
                Err(_) => break,
            };
            if self.token.is_cancelled() {
                break;
            }
            let filled = self.fill(&mut batch).map(|()| batch);
            let failed = filled.is_err();
            if let Err(e) = &filled {
                error!("Prefetch worker failed: {}", e);
            }
            // The full queue holds every slot, so this never blocks.
            if self.full_tx.send(filled).is_err() || failed {
                break;
            }
        }
        debug!("Prefetch worker stopped in epoch {}", self.epoch);
    }

    fn next_index(&mut self) -> Result<usize, DataError> {
        if self.cursor >= self.order.len() {
            self.order = self.sampler.epoch_order(self.dataset.len());
            self.cursor = 0;
            self.epoch += 1;
            debug!("Restarting data prefetching from start");
            if self.order.is_empty() {
                return Err(DataError::EmptyDataset);
            }
        }
        let index = self.order[self.cursor];
        self.cursor += 1;
        Ok(index)
    }

    fn fill(&mut self, batch: &mut Batch<T>) -> Result<(), DataError> {
        for slot in 0..batch.batch_size() {
            let index = self.next_index()?;
            batch.indices[slot] = index;
            let mut parts = batch.slot_mut(slot);
            self.dataset.fill_sample(index, &mut parts)?;
        }
        batch.epoch = self.epoch;
        Ok(())
    }
}
