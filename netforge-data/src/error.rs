use netforge_core::NetForgeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error(transparent)]
    Graph(#[from] NetForgeError),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Sample {index}: input {input} has {actual} values, expected {expected}")]
    SampleSize {
        index: usize,
        input: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Dataset provides {provided} inputs but the graph declares {declared}")]
    InputCount { provided: usize, declared: usize },

    #[error("Invalid prefetch configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn prefetch worker: {0}")]
    Spawn(String),

    #[error("Prefetch worker is no longer running")]
    Disconnected,

    #[error("Prefetch worker panicked")]
    WorkerPanicked,
}
