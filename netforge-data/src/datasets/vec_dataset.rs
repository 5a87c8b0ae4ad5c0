use super::traits::Dataset;
use crate::error::DataError;
use netforge_core::NetNumeric;

/// An in-memory dataset holding one flat column per graph input.
///
/// Column `k` stores the samples of input `k` back to back, so sample `i`
/// of that input lives at `i * sizes[k] .. (i + 1) * sizes[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VecDataset<T: NetNumeric> {
    sizes: Vec<usize>,
    columns: Vec<Vec<T>>,
    len: usize,
}

impl<T: NetNumeric> VecDataset<T> {
    /// Creates a dataset from `(sample_size, column)` pairs.
    ///
    /// Every column must hold the same number of samples.
    pub fn new(columns: Vec<(usize, Vec<T>)>) -> Result<Self, DataError> {
        if columns.is_empty() {
            return Err(DataError::InvalidConfig("dataset needs at least one column".to_string()));
        }
        let mut len = None;
        for (input, (size, column)) in columns.iter().enumerate() {
            if *size == 0 || column.len() % size != 0 {
                return Err(DataError::SampleSize {
                    index: column.len() / (*size).max(1),
                    input,
                    expected: *size,
                    actual: column.len() % (*size).max(1),
                });
            }
            let samples = column.len() / size;
            match len {
                None => len = Some(samples),
                Some(n) if n != samples => {
                    return Err(DataError::InvalidConfig(format!(
                        "column {} holds {} samples, column 0 holds {}",
                        input, samples, n
                    )));
                }
                Some(_) => {}
            }
        }
        let (sizes, columns) = columns.into_iter().unzip();
        Ok(VecDataset {
            sizes,
            columns,
            len: len.unwrap_or(0),
        })
    }

    /// Builds a dataset from per-sample parts.
    pub fn from_samples(samples: Vec<Vec<Vec<T>>>) -> Result<Self, DataError> {
        let first = samples.first().ok_or(DataError::EmptyDataset)?;
        let sizes: Vec<usize> = first.iter().map(|p| p.len()).collect();
        let mut columns: Vec<Vec<T>> = sizes.iter().map(|&s| Vec::with_capacity(s * samples.len())).collect();
        for (index, sample) in samples.iter().enumerate() {
            if sample.len() != sizes.len() {
                return Err(DataError::InputCount {
                    provided: sample.len(),
                    declared: sizes.len(),
                });
            }
            for (input, part) in sample.iter().enumerate() {
                if part.len() != sizes[input] {
                    return Err(DataError::SampleSize {
                        index,
                        input,
                        expected: sizes[input],
                        actual: part.len(),
                    });
                }
                columns[input].extend_from_slice(part);
            }
        }
        Self::new(sizes.into_iter().zip(columns).collect())
    }

    /// Returns sample `index` of input `input`.
    pub fn part(&self, index: usize, input: usize) -> Option<&[T]> {
        if index >= self.len {
            return None;
        }
        let size = *self.sizes.get(input)?;
        Some(&self.columns[input][index * size..(index + 1) * size])
    }
}

impl<T: NetNumeric> Dataset<T> for VecDataset<T> {
    fn sample_sizes(&self) -> Vec<usize> {
        self.sizes.clone()
    }

    fn fill_sample(&self, index: usize, parts: &mut [&mut [T]]) -> Result<(), DataError> {
        if index >= self.len {
            return Err(DataError::IndexOutOfRange { index, len: self.len });
        }
        if parts.len() != self.sizes.len() {
            return Err(DataError::InputCount {
                provided: self.sizes.len(),
                declared: parts.len(),
            });
        }
        for (input, dest) in parts.iter_mut().enumerate() {
            let size = self.sizes[input];
            if dest.len() != size {
                return Err(DataError::SampleSize {
                    index,
                    input,
                    expected: dest.len(),
                    actual: size,
                });
            }
            dest.copy_from_slice(&self.columns[input][index * size..(index + 1) * size]);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}
