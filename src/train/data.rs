use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{GradError, Result};
use crate::math::matrix::Matrix;

/// One mini-batch: inputs plus the target class of every example.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Matrix,
    pub targets: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Producer of batches, restartable once per epoch.
pub trait DataSource {
    /// Rewinds to the first batch of `epoch`.
    fn start_epoch(&mut self, epoch: usize);

    /// Restarts the current sample order from its first batch without
    /// drawing a new one.
    fn rewind(&mut self);

    /// Next batch of the current epoch; `Ok(None)` marks the end of the epoch.
    fn next_batch(&mut self) -> Result<Option<Batch>>;
}

/// Samples held in memory, served in fixed-size batches.
///
/// Each sample has shape `sample_shape = (rows, cols)` and a batch of `n`
/// samples is served as a `[n * rows, cols]` matrix of stacked samples; the
/// model flattens it to `[n, rows * cols]`. With shuffling enabled the order
/// is redrawn from a seeded RNG at the start of every epoch.
pub struct InMemoryDataset {
    samples: Vec<Vec<f64>>,
    labels: Vec<usize>,
    sample_shape: (usize, usize),
    batch_size: usize,
    rng: Option<StdRng>,
    order: Vec<usize>,
    cursor: usize,
}

impl InMemoryDataset {
    pub fn new(
        samples: Vec<Vec<f64>>,
        labels: Vec<usize>,
        sample_shape: (usize, usize),
        batch_size: usize,
    ) -> Result<InMemoryDataset> {
        if samples.is_empty() {
            return Err(GradError::InvalidData("dataset has no samples".to_owned()));
        }
        if samples.len() != labels.len() {
            return Err(GradError::InvalidData(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(GradError::InvalidConfig("batch_size must be at least 1".to_owned()));
        }
        let width = sample_shape.0 * sample_shape.1;
        if let Some((i, s)) = samples.iter().enumerate().find(|(_, s)| s.len() != width) {
            return Err(GradError::InvalidData(format!(
                "sample {} has {} values, expected {}x{}",
                i,
                s.len(),
                sample_shape.0,
                sample_shape.1
            )));
        }

        let order = (0..samples.len()).collect();
        Ok(InMemoryDataset {
            samples,
            labels,
            sample_shape,
            batch_size,
            rng: None,
            order,
            cursor: 0,
        })
    }

    /// Reshuffles the sample order at every epoch start.
    pub fn with_shuffle(mut self, seed: u64) -> InMemoryDataset {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_shape(&self) -> (usize, usize) {
        self.sample_shape
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }
}

impl DataSource for InMemoryDataset {
    fn start_epoch(&mut self, _epoch: usize) {
        self.cursor = 0;
        if let Some(rng) = self.rng.as_mut() {
            self.order.shuffle(rng);
        }
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.cursor >= self.order.len() {
            return Ok(None);
        }
        let end = self.cursor.saturating_add(self.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let (rows, cols) = self.sample_shape;
        let mut data = Vec::with_capacity(indices.len() * rows * cols);
        let mut targets = Vec::with_capacity(indices.len());
        for &idx in indices {
            data.extend_from_slice(&self.samples[idx]);
            targets.push(self.labels[idx]);
        }
        let inputs = Matrix::from_vec(indices.len() * rows, cols, data)?;
        Ok(Some(Batch { inputs, targets }))
    }
}

/// Noisy samples around one random prototype per class, values clamped to
/// `[0, 1]` like normalised pixel intensities. Labels cycle through the
/// classes in order.
pub fn synthetic_clusters(
    n_samples: usize,
    n_classes: usize,
    features: usize,
    noise: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<usize>) {
    if n_classes == 0 {
        return (Vec::new(), Vec::new());
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let prototypes: Vec<Vec<f64>> = (0..n_classes)
        .map(|_| (0..features).map(|_| rng.gen::<f64>()).collect())
        .collect();

    let labels: Vec<usize> = (0..n_samples).map(|i| i % n_classes).collect();
    let samples = labels
        .iter()
        .map(|&class| {
            prototypes[class]
                .iter()
                .map(|&p| (p + (rng.gen::<f64>() * 2.0 - 1.0) * noise).clamp(0.0, 1.0))
                .collect()
        })
        .collect();
    (samples, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize, batch: usize) -> InMemoryDataset {
        let samples = (0..n).map(|i| vec![i as f64; 4]).collect();
        let labels = (0..n).map(|i| i % 2).collect();
        InMemoryDataset::new(samples, labels, (2, 2), batch).unwrap()
    }

    #[test]
    fn batches_cover_epoch_then_signal_end() {
        let mut ds = dataset(5, 2);
        ds.start_epoch(1);
        let mut sizes = Vec::new();
        while let Some(batch) = ds.next_batch().unwrap() {
            assert_eq!(batch.inputs.shape(), (batch.len() * 2, 2));
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(ds.next_batch().unwrap().is_none());

        ds.start_epoch(2);
        assert_eq!(ds.next_batch().unwrap().unwrap().targets, vec![0, 1]);
    }

    #[test]
    fn shuffle_is_seeded() {
        let collect = |seed| {
            let mut ds = dataset(10, 10).with_shuffle(seed);
            ds.start_epoch(1);
            ds.next_batch().unwrap().unwrap().inputs.data
        };
        assert_eq!(collect(3), collect(3));
    }

    #[test]
    fn rewind_replays_order_without_reshuffling() {
        let first_batches = |ds: &mut InMemoryDataset| {
            let mut out = Vec::new();
            while let Some(batch) = ds.next_batch().unwrap() {
                out.push(batch.inputs.data);
            }
            out
        };
        let mut plain = dataset(9, 4).with_shuffle(5);
        let mut rewound = dataset(9, 4).with_shuffle(5);

        plain.start_epoch(1);
        rewound.start_epoch(1);
        let epoch_one = first_batches(&mut rewound);
        rewound.rewind();
        assert_eq!(first_batches(&mut rewound), epoch_one);

        plain.start_epoch(2);
        rewound.start_epoch(2);
        assert_eq!(first_batches(&mut plain), first_batches(&mut rewound));
    }

    #[test]
    fn batch_count_rounds_up_without_overflow() {
        assert_eq!(dataset(5, 2).num_batches(), 3);
        assert_eq!(dataset(4, 2).num_batches(), 2);
        let mut huge = dataset(3, usize::MAX);
        assert_eq!(huge.num_batches(), 1);
        huge.start_epoch(1);
        assert_eq!(huge.next_batch().unwrap().unwrap().len(), 3);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(InMemoryDataset::new(vec![vec![0.0; 4]], vec![0, 1], (2, 2), 1).is_err());
        assert!(InMemoryDataset::new(vec![vec![0.0; 3]], vec![0], (2, 2), 1).is_err());
        assert!(InMemoryDataset::new(vec![vec![0.0; 4]], vec![0], (2, 2), 0).is_err());
    }

    #[test]
    fn synthetic_labels_cycle() {
        let (samples, labels) = synthetic_clusters(7, 3, 5, 0.1, 1);
        assert_eq!(labels, vec![0, 1, 2, 0, 1, 2, 0]);
        assert!(samples.iter().flatten().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
