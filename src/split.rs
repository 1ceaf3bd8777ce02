use crate::config::SplitParams;
use crate::error::{PipelineError, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Fewest training rows a split may leave behind.
pub const MIN_TRAIN_ROWS: usize = 2;

/// Row indices of a seeded train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Shuffles `0..n_rows` with the configured seed; the first
    /// `ceil(n_rows * test_ratio)` shuffled rows form the test partition.
    pub fn new(n_rows: usize, params: &SplitParams) -> Result<Self> {
        if !(params.test_ratio > 0.0 && params.test_ratio < 1.0) {
            return Err(PipelineError::InvalidInput(format!(
                "test ratio {} outside (0, 1)",
                params.test_ratio
            )));
        }

        let n_test = (n_rows as f64 * params.test_ratio).ceil() as usize;
        if n_test == 0 || n_rows < n_test + MIN_TRAIN_ROWS {
            return Err(PipelineError::Split {
                rows: n_rows,
                required: Self::min_rows(params.test_ratio),
            });
        }

        let mut indices: Vec<usize> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(params.seed);
        indices.shuffle(&mut rng);

        let train = indices.split_off(n_test);
        Ok(Self {
            train,
            test: indices,
        })
    }

    /// Smallest row count that yields a viable split for `test_ratio`.
    pub fn min_rows(test_ratio: f64) -> usize {
        (MIN_TRAIN_ROWS + 1..)
            .find(|&n| {
                let n_test = (n as f64 * test_ratio).ceil() as usize;
                n_test > 0 && n >= n_test + MIN_TRAIN_ROWS
            })
            .unwrap_or(MIN_TRAIN_ROWS + 1)
    }
}

/// Picks `values[i]` for every index, in index order.
pub fn take<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_sizes_and_coverage() {
        let split = TrainTestSplit::new(10, &SplitParams::default()).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_is_reproducible() {
        let params = SplitParams { test_ratio: 0.2, seed: 42 };
        let a = TrainTestSplit::new(50, &params).unwrap();
        let b = TrainTestSplit::new(50, &params).unwrap();
        assert_eq!(a, b);

        let other = TrainTestSplit::new(50, &SplitParams { test_ratio: 0.2, seed: 7 }).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_too_few_rows() {
        let params = SplitParams::default();
        assert!(matches!(
            TrainTestSplit::new(2, &params),
            Err(PipelineError::Split { rows: 2, required: 3 })
        ));
        assert!(TrainTestSplit::new(0, &params).is_err());
        assert!(TrainTestSplit::new(3, &params).is_ok());
    }

    #[test]
    fn test_take() {
        assert_eq!(take(&[10, 20, 30], &[2, 0]), vec![30, 10]);
    }
}
