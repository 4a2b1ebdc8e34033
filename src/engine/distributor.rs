use std::ops::Range;

use crate::error::PipelineError;

/// Static range split of an ordered batch across a fixed number of workers.
///
/// Worker `i` of `W` gets `[i*base + min(i, rem), (i+1)*base + min(i+1, rem))`
/// where `base = n / W` and `rem = n % W`: the first `rem` workers take one
/// extra unit each. Ranges are contiguous, disjoint and cover `[0, n)`.
#[derive(Debug, Clone, Copy)]
pub struct WorkDistributor {
    workers: usize,
}

impl WorkDistributor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn split_ranges(&self, n: usize) -> Result<Vec<Range<usize>>, PipelineError> {
        if n == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let base = n / self.workers;
        let rem = n % self.workers;
        let ranges = (0..self.workers)
            .map(|i| {
                let start = i * base + i.min(rem);
                let end = (i + 1) * base + (i + 1).min(rem);
                start..end
            })
            .collect();

        Ok(ranges)
    }

    /// Move `units` into one batch per worker, following `split_ranges`
    pub fn partition<T>(&self, units: Vec<T>) -> Result<Vec<Vec<T>>, PipelineError> {
        let ranges = self.split_ranges(units.len())?;
        let mut units = units.into_iter();
        Ok(ranges
            .into_iter()
            .map(|range| units.by_ref().take(range.len()).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let ranges = WorkDistributor::new(4).split_ranges(100).unwrap();
        assert_eq!(ranges, vec![0..25, 25..50, 50..75, 75..100]);
    }

    #[test]
    fn test_remainder_goes_to_leading_workers() {
        let ranges = WorkDistributor::new(3).split_ranges(10).unwrap();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_partition_moves_units_in_order() {
        let batches = WorkDistributor::new(3).partition((0..7).collect()).unwrap();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
    }
}
