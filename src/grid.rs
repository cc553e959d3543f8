//! The model's frequency grid.

use ndarray::Array1;

use crate::error::{Error, Result};

/// Ordered sequence of strictly positive frequencies shared by the whole
/// model. Every frequency-dependent quantity in the model is a same-length
/// array aligned to this grid. Immutable once the model is created.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyGrid {
    freqs: Array1<f64>,
}

impl FrequencyGrid {
    /// Validates and wraps a frequency sequence.
    pub fn new(freqs: Array1<f64>) -> Result<Self> {
        if freqs.is_empty() {
            return Err(Error::config("frequency grid must be non-empty"));
        }
        for (i, &f) in freqs.iter().enumerate() {
            if !f.is_finite() || f <= 0.0 {
                return Err(Error::config(format!(
                    "frequency grid entry {} is not strictly positive: {}",
                    i, f
                )));
            }
        }
        for (i, w) in freqs.windows(2).into_iter().enumerate() {
            if w[1] <= w[0] {
                return Err(Error::config(format!(
                    "frequency grid must be strictly ascending, entries {}..{}: {} >= {}",
                    i,
                    i + 1,
                    w[0],
                    w[1]
                )));
            }
        }
        Ok(Self { freqs })
    }

    /// Linearly spaced grid over `[start, stop]`.
    pub fn linspace(start: f64, stop: f64, num: usize) -> Result<Self> {
        Self::new(Array1::linspace(start, stop, num))
    }

    /// Logarithmically spaced grid over `[start, stop]`.
    pub fn logspace(start: f64, stop: f64, num: usize) -> Result<Self> {
        if start <= 0.0 || stop <= 0.0 {
            return Err(Error::config("logspace endpoints must be positive"));
        }
        Self::new(Array1::logspace(
            10.0,
            start.log10(),
            stop.log10(),
            num,
        ))
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    pub fn freqs(&self) -> &Array1<f64> {
        &self.freqs
    }

    pub fn min(&self) -> f64 {
        self.freqs[0]
    }

    pub fn max(&self) -> f64 {
        self.freqs[self.freqs.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_empty_grid() {
        assert!(FrequencyGrid::new(Array1::zeros(0)).is_err());
    }

    #[test]
    fn rejects_non_positive_frequency() {
        assert!(FrequencyGrid::new(array![1e6, 0.0, 2e6]).is_err());
        assert!(FrequencyGrid::new(array![-1e6]).is_err());
    }

    #[test]
    fn rejects_unordered_grid() {
        assert!(FrequencyGrid::new(array![1e6, 3e6, 2e6]).is_err());
        assert!(FrequencyGrid::new(array![1e6, 1e6]).is_err());
    }

    #[test]
    fn linspace_grid() {
        let grid = FrequencyGrid::linspace(1e9, 2e9, 11).unwrap();
        assert_eq!(grid.len(), 11);
        assert_eq!(grid.min(), 1e9);
        assert_eq!(grid.max(), 2e9);
    }

    #[test]
    fn logspace_grid() {
        let grid = FrequencyGrid::logspace(1e6, 1e9, 4).unwrap();
        assert_eq!(grid.len(), 4);
        assert!((grid.freqs()[1] - 1e7).abs() / 1e7 < 1e-10);
    }
}
