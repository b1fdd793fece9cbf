use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum GridError {
    #[error(
        "Grid mismatch: [{lo_a}, {hi_a}] with {bins_a} bins vs [{lo_b}, {hi_b}] with {bins_b} bins"
    )]
    Mismatch {
        lo_a: f64,
        hi_a: f64,
        bins_a: usize,
        lo_b: f64,
        hi_b: f64,
        bins_b: usize,
    },

    #[error("Expected {expected} values for grid, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Degenerate grid: lo={lo}, hi={hi}, n_bins={n_bins}")]
    Degenerate { lo: f64, hi: f64, n_bins: usize },
}

const BOUND_TOLERANCE: f64 = 1e-9;

/// A fixed, uniformly spaced coordinate grid over `[lo, hi)`.
///
/// Every distribution and potential table in the optimization is sampled at
/// the centers of this grid; two tables are only comparable when their grids
/// match in bounds and bin count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub lo: f64,
    pub hi: f64,
    pub n_bins: usize,
}

impl Grid {
    pub fn new(lo: f64, hi: f64, n_bins: usize) -> Result<Self, GridError> {
        if n_bins < 2 || hi <= lo {
            return Err(GridError::Degenerate { lo, hi, n_bins });
        }
        Ok(Self { lo, hi, n_bins })
    }

    #[inline]
    pub fn spacing(&self) -> f64 {
        (self.hi - self.lo) / self.n_bins as f64
    }

    /// Bin-center coordinates, one per bin.
    pub fn centers(&self) -> Vec<f64> {
        let dx = self.spacing();
        (0..self.n_bins)
            .map(|i| self.lo + (i as f64 + 0.5) * dx)
            .collect()
    }

    /// Bin index for a coordinate, or `None` if it falls outside the grid.
    #[inline]
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if x < self.lo || x >= self.hi {
            return None;
        }
        let idx = ((x - self.lo) / self.spacing()) as usize;
        Some(idx.min(self.n_bins - 1))
    }

    pub fn matches(&self, other: &Grid) -> bool {
        self.n_bins == other.n_bins
            && (self.lo - other.lo).abs() < BOUND_TOLERANCE
            && (self.hi - other.hi).abs() < BOUND_TOLERANCE
    }

    pub fn check_matches(&self, other: &Grid) -> Result<(), GridError> {
        if self.matches(other) {
            Ok(())
        } else {
            Err(GridError::Mismatch {
                lo_a: self.lo,
                hi_a: self.hi,
                bins_a: self.n_bins,
                lo_b: other.lo,
                hi_b: other.hi,
                bins_b: other.n_bins,
            })
        }
    }
}

/// A binned observable (distances, angles) over a fixed grid, normalized for
/// comparison against a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    grid: Grid,
    values: Vec<f64>,
}

impl Distribution {
    pub fn new(grid: Grid, values: Vec<f64>) -> Result<Self, GridError> {
        if values.len() != grid.n_bins {
            return Err(GridError::LengthMismatch {
                expected: grid.n_bins,
                got: values.len(),
            });
        }
        Ok(Self { grid, values })
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn check_compatible(&self, other: &Distribution) -> Result<(), GridError> {
        self.grid.check_matches(&other.grid)
    }

    /// Fixed-width moving-average low-pass filter. The window is clamped to
    /// odd sizes; edge bins average over the in-range part of the window.
    pub fn smoothed(&self, window: usize) -> Distribution {
        let half = (window.max(1) / 2) as isize;
        let n = self.values.len() as isize;
        let values = (0..n)
            .map(|i| {
                let lo = (i - half).max(0);
                let hi = (i + half).min(n - 1);
                let slice = &self.values[lo as usize..=hi as usize];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect();
        Self {
            grid: self.grid,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn grid_spacing_and_centers_are_uniform() {
        let grid = Grid::new(0.0, 2.0, 4).unwrap();
        assert!(f64_approx_equal(grid.spacing(), 0.5));
        let centers = grid.centers();
        assert_eq!(centers.len(), 4);
        assert!(f64_approx_equal(centers[0], 0.25));
        assert!(f64_approx_equal(centers[3], 1.75));
    }

    #[test]
    fn bin_index_covers_range_and_rejects_outside() {
        let grid = Grid::new(0.0, 2.0, 4).unwrap();
        assert_eq!(grid.bin_index(0.0), Some(0));
        assert_eq!(grid.bin_index(1.99), Some(3));
        assert_eq!(grid.bin_index(2.0), None);
        assert_eq!(grid.bin_index(-0.1), None);
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        assert!(Grid::new(1.0, 1.0, 10).is_err());
        assert!(Grid::new(0.0, 1.0, 1).is_err());
    }

    #[test]
    fn distribution_rejects_wrong_length() {
        let grid = Grid::new(0.0, 1.0, 4).unwrap();
        let err = Distribution::new(grid, vec![0.0; 3]).unwrap_err();
        assert_eq!(
            err,
            GridError::LengthMismatch {
                expected: 4,
                got: 3
            }
        );
    }

    #[test]
    fn mismatched_grids_are_incompatible() {
        let a = Distribution::new(Grid::new(0.0, 1.0, 4).unwrap(), vec![0.0; 4]).unwrap();
        let b = Distribution::new(Grid::new(0.0, 2.0, 4).unwrap(), vec![0.0; 4]).unwrap();
        assert!(a.check_compatible(&b).is_err());
    }

    #[test]
    fn smoothing_preserves_a_constant_signal() {
        let grid = Grid::new(0.0, 1.0, 5).unwrap();
        let dist = Distribution::new(grid, vec![2.0; 5]).unwrap();
        let smoothed = dist.smoothed(3);
        for v in smoothed.values() {
            assert!(f64_approx_equal(*v, 2.0));
        }
    }

    #[test]
    fn smoothing_averages_neighbors() {
        let grid = Grid::new(0.0, 1.0, 3).unwrap();
        let dist = Distribution::new(grid, vec![0.0, 3.0, 0.0]).unwrap();
        let smoothed = dist.smoothed(3);
        assert!(f64_approx_equal(smoothed.values()[1], 1.0));
        assert!(f64_approx_equal(smoothed.values()[0], 1.5));
    }
}
