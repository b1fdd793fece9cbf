use super::grid::{Grid, GridError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum PotentialError {
    #[error("Tabulated potential holds {got} values but the grid has {expected} bins")]
    TableLength { expected: usize, got: usize },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Functional form of an interaction potential.
///
/// This is a closed set: the optimizer refines the `Tabulated` form, while
/// `Harmonic` and `Polynomial` describe fixed analytic terms that are
/// evaluated onto the working grid once at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PotentialForm {
    /// `0.5 * k * (x - x0)^2`
    Harmonic { k: f64, x0: f64 },
    /// `sum_i coeffs[i] * (x - x0)^i`
    Polynomial { x0: f64, coeffs: Vec<f64> },
    /// Values sampled directly on the working grid, in bin order.
    Tabulated { values: Vec<f64> },
}

impl PotentialForm {
    pub fn label(&self) -> &'static str {
        match self {
            PotentialForm::Harmonic { .. } => "harmonic",
            PotentialForm::Polynomial { .. } => "polynomial",
            PotentialForm::Tabulated { .. } => "tabulated",
        }
    }

    /// Pointwise evaluation for the analytic forms; `None` for `Tabulated`,
    /// which only exists as a whole table.
    #[inline]
    pub fn evaluate(&self, x: f64) -> Option<f64> {
        match self {
            PotentialForm::Harmonic { k, x0 } => Some(0.5 * k * (x - x0).powi(2)),
            PotentialForm::Polynomial { x0, coeffs } => {
                let dx = x - x0;
                Some(
                    coeffs
                        .iter()
                        .rev()
                        .fold(0.0, |acc, c| acc * dx + c),
                )
            }
            PotentialForm::Tabulated { .. } => None,
        }
    }

    /// Materializes the form as a table over the grid's bin centers.
    pub fn to_table(&self, grid: &Grid) -> Result<Vec<f64>, PotentialError> {
        match self {
            PotentialForm::Tabulated { values } => {
                if values.len() != grid.n_bins {
                    return Err(PotentialError::TableLength {
                        expected: grid.n_bins,
                        got: values.len(),
                    });
                }
                Ok(values.clone())
            }
            _ => Ok(grid
                .centers()
                .iter()
                .map(|&x| self.evaluate(x).unwrap())
                .collect()),
        }
    }
}

/// Purely repulsive `epsilon * (sigma / r)^m` table, the usual starting
/// guess for an optimized pair potential. Values are capped to avoid the
/// singularity in never-sampled head bins.
pub fn repulsive_initial_guess(grid: &Grid, epsilon: f64, sigma: f64, m: i32) -> Vec<f64> {
    const CAP: f64 = 1e2;
    grid.centers()
        .iter()
        .map(|&r| {
            if r <= 0.0 {
                CAP
            } else {
                (epsilon * (sigma / r).powi(m)).min(CAP)
            }
        })
        .collect()
}
