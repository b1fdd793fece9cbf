use super::grid::{Distribution, GridError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CorrectionError {
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("No grid point has nonzero density in both distributions")]
    NoValidBins,

    #[error("Cannot blend zero per-state tables")]
    EmptyBlend,
}

/// Per-state learning-rate schedule. The alpha value scales the Boltzmann
/// correction and doubles as the state's weight in the multistate blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlphaSchedule {
    Constant(f64),
    /// Linear interpolation from `initial` at iteration 0 to `end` at the
    /// final iteration of the run.
    Linear { initial: f64, end: f64 },
}

impl AlphaSchedule {
    pub fn at(&self, iteration: usize, total_iterations: usize) -> f64 {
        match *self {
            AlphaSchedule::Constant(alpha) => alpha,
            AlphaSchedule::Linear { initial, end } => {
                if total_iterations <= 1 {
                    return initial;
                }
                let frac = iteration as f64 / (total_iterations - 1) as f64;
                initial + (end - initial) * frac.min(1.0)
            }
        }
    }
}

/// One iterative-Boltzmann-inversion step for a single state.
///
/// At every bin where both distributions are nonzero the potential moves by
/// exactly `alpha * kT * ln(current / target)`. Bins with insufficient
/// sampling in either distribution are not corrected directly; they are
/// filled by monotone extension from the nearest corrected neighbors so the
/// table stays free of discontinuities.
pub fn ibi_update(
    potential: &[f64],
    current: &Distribution,
    target: &Distribution,
    kt: f64,
    alpha: f64,
) -> Result<Vec<f64>, CorrectionError> {
    current.check_compatible(target)?;
    if potential.len() != current.grid().n_bins {
        return Err(GridError::LengthMismatch {
            expected: current.grid().n_bins,
            got: potential.len(),
        }
        .into());
    }

    let mut updated: Vec<f64> = potential
        .iter()
        .zip(current.values().iter().zip(target.values()))
        .map(|(&v, (&c, &t))| {
            if c > 0.0 && t > 0.0 {
                v + alpha * kt * (c / t).ln()
            } else {
                f64::NAN
            }
        })
        .collect();
    fill_invalid(&mut updated)?;
    Ok(updated)
}

/// Replaces NaN markers by extension from corrected bins: interior gaps are
/// linearly interpolated, the never-sampled head is extrapolated from the
/// first two valid points, and trailing bins continue the slope of the last
/// two valid points.
fn fill_invalid(values: &mut [f64]) -> Result<(), CorrectionError> {
    let valid: Vec<usize> = (0..values.len())
        .filter(|&i| values[i].is_finite())
        .collect();
    let (&first, &last) = match (valid.first(), valid.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(CorrectionError::NoValidBins),
    };

    // Interior gaps between pairs of valid bins.
    for w in valid.windows(2) {
        let (a, b) = (w[0], w[1]);
        if b > a + 1 {
            let step = (values[b] - values[a]) / (b - a) as f64;
            for i in (a + 1)..b {
                values[i] = values[a] + step * (i - a) as f64;
            }
        }
    }

    if first == last {
        let v = values[first];
        values.fill(v);
        return Ok(());
    }

    let head_slope = values[first + 1] - values[first];
    for i in 0..first {
        values[i] = values[first] - head_slope * (first - i) as f64;
    }
    let tail_slope = values[last] - values[last - 1];
    for i in (last + 1)..values.len() {
        values[i] = values[last] + tail_slope * (i - last) as f64;
    }
    Ok(())
}

/// Blends per-state corrected tables into one updated table, weighted by
/// each state's alpha. With all weights zero (every state a no-op) the
/// plain average is returned, which leaves the potential unchanged.
pub fn blend(corrections: &[(f64, Vec<f64>)]) -> Result<Vec<f64>, CorrectionError> {
    let (first, rest) = corrections.split_first().ok_or(CorrectionError::EmptyBlend)?;
    let n = first.1.len();
    for (_, table) in rest {
        if table.len() != n {
            return Err(GridError::LengthMismatch {
                expected: n,
                got: table.len(),
            }
            .into());
        }
    }

    let total: f64 = corrections.iter().map(|(alpha, _)| alpha).sum();
    let mut blended = vec![0.0; n];
    for (alpha, table) in corrections {
        let weight = if total > 0.0 {
            alpha / total
        } else {
            1.0 / corrections.len() as f64
        };
        for (out, v) in blended.iter_mut().zip(table) {
            *out += weight * v;
        }
    }
    Ok(blended)
}

/// Forces the potential smoothly to zero beyond the switch radius using the
/// XPLOR switching function, the same shape the simulation engine applies at
/// its cutoff. The switch snaps to the nearest grid point; the value and
/// slope there are untouched and the value at the outer cutoff is exactly
/// zero.
pub fn tail_correction(r: &[f64], potential: &[f64], r_switch: f64) -> Vec<f64> {
    debug_assert_eq!(r.len(), potential.len());
    let r_cut = *r.last().expect("tail correction on an empty table");
    let idx_switch = nearest_index(r, r_switch);
    let rs = r[idx_switch];
    let rc2 = r_cut * r_cut;
    let rs2 = rs * rs;
    let denom = (rc2 - rs2).powi(3);

    potential
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if i < idx_switch {
                v
            } else {
                let r2 = r[i] * r[i];
                let s = (rc2 - r2).powi(2) * (rc2 + 2.0 * r2 - 3.0 * rs2) / denom;
                v * s
            }
        })
        .collect()
}

fn nearest_index(xs: &[f64], x: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &xi) in xs.iter().enumerate() {
        let d = (xi - x).abs();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}
