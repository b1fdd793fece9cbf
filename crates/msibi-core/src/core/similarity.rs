use super::grid::{Distribution, GridError};

/// F-fit score between two distributions on matching grids.
///
/// Defined as `1 - sum(|c_i - t_i|) / sum(|c_i| + |t_i|)`, giving 1.0 for a
/// perfect match and 0.0 for maximal disagreement. A zero denominator (both
/// distributions identically zero) scores 0.0 rather than dividing.
pub fn fit_score(current: &Distribution, target: &Distribution) -> Result<f64, GridError> {
    current.check_compatible(target)?;

    let mut diff = 0.0;
    let mut norm = 0.0;
    for (c, t) in current.values().iter().zip(target.values()) {
        diff += (c - t).abs();
        norm += c.abs() + t.abs();
    }
    if norm == 0.0 {
        return Ok(0.0);
    }
    Ok(1.0 - diff / norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Grid;

    const TOLERANCE: f64 = 1e-12;

    fn dist(values: Vec<f64>) -> Distribution {
        let grid = Grid::new(0.0, 1.0, values.len()).unwrap();
        Distribution::new(grid, values).unwrap()
    }

    #[test]
    fn identical_nonzero_distributions_score_one() {
        let x = dist(vec![0.5, 1.0, 2.0, 0.1]);
        assert!((fit_score(&x, &x).unwrap() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn score_is_symmetric() {
        let a = dist(vec![0.5, 1.0, 2.0, 0.1]);
        let b = dist(vec![0.7, 0.9, 1.5, 0.3]);
        let ab = fit_score(&a, &b).unwrap();
        let ba = fit_score(&b, &a).unwrap();
        assert!((ab - ba).abs() < TOLERANCE);
    }

    #[test]
    fn disjoint_distributions_score_zero() {
        let a = dist(vec![1.0, 0.0, 2.0, 0.0]);
        let b = dist(vec![0.0, 1.0, 0.0, 2.0]);
        assert!(fit_score(&a, &b).unwrap().abs() < TOLERANCE);
    }

    #[test]
    fn all_zero_distributions_score_zero_without_dividing() {
        let a = dist(vec![0.0; 4]);
        let b = dist(vec![0.0; 4]);
        assert_eq!(fit_score(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_grids_are_an_error() {
        let a = dist(vec![1.0; 4]);
        let grid = Grid::new(0.0, 2.0, 4).unwrap();
        let b = Distribution::new(grid, vec![1.0; 4]).unwrap();
        assert!(fit_score(&a, &b).is_err());
    }
}
