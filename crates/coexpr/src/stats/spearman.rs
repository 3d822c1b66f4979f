use super::RankCorrelation;
use crate::{Error, Result};
use statrs::function::beta::checked_beta_reg;

/// Spearman's rank correlation with midranks for ties.
///
/// `rho` is the Pearson correlation of the two rank vectors. The p-value is
/// two-sided, taken from Student's t distribution with `n - 2` degrees of
/// freedom.
///
/// Degenerate inputs do not fail: fewer than three observations give
/// `p = 1`, and a constant vector (no rank variance) gives `(0, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spearman;

impl RankCorrelation for Spearman {
    fn correlate(&self, a: &[f64], b: &[f64]) -> Result<(f64, f64)> {
        if a.len() != b.len() {
            return Err(Error::Computation {
                reason: format!("vector lengths differ ({} vs {})", a.len(), b.len()),
            });
        }
        if a.iter().chain(b).any(|v| !v.is_finite()) {
            return Err(Error::Computation {
                reason: "vectors contain non-finite values".to_string(),
            });
        }

        let n = a.len();
        let rank_a = midranks(a);
        let rank_b = midranks(b);

        let Some(rho) = pearson(&rank_a, &rank_b) else {
            return Ok((0.0, 1.0));
        };
        let rho = rho.clamp(-1.0, 1.0);

        Ok((rho, two_sided_p(rho, n)?))
    }
}

/// 1-based ranks, ties share the mean of the ranks they span.
fn midranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Ranks start..end (0-based) map to start+1..=end.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// `None` when either side has zero variance.
fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

fn two_sided_p(rho: f64, n: usize) -> Result<f64> {
    if n < 3 {
        return Ok(1.0);
    }
    let fac = (1.0 - rho) * (1.0 + rho);
    if fac <= 0.0 {
        return Ok(0.0);
    }

    let df = (n - 2) as f64;
    let t_sq = rho * rho * df / fac;
    let p = checked_beta_reg(0.5 * df, 0.5, df / (df + t_sq)).map_err(|e| Error::Computation {
        reason: format!("incomplete beta failed: {e}"),
    })?;
    Ok(p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn perfectly_monotonic_is_one() {
        let (rho, p) = Spearman
            .correlate(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0])
            .unwrap();
        assert!((rho - 1.0).abs() < EPS);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn reversed_is_minus_one() {
        let (rho, p) = Spearman
            .correlate(&[1.0, 2.0, 3.0, 4.0], &[4.0, 3.0, 2.0, 1.0])
            .unwrap();
        assert!((rho + 1.0).abs() < EPS);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn monotonic_but_nonlinear_is_one() {
        let (rho, _) = Spearman
            .correlate(&[1.0, 2.0, 3.0, 4.0, 5.0], &[1.0, 8.0, 27.0, 64.0, 125.0])
            .unwrap();
        assert!((rho - 1.0).abs() < EPS);
    }

    #[test]
    fn matches_t_distribution_p_value() {
        let x: Vec<f64> = (1..=10).map(f64::from).collect();
        let y = [1.0, 5.0, 3.0, 2.0, 7.0, 8.0, 9.0, 6.0, 10.0, 4.0];

        let (rho, p) = Spearman.correlate(&x, &y).unwrap();
        assert!((rho - 0.6).abs() < 1e-9);
        assert!((p - 0.066_688).abs() < 1e-4, "p = {p}");
    }

    #[test]
    fn ties_use_midranks() {
        assert_eq!(midranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(midranks(&[7.0, 7.0, 7.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn constant_vector_has_no_association() {
        let (rho, p) = Spearman
            .correlate(&[1.0, 2.0, 3.0, 4.0], &[0.0, 0.0, 0.0, 0.0])
            .unwrap();
        assert_eq!((rho, p), (0.0, 1.0));
    }

    #[test]
    fn too_few_observations_have_p_one() {
        let (rho, p) = Spearman.correlate(&[1.0, 2.0], &[3.0, 4.0]).unwrap();
        assert!((rho - 1.0).abs() < EPS);
        assert_eq!(p, 1.0);
    }

    #[test]
    fn length_mismatch_is_a_computation_error() {
        let err = Spearman.correlate(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::Computation { .. }));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let err = Spearman
            .correlate(&[1.0, f64::NAN, 3.0], &[1.0, 2.0, 3.0])
            .unwrap_err();
        assert!(matches!(err, Error::Computation { .. }));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let a: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64).collect();
        let b: Vec<f64> = (0..500).map(|i| ((i * 53) % 89) as f64).collect();

        let first = Spearman.correlate(&a, &b).unwrap();
        for _ in 0..10 {
            assert_eq!(Spearman.correlate(&a, &b).unwrap(), first);
        }
        assert!((-1.0..=1.0).contains(&first.0));
        assert!((0.0..=1.0).contains(&first.1));
    }
}
