//! Rank-correlation capability used by the correlation workers.
//!
//! Workers only depend on the [`RankCorrelation`] trait; [`Spearman`] is the
//! implementation the service ships with.

mod spearman;

pub use spearman::Spearman;

use crate::Result;

/// Computes a rank correlation coefficient and its two-sided p-value for two
/// equal-length samples.
pub trait RankCorrelation: Send + Sync {
    /// Returns `(rho, p)` with `rho` in `[-1, 1]` and `p` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Computation`](crate::Error::Computation) when the
    /// inputs differ in length or contain non-finite values.
    fn correlate(&self, a: &[f64], b: &[f64]) -> Result<(f64, f64)>;
}
