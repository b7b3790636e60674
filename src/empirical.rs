//! Empirical counterparts of the closed-form moments.
//!
//! Batches are `n × N` matrices with the batch dimension on the leading
//! axis (one sample per row). The batch statistics use the population
//! (`n`) denominator, matching `E[(x − μ)(x − μ)ᵗ]` rather than its
//! unbiased estimator.
//!
//! [`tightness`] compares an analytic result with its Monte Carlo
//! estimate; [`monte_carlo_check`] runs the whole experiment for one
//! affine map.

use nalgebra::storage::RawStorage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};
use serde::{Deserialize, Serialize};

use crate::affine::AffineMap;
use crate::error::{ensure_dim, MomentError, Result};
use crate::random::{create_rng, sample_gaussian};
use crate::stats::{ensure_non_empty, kahan_sum, MomentAccumulator};

/// Per-column mean of a batch, using compensated summation.
///
/// # Errors
/// `EmptyBatch` if `samples` has no rows.
///
/// # Examples
/// ```
/// use nalgebra::{dmatrix, dvector};
/// use u_moments::empirical::batch_mean;
/// let samples = dmatrix![1.0, 10.0; 3.0, 20.0];
/// assert_eq!(batch_mean(&samples).unwrap(), dvector![2.0, 15.0]);
/// ```
pub fn batch_mean(samples: &DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_non_empty(samples)?;
    let n = samples.nrows() as f64;
    Ok(DVector::from_iterator(
        samples.ncols(),
        samples.column_iter().map(|col| kahan_sum(col.iter().copied()) / n),
    ))
}

/// Per-column population variance of a batch.
///
/// # Errors
/// `EmptyBatch` if `samples` has no rows.
pub fn batch_variance(samples: &DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_non_empty(samples)?;
    MomentAccumulator::from_batch(samples)
        .population_variance()
        .ok_or(MomentError::EmptyBatch)
}

/// Population covariance (N×N) of a batch.
///
/// # Errors
/// `EmptyBatch` if `samples` has no rows.
///
/// # Examples
/// ```
/// use nalgebra::dmatrix;
/// use u_moments::empirical::batch_covariance;
/// let samples = dmatrix![0.0, 0.0; 2.0, 4.0];
/// let cov = batch_covariance(&samples).unwrap();
/// assert_eq!(cov, dmatrix![1.0, 2.0; 2.0, 4.0]);
/// ```
pub fn batch_covariance(samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_non_empty(samples)?;
    MomentAccumulator::from_batch(samples)
        .population_covariance()
        .ok_or(MomentError::EmptyBatch)
}

/// Outcome of comparing a closed-form value with an empirical estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TightnessReport {
    /// Largest `|closed − empirical|` over all entries.
    pub max_abs_error: f64,
    /// `max_abs_error` divided by the largest `|closed|` entry, floored at 1.
    pub max_rel_error: f64,
    /// Tolerance the comparison was made against.
    pub tolerance: f64,
    /// Number of entries compared.
    pub entries: usize,
}

impl TightnessReport {
    /// True when every entry agrees within the tolerance.
    ///
    /// The tolerance is scaled by the magnitude of the closed-form value
    /// (at least 1): absolute for small quantities, relative for large
    /// ones. Off-diagonal covariance entries are judged against the scale
    /// of the whole matrix, not their own, often near-zero, value.
    pub fn is_tight(&self) -> bool {
        self.max_rel_error <= self.tolerance
    }
}

/// Compares `closed_form` against `empirical` entry by entry.
///
/// Works for any pair of equally shaped matrices or vectors.
///
/// # Errors
/// - `ShapeMismatch` if the shapes differ.
/// - `InvalidParameter` if `tolerance` is not finite and positive.
///
/// # Examples
/// ```
/// use nalgebra::dvector;
/// use u_moments::empirical::tightness;
/// let report = tightness(&dvector![1.0, 100.0], &dvector![1.01, 101.0], 0.02).unwrap();
/// assert!(report.is_tight());
/// assert!((report.max_abs_error - 1.0).abs() < 1e-12);
/// ```
pub fn tightness<R, C, S1, S2>(
    closed_form: &Matrix<f64, R, C, S1>,
    empirical: &Matrix<f64, R, C, S2>,
    tolerance: f64,
) -> Result<TightnessReport>
where
    R: Dim,
    C: Dim,
    S1: RawStorage<f64, R, C>,
    S2: RawStorage<f64, R, C>,
{
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(MomentError::InvalidParameter(format!(
            "tolerance must be finite and > 0, got {tolerance}"
        )));
    }
    let (rows, cols) = closed_form.shape();
    ensure_dim("rows of empirical vs closed form", rows, empirical.nrows())?;
    ensure_dim("columns of empirical vs closed form", cols, empirical.ncols())?;

    let mut max_abs_error = 0.0_f64;
    let mut scale = 1.0_f64;
    for (&c, &e) in closed_form.iter().zip(empirical.iter()) {
        let err = (c - e).abs();
        // NaN must fail the comparison rather than vanish in `max`.
        let err = if err.is_nan() { f64::INFINITY } else { err };
        max_abs_error = max_abs_error.max(err);
        scale = scale.max(c.abs());
    }
    let max_rel_error = max_abs_error / scale;

    let report = TightnessReport {
        max_abs_error,
        max_rel_error,
        tolerance,
        entries: rows * cols,
    };
    log::debug!(
        "tightness: {} entries, max abs error {:.3e}, max rel error {:.3e}, tolerance {:.3e}",
        report.entries,
        report.max_abs_error,
        report.max_rel_error,
        report.tolerance
    );
    Ok(report)
}

/// Parameters for a Monte Carlo agreement experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of samples drawn from the input distribution.
    pub batch_size: usize,
    /// Seed for [`create_rng`].
    pub seed: u64,
    /// Tolerance passed to [`tightness`].
    pub tolerance: f64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self { batch_size: 100_000, seed: 42, tolerance: 0.05 }
    }
}

impl MonteCarloConfig {
    /// Checks that the batch is large enough and the tolerance is usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 2 {
            return Err(MomentError::InvalidParameter(format!(
                "batch_size must be >= 2, got {}",
                self.batch_size
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(MomentError::InvalidParameter(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Tightness of the mean and covariance of one affine map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub mean: TightnessReport,
    pub covariance: TightnessReport,
}

impl MonteCarloReport {
    pub fn is_tight(&self) -> bool {
        self.mean.is_tight() && self.covariance.is_tight()
    }
}

/// Checks the closed-form mean and covariance of `map` against a Monte
/// Carlo estimate.
///
/// Draws `config.batch_size` samples of `x ~ N(M, S)`, maps each one
/// through `map`, and compares `batch_mean`/`batch_covariance` of the
/// outputs with `map.mean(M)`/`map.covariance(S)`.
///
/// # Errors
/// Shape errors from the map or the input moments, `InvalidParameter`
/// for a bad config, `NotPositiveSemiDefinite` if `S` cannot be sampled.
pub fn monte_carlo_check(
    map: &AffineMap,
    m: &DVector<f64>,
    s: &DMatrix<f64>,
    config: &MonteCarloConfig,
) -> Result<MonteCarloReport> {
    config.validate()?;
    let closed_mean = map.mean(m)?;
    let closed_cov = map.covariance(s)?;

    let mut rng = create_rng(config.seed);
    let inputs = sample_gaussian(m, s, config.batch_size, &mut rng)?;
    let outputs = map.apply_batch(&inputs)?;

    let report = MonteCarloReport {
        mean: tightness(&closed_mean, &batch_mean(&outputs)?, config.tolerance)?,
        covariance: tightness(&closed_cov, &batch_covariance(&outputs)?, config.tolerance)?,
    };
    if !report.is_tight() {
        log::warn!(
            "closed-form moments disagree with {} samples: mean rel error {:.3e}, covariance rel error {:.3e} (tolerance {:.3e})",
            config.batch_size,
            report.mean.max_rel_error,
            report.covariance.max_rel_error,
            config.tolerance
        );
    }
    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn batch_mean_is_affine_equivariant(
            rows in 1_usize..30,
            values in proptest::collection::vec(-100.0_f64..100.0, 60),
            scale in -10.0_f64..10.0,
            shift in -10.0_f64..10.0,
        ) {
            let samples = DMatrix::from_fn(rows, 2, |i, j| values[i * 2 + j]);
            let transformed = samples.map(|x| scale * x + shift);
            let expected = batch_mean(&samples).unwrap().map(|x| scale * x + shift);
            let got = batch_mean(&transformed).unwrap();
            prop_assert!((got - &expected).amax() < 1e-9 * expected.amax().max(1.0));
        }

        #[test]
        fn batch_covariance_ignores_shift(
            rows in 2_usize..30,
            values in proptest::collection::vec(-100.0_f64..100.0, 60),
            shift in -1e3_f64..1e3,
        ) {
            let samples = DMatrix::from_fn(rows, 2, |i, j| values[i * 2 + j]);
            let shifted = samples.add_scalar(shift);
            let c0 = batch_covariance(&samples).unwrap();
            let c1 = batch_covariance(&shifted).unwrap();
            prop_assert!((&c0 - &c1).amax() < 1e-7 * c0.amax().max(1.0));
        }

        #[test]
        fn tightness_is_reflexive(values in proptest::collection::vec(-1e6_f64..1e6, 1..20)) {
            let v = DVector::from_vec(values);
            prop_assert!(tightness(&v, &v, 1e-12).unwrap().is_tight());
        }
    }
}
