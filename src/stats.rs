//! Streaming sample statistics for batches of vectors.
//!
//! # Algorithms
//!
//! - **Sum**: Neumaier compensated summation for O(ε) error independent of n.
//! - **Mean vector / co-moment matrix**: multivariate Welford update.
//!   Reference: Welford (1962), "Note on a Method for Calculating
//!   Corrected Sums of Squares and Products", *Technometrics* 4(3).
//! - **Merge**: Chan, Golub & LeVeque (1979), "Updating Formulae and a
//!   Pairwise Algorithm for Computing Sample Variances", generalized to
//!   the outer-product co-moment.

use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_dim, MomentError, Result};

/// Neumaier compensated summation for O(ε) error independent of `n`.
///
/// An improved variant of Kahan summation that also handles the case
/// where the addend is larger in magnitude than the running sum.
///
/// Reference: Neumaier (1974), *Zeitschrift für Angewandte Mathematik
/// und Mechanik* 54(1), pp. 39–51.
///
/// # Examples
/// ```
/// use u_moments::stats::kahan_sum;
/// let v = [1e16, 1.0, -1e16];
/// assert_eq!(kahan_sum(v.iter().copied()), 1.0);
/// ```
pub fn kahan_sum<I: IntoIterator<Item = f64>>(data: I) -> f64 {
    let mut sum = 0.0_f64;
    let mut c = 0.0_f64;
    for x in data {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            c += (sum - t) + x;
        } else {
            c += (x - t) + sum;
        }
        sum = t;
    }
    sum + c
}

/// Streaming accumulator for the mean vector and covariance of
/// N-dimensional samples.
///
/// Maintains the running mean `μ` and the co-moment matrix
/// `C = Σ (xᵢ − μ)(xᵢ − μ)ᵗ` in a single pass with O(N²) memory.
///
/// # Examples
/// ```
/// use u_moments::stats::MomentAccumulator;
/// let mut acc = MomentAccumulator::new(2);
/// acc.update(&[1.0, 2.0]).unwrap();
/// acc.update(&[3.0, 6.0]).unwrap();
/// let cov = acc.population_covariance().unwrap();
/// assert!((cov[(0, 1)] - 2.0).abs() < 1e-15);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MomentAccumulator {
    count: u64,
    mean_acc: DVector<f64>,
    comoment: DMatrix<f64>,
}

impl MomentAccumulator {
    /// Creates an empty accumulator for `dim`-dimensional samples.
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            mean_acc: DVector::zeros(dim),
            comoment: DMatrix::zeros(dim, dim),
        }
    }

    /// Builds an accumulator from every row of `samples` (n×N).
    pub fn from_batch(samples: &DMatrix<f64>) -> Self {
        let mut acc = Self::new(samples.ncols());
        let mut row_buf = vec![0.0; samples.ncols()];
        for row in samples.row_iter() {
            for (dst, &src) in row_buf.iter_mut().zip(row.iter()) {
                *dst = src;
            }
            acc.push(&row_buf);
        }
        acc
    }

    /// Sample dimension N.
    pub fn dim(&self) -> usize {
        self.mean_acc.len()
    }

    /// Returns the number of samples seen so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Feeds one sample into the accumulator.
    ///
    /// # Errors
    /// `ShapeMismatch` if `x.len() != self.dim()`.
    pub fn update(&mut self, x: &[f64]) -> Result<()> {
        ensure_dim("sample length vs accumulator dimension", self.dim(), x.len())?;
        self.push(x);
        Ok(())
    }

    fn push(&mut self, x: &[f64]) {
        self.count += 1;
        let n = self.count as f64;
        let x = DVector::from_column_slice(x);
        let delta = &x - &self.mean_acc;
        self.mean_acc += &delta / n;
        // Uses the pre- and post-update deviations; their outer product
        // adds exactly the new sample's contribution to C.
        let delta_after = &x - &self.mean_acc;
        self.comoment.ger(1.0, &delta, &delta_after, 1.0);
    }

    /// Returns the running mean, or `None` if no samples have been added.
    pub fn mean(&self) -> Option<DVector<f64>> {
        if self.count == 0 {
            None
        } else {
            Some(self.mean_acc.clone())
        }
    }

    fn scaled_comoment(&self, denom: f64) -> DMatrix<f64> {
        let c = &self.comoment / denom;
        (&c + c.transpose()) * 0.5
    }

    /// Returns the population covariance (n denominator), or `None` if no
    /// samples have been added.
    pub fn population_covariance(&self) -> Option<DMatrix<f64>> {
        if self.count == 0 {
            None
        } else {
            Some(self.scaled_comoment(self.count as f64))
        }
    }

    /// Returns the sample covariance (n − 1 denominator), or `None` if
    /// fewer than 2 samples have been added.
    pub fn sample_covariance(&self) -> Option<DMatrix<f64>> {
        if self.count < 2 {
            None
        } else {
            Some(self.scaled_comoment((self.count - 1) as f64))
        }
    }

    /// Returns the per-dimension population variance, or `None` if no
    /// samples have been added.
    pub fn population_variance(&self) -> Option<DVector<f64>> {
        if self.count == 0 {
            None
        } else {
            Some(self.comoment.diagonal() / self.count as f64)
        }
    }

    /// Merges another accumulator into this one (parallel-friendly).
    ///
    /// # Errors
    /// `ShapeMismatch` if the two accumulators have different dimensions.
    pub fn merge(&mut self, other: &MomentAccumulator) -> Result<()> {
        ensure_dim("merged accumulator dimension", self.dim(), other.dim())?;
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let total = self.count + other.count;
        let n = total as f64;
        let delta = &other.mean_acc - &self.mean_acc;

        self.mean_acc += &delta * (nb / n);
        self.comoment += &other.comoment;
        self.comoment.ger(na * nb / n, &delta, &delta, 1.0);
        self.count = total;
        Ok(())
    }
}

/// Errors with `EmptyBatch` unless `samples` has at least one row.
pub(crate) fn ensure_non_empty(samples: &DMatrix<f64>) -> Result<()> {
    if samples.nrows() == 0 {
        Err(MomentError::EmptyBatch)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_kahan_sum_cancellation() {
        let v = [1.0, 1e100, 1.0, -1e100];
        assert_eq!(kahan_sum(v.iter().copied()), 2.0);
        assert_eq!(kahan_sum(std::iter::empty()), 0.0);
    }

    #[test]
    fn test_accumulator_empty() {
        let acc = MomentAccumulator::new(3);
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.dim(), 3);
        assert!(acc.mean().is_none());
        assert!(acc.population_covariance().is_none());
        assert!(acc.population_variance().is_none());
        assert!(acc.sample_covariance().is_none());
    }

    #[test]
    fn test_accumulator_single_sample() {
        let mut acc = MomentAccumulator::new(2);
        acc.update(&[3.0, -1.0]).unwrap();
        assert_eq!(acc.mean().unwrap(), dvector![3.0, -1.0]);
        assert_eq!(acc.population_covariance().unwrap(), DMatrix::<f64>::zeros(2, 2));
        assert!(acc.sample_covariance().is_none());
    }

    #[test]
    fn test_accumulator_known_values() {
        let samples = dmatrix![
            1.0, 2.0;
            2.0, 4.0;
            3.0, 6.0;
            4.0, 8.0
        ];
        let acc = MomentAccumulator::from_batch(&samples);
        assert_eq!(acc.count(), 4);
        assert_relative_eq!(acc.mean().unwrap(), dvector![2.5, 5.0], epsilon = 1e-14);
        // population var of [1,2,3,4] = 1.25
        assert_relative_eq!(
            acc.population_covariance().unwrap(),
            dmatrix![1.25, 2.5; 2.5, 5.0],
            epsilon = 1e-12
        );
        assert_relative_eq!(
            acc.sample_covariance().unwrap(),
            dmatrix![5.0 / 3.0, 10.0 / 3.0; 10.0 / 3.0, 20.0 / 3.0],
            epsilon = 1e-12
        );
        assert_relative_eq!(
            acc.population_variance().unwrap(),
            dvector![1.25, 5.0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_accumulator_dimension_mismatch() {
        let mut acc = MomentAccumulator::new(2);
        assert!(matches!(
            acc.update(&[1.0]),
            Err(MomentError::ShapeMismatch { expected: 2, got: 1, .. })
        ));
        assert!(acc.merge(&MomentAccumulator::new(3)).is_err());
    }

    #[test]
    fn test_accumulator_offset_data() {
        // Large offset: naive E[x²] − E[x]² would lose all precision.
        let offset = 1e9;
        let samples = dmatrix![
            offset + 4.0;
            offset + 7.0;
            offset + 13.0;
            offset + 16.0
        ];
        let acc = MomentAccumulator::from_batch(&samples);
        let var = acc.population_variance().unwrap()[0];
        assert!((var - 22.5).abs() < 1e-6, "variance of offset data should be 22.5, got {var}");
    }

    #[test]
    fn test_merge_with_empty() {
        let mut a = MomentAccumulator::new(1);
        let mut b = MomentAccumulator::new(1);
        b.update(&[2.0]).unwrap();
        b.update(&[4.0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a, b);
        a.merge(&MomentAccumulator::new(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ensure_non_empty() {
        assert_eq!(ensure_non_empty(&DMatrix::zeros(0, 2)), Err(MomentError::EmptyBatch));
        assert!(ensure_non_empty(&DMatrix::zeros(1, 2)).is_ok());
    }
}
