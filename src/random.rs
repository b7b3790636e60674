//! Seeded random number generation and Gaussian batch sampling.
//!
//! Sampling exists to produce Monte Carlo evidence for the closed-form
//! moments; nothing on the moment computation path draws samples.
//!
//! # Reproducibility
//!
//! For reproducible experiments, use [`create_rng`] with a fixed seed.
//! The underlying algorithm (SmallRng) is deterministic for a given seed
//! on the same platform.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::affine::AffineMap;
use crate::error::{ensure_dim, MomentError, Result};

/// Creates a fast, seeded random number generator.
///
/// Uses `SmallRng` (Xoshiro256++) for high performance.
/// The sequence is deterministic for a given seed on the same platform.
///
/// # Examples
/// ```
/// use u_moments::random::create_rng;
/// use rand::Rng;
/// let mut rng = create_rng(42);
/// let x: f64 = rng.random();
/// assert!(x >= 0.0 && x < 1.0);
/// ```
pub fn create_rng(seed: u64) -> rand::rngs::SmallRng {
    use rand::SeedableRng;
    rand::rngs::SmallRng::seed_from_u64(seed)
}

/// Returns a factor `L` with `L·Lᵗ = S`.
///
/// Uses Cholesky when `S` is positive definite. A singular PSD `S` falls
/// back to the symmetric eigendecomposition `V·diag(√λ)` with eigenvalues
/// in `[-ε, 0)` clamped to zero, where `ε` scales with the largest
/// eigenvalue magnitude.
///
/// # Errors
/// - `ShapeMismatch` if `S` is not square.
/// - `NotPositiveSemiDefinite` if `S` has a non-finite entry or an
///   eigenvalue is clearly negative.
pub fn covariance_factor(s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = s.nrows();
    ensure_dim("columns of S vs rows of S", n, s.ncols())?;
    if s.iter().any(|v| !v.is_finite()) {
        return Err(MomentError::NotPositiveSemiDefinite(
            "matrix contains non-finite entries".to_string(),
        ));
    }
    if let Some(chol) = s.clone().cholesky() {
        return Ok(chol.l());
    }

    log::warn!("covariance is not positive definite; falling back to eigendecomposition");
    let eigen = s.clone().symmetric_eigen();
    let scale = eigen.eigenvalues.amax().max(f64::MIN_POSITIVE);
    let floor = -1e-10 * scale;
    if let Some(&lambda) = eigen.eigenvalues.iter().find(|&&l| l < floor) {
        return Err(MomentError::NotPositiveSemiDefinite(format!(
            "eigenvalue {lambda} is below {floor}"
        )));
    }
    let roots = eigen.eigenvalues.map(|l| l.max(0.0).sqrt());
    Ok(eigen.eigenvectors * DMatrix::from_diagonal(&roots))
}

/// Draws `n` samples of `x ~ N(M, S)` as an `n × N` batch (one per row).
///
/// Each row is `M + L·z` with `z ~ N(0, I)` and `L` from
/// [`covariance_factor`].
///
/// # Errors
/// - `ShapeMismatch` if `S` is not `M.len()`×`M.len()`.
/// - `NotPositiveSemiDefinite` if `S` cannot be factorized.
///
/// # Examples
/// ```
/// use nalgebra::{dvector, DMatrix};
/// use u_moments::random::{create_rng, sample_gaussian};
/// let mut rng = create_rng(7);
/// let batch = sample_gaussian(&dvector![0.0, 1.0], &DMatrix::identity(2, 2), 16, &mut rng).unwrap();
/// assert_eq!(batch.shape(), (16, 2));
/// ```
pub fn sample_gaussian<R: Rng + ?Sized>(
    m: &DVector<f64>,
    s: &DMatrix<f64>,
    n: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    let dim = m.len();
    ensure_dim("rows of S vs length of M", dim, s.nrows())?;
    let factor = covariance_factor(s)?;
    let shift = AffineMap::new(factor, m.clone())?;
    let z: DMatrix<f64> = DMatrix::from_fn(n, dim, |_, _| StandardNormal.sample(&mut *rng));
    shift.apply_batch(&z)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_create_rng_deterministic() {
        let mut rng1 = create_rng(42);
        let mut rng2 = create_rng(42);
        let vals1: Vec<f64> = (0..10).map(|_| rng1.random()).collect();
        let vals2: Vec<f64> = (0..10).map(|_| rng2.random()).collect();
        assert_eq!(vals1, vals2);
    }

    #[test]
    fn test_factor_positive_definite() {
        let s = dmatrix![4.0, 2.0; 2.0, 3.0];
        let l = covariance_factor(&s).unwrap();
        assert_relative_eq!(&l * l.transpose(), s, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_singular_psd() {
        // rank one
        let s = dmatrix![1.0, 2.0; 2.0, 4.0];
        let l = covariance_factor(&s).unwrap();
        assert_relative_eq!(&l * l.transpose(), s, epsilon = 1e-9);

        let zero = DMatrix::<f64>::zeros(3, 3);
        let l = covariance_factor(&zero).unwrap();
        assert_relative_eq!(&l * l.transpose(), zero, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_rejects_indefinite() {
        let s = dmatrix![1.0, 2.0; 2.0, 1.0];
        assert!(matches!(
            covariance_factor(&s),
            Err(MomentError::NotPositiveSemiDefinite(_))
        ));
        assert!(covariance_factor(&DMatrix::zeros(2, 3)).is_err());
    }

    #[test]
    fn test_non_finite_covariance_rejected() {
        let s = dmatrix![f64::NAN, 0.0; 0.0, 1.0];
        assert!(matches!(
            covariance_factor(&s),
            Err(MomentError::NotPositiveSemiDefinite(_))
        ));
        let inf = dmatrix![1.0, f64::INFINITY; f64::INFINITY, 1.0];
        assert!(covariance_factor(&inf).is_err());

        let m = dvector![0.0, 0.0];
        assert!(matches!(
            sample_gaussian(&m, &s, 4, &mut create_rng(0)),
            Err(MomentError::NotPositiveSemiDefinite(_))
        ));
    }

    #[test]
    fn test_sample_gaussian_shape_and_determinism() {
        let m = dvector![1.0, -1.0, 0.5];
        let s = DMatrix::identity(3, 3);
        let a = sample_gaussian(&m, &s, 50, &mut create_rng(3)).unwrap();
        let b = sample_gaussian(&m, &s, 50, &mut create_rng(3)).unwrap();
        assert_eq!(a.shape(), (50, 3));
        assert_eq!(a, b);
        assert!(sample_gaussian(&m, &s, 0, &mut create_rng(3)).unwrap().is_empty());
    }

    #[test]
    fn test_sample_gaussian_zero_covariance_is_point_mass() {
        let m = dvector![2.0, 3.0];
        let batch = sample_gaussian(&m, &DMatrix::zeros(2, 2), 10, &mut create_rng(1)).unwrap();
        for row in batch.row_iter() {
            assert_relative_eq!(row.transpose(), m, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sample_gaussian_shape_errors() {
        let mut rng = create_rng(0);
        let m = dvector![0.0, 0.0];
        assert!(sample_gaussian(&m, &DMatrix::identity(3, 3), 5, &mut rng).is_err());
        assert!(sample_gaussian(&m, &DMatrix::zeros(2, 3), 5, &mut rng).is_err());
    }
}
