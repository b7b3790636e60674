//! Closed-form moments of affine transformations.
//!
//! Let `x` be a random vector of size N with mean `M` and covariance `S`.
//! For `y = A·x + b` with `A` of shape K×N:
//!
//! | Moment | Closed form |
//! |---|---|
//! | mean | `A·M + b` |
//! | covariance | `A·S·Aᵗ` |
//! | variance | `diag(A·S·Aᵗ)` |
//! | second moment | `variance + mean²` |
//! | correlation | `A·S·Aᵗ + outer(mean, mean)` |
//!
//! These identities hold for **any** input distribution with finite
//! second moments; nothing here assumes Gaussianity.
//!
//! # Caller contract
//!
//! `S` is expected to be symmetric positive semi-definite. It is not
//! checked here: an invalid `S` produces mechanically computed output
//! (possibly a non-PSD covariance or negative variances). Use
//! [`check_covariance`] to validate explicitly.

use nalgebra::{DMatrix, DVector};

use crate::error::{ensure_dim, MomentError, Result};

/// Additive term of an affine map.
///
/// A scalar is broadcast to every output; `Bias::Scalar(0.0)` is the
/// zero bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bias<'a> {
    Scalar(f64),
    Vector(&'a DVector<f64>),
}

impl From<f64> for Bias<'_> {
    fn from(value: f64) -> Self {
        Bias::Scalar(value)
    }
}

impl<'a> From<&'a DVector<f64>> for Bias<'a> {
    fn from(value: &'a DVector<f64>) -> Self {
        Bias::Vector(value)
    }
}

impl Bias<'_> {
    fn add_to(self, v: &mut DVector<f64>) -> Result<()> {
        match self {
            Bias::Scalar(s) => v.add_scalar_mut(s),
            Bias::Vector(b) => {
                ensure_dim("bias length vs rows of A", v.len(), b.len())?;
                *v += b;
            }
        }
        Ok(())
    }
}

/// Checks that `s` is N×N where N is the column count of `a`.
fn ensure_input_covariance(a: &DMatrix<f64>, s: &DMatrix<f64>) -> Result<()> {
    ensure_dim("rows of S vs columns of A", a.ncols(), s.nrows())?;
    ensure_dim("columns of S vs columns of A", a.ncols(), s.ncols())
}

/// Mean of `A·x + b`: `A·M + b`.
///
/// # Errors
/// `ShapeMismatch` if `A.ncols() != M.len()` or a vector bias does not
/// have `A.nrows()` entries.
///
/// # Examples
/// ```
/// use nalgebra::{dmatrix, dvector};
/// use u_moments::affine::mean;
/// let a = dmatrix![2.0, 0.0; 0.0, 3.0];
/// let m = dvector![1.0, -1.0];
/// let y = mean(&a, 1.0, &m).unwrap();
/// assert_eq!(y, dvector![3.0, -2.0]);
/// ```
pub fn mean<'b>(
    a: &DMatrix<f64>,
    b: impl Into<Bias<'b>>,
    m: &DVector<f64>,
) -> Result<DVector<f64>> {
    ensure_dim("length of M vs columns of A", a.ncols(), m.len())?;
    let mut out = a * m;
    b.into().add_to(&mut out)?;
    Ok(out)
}

/// Marginal variances of `A·x + b`: the diagonal of `A·S·Aᵗ`.
///
/// Entry `i` is `Aᵢ·S·Aᵢᵗ`. The K×K covariance is never formed; the cost
/// is one K×N by N×N product plus an elementwise pass.
///
/// # Errors
/// `ShapeMismatch` if `S` is not N×N with `N = A.ncols()`.
///
/// # Examples
/// ```
/// use nalgebra::{dmatrix, dvector, DMatrix};
/// use u_moments::affine::variance;
/// let a = dmatrix![2.0, 0.0; 0.0, 3.0];
/// let v = variance(&a, &DMatrix::identity(2, 2)).unwrap();
/// assert_eq!(v, dvector![4.0, 9.0]);
/// ```
pub fn variance(a: &DMatrix<f64>, s: &DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_input_covariance(a, s)?;
    // diag(A S Aᵗ)_i = Σ_j (A S)_ij · A_ij
    Ok((a * s).component_mul(a).column_sum())
}

/// Covariance of `A·x + b`: `A·S·Aᵗ`. The bias has no effect.
///
/// The result is PSD whenever `S` is. It is symmetrized to remove the
/// rounding asymmetry of the two products.
///
/// # Errors
/// `ShapeMismatch` if `S` is not N×N with `N = A.ncols()`.
pub fn covariance(a: &DMatrix<f64>, s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_input_covariance(a, s)?;
    let cov = a * s * a.transpose();
    Ok((&cov + cov.transpose()) * 0.5)
}

/// Per-output second moment `E[y²] = variance + mean²`.
pub fn second_moment<'b>(
    a: &DMatrix<f64>,
    b: impl Into<Bias<'b>>,
    m: &DVector<f64>,
    s: &DMatrix<f64>,
) -> Result<DVector<f64>> {
    let mu = mean(a, b, m)?;
    let var = variance(a, s)?;
    Ok(var + mu.component_mul(&mu))
}

/// Output correlation matrix `E[y·yᵗ] = A·S·Aᵗ + outer(μ, μ)` with
/// `μ = A·M + b`.
pub fn correlation<'b>(
    a: &DMatrix<f64>,
    b: impl Into<Bias<'b>>,
    m: &DVector<f64>,
    s: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let mu = mean(a, b, m)?;
    let cov = covariance(a, s)?;
    Ok(cov + &mu * mu.transpose())
}

/// Recovers the covariance from a correlation matrix: `S = C − outer(M, M)`.
///
/// # Errors
/// `ShapeMismatch` if `C` is not `M.len()`×`M.len()`.
pub fn covariance_from_correlation(c: &DMatrix<f64>, m: &DVector<f64>) -> Result<DMatrix<f64>> {
    ensure_dim("rows of C vs length of M", m.len(), c.nrows())?;
    ensure_dim("columns of C vs length of M", m.len(), c.ncols())?;
    Ok(c - m * m.transpose())
}

/// Validates that `s` is a plausible covariance matrix.
///
/// Checks, in order: squareness, symmetry within `tol`, a non-negative
/// diagonal (down to `-tol`), and that `S + ε·I` admits a Cholesky
/// factorization, where `ε` scales `tol` by the largest diagonal entry.
///
/// None of the moment functions call this.
pub fn check_covariance(s: &DMatrix<f64>, tol: f64) -> Result<()> {
    if !tol.is_finite() || tol < 0.0 {
        return Err(MomentError::InvalidParameter(format!(
            "tolerance must be finite and >= 0, got {tol}"
        )));
    }
    let n = s.nrows();
    ensure_dim("columns of S vs rows of S", n, s.ncols())?;
    if n == 0 {
        return Ok(());
    }
    if s.iter().any(|v| !v.is_finite()) {
        return Err(MomentError::NotPositiveSemiDefinite(
            "matrix contains non-finite entries".to_string(),
        ));
    }

    let asymmetry = (s - s.transpose()).abs().max();
    if asymmetry > tol {
        return Err(MomentError::NotPositiveSemiDefinite(format!(
            "matrix is not symmetric (max |S - Sᵗ| = {asymmetry})"
        )));
    }

    let diag = s.diagonal();
    if let Some(i) = diag.iter().position(|&d| d < -tol) {
        return Err(MomentError::NotPositiveSemiDefinite(format!(
            "diagonal entry {i} is negative ({})",
            diag[i]
        )));
    }

    let scale = diag.amax().max(1.0);
    let jitter = tol.max(f64::EPSILON) * scale;
    let shifted = s + DMatrix::identity(n, n) * jitter;
    if shifted.cholesky().is_none() {
        log::debug!("covariance check: Cholesky failed with jitter {jitter}");
        return Err(MomentError::NotPositiveSemiDefinite(
            "matrix has a negative eigenvalue".to_string(),
        ));
    }
    Ok(())
}

/// An affine map `x ↦ A·x + b` with shapes validated once.
///
/// # Examples
/// ```
/// use nalgebra::{dmatrix, dvector, DMatrix};
/// use u_moments::affine::AffineMap;
/// let map = AffineMap::new(dmatrix![2.0, 0.0; 0.0, 3.0], dvector![1.0, 1.0]).unwrap();
/// let s = DMatrix::identity(2, 2);
/// assert_eq!(map.mean(&dvector![0.0, 0.0]).unwrap(), dvector![1.0, 1.0]);
/// assert_eq!(map.covariance(&s).unwrap(), dmatrix![4.0, 0.0; 0.0, 9.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AffineMap {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl AffineMap {
    /// Creates the map `x ↦ weights·x + bias`.
    ///
    /// # Errors
    /// `ShapeMismatch` if `bias.len() != weights.nrows()`.
    pub fn new(weights: DMatrix<f64>, bias: DVector<f64>) -> Result<Self> {
        ensure_dim("bias length vs rows of A", weights.nrows(), bias.len())?;
        Ok(Self { weights, bias })
    }

    /// Creates the purely linear map `x ↦ weights·x`.
    pub fn linear(weights: DMatrix<f64>) -> Self {
        let bias = DVector::zeros(weights.nrows());
        Self { weights, bias }
    }

    /// The identity map on `n` dimensions.
    pub fn identity(n: usize) -> Self {
        Self::linear(DMatrix::identity(n, n))
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    /// Input dimension N.
    pub fn input_dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Output dimension K.
    pub fn output_dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn mean(&self, m: &DVector<f64>) -> Result<DVector<f64>> {
        mean(&self.weights, &self.bias, m)
    }

    pub fn variance(&self, s: &DMatrix<f64>) -> Result<DVector<f64>> {
        variance(&self.weights, s)
    }

    pub fn covariance(&self, s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        covariance(&self.weights, s)
    }

    pub fn second_moment(&self, m: &DVector<f64>, s: &DMatrix<f64>) -> Result<DVector<f64>> {
        second_moment(&self.weights, &self.bias, m, s)
    }

    pub fn correlation(&self, m: &DVector<f64>, s: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        correlation(&self.weights, &self.bias, m, s)
    }

    /// Evaluates the map at a single point.
    pub fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        self.mean(x)
    }

    /// Evaluates the map on every row of a batch (n×N → n×K).
    pub fn apply_batch(&self, samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        ensure_dim("sample width vs columns of A", self.input_dim(), samples.ncols())?;
        let mut out = samples * self.weights.transpose();
        let bias_row = self.bias.transpose();
        for mut row in out.row_iter_mut() {
            row += &bias_row;
        }
        Ok(out)
    }
}

// ============================================================================
// Tests
// ============================================================================
