//! # u-moments
//!
//! Closed-form moment propagation for the U-Engine ecosystem.
//!
//! Given the mean `M` and covariance `S` of a random vector `x`, this crate
//! computes the mean, variance and covariance of `y = A·x + b` analytically,
//! with no sampling. It knows nothing about where `M`, `S`, `A` and `b` come
//! from or how the results are used.
//!
//! ## Modules
//!
//! - [`affine`] — Closed-form moments of affine maps
//! - [`empirical`] — Batch statistics and Monte Carlo tightness checks
//! - [`stats`] — Compensated summation and a streaming co-moment accumulator
//! - [`random`] — Seeded RNG and Gaussian batch sampling
//! - [`error`] — Error type shared by all modules
//!
//! ## Design Philosophy
//!
//! - **Pure functions**: every operation is stateless and single-step
//! - **Fail fast on shapes**: dimension mismatches return
//!   [`MomentError::ShapeMismatch`]; numerical validity of `S` is a caller
//!   contract (see [`affine::check_covariance`])
//! - **Property-based testing**: the moment identities are verified via
//!   proptest and against Monte Carlo estimates
//!
//! ## Example
//!
//! ```
//! use nalgebra::{dmatrix, dvector, DMatrix};
//! use u_moments::affine::{covariance, mean, variance};
//!
//! let a = dmatrix![2.0, 0.0; 0.0, 3.0];
//! let b = dvector![1.0, 1.0];
//! let m = dvector![0.0, 0.0];
//! let s = DMatrix::identity(2, 2);
//!
//! assert_eq!(mean(&a, &b, &m).unwrap(), dvector![1.0, 1.0]);
//! assert_eq!(covariance(&a, &s).unwrap(), dmatrix![4.0, 0.0; 0.0, 9.0]);
//! assert_eq!(variance(&a, &s).unwrap(), dvector![4.0, 9.0]);
//! ```

pub mod affine;
pub mod empirical;
pub mod error;
pub mod random;
pub mod stats;

pub use affine::{AffineMap, Bias};
pub use error::{MomentError, Result};
