//! Least-squares multilateration in 2D
//!
//! The range equations `(x - xi)² + (y - yi)² = ri²` are subtracted from the
//! reference anchor's equation (anchor 0), which removes the quadratic terms
//! and leaves N-1 linear equations in (x, y):
//!
//! ```text
//! 2(xi - x0)·x + 2(yi - y0)·y = r0² - ri² - x0² + xi² - y0² + yi²
//! ```
//!
//! The overdetermined system is solved through an SVD, and rank deficiency
//! (collinear or coincident anchors) is reported instead of returning an
//! arbitrary minimum-norm answer.

use crate::core::{AnchorPosition, MIN_ANCHORS, OUTPUT_DECIMALS};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Errors raised by a single solve. Both are recoverable at estimation time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MultilaterationError {
    #[error("insufficient anchors: {available} available, {required} required")]
    InsufficientAnchors { available: usize, required: usize },

    #[error("degenerate anchor geometry (condition number {condition_number:.3e})")]
    DegenerateGeometry { condition_number: f64 },

    #[error("non-finite input for anchor {index}")]
    InvalidInput { index: usize },
}

/// Result of a successful solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solution {
    /// Estimated x, rounded to the output precision
    pub x: f64,
    /// Estimated y, rounded to the output precision
    pub y: f64,
    /// RMS residual of the linearized system before rounding
    pub residual_rms: f64,
    /// Ratio of largest to smallest singular value of the coefficient matrix
    pub condition_number: f64,
}

/// Linearized least-squares solver
#[derive(Debug, Clone)]
pub struct MultilaterationEngine {
    /// Matrices whose condition number exceeds this are treated as rank deficient
    pub max_condition_number: f64,
    /// Decimal places the reported coordinates are rounded to
    pub decimals: i32,
}

impl Default for MultilaterationEngine {
    fn default() -> Self {
        Self {
            max_condition_number: 1e8,
            decimals: OUTPUT_DECIMALS,
        }
    }
}

impl MultilaterationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the tag position from ordered (anchor position, range) pairs.
    ///
    /// The first pair is the linearization reference.
    pub fn solve(
        &self,
        measurements: &[(AnchorPosition, f64)],
    ) -> Result<Solution, MultilaterationError> {
        let n = measurements.len();
        if n < MIN_ANCHORS {
            return Err(MultilaterationError::InsufficientAnchors {
                available: n,
                required: MIN_ANCHORS,
            });
        }

        if let Some(index) = measurements
            .iter()
            .position(|(p, r)| !p.is_finite() || !r.is_finite())
        {
            return Err(MultilaterationError::InvalidInput { index });
        }

        let (p0, r0) = measurements[0];
        let mut a_matrix = DMatrix::zeros(n - 1, 2);
        let mut b_vector = DVector::zeros(n - 1);

        for (row, (pi, ri)) in measurements.iter().skip(1).enumerate() {
            a_matrix[(row, 0)] = 2.0 * (pi.x - p0.x);
            a_matrix[(row, 1)] = 2.0 * (pi.y - p0.y);
            b_vector[row] = r0.powi(2) - ri.powi(2)
                - p0.x.powi(2) + pi.x.powi(2)
                - p0.y.powi(2) + pi.y.powi(2);
        }

        let svd = a_matrix.clone().svd(true, true);
        let singular_values = &svd.singular_values;
        let largest = singular_values.max();
        let smallest = singular_values.min();

        let condition_number = if smallest > 0.0 { largest / smallest } else { f64::INFINITY };
        if largest <= f64::EPSILON || !(condition_number <= self.max_condition_number) {
            return Err(MultilaterationError::DegenerateGeometry { condition_number });
        }

        let eps = largest * 1e-12;
        let solution = svd
            .solve(&b_vector, eps)
            .map_err(|_| MultilaterationError::DegenerateGeometry { condition_number })?;

        let residual = &a_matrix * &solution - &b_vector;
        let residual_rms = (residual.norm_squared() / (n - 1) as f64).sqrt();

        Ok(Solution {
            x: self.round(solution[0]),
            y: self.round(solution[1]),
            residual_rms,
            condition_number,
        })
    }

    fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.decimals);
        let rounded = (value * factor).round() / factor;
        // Avoid reporting -0.0
        if rounded == 0.0 { 0.0 } else { rounded }
    }
}
