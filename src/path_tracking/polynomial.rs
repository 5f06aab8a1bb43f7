//! Reference path polynomial
//!
//! The reference path is a polynomial `y = f(x)` in the vehicle frame with
//! coefficients stored lowest degree first.

use nalgebra::{DMatrix, DVector};
use crate::common::{Point2D, TrackingError, TrackingResult};

/// Polynomial `c0 + c1 x + c2 x^2 + ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: DVector<f64>,
}

impl Polynomial {
    /// Build from coefficients, lowest degree first.
    ///
    /// At least two finite coefficients are required (degree >= 1).
    pub fn new(coeffs: Vec<f64>) -> TrackingResult<Self> {
        if coeffs.len() < 2 {
            return Err(TrackingError::InvalidInput(format!(
                "reference polynomial needs at least 2 coefficients, got {}",
                coeffs.len()
            )));
        }
        if let Some(i) = coeffs.iter().position(|c| !c.is_finite()) {
            return Err(TrackingError::InvalidInput(format!(
                "reference polynomial coefficient {} is not finite",
                i
            )));
        }
        Ok(Self { coeffs: DVector::from_vec(coeffs) })
    }

    /// Least-squares fit of a polynomial of the given order through `points`.
    pub fn fit(points: &[Point2D], order: usize) -> TrackingResult<Self> {
        if order < 1 || order + 1 > points.len() {
            return Err(TrackingError::InvalidParameter(format!(
                "cannot fit order {} polynomial through {} points",
                order,
                points.len()
            )));
        }

        // Vandermonde matrix, one row per point
        let mut a = DMatrix::<f64>::zeros(points.len(), order + 1);
        for (j, p) in points.iter().enumerate() {
            a[(j, 0)] = 1.0;
            for i in 0..order {
                a[(j, i + 1)] = a[(j, i)] * p.x;
            }
        }
        let b = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

        let coeffs = a
            .svd(true, true)
            .solve(&b, 1e-12)
            .map_err(|e| TrackingError::NumericDegeneracy(format!("polynomial fit failed: {}", e)))?;

        Self::new(coeffs.iter().copied().collect())
    }

    pub fn coeffs(&self) -> &[f64] {
        self.coeffs.as_slice()
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// f(x)
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.as_slice().iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// f'(x)
    pub fn derivative(&self, x: f64) -> f64 {
        self.coeffs
            .as_slice()
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + i as f64 * c)
    }

    /// f''(x)
    pub fn second_derivative(&self, x: f64) -> f64 {
        self.coeffs
            .as_slice()
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + (i * (i - 1)) as f64 * c)
    }

    /// Desired heading of the path tangent, `atan(f'(x))`
    pub fn heading(&self, x: f64) -> f64 {
        self.derivative(x).atan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_polynomial_requires_degree_one() {
        assert!(matches!(Polynomial::new(vec![1.0]), Err(TrackingError::InvalidInput(_))));
        assert!(matches!(Polynomial::new(vec![]), Err(TrackingError::InvalidInput(_))));
        assert!(matches!(
            Polynomial::new(vec![0.0, f64::NAN]),
            Err(TrackingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_polynomial_eval_and_derivatives() {
        // f = 1 + 2x + 3x^2 + 4x^3
        let p = Polynomial::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(p.degree(), 3);
        assert_abs_diff_eq!(p.eval(2.0), 1.0 + 4.0 + 12.0 + 32.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.derivative(2.0), 2.0 + 12.0 + 48.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.second_derivative(2.0), 6.0 + 48.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.heading(0.0), 2.0_f64.atan(), epsilon = 1e-12);
    }

    #[test]
    fn test_linear_polynomial_has_no_curvature() {
        let p = Polynomial::new(vec![0.5, -1.0]).unwrap();
        assert_eq!(p.second_derivative(10.0), 0.0);
        assert_abs_diff_eq!(p.derivative(-3.0), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_recovers_cubic() {
        let truth = Polynomial::new(vec![0.3, -0.2, 0.05, -0.001]).unwrap();
        let points: Vec<Point2D> = (0..8)
            .map(|i| {
                let x = i as f64 * 5.0 - 5.0;
                Point2D::new(x, truth.eval(x))
            })
            .collect();

        let fitted = Polynomial::fit(&points, 3).unwrap();
        for (a, b) in fitted.coeffs().iter().zip(truth.coeffs()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_fit_rejects_too_few_points() {
        let points = vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)];
        assert!(matches!(
            Polynomial::fit(&points, 3),
            Err(TrackingError::InvalidParameter(_))
        ));
    }
}
