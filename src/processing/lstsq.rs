//! Dense linear least squares for small column counts.
//!
//! The design matrix is stored column-major (one `Vec` per regressor), which
//! is how the EMSC model assembles it.

use crate::error::{Result, SpectrumError};

/// Solution of `min ‖A·c − b‖²`.
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquares {
    pub coefficients: Vec<f64>,
    /// `A·c`
    pub prediction: Vec<f64>,
}

/// Solve the ordinary least-squares problem for column-major `columns`.
///
/// Columns are scaled to unit norm before a Householder QR factorisation,
/// so regressors of very different magnitude (raw polynomial powers of the
/// Raman shift) stay well conditioned. A column that is numerically a
/// combination of the others is reported as [`SpectrumError::SingularModel`].
pub fn solve(columns: &[Vec<f64>], target: &[f64]) -> Result<LeastSquares> {
    let m = target.len();
    let n = columns.len();
    if n == 0 {
        return Err(SpectrumError::InvalidParameter(
            "design matrix has no columns".to_string(),
        ));
    }
    if let Some(col) = columns.iter().find(|c| c.len() != m) {
        return Err(SpectrumError::ShapeMismatch {
            what: "design column",
            expected: m,
            found: col.len(),
        });
    }
    if m < n {
        return Err(SpectrumError::SingularModel(format!(
            "{n} regressors cannot be fitted from {m} points"
        )));
    }

    let norms: Vec<f64> = columns
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();
    if let Some(j) = norms.iter().position(|&s| s == 0.0 || !s.is_finite()) {
        return Err(SpectrumError::SingularModel(format!(
            "design column {j} is zero or not finite"
        )));
    }
    let mut a: Vec<Vec<f64>> = columns
        .iter()
        .zip(&norms)
        .map(|(c, s)| c.iter().map(|v| v / s).collect())
        .collect();
    let mut rhs = target.to_vec();

    // Householder QR, applying each reflection to the remaining columns and
    // to the right-hand side.
    let mut diag = vec![0.0; n];
    for k in 0..n {
        let alpha = a[k][k..].iter().map(|v| v * v).sum::<f64>().sqrt();
        let alpha = if a[k][k] > 0.0 { -alpha } else { alpha };
        diag[k] = alpha;
        if alpha == 0.0 {
            continue;
        }
        let mut v: Vec<f64> = a[k][k..].to_vec();
        v[0] -= alpha;
        let v_norm2: f64 = v.iter().map(|x| x * x).sum();
        if v_norm2 == 0.0 {
            continue;
        }
        let reflect = |col: &mut [f64]| {
            let dot: f64 = v.iter().zip(col.iter()).map(|(a, b)| a * b).sum();
            let f = 2.0 * dot / v_norm2;
            for (c, vi) in col.iter_mut().zip(&v) {
                *c -= f * vi;
            }
        };
        for col in a.iter_mut().skip(k + 1) {
            reflect(&mut col[k..]);
        }
        reflect(&mut rhs[k..]);
    }

    let max_diag = diag.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
    let tolerance = max_diag * m.max(n) as f64 * f64::EPSILON;
    if let Some(j) = diag.iter().position(|d| d.abs() <= tolerance) {
        return Err(SpectrumError::SingularModel(format!(
            "design matrix is rank deficient at column {j}"
        )));
    }

    // Back substitution on R (upper part of `a`, diagonal in `diag`)
    let mut scaled = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for j in i + 1..n {
            sum -= a[j][i] * scaled[j];
        }
        scaled[i] = sum / diag[i];
    }

    let coefficients: Vec<f64> = scaled.iter().zip(&norms).map(|(c, s)| c / s).collect();
    let prediction = (0..m)
        .map(|row| {
            columns
                .iter()
                .zip(&coefficients)
                .map(|(col, c)| col[row] * c)
                .sum()
        })
        .collect();

    Ok(LeastSquares {
        coefficients,
        prediction,
    })
}

/// Coefficient of determination, following scikit-learn's convention for a
/// constant target (1.0 for a perfect prediction, 0.0 otherwise).
pub fn r_squared(target: &[f64], prediction: &[f64]) -> f64 {
    let n = target.len() as f64;
    let mean = target.iter().sum::<f64>() / n;
    let ss_res: f64 = target
        .iter()
        .zip(prediction)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = target.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_polynomial() {
        let x: Vec<f64> = (0..50).map(|i| 800.0 + i as f64 * 16.0).collect();
        let columns: Vec<Vec<f64>> = (0..4)
            .map(|p| x.iter().map(|v| v.powi(p)).collect())
            .collect();
        let truth = [3.0, -0.5, 2e-3, -1e-7];
        let target: Vec<f64> = x
            .iter()
            .map(|v| truth.iter().enumerate().map(|(p, c)| c * v.powi(p as i32)).sum())
            .collect();

        let fit = solve(&columns, &target).unwrap();
        for (c, t) in fit.coefficients.iter().zip(truth) {
            assert_relative_eq!(*c, t, max_relative = 1e-5);
        }
        assert_relative_eq!(r_squared(&target, &fit.prediction), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn overdetermined_fit_minimises_residual() {
        // Mean of the target is the least-squares constant.
        let columns = vec![vec![1.0; 4]];
        let fit = solve(&columns, &[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert_relative_eq!(fit.coefficients[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn collinear_columns_are_singular() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b: Vec<f64> = a.iter().map(|v| v * 2.0).collect();
        assert!(matches!(
            solve(&[a, b], &[1.0, 1.0, 1.0, 1.0]),
            Err(SpectrumError::SingularModel(_))
        ));
        assert!(matches!(
            solve(&[vec![0.0; 3]], &[1.0, 1.0, 1.0]),
            Err(SpectrumError::SingularModel(_))
        ));
    }

    #[test]
    fn r_squared_of_constant_target() {
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 2.5]), 0.0);
    }
}
