//! Finite-difference checks of analytic gradients.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("gradient of {term} disagrees at parameter {index}: analytic {analytic}, numeric {numeric}")]
pub struct GradientMismatch {
    pub term: &'static str,
    pub index: usize,
    pub analytic: f64,
    pub numeric: f64,
}

/// Centered difference of `f` along parameter `index`.
pub fn central_difference(mut f: impl FnMut(&[f64]) -> f64, x: &[f64], index: usize, step: f64) -> f64 {
    let mut probe = x.to_vec();
    probe[index] = x[index] + step;
    let plus = f(&probe);
    probe[index] = x[index] - step;
    let minus = f(&probe);
    (plus - minus) / (2.0 * step)
}

/// Compare `analytic` against centered differences of `f` at `x`. The
/// tolerance is absolute below 1 and relative above.
///
/// # Errors
/// The first parameter whose partial derivative disagrees.
pub fn check_gradient(
    term: &'static str,
    mut f: impl FnMut(&[f64]) -> f64,
    x: &[f64],
    analytic: &[f64],
    step: f64,
    tolerance: f64,
) -> Result<(), GradientMismatch> {
    for (index, &a) in analytic.iter().enumerate() {
        let numeric = central_difference(&mut f, x, index, step);
        if (a - numeric).abs() > tolerance * numeric.abs().max(1.0) {
            return Err(GradientMismatch {
                term,
                index,
                analytic: a,
                numeric,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(x: &[f64]) -> f64 {
        x[0].sin() * x[1] + x[1] * x[1]
    }

    #[test]
    fn central_difference_matches_derivative() {
        let x = [0.3, 2.0];
        let d0 = central_difference(wave, &x, 0, 1e-4);
        assert!((d0 - 0.3_f64.cos() * 2.0).abs() < 1e-6);
        let d1 = central_difference(wave, &x, 1, 1e-4);
        assert!((d1 - (0.3_f64.sin() + 4.0)).abs() < 1e-6);
    }

    #[test]
    fn wrong_gradient_is_reported() {
        let x = [0.3, 2.0];
        let good = [0.3_f64.cos() * 2.0, 0.3_f64.sin() + 4.0];
        assert!(check_gradient("wave", wave, &x, &good, 1e-3, 1e-2).is_ok());

        let bad = [good[0], good[1] + 0.5];
        let err = check_gradient("wave", wave, &x, &bad, 1e-3, 1e-2).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.term, "wave");
    }
}
