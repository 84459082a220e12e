//! Real roots of small dense polynomials.

use nalgebra::DMatrix;

/// Eigenvalues whose imaginary part is below this are treated as real roots.
const IMAGINARY_TOLERANCE: f64 = 1e-10;

/// Strips trailing zero coefficients so the effective degree is exact.
///
/// Coefficients are in ascending order (constant term first). The companion
/// matrix of a polynomial with a zero leading coefficient is singular, so
/// every solver call must go through this first.
pub(crate) fn trim_trailing_zeros(coefficients: &[f64]) -> &[f64] {
    let mut len = coefficients.len();
    while len > 0 && coefficients[len - 1] == 0.0 {
        len -= 1;
    }
    &coefficients[..len]
}

/// Returns all real roots of a polynomial given in ascending coefficient
/// order, computed as the eigenvalues of its companion matrix.
///
/// The input must have a non-zero leading coefficient and degree >= 1.
pub(crate) fn real_roots(coefficients: &[f64]) -> Vec<f64> {
    let degree = coefficients.len() - 1;
    debug_assert!(degree >= 1 && coefficients[degree] != 0.0);

    let leading = coefficients[degree];
    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for k in 1..degree {
        companion[(k, k - 1)] = 1.0;
    }
    for k in 0..degree {
        companion[(k, degree - 1)] = -coefficients[k] / leading;
    }

    companion
        .complex_eigenvalues()
        .iter()
        .filter(|root| root.im.abs() < IMAGINARY_TOLERANCE)
        .map(|root| root.re)
        .collect()
}
