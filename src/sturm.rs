//! Sturm-chain root counting and isolation on `[0, 1]`.
//!
//! Polynomial coefficients are given highest degree first. All functions
//! take explicit precision parameters; `crate::DEFAULT_EPSILON` is a
//! reasonable choice.

use nalgebra::{DMatrix, DVector};

/// Local shape of the function at a root, used to filter isolated roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFilter {
    /// Keep every root.
    All,
    /// Keep roots where the function crosses from non-positive to positive.
    Convex,
    /// Keep roots where the function crosses from positive to non-positive.
    Concave,
    /// Keep roots where the function keeps its sign (or touches zero).
    Inflection,
}

/// Builds the Sturm chain of a polynomial.
///
/// Row 0 is the polynomial, row 1 its derivative, and each further row the
/// negated remainder of the two rows above. Row `i` is left-padded with `i`
/// zeros so that all rows share one highest-first power basis. The chain is
/// truncated as soon as a row is effectively constant (its norm equals the
/// absolute value of its last non-zero coefficient).
///
/// `epsilon` guards the remainder construction: a divisor whose leading
/// coefficient is below it is handled by scalar long division on the
/// leading-zero-stripped coefficients instead of the two-step formula.
pub fn chain(polynomial: &[f64], epsilon: f64) -> DMatrix<f64> {
    let size = polynomial.len();
    let mut chain = DMatrix::<f64>::zeros(size, size + 2);

    for (j, &coefficient) in polynomial.iter().enumerate() {
        chain[(0, j)] = coefficient;
    }
    for j in 1..size {
        chain[(1, j)] = (size - j) as f64 * chain[(0, j - 1)];
    }

    for i in 2..size {
        // rows i-2 and i-1 start at columns i-2 and i-1; the two spare
        // columns keep the j+2 lookups below in bounds
        let above: Vec<f64> = (i - 2..size + 2).map(|j| chain[(i - 2, j)]).collect();
        let divisor: Vec<f64> = (i - 1..size + 2).map(|j| chain[(i - 1, j)]).collect();

        let norm = divisor.iter().map(|c| c * c).sum::<f64>().sqrt();
        let constant = divisor[divisor.len() - 3];
        if (norm - constant.abs()).abs() < epsilon {
            return chain.view((0, 0), (i, size)).into_owned();
        }

        if divisor[0].abs() > epsilon {
            let t = above[0] / divisor[0];
            let m = (above[1] - t * divisor[1]) / divisor[0];
            for j in 0..size - i {
                chain[(i, i + j)] = -(above[j + 2] - m * divisor[j + 1] - t * divisor[j + 2]);
            }
        } else {
            let dividend = strip_leading_zeros(&above[..above.len() - 2]);
            let divisor = strip_leading_zeros(&divisor[..divisor.len() - 2]);
            if divisor.is_empty() {
                return chain.view((0, 0), (i, size)).into_owned();
            }

            let mut remainder = dividend.to_vec();
            while !remainder.is_empty() && remainder.len() >= divisor.len() {
                let quotient = remainder[0] / divisor[0];
                for k in 1..divisor.len() {
                    remainder[k] -= quotient * divisor[k];
                }
                remainder[0] = 0.0;
                remainder = strip_leading_zeros(&remainder).to_vec();
            }
            // right-align so the constant term lands in the last column
            for (k, &coefficient) in remainder.iter().enumerate() {
                chain[(i, size - remainder.len() + k)] = -coefficient;
            }
        }
    }

    chain.columns(0, size).into_owned()
}

/// Counts the roots of the chained polynomial inside `[a, b]` as the
/// difference of sign changes down the chain evaluated at both endpoints.
/// Zero counts as positive (IEEE sign bit).
pub fn count_roots(chain: &DMatrix<f64>, a: f64, b: f64) -> i32 {
    let at_a = chain * power_basis(chain.ncols(), a);
    let at_b = chain * power_basis(chain.ncols(), b);
    sign_changes(&at_a) - sign_changes(&at_b)
}

/// Isolates the roots of `polynomial` inside `[0, 1]` to a precision of
/// `epsilon`, keeping only those matching `filter`.
///
/// Bisection runs on an explicit work stack, so stack usage stays bounded
/// for any polynomial degree and precision.
pub fn roots(polynomial: &[f64], filter: RootFilter, epsilon: f64) -> Vec<f64> {
    let chain = chain(polynomial, crate::DEFAULT_EPSILON);
    let mut found = Vec::new();
    let mut intervals = vec![(0.0_f64, 1.0_f64, false)];

    while let Some((a, b, mut flag)) = intervals.pop() {
        let count = count_roots(&chain, a, b);
        if count <= 0 {
            continue;
        }

        let mid = (a + b) / 2.0;
        if mid - a < epsilon {
            found.push(mid);
            continue;
        }

        if count == 1 && filter != RootFilter::All && !flag {
            let at_a = evaluate_row(&chain, 0, a);
            let at_b = evaluate_row(&chain, 0, b);
            flag = match filter {
                RootFilter::All => true,
                RootFilter::Convex => at_a <= 0.0 && at_b > 0.0,
                RootFilter::Concave => at_a > 0.0 && at_b <= 0.0,
                RootFilter::Inflection => {
                    (at_a >= 0.0 && at_b >= 0.0) || (at_a <= 0.0 && at_b <= 0.0)
                }
            };
            if !flag {
                continue;
            }
        }

        intervals.push((a, mid, flag));
        intervals.push((mid, b, flag));
    }

    found
}

fn power_basis(columns: usize, t: f64) -> DVector<f64> {
    DVector::from_fn(columns, |k, _| t.powi((columns - 1 - k) as i32))
}

fn sign_changes(values: &DVector<f64>) -> i32 {
    let mut changes = 0;
    for k in 1..values.len() {
        if values[k - 1].is_sign_negative() != values[k].is_sign_negative() {
            changes += 1;
        }
    }
    changes
}

fn evaluate_row(chain: &DMatrix<f64>, row: usize, t: f64) -> f64 {
    let columns = chain.ncols();
    (0..columns)
        .map(|k| chain[(row, k)] * t.powi((columns - 1 - k) as i32))
        .sum()
}

fn strip_leading_zeros(coefficients: &[f64]) -> &[f64] {
    let start = coefficients
        .iter()
        .position(|&c| c != 0.0)
        .unwrap_or(coefficients.len());
    &coefficients[start..]
}
