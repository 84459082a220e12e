//! Memoized coefficient matrices, keyed by the number of control points.
//!
//! Every family grows monotonically: an entry, once inserted, is never
//! mutated, so concurrent readers either observe a fully built matrix or
//! compute it themselves under the lock.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use nalgebra::DMatrix;

type CoeffCache = LazyLock<Mutex<HashMap<usize, DMatrix<f64>>>>;

static BERNSTEIN: CoeffCache = LazyLock::new(|| Mutex::new(HashMap::new()));
static SPLIT_LEFT: CoeffCache = LazyLock::new(|| Mutex::new(HashMap::new()));
static SPLIT_RIGHT: CoeffCache = LazyLock::new(|| Mutex::new(HashMap::new()));
static ELEVATE: CoeffCache = LazyLock::new(|| Mutex::new(HashMap::new()));
static LOWER: CoeffCache = LazyLock::new(|| Mutex::new(HashMap::new()));

pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

pub(crate) fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, i| acc * i as f64)
}

/// Bernstein basis matrix `B_n`.
///
/// Converts a monomial power basis into Bernstein weights on the control
/// points: `value(t) = [1, t, .., t^(n-1)] * B_n * P`. Built as the matrix
/// exponential of the subdiagonal `-1, -2, .., -(n-1)`, with row `k` scaled
/// by `C(n-1, k)`.
pub(crate) fn bernstein(n: usize) -> DMatrix<f64> {
    let mut cache = BERNSTEIN.lock().unwrap();
    cache
        .entry(n)
        .or_insert_with(|| {
            let mut subdiagonal = DMatrix::<f64>::zeros(n, n);
            for k in 1..n {
                subdiagonal[(k, k - 1)] = -(k as f64);
            }
            let mut basis = subdiagonal.exp();
            for k in 0..n {
                let scale = binomial(n - 1, k);
                basis.row_mut(k).apply(|entry| *entry *= scale);
            }
            basis
        })
        .clone()
}

/// Matrix mapping control points to those of the sub-curve on `[0, 1/2]`.
pub(crate) fn split_left(n: usize) -> DMatrix<f64> {
    let mut cache = SPLIT_LEFT.lock().unwrap();
    cache
        .entry(n)
        .or_insert_with(|| split_left_matrix(n, 0.5))
        .clone()
}

/// Matrix mapping control points to those of the sub-curve on `[0, z]`.
///
/// Only the `z = 1/2` case is memoized; other values are computed on demand.
pub(crate) fn split_left_at(n: usize, z: f64) -> DMatrix<f64> {
    if z == 0.5 {
        return split_left(n);
    }
    split_left_matrix(n, z)
}

/// Matrix mapping control points to those of the sub-curve on `[1/2, 1]`.
pub(crate) fn split_right(n: usize) -> DMatrix<f64> {
    let mut cache = SPLIT_RIGHT.lock().unwrap();
    cache
        .entry(n)
        .or_insert_with(|| reflect_split(&split_left(n)))
        .clone()
}

/// Matrix mapping control points to those of the sub-curve on `[z, 1]`.
pub(crate) fn split_right_at(n: usize, z: f64) -> DMatrix<f64> {
    if z == 0.5 {
        return split_right(n);
    }
    reflect_split(&split_left_matrix(n, z))
}

/// Order elevation matrix `E_n`, shape `(n+1) x n`. Exact.
pub(crate) fn elevate(n: usize) -> DMatrix<f64> {
    let mut cache = ELEVATE.lock().unwrap();
    cache
        .entry(n)
        .or_insert_with(|| {
            let mut matrix = DMatrix::<f64>::zeros(n + 1, n);
            for k in 0..n {
                matrix[(k, k)] = 1.0 - k as f64 / n as f64;
                matrix[(k + 1, k)] = (k + 1) as f64 / n as f64;
            }
            matrix
        })
        .clone()
}

/// Order reduction matrix `L_n`, shape `(n-1) x n`.
///
/// The least-squares pseudo-inverse of `E_(n-1)`; exact only when the curve
/// genuinely lives in the lower order.
pub(crate) fn lower(n: usize) -> DMatrix<f64> {
    let mut cache = LOWER.lock().unwrap();
    cache
        .entry(n)
        .or_insert_with(|| {
            let elevated = elevate(n - 1);
            let normal = elevated.transpose() * &elevated;
            let inverse = normal
                .try_inverse()
                .expect("elevation normal matrix is invertible");
            inverse * elevated.transpose()
        })
        .clone()
}

fn split_left_matrix(n: usize, z: f64) -> DMatrix<f64> {
    let basis = bernstein(n);
    let mut powers = DMatrix::<f64>::zeros(n, n);
    for k in 0..n {
        powers[(k, k)] = z.powi(k as i32);
    }
    let inverse = basis
        .clone()
        .try_inverse()
        .expect("Bernstein basis matrix is invertible");
    inverse * powers * basis
}

/// Reflects a left splitting matrix into the matching right one:
/// `R[k, k+j] = L[n-1-k, j]`.
fn reflect_split(left: &DMatrix<f64>) -> DMatrix<f64> {
    let n = left.nrows();
    let mut right = DMatrix::<f64>::zeros(n, n);
    for k in 0..n {
        for j in 0..n - k {
            right[(k, k + j)] = left[(n - 1 - k, j)];
        }
    }
    right
}
