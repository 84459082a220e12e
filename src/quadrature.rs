//! Fixed-order Gauss-Legendre quadrature for arc-length integration.

use std::f64::consts::PI;
use std::sync::LazyLock;

/// Number of quadrature points; exact for polynomial integrands up to
/// degree `2 * POINTS - 1`.
const POINTS: usize = 30;

struct Table {
    abscissae: [f64; POINTS],
    weights: [f64; POINTS],
}

/// Abscissae and weights on (-1, 1), found once by Newton iteration on the
/// Legendre recurrence from the Chebyshev initial guess.
static TABLE: LazyLock<Table> = LazyLock::new(|| {
    let mut abscissae = [0.0; POINTS];
    let mut weights = [0.0; POINTS];

    for k in 0..POINTS {
        let mut x = (PI * (k as f64 + 0.75) / (POINTS as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (value, slope) = legendre(x);
            let step = value / slope;
            x -= step;
            if step.abs() < 1e-15 {
                break;
            }
        }
        let (_, slope) = legendre(x);
        abscissae[k] = x;
        weights[k] = 2.0 / ((1.0 - x * x) * slope * slope);
    }

    Table { abscissae, weights }
});

/// Legendre polynomial of degree `POINTS` and its derivative at `x`.
fn legendre(x: f64) -> (f64, f64) {
    let mut previous = 1.0;
    let mut current = x;
    for degree in 2..=POINTS {
        let degree = degree as f64;
        let next = ((2.0 * degree - 1.0) * x * current - (degree - 1.0) * previous) / degree;
        previous = current;
        current = next;
    }
    let slope = POINTS as f64 * (x * current - previous) / (x * x - 1.0);
    (current, slope)
}

/// Integrates `f` over `[t1, t2]`.
pub(crate) fn integrate(f: impl Fn(f64) -> f64, t1: f64, t2: f64) -> f64 {
    let half_width = (t2 - t1) / 2.0;
    let midpoint = (t1 + t2) / 2.0;
    let sum: f64 = TABLE
        .abscissae
        .iter()
        .zip(TABLE.weights.iter())
        .map(|(&x, &w)| w * f(x * half_width + midpoint))
        .sum();
    sum * half_width
}
