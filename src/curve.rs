//! Arbitrary-order Bézier curves in the plane.

use std::sync::{Mutex, OnceLock};

use nalgebra::{DMatrix, DVector, MatrixXx2, RowDVector};

use crate::bounds::BoundingBox;
use crate::error::CurveError;
use crate::{coeffs, poly, quadrature, Point, PointVector, Vector};

/// Iteration cap for the Halley arc-length inversion.
const MAX_HALLEY_ITERATIONS: usize = 50;

/// Subdivision cap per seeded pair in the intersection search.
const MAX_INTERSECTION_SUBDIVISIONS: u32 = 100;

/// A Bézier curve of arbitrary order, defined by its control points.
///
/// The parameter domain is `t ∈ [0, 1]`. Expensive derived data (the
/// derivative curve, extrema, bounding box, polyline, projection
/// polynomial) is computed lazily and cached inside the curve; every
/// mutation drops the cache. Reads are therefore cheap to repeat, and a
/// `&Curve` can be shared across threads.
///
/// # Example
///
/// ```
/// use bezium::{Curve, Point};
///
/// let curve = Curve::from_points(vec![
///     Point::new(0.0, 0.0),
///     Point::new(1.0, 2.0),
///     Point::new(2.0, 0.0),
/// ])
/// .unwrap();
///
/// let midpoint = curve.value_at(0.5);
/// assert!((midpoint - Point::new(1.0, 1.0)).norm() < 1e-12);
/// ```
#[derive(Debug)]
pub struct Curve {
    control_points: MatrixXx2<f64>,
    cache: CurveCache,
}

#[derive(Debug, Default)]
struct CurveCache {
    derivative: OnceLock<Box<Curve>>,
    roots: OnceLock<Vec<f64>>,
    bounding_box: OnceLock<BoundingBox>,
    polyline: Mutex<Option<CachedPolyline>>,
    projection: OnceLock<ProjectionPolynomial>,
}

#[derive(Debug)]
struct CachedPolyline {
    flatness: f64,
    points: PointVector,
}

/// Point-independent part of the projection polynomial `C'(t) . (C(t) - p)`.
#[derive(Debug)]
struct ProjectionPolynomial {
    part: DVector<f64>,
    derivative: MatrixXx2<f64>,
}

impl Clone for Curve {
    fn clone(&self) -> Self {
        Curve::from_matrix(self.control_points.clone())
    }
}

impl Curve {
    /// Creates a curve from an n-row, 2-column control-point matrix.
    ///
    /// Returns [`CurveError::EmptyControlPoints`] for a 0-row matrix. A
    /// single control point is accepted as a degenerate constant curve.
    pub fn new(control_points: MatrixXx2<f64>) -> Result<Self, CurveError> {
        if control_points.nrows() == 0 {
            return Err(CurveError::EmptyControlPoints);
        }
        Ok(Self::from_matrix(control_points))
    }

    /// Creates a curve from a sequence of control points.
    pub fn from_points<I>(points: I) -> Result<Self, CurveError>
    where
        I: IntoIterator<Item = Point>,
    {
        let points: Vec<Point> = points.into_iter().collect();
        if points.is_empty() {
            return Err(CurveError::EmptyControlPoints);
        }
        Ok(Self::from_matrix(MatrixXx2::from_fn(points.len(), |k, j| {
            points[k][j]
        })))
    }

    fn from_matrix(control_points: MatrixXx2<f64>) -> Self {
        Curve {
            control_points,
            cache: CurveCache::default(),
        }
    }

    fn n(&self) -> usize {
        self.control_points.nrows()
    }

    fn invalidate(&mut self) {
        self.cache = CurveCache::default();
    }

    /// Order of the curve (control-point count minus one).
    pub fn order(&self) -> usize {
        self.n() - 1
    }

    /// The control points as a list.
    pub fn control_points(&self) -> PointVector {
        (0..self.n())
            .map(|k| self.control_points.row(k).transpose())
            .collect()
    }

    /// A single control point.
    ///
    /// Panics when `index` is out of range.
    pub fn control_point(&self, index: usize) -> Point {
        self.control_points.row(index).transpose()
    }

    /// First and last control points, which the curve interpolates.
    pub fn end_points(&self) -> (Point, Point) {
        (self.control_point(0), self.control_point(self.n() - 1))
    }

    /// The raw control-point matrix.
    pub fn control_points_matrix(&self) -> &MatrixXx2<f64> {
        &self.control_points
    }

    /// Evaluates the curve at parameter `t`:
    /// `[1, t, .., t^(n-1)] * B_n * P`.
    pub fn value_at(&self, t: f64) -> Point {
        let n = self.n();
        let basis = RowDVector::from_fn(n, |_, k| t.powi(k as i32));
        (basis * coeffs::bernstein(n) * &self.control_points).transpose()
    }

    /// Evaluates the curve at a batch of parameters with a single
    /// power-basis multiply; element-wise equal to [`Curve::value_at`].
    pub fn values_at(&self, parameters: &[f64]) -> PointVector {
        let n = self.n();
        let basis = DMatrix::from_fn(parameters.len(), n, |row, k| parameters[row].powi(k as i32));
        let values = basis * coeffs::bernstein(n) * &self.control_points;
        (0..values.nrows()).map(|k| values.row(k).transpose()).collect()
    }

    /// Tangent of the curve at `t`, optionally normalized to unit length
    /// (left unchanged when the derivative vanishes).
    pub fn tangent_at(&self, t: f64, normalize: bool) -> Vector {
        let mut tangent = self.derivative_at(t);
        if normalize && tangent.norm() > 0.0 {
            tangent.normalize_mut();
        }
        tangent
    }

    /// Normal of the curve at `t`: the tangent rotated 90° counter-clockwise.
    pub fn normal_at(&self, t: f64, normalize: bool) -> Vector {
        let tangent = self.tangent_at(t, normalize);
        Vector::new(-tangent.y, tangent.x)
    }

    /// Signed curvature at `t`.
    pub fn curvature_at(&self, t: f64) -> f64 {
        let d1 = self.derivative_at(t);
        let d2 = self.derivative().derivative_at(t);
        (d1.x * d2.y - d1.y * d2.x) / d1.norm().powi(3)
    }

    /// Derivative of the signed curvature with respect to `t`.
    pub fn curvature_derivative_at(&self, t: f64) -> f64 {
        let d1 = self.derivative_at(t);
        let d2 = self.derivative().derivative_at(t);
        let d3 = self.derivative().derivative().derivative_at(t);
        (d1.x * d3.y - d1.y * d3.x) / d1.norm().powi(3)
            - 3.0 * d1.dot(&d2) * (d1.x * d2.y - d1.y * d2.x) / d1.norm().powi(5)
    }

    /// The derivative curve, with control points `(n-1) * (P[k+1] - P[k])`.
    ///
    /// Built on first use and owned by this curve; the returned borrow
    /// lives as long as the parent. The derivative of a degenerate
    /// single-point curve is the constant curve at the origin.
    pub fn derivative(&self) -> &Curve {
        self.cache.derivative.get_or_init(|| {
            let n = self.n();
            let control_points = if n == 1 {
                MatrixXx2::zeros(1)
            } else {
                (self.control_points.rows(1, n - 1) - self.control_points.rows(0, n - 1))
                    * (n - 1) as f64
            };
            Box::new(Curve::from_matrix(control_points))
        })
    }

    /// The `order`-th derivative curve.
    ///
    /// Returns [`CurveError::ZeroDerivativeOrder`] for `order == 0`.
    pub fn nth_derivative(&self, order: u32) -> Result<&Curve, CurveError> {
        if order == 0 {
            return Err(CurveError::ZeroDerivativeOrder);
        }
        let mut derivative = self.derivative();
        for _ in 1..order {
            derivative = derivative.derivative();
        }
        Ok(derivative)
    }

    /// First derivative evaluated at `t`.
    pub fn derivative_at(&self, t: f64) -> Vector {
        self.derivative().value_at(t)
    }

    /// `order`-th derivative evaluated at `t`.
    pub fn nth_derivative_at(&self, order: u32, t: f64) -> Result<Vector, CurveError> {
        Ok(self.nth_derivative(order)?.value_at(t))
    }

    /// Arc length of the whole curve.
    pub fn length(&self) -> f64 {
        self.length_between(0.0, 1.0)
    }

    /// Arc length from the start of the curve to `t`.
    ///
    /// The suffix length is `length_between(t, 1.0)`.
    pub fn length_to(&self, t: f64) -> f64 {
        self.length_between(0.0, t)
    }

    /// Arc length between two parameters, by Gauss-Legendre quadrature of
    /// `||C'(t)||`. Negative when `t1 > t2`.
    pub fn length_between(&self, t1: f64, t2: f64) -> f64 {
        quadrature::integrate(|t| self.derivative_at(t).norm(), t1, t2)
    }

    /// Finds the parameter `t*` lying an arc length of `s` past `t`, i.e.
    /// `length_to(t*) - length_to(t) = s`, to a precision of `epsilon`.
    ///
    /// Returns 0 when the target length falls before the curve start and 1
    /// when it falls past the curve end. Otherwise iterates Halley's method
    /// starting from `t`, capped at 50 iterations; on a vanishing
    /// denominator or a hit cap the current estimate is returned.
    pub fn iterate_by_length(&self, t: f64, s: f64, epsilon: f64) -> f64 {
        debug_assert!((0.0..=1.0).contains(&t));

        let start = self.length_to(t);
        if start + s < 0.0 {
            return 0.0;
        }
        if start + s > self.length() {
            return 1.0;
        }

        let mut t = t;
        let mut f = -s;
        for _ in 0..MAX_HALLEY_ITERATIONS {
            if f.abs() <= epsilon {
                break;
            }
            let speed = self.derivative_at(t).norm();
            let acceleration = self.derivative().derivative_at(t).norm();
            let denominator = 2.0 * speed * speed - f * acceleration;
            if denominator == 0.0 {
                break;
            }
            t -= (2.0 * f * speed) / denominator;
            f = self.length_to(t) - start - s;
        }
        t
    }

    /// Parameters in `[0, 1]` where either coordinate polynomial of the
    /// curve vanishes.
    ///
    /// X-axis roots come first, then y-axis roots, each group in solver
    /// order; duplicates are kept. Cached.
    pub fn roots(&self) -> &[f64] {
        self.cache.roots.get_or_init(|| {
            let n = self.n();
            if n < 2 {
                return Vec::new();
            }
            let polynomial = coeffs::bernstein(n) * &self.control_points;
            let mut found = Vec::new();
            for column in 0..2 {
                let coefficients: Vec<f64> = polynomial.column(column).iter().copied().collect();
                let trimmed = poly::trim_trailing_zeros(&coefficients);
                if trimmed.len() > 1 {
                    found.extend(
                        poly::real_roots(trimmed)
                            .into_iter()
                            .filter(|t| (0.0..=1.0).contains(t)),
                    );
                }
            }
            found
        })
    }

    /// Parameters in `[0, 1]` where a component of the first derivative
    /// vanishes; these govern the tight bounding box.
    pub fn extrema(&self) -> &[f64] {
        self.derivative().roots()
    }

    /// Tight axis-aligned bounding box: the box of the curve values at all
    /// extrema plus both endpoints. Cached.
    pub fn bounding_box(&self) -> BoundingBox {
        *self.cache.bounding_box.get_or_init(|| {
            let samples = self.values_at(self.extrema());
            let (first, last) = self.end_points();
            samples
                .into_iter()
                .fold(BoundingBox::from_point(first), BoundingBox::expand_to_include)
                .expand_to_include(last)
        })
    }

    /// Bounding box of the control points: a cheap conservative superset
    /// of [`Curve::bounding_box`].
    pub fn control_box(&self) -> BoundingBox {
        control_box(&self.control_points)
    }

    /// Splits the curve in half. Equivalent to `split_at(0.5)` but served
    /// from the cached splitting matrices.
    pub fn split(&self) -> (Curve, Curve) {
        self.split_at(0.5)
    }

    /// Splits the curve at `z ∈ (0, 1)` into two curves that together
    /// trace the identical image.
    pub fn split_at(&self, z: f64) -> (Curve, Curve) {
        debug_assert!((0.0..=1.0).contains(&z));
        let n = self.n();
        (
            Curve::from_matrix(coeffs::split_left_at(n, z) * &self.control_points),
            Curve::from_matrix(coeffs::split_right_at(n, z) * &self.control_points),
        )
    }

    /// Raises the order by one; the traced curve is unchanged.
    pub fn elevate_order(&mut self) {
        self.control_points = coeffs::elevate(self.n()) * &self.control_points;
        self.invalidate();
    }

    /// Lowers the order by one, as the least-squares best fit.
    ///
    /// Exact only when the curve genuinely lives in the lower order.
    /// Returns [`CurveError::OrderTooLow`] for a linear curve.
    pub fn lower_order(&mut self) -> Result<(), CurveError> {
        if self.n() == 2 {
            return Err(CurveError::OrderTooLow);
        }
        self.control_points = coeffs::lower(self.n()) * &self.control_points;
        self.invalidate();
        Ok(())
    }

    /// Moves the interior control points of a quadratic or cubic curve so
    /// the curve passes through `point` at parameter `t ∈ (0, 1)`, keeping
    /// the endpoints fixed.
    pub fn manipulate_curvature(&mut self, t: f64, point: Point) -> Result<(), CurveError> {
        let n = self.n();
        if !(3..=4).contains(&n) {
            return Err(CurveError::UnsupportedManipulationOrder { order: n - 1 });
        }
        debug_assert!(t > 0.0 && t < 1.0);

        let power = (n - 1) as i32;
        let forward = t.powi(power);
        let backward = (1.0 - t).powi(power);
        let r = ((forward + backward - 1.0) / (forward + backward)).abs();
        let u = backward / (forward + backward);

        let first = self.control_point(0);
        let last = self.control_point(n - 1);
        let anchor = u * first + (1.0 - u) * last;
        let a = point - (anchor - point) / r;

        if n == 3 {
            self.control_points.row_mut(1).copy_from(&a.transpose());
        } else {
            let p1 = self.control_point(1);
            let p2 = self.control_point(2);
            let value = self.value_at(t);
            let mt = 1.0 - t;

            let shift = point - value;
            let e1 = first * (mt * mt) + p1 * (2.0 * t * mt) + p2 * (t * t) + shift;
            let e2 = p1 * (mt * mt) + p2 * (2.0 * t * mt) + last * (t * t) + shift;
            let v1 = a - (a - e1) / mt;
            let v2 = a + (e2 - a) / t;
            let new_p1 = first + (v1 - first) / t;
            let new_p2 = last - (last - v2) / mt;
            self.control_points.row_mut(1).copy_from(&new_p1.transpose());
            self.control_points.row_mut(2).copy_from(&new_p2.transpose());
        }
        self.invalidate();
        Ok(())
    }

    /// Replaces a single control point.
    ///
    /// Panics when `index` is out of range.
    pub fn move_control_point(&mut self, index: usize, point: Point) {
        self.control_points.row_mut(index).copy_from(&point.transpose());
        self.invalidate();
    }

    /// Reverses the direction of the curve by reversing the control-point
    /// order. Applying it twice restores the control points exactly.
    pub fn reverse(&mut self) {
        let n = self.n();
        for k in 0..n / 2 {
            self.control_points.swap_rows(k, n - 1 - k);
        }
        self.invalidate();
    }

    /// Approximates the curve by a polyline, subdividing until the control
    /// points of every piece sit within `flatness` of its chord (measured
    /// by a second-moment test against the uniform baseline).
    /// [`crate::DEFAULT_FLATNESS`] is a reasonable default.
    ///
    /// The result is cached and reused while the requested flatness stays
    /// within `1e-10` of the cached one.
    pub fn polyline(&self, flatness: f64) -> PointVector {
        let mut slot = self.cache.polyline.lock().unwrap();
        if let Some(cached) = slot.as_ref() {
            if (cached.flatness - flatness).abs() < 1e-10 {
                return cached.points.clone();
            }
        }

        let n = self.n();
        let mut points = vec![self.control_point(0)];
        if n == 2 {
            points.push(self.control_point(1));
        } else {
            let binomials: Vec<f64> = (1..n - 1).map(|k| coeffs::binomial(n - 1, k)).collect();
            let limit = 16.0 * flatness * flatness;
            let mut subcurves = vec![self.control_points.clone()];

            while let Some(cp) = subcurves.pop() {
                let step = (cp.row(n - 1) - cp.row(0)).transpose() / (n - 1) as f64;

                let mut worst_x = 0.0_f64;
                let mut worst_y = 0.0_f64;
                for k in 1..n - 1 {
                    let weight = binomials[k - 1];
                    let dx = weight * (cp[(k, 0)] - cp[(0, 0)] - k as f64 * step.x);
                    let dy = weight * (cp[(k, 1)] - cp[(0, 1)] - k as f64 * step.y);
                    worst_x = worst_x.max(dx * dx);
                    worst_y = worst_y.max(dy * dy);
                }

                if worst_x + worst_y <= limit {
                    points.push(cp.row(n - 1).transpose());
                } else {
                    // push right first so the leftmost piece is expanded
                    // next and the output stays ordered along the curve
                    subcurves.push(coeffs::split_right(n) * &cp);
                    subcurves.push(coeffs::split_left(n) * &cp);
                }
            }
        }

        *slot = Some(CachedPolyline {
            flatness,
            points: points.clone(),
        });
        points
    }

    /// Points where this curve meets `other`, to a precision of `epsilon`
    /// ([`crate::DEFAULT_EPSILON`] is a reasonable default).
    ///
    /// Passing the same curve for both sides finds self-intersections: the
    /// curve is first cut apart at its extrema (each cut shrunk inwards by
    /// `epsilon / 2` on both sides) and all sub-curve pairs are searched.
    /// Accepted points are pairwise more than `epsilon` apart. Subdivision
    /// of a candidate pair stops after 100 rounds and yields the current
    /// box center as the best estimate.
    pub fn intersections(&self, other: &Curve, epsilon: f64) -> PointVector {
        let mut found = PointVector::new();
        let mut pairs: Vec<(MatrixXx2<f64>, MatrixXx2<f64>, u32)> = Vec::new();

        if std::ptr::eq(self, other) {
            let n = self.n();
            let mut cuts: Vec<f64> = self.extrema().to_vec();
            cuts.sort_by(f64::total_cmp);

            let mut subcurves: Vec<MatrixXx2<f64>> = Vec::new();
            for k in 0..cuts.len() {
                let cut = cuts[k];
                let source = match subcurves.pop() {
                    Some(remainder) => remainder,
                    None => self.control_points.clone(),
                };
                subcurves.push(coeffs::split_left_at(n, cut - epsilon / 2.0) * &source);
                subcurves.push(coeffs::split_right_at(n, cut + epsilon / 2.0) * &source);

                // remaining cuts live on the right remainder; remap them
                // into its parameter range
                for later in cuts[k + 1..].iter_mut() {
                    *later = (*later - cut) / (1.0 - cut);
                }
            }

            for i in 0..subcurves.len() {
                for j in i + 1..subcurves.len() {
                    pairs.push((subcurves[i].clone(), subcurves[j].clone(), 0));
                }
            }
        } else {
            pairs.push((self.control_points.clone(), other.control_points.clone(), 0));
        }

        while let Some((part_a, part_b, depth)) = pairs.pop() {
            let box_a = control_box(&part_a);
            let box_b = control_box(&part_b);
            if !box_a.intersects(box_b) {
                continue;
            }

            let diagonal_a = box_a.diagonal().norm();
            let diagonal_b = box_b.diagonal().norm();
            if (diagonal_a < epsilon && diagonal_b < epsilon)
                || depth >= MAX_INTERSECTION_SUBDIVISIONS
            {
                let candidate = box_a.center();
                if found.iter().all(|p| (p - candidate).norm() >= epsilon) {
                    found.push(candidate);
                }
                continue;
            }

            // halve whichever sides are still too large; right half first
            let halves_a = if diagonal_a < epsilon {
                vec![part_a]
            } else {
                let n = part_a.nrows();
                vec![
                    coeffs::split_right(n) * &part_a,
                    coeffs::split_left(n) * &part_a,
                ]
            };
            let halves_b = if diagonal_b < epsilon {
                vec![part_b]
            } else {
                let n = part_b.nrows();
                vec![
                    coeffs::split_right(n) * &part_b,
                    coeffs::split_left(n) * &part_b,
                ]
            };

            for half_b in &halves_b {
                for half_a in &halves_a {
                    pairs.push((half_a.clone(), half_b.clone(), depth + 1));
                }
            }
        }

        found
    }

    /// Parameter of the point on the curve closest to `point`.
    ///
    /// The critical parameters are the real roots of
    /// `C'(t) . (C(t) - point)`, a polynomial of degree `2n - 3` whose
    /// point-independent part is cached; the endpoints always compete as
    /// candidates. When the closest point is attained on several branches
    /// (a self-intersecting curve), an arbitrary one of them wins.
    pub fn project_point(&self, point: Point) -> f64 {
        let n = self.n();
        if n < 2 {
            return 0.0;
        }

        let prefactor = self.cache.projection.get_or_init(|| {
            let curve_polynomial = coeffs::bernstein(n) * &self.control_points;
            let derivative_polynomial =
                coeffs::bernstein(n - 1) * self.derivative().control_points_matrix();

            let mut part = DVector::<f64>::zeros(2 * n - 2);
            for k in 0..n {
                let contribution = &derivative_polynomial * curve_polynomial.row(k).transpose();
                let mut rows = part.rows_mut(k, n - 1);
                rows += contribution;
            }
            ProjectionPolynomial {
                part,
                derivative: derivative_polynomial,
            }
        });

        let mut polynomial = prefactor.part.clone();
        {
            let offset = &prefactor.derivative * point;
            let mut rows = polynomial.rows_mut(0, prefactor.derivative.nrows());
            rows -= offset;
        }

        let (first, last) = self.end_points();
        let mut projection = if (point - first).norm() < (point - last).norm() {
            0.0
        } else {
            1.0
        };
        let mut best = (point - self.value_at(projection)).norm();

        let coefficients: Vec<f64> = polynomial.iter().copied().collect();
        let trimmed = poly::trim_trailing_zeros(&coefficients);
        if trimmed.len() > 1 {
            for candidate in poly::real_roots(trimmed) {
                if !(0.0..=1.0).contains(&candidate) {
                    continue;
                }
                let distance = (point - self.value_at(candidate)).norm();
                if distance < best {
                    projection = candidate;
                    best = distance;
                }
            }
        }
        projection
    }

    /// Projects a batch of points; element-wise equal to
    /// [`Curve::project_point`].
    pub fn project_points(&self, points: &[Point]) -> Vec<f64> {
        points.iter().map(|&p| self.project_point(p)).collect()
    }

    /// Distance from `point` to the curve.
    pub fn distance(&self, point: Point) -> f64 {
        (point - self.value_at(self.project_point(point))).norm()
    }

    /// Distances from a batch of points to the curve.
    pub fn distances(&self, points: &[Point]) -> Vec<f64> {
        points.iter().map(|&p| self.distance(p)).collect()
    }

    /// Constrains the first `beta.len() + 1` control points so that this
    /// curve's derivatives at its start match the end derivatives of
    /// `source`, scaled by the `beta` coefficients (Farin's Gᵏ/Cᵏ
    /// construction). `beta = [1.0]` yields C¹ continuity, an empty `beta`
    /// plain C⁰.
    pub fn apply_continuity(&mut self, source: &Curve, beta: &[f64]) -> Result<(), CurveError> {
        let n = self.n();
        let order = beta.len();
        if order + 1 > n {
            return Err(CurveError::ContinuityOrderTooHigh {
                requested: order,
                order: n - 1,
            });
        }

        let mut pascal = DMatrix::<f64>::zeros(order + 1, order + 1);
        for i in 1..=order {
            pascal[(i, i - 1)] = -(i as f64);
        }
        let pascal = pascal.exp();

        // columns encode the partial Bell polynomials in beta
        let mut bell = DMatrix::<f64>::zeros(order + 1, order + 1);
        bell[(0, order)] = 1.0;
        for i in 0..order {
            let weights = DVector::from_fn(i + 1, |r, _| pascal[(i, r)].abs() * beta[r]);
            let block = bell.view((0, order - i), (i + 1, i + 1)).into_owned();
            let column = block * weights;
            for r in 0..=i {
                bell[(r + 1, order - i - 1)] = column[r];
            }
        }

        let mut factorials = DMatrix::<f64>::zeros(order + 1, order + 1);
        for i in 0..=order {
            factorials[(i, i)] = coeffs::factorial(n - 1) / coeffs::factorial(n - 1 - i);
        }

        let mut derivatives = DMatrix::<f64>::zeros(2, order + 1);
        derivatives.set_column(0, &source.control_point(source.n() - 1));
        let mut source_derivative = source;
        for i in 1..=order {
            source_derivative = source_derivative.derivative();
            derivatives.set_column(
                i,
                &source_derivative.control_point(source_derivative.n() - 1),
            );
        }

        let product = derivatives * bell;
        let mut required = DMatrix::<f64>::zeros(order + 1, 2);
        for j in 0..=order {
            required.set_row(j, &product.column(order - j).transpose());
        }

        let inverse = (factorials * pascal)
            .try_inverse()
            .expect("factorial-pascal matrix is invertible");
        let constrained = inverse * required;
        self.control_points.rows_mut(0, order + 1).copy_from(&constrained);
        self.invalidate();
        Ok(())
    }
}

/// Box of the rows of a control-point matrix.
fn control_box(control_points: &MatrixXx2<f64>) -> BoundingBox {
    BoundingBox::new(
        Point::new(control_points.column(0).min(), control_points.column(1).min()),
        Point::new(control_points.column(0).max(), control_points.column(1).max()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quadratic() -> Curve {
        Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 2.0),
            Point::new(2.0, 0.0),
        ])
        .unwrap()
    }

    fn cubic() -> Curve {
        Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 2.0),
            Point::new(2.0, -1.0),
            Point::new(3.0, 0.0),
        ])
        .unwrap()
    }

    /// Straightforward de Casteljau evaluation, as an independent oracle.
    fn de_casteljau(curve: &Curve, t: f64) -> Point {
        let mut points = curve.control_points();
        while points.len() > 1 {
            points = points
                .windows(2)
                .map(|pair| pair[0] * (1.0 - t) + pair[1] * t)
                .collect();
        }
        points[0]
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert_eq!(
            Curve::from_points(vec![]).unwrap_err(),
            CurveError::EmptyControlPoints
        );
        assert_eq!(
            Curve::new(MatrixXx2::zeros(0)).unwrap_err(),
            CurveError::EmptyControlPoints
        );
    }

    #[test]
    fn test_inspection() {
        let curve = cubic();
        assert_eq!(curve.order(), 3);
        assert_eq!(curve.control_points().len(), 4);
        assert_relative_eq!(curve.control_point(2).x, 2.0, epsilon = 1e-12);
        let (start, end) = curve.end_points();
        assert_relative_eq!(start.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(end.x, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cubic_evaluation() {
        let curve = cubic();
        let value = curve.value_at(0.5);
        assert_relative_eq!(value.x, 1.5, epsilon = 1e-12);
        assert_relative_eq!(value.y, 0.375, epsilon = 1e-12);

        let (start, end) = curve.end_points();
        assert_relative_eq!((curve.value_at(0.0) - start).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!((curve.value_at(1.0) - end).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_evaluation_matches_de_casteljau() {
        let curve = cubic();
        for k in 0..=20 {
            let t = k as f64 / 20.0;
            let difference = curve.value_at(t) - de_casteljau(&curve, t);
            assert!(difference.norm() < 1e-10, "mismatch at t = {t}");
        }
    }

    #[test]
    fn test_values_at_matches_scalar_evaluation() {
        let curve = cubic();
        let parameters: Vec<f64> = (0..=10).map(|k| k as f64 / 10.0).collect();
        let batch = curve.values_at(&parameters);
        for (&t, &point) in parameters.iter().zip(batch.iter()) {
            assert!((point - curve.value_at(t)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_degenerate_single_point_curve() {
        let curve = Curve::from_points(vec![Point::new(2.0, 3.0)]).unwrap();
        assert_eq!(curve.order(), 0);
        let value = curve.value_at(0.7);
        assert_relative_eq!(value.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(value.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_control_points() {
        let curve = cubic();
        let derivative = curve.derivative();
        assert_eq!(derivative.order(), 2);
        let expected = [(3.0, 6.0), (3.0, -9.0), (3.0, 3.0)];
        for (k, &(x, y)) in expected.iter().enumerate() {
            assert_relative_eq!(derivative.control_point(k).x, x, epsilon = 1e-12);
            assert_relative_eq!(derivative.control_point(k).y, y, epsilon = 1e-12);
        }

        // derivative of a linear curve is constant, of a point the origin
        let line = Curve::from_points(vec![Point::new(0.0, 0.0), Point::new(2.0, 1.0)]).unwrap();
        assert_eq!(line.derivative().order(), 0);
        assert_relative_eq!(line.derivative().derivative().value_at(0.3).norm(), 0.0);
    }

    #[test]
    fn test_derivative_matches_finite_differences() {
        let curve = cubic();
        let h = 1e-4;
        for k in 1..10 {
            let t = k as f64 / 10.0;
            let numeric = (curve.value_at(t + h) - curve.value_at(t - h)) / (2.0 * h);
            let exact = curve.derivative_at(t);
            assert!((numeric - exact).norm() < 1e-4, "mismatch at t = {t}");
        }
    }

    #[test]
    fn test_nth_derivative() {
        let curve = cubic();
        assert_eq!(
            curve.nth_derivative(0).unwrap_err(),
            CurveError::ZeroDerivativeOrder
        );
        assert_eq!(curve.nth_derivative(2).unwrap().order(), 1);
        // the fourth derivative of a cubic vanishes
        assert_relative_eq!(
            curve.nth_derivative_at(4, 0.3).unwrap().norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_tangent_and_normal() {
        let curve = quadratic();
        // the apex tangent is horizontal
        let tangent = curve.tangent_at(0.5, true);
        assert_relative_eq!(tangent.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(tangent.y, 0.0, epsilon = 1e-12);

        let normal = curve.normal_at(0.5, true);
        assert_relative_eq!(normal.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(normal.y, 1.0, epsilon = 1e-12);

        // unnormalized tangent is the raw derivative
        let raw = curve.tangent_at(0.25, false);
        assert!((raw - curve.derivative_at(0.25)).norm() < 1e-12);
    }

    #[test]
    fn test_curvature() {
        let curve = cubic();
        // at t = 1/2: C' = (3, -2.25), C'' = (0, -3)
        let d1 = curve.derivative_at(0.5);
        let d2 = curve.derivative().derivative_at(0.5);
        let expected = (d1.x * d2.y - d1.y * d2.x) / d1.norm().powi(3);
        assert_relative_eq!(curve.curvature_at(0.5), expected, epsilon = 1e-12);
        assert_relative_eq!(curve.curvature_at(0.5), -9.0 / 3.75_f64.powi(3), epsilon = 1e-12);

        // a straight line has zero curvature everywhere
        let line = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
        ])
        .unwrap();
        assert_relative_eq!(line.curvature_at(0.25), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_curvature_derivative_matches_finite_differences() {
        let curve = cubic();
        let h = 1e-5;
        for k in 2..9 {
            let t = k as f64 / 10.0;
            let numeric = (curve.curvature_at(t + h) - curve.curvature_at(t - h)) / (2.0 * h);
            assert_relative_eq!(
                curve.curvature_derivative_at(t),
                numeric,
                epsilon = 1e-4,
                max_relative = 1e-4
            );
        }
    }

    #[test]
    fn test_roots_of_cubic() {
        // y(t) of this curve vanishes at the endpoints' parameters and once between
        let curve = cubic();
        let roots = curve.roots();
        assert!(roots.iter().any(|&t| t.abs() < 1e-9));
        assert!(roots.iter().all(|&t| (0.0..=1.0).contains(&t)));
    }

    #[test]
    fn test_extrema_of_symmetric_quadratic() {
        let curve = quadratic();
        // y'(t) = 0 at the apex only
        let extrema = curve.extrema();
        assert_eq!(extrema.len(), 1);
        assert_relative_eq!(extrema[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_bounding_box_contains_samples() {
        let curve = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 8.0),
            Point::new(8.0, -8.0),
            Point::new(12.0, 0.0),
        ])
        .unwrap();
        let bounds = curve.bounding_box();
        for k in 0..=1000 {
            let t = k as f64 / 1000.0;
            let p = curve.value_at(t);
            // allow for roundoff right at the box faces
            assert!(
                p.x >= bounds.min.x - 1e-9
                    && p.x <= bounds.max.x + 1e-9
                    && p.y >= bounds.min.y - 1e-9
                    && p.y <= bounds.max.y + 1e-9,
                "sample at t = {t} escapes the bounding box"
            );
        }

        // the tight box is inside the control-point box
        let relaxed = curve.control_box();
        assert!(relaxed.contains_point(bounds.min));
        assert!(relaxed.contains_point(bounds.max));
    }

    #[test]
    fn test_bounding_box_of_quadratic() {
        let bounds = quadratic().bounding_box();
        assert_relative_eq!(bounds.min.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.min.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.max.x, 2.0, epsilon = 1e-9);
        // the apex is at y = 1, below the control point at y = 2
        assert_relative_eq!(bounds.max.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_split_in_half() {
        let (left, right) = quadratic().split();
        let expected_left = [(0.0, 0.0), (0.5, 1.0), (1.0, 1.0)];
        let expected_right = [(1.0, 1.0), (1.5, 1.0), (2.0, 0.0)];
        for (k, &(x, y)) in expected_left.iter().enumerate() {
            assert_relative_eq!(left.control_point(k).x, x, epsilon = 1e-12);
            assert_relative_eq!(left.control_point(k).y, y, epsilon = 1e-12);
        }
        for (k, &(x, y)) in expected_right.iter().enumerate() {
            assert_relative_eq!(right.control_point(k).x, x, epsilon = 1e-12);
            assert_relative_eq!(right.control_point(k).y, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_split_preserves_geometry() {
        let curve = cubic();
        for &z in &[0.25, 0.5, 0.8] {
            let (left, right) = curve.split_at(z);
            for k in 0..=10 {
                let u = k as f64 / 10.0;
                let on_left = (curve.value_at(z * u) - left.value_at(u)).norm();
                let on_right = (curve.value_at(z + (1.0 - z) * u) - right.value_at(u)).norm();
                assert!(on_left < 1e-10, "left half diverges at z = {z}, u = {u}");
                assert!(on_right < 1e-10, "right half diverges at z = {z}, u = {u}");
            }
        }
    }

    #[test]
    fn test_elevate_preserves_geometry() {
        let mut curve = quadratic();
        let samples: Vec<Point> = (0..=10).map(|k| curve.value_at(k as f64 / 10.0)).collect();
        curve.elevate_order();
        assert_eq!(curve.order(), 3);
        for (k, &expected) in samples.iter().enumerate() {
            let t = k as f64 / 10.0;
            assert!((curve.value_at(t) - expected).norm() < 1e-10);
        }
    }

    #[test]
    fn test_elevate_then_lower_roundtrip() {
        let mut curve = quadratic();
        curve.elevate_order();
        curve.lower_order().unwrap();
        assert_eq!(curve.order(), 2);
        let expected = [(0.0, 0.0), (1.0, 2.0), (2.0, 0.0)];
        for (k, &(x, y)) in expected.iter().enumerate() {
            assert_relative_eq!(curve.control_point(k).x, x, epsilon = 1e-10);
            assert_relative_eq!(curve.control_point(k).y, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_lower_order_of_line_is_rejected() {
        let mut line =
            Curve::from_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]).unwrap();
        assert_eq!(line.lower_order().unwrap_err(), CurveError::OrderTooLow);
        assert_eq!(line.order(), 1);
    }

    #[test]
    fn test_manipulate_curvature_quadratic() {
        let mut curve = quadratic();
        let target = Point::new(1.0, 1.5);
        curve.manipulate_curvature(0.5, target).unwrap();
        assert!((curve.value_at(0.5) - target).norm() < 1e-10);
        // endpoints stay put
        assert_relative_eq!(curve.control_point(0).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(curve.control_point(2).x, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_manipulate_curvature_cubic() {
        let mut curve = cubic();
        let target = Point::new(1.2, 0.9);
        curve.manipulate_curvature(0.4, target).unwrap();
        assert!((curve.value_at(0.4) - target).norm() < 1e-9);
    }

    #[test]
    fn test_manipulate_curvature_rejects_other_orders() {
        let mut line =
            Curve::from_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]).unwrap();
        assert_eq!(
            line.manipulate_curvature(0.5, Point::new(0.5, 1.0))
                .unwrap_err(),
            CurveError::UnsupportedManipulationOrder { order: 1 }
        );

        let mut quartic = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 1.0),
            Point::new(3.0, 1.0),
            Point::new(4.0, 0.0),
        ])
        .unwrap();
        assert!(quartic
            .manipulate_curvature(0.5, Point::new(2.0, 2.0))
            .is_err());
    }

    #[test]
    fn test_move_control_point_invalidates_cache() {
        let mut curve = quadratic();
        let before = curve.bounding_box();
        curve.move_control_point(1, Point::new(1.0, 4.0));
        let after = curve.bounding_box();
        assert!(after.max.y > before.max.y + 0.5);
    }

    #[test]
    fn test_reverse_twice_is_identity() {
        let mut curve = cubic();
        let original = curve.control_points_matrix().clone();
        curve.reverse();
        assert_relative_eq!(curve.control_point(0).x, 3.0, epsilon = 1e-12);
        curve.reverse();
        assert_eq!(curve.control_points_matrix(), &original);
    }

    #[test]
    fn test_polyline_linear_curve() {
        let line = Curve::from_points(vec![Point::new(0.0, 0.0), Point::new(3.0, 0.0)]).unwrap();
        let polyline = line.polyline(0.1);
        assert_eq!(polyline.len(), 2);
    }

    #[test]
    fn test_polyline_follows_curve() {
        let curve = cubic();
        let polyline = curve.polyline(0.01);
        assert!(polyline.len() > 2);
        assert!((polyline[0] - curve.value_at(0.0)).norm() < 1e-12);
        assert!((polyline[polyline.len() - 1] - curve.value_at(1.0)).norm() < 1e-12);
        // every vertex lies on the curve
        for &vertex in &polyline {
            assert!(curve.distance(vertex) < 1e-6);
        }
        // finer flatness gives more vertices
        assert!(curve.polyline(0.0001).len() > polyline.len());
    }

    #[test]
    fn test_polyline_cache_reuse() {
        let curve = cubic();
        let first = curve.polyline(0.05);
        let again = curve.polyline(0.05 + 1e-12);
        assert_eq!(first.len(), again.len());
    }

    #[test]
    fn test_length_of_straight_line() {
        let line = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 0.0),
        ])
        .unwrap();
        assert_relative_eq!(line.length(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(line.length_to(0.5), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_length_additivity() {
        let curve = cubic();
        for &t in &[0.1, 0.4, 0.7] {
            let split_sum = curve.length_between(0.0, t) + curve.length_between(t, 1.0);
            assert_relative_eq!(split_sum, curve.length(), epsilon = 1e-6);
        }
        assert_relative_eq!(curve.length_between(0.3, 0.3), 0.0, epsilon = 1e-12);
        assert!(curve.length() >= (curve.value_at(1.0) - curve.value_at(0.0)).norm());
    }

    #[test]
    fn test_iterate_by_length_inverts_length() {
        let curve = cubic();
        for &t in &[0.2, 0.5, 0.9] {
            let s = curve.length_to(t);
            let recovered = curve.iterate_by_length(0.0, s, 1e-8);
            assert_relative_eq!(recovered, t, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_iterate_by_length_clamps() {
        let curve = cubic();
        assert_relative_eq!(curve.iterate_by_length(0.5, -100.0, 1e-8), 0.0);
        assert_relative_eq!(curve.iterate_by_length(0.5, 100.0, 1e-8), 1.0);
    }

    #[test]
    fn test_pair_intersections() {
        let wave = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 6.0),
            Point::new(6.0, -6.0),
            Point::new(9.0, 0.0),
        ])
        .unwrap();
        let zigzag = Curve::from_points(vec![
            Point::new(0.0, -3.0),
            Point::new(9.0, -3.0),
            Point::new(0.0, 3.0),
            Point::new(9.0, 3.0),
        ])
        .unwrap();

        let epsilon = 1e-4;
        let points = wave.intersections(&zigzag, epsilon);
        assert!(!points.is_empty());
        for &p in &points {
            assert!(wave.distance(p) < 1e-3);
            assert!(zigzag.distance(p) < 1e-3);
        }
        // pairwise distinct
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                assert!((points[i] - points[j]).norm() > epsilon);
            }
        }

        // halving epsilon keeps the found set stable: every crossing is
        // found again in the refined run
        let refined = wave.intersections(&zigzag, epsilon / 2.0);
        for &p in &points {
            assert!(refined.iter().any(|&q| (p - q).norm() < 10.0 * epsilon));
        }
    }

    #[test]
    fn test_disjoint_curves_do_not_intersect() {
        let curve = cubic();
        let far_away = Curve::from_points(vec![
            Point::new(100.0, 100.0),
            Point::new(101.0, 102.0),
            Point::new(102.0, 100.0),
        ])
        .unwrap();
        assert!(curve.intersections(&far_away, 1e-4).is_empty());
    }

    #[test]
    fn test_self_intersection_of_loop() {
        // this loop crosses itself at exactly (0.5, 0.375), reached at
        // t = (2 - sqrt(3)) / 4 and t = (2 + sqrt(3)) / 4
        let loop_curve = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 2.0),
            Point::new(-2.0, 2.0),
            Point::new(1.0, 0.0),
        ])
        .unwrap();

        let epsilon = 1e-3;
        let points = loop_curve.intersections(&loop_curve, epsilon);
        let crossing = Point::new(0.5, 0.375);
        assert!(
            points.iter().any(|&p| (p - crossing).norm() < 10.0 * epsilon),
            "crossing not found: {points:?}"
        );
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                assert!((points[i] - points[j]).norm() > epsilon);
            }
        }
    }

    #[test]
    fn test_projection_onto_line_like_cubic() {
        let line = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 0.0),
        ])
        .unwrap();
        let t = line.project_point(Point::new(1.5, 1.0));
        assert_relative_eq!(t, 0.5, epsilon = 1e-4);
        assert_relative_eq!(line.distance(Point::new(1.5, 1.0)), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_of_point_on_curve() {
        let curve = cubic();
        for &t in &[0.0, 0.3, 0.65, 1.0] {
            let projected = curve.project_point(curve.value_at(t));
            assert!((curve.value_at(projected) - curve.value_at(t)).norm() < 1e-6);
        }
    }

    #[test]
    fn test_projection_prefers_endpoints_when_closest() {
        let curve = quadratic();
        assert_relative_eq!(curve.project_point(Point::new(-2.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(curve.project_point(Point::new(4.0, 0.0)), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_project_points_and_distances_batches() {
        let curve = quadratic();
        let queries = [Point::new(1.0, 2.0), Point::new(-1.0, 0.0)];
        let parameters = curve.project_points(&queries);
        let distances = curve.distances(&queries);
        for (k, &q) in queries.iter().enumerate() {
            assert_relative_eq!(parameters[k], curve.project_point(q), epsilon = 1e-12);
            assert_relative_eq!(distances[k], curve.distance(q), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_apply_continuity_c1() {
        let source = cubic();
        let mut target = Curve::from_points(vec![
            Point::new(10.0, 10.0),
            Point::new(11.0, 10.0),
            Point::new(12.0, 11.0),
            Point::new(13.0, 10.0),
        ])
        .unwrap();

        target.apply_continuity(&source, &[1.0]).unwrap();

        // position and first derivative both match at the joint
        assert!((target.value_at(0.0) - source.value_at(1.0)).norm() < 1e-9);
        assert!((target.derivative_at(0.0) - source.derivative_at(1.0)).norm() < 1e-9);
        // the free control points are untouched
        assert_relative_eq!(target.control_point(3).x, 13.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_continuity_c0() {
        let source = quadratic();
        let mut target = cubic();
        target.apply_continuity(&source, &[]).unwrap();
        assert!((target.value_at(0.0) - source.value_at(1.0)).norm() < 1e-10);
    }

    #[test]
    fn test_apply_continuity_g1_scales_velocity() {
        let source = cubic();
        let mut target = Curve::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 1.0),
            Point::new(3.0, 0.0),
        ])
        .unwrap();
        target.apply_continuity(&source, &[2.0]).unwrap();
        assert!((target.derivative_at(0.0) - 2.0 * source.derivative_at(1.0)).norm() < 1e-9);
    }

    #[test]
    fn test_apply_continuity_order_too_high() {
        let source = cubic();
        let mut line =
            Curve::from_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]).unwrap();
        assert_eq!(
            line.apply_continuity(&source, &[1.0, 1.0]).unwrap_err(),
            CurveError::ContinuityOrderTooHigh {
                requested: 2,
                order: 1
            }
        );
    }

    #[test]
    fn test_cached_artifacts_match_fresh_computation() {
        let curve = cubic();
        let first_roots = curve.roots().to_vec();
        let first_box = curve.bounding_box();
        // cached reads return the identical artifacts
        assert_eq!(curve.roots(), first_roots.as_slice());
        assert_eq!(curve.bounding_box(), first_box);

        let fresh = curve.clone();
        assert_eq!(fresh.roots(), first_roots.as_slice());
        assert_eq!(fresh.bounding_box(), first_box);
    }
}
