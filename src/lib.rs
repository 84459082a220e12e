//! bezium - planar Bézier curves of arbitrary order.
//!
//! Represents a Bézier curve by its control points and answers geometric
//! queries about it: evaluation, derivatives, curvature, arc length (with
//! inversion back to the parameter), extrema, bounding boxes, adaptive
//! polyline approximation, splitting, order elevation and reduction,
//! intersections (including self-intersections), point projection, and
//! parametric continuity between curves.
//!
//! All arithmetic is double precision and the parameter domain of every
//! curve is `t ∈ [0, 1]`.

pub mod bounds;
pub mod curve;
pub mod error;
pub mod sturm;

mod coeffs;
mod poly;
mod quadrature;

pub use bounds::BoundingBox;
pub use curve::Curve;
pub use error::CurveError;

/// A point in the xy plane.
pub type Point = nalgebra::Vector2<f64>;

/// A direction or offset in the xy plane.
pub type Vector = nalgebra::Vector2<f64>;

/// A sequence of points, as produced by polyline and intersection queries.
pub type PointVector = Vec<Point>;

/// Default flatness for polyline approximation.
pub const DEFAULT_FLATNESS: f64 = 0.5;

/// Default precision for intersections and Sturm root isolation.
pub const DEFAULT_EPSILON: f64 = 0.001;
