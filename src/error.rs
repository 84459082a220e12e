//! Error types for curve operations.

use thiserror::Error;

/// Precondition violations reported by curve operations.
///
/// Numerical difficulties (non-convergence of an iteration) are never
/// reported through this type; they are resolved internally by clamping
/// or by returning the best available estimate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    /// A curve requires at least one control point.
    #[error("a curve requires at least one control point")]
    EmptyControlPoints,

    /// The order of a linear curve cannot be lowered further.
    #[error("the order of a linear curve cannot be lowered further")]
    OrderTooLow,

    /// Curvature manipulation is defined for quadratic and cubic curves only.
    #[error("curvature manipulation requires a quadratic or cubic curve, got order {order}")]
    UnsupportedManipulationOrder {
        /// Order of the curve the manipulation was attempted on.
        order: usize,
    },

    /// The zeroth derivative is the curve itself and is not produced here.
    #[error("derivative order must be at least 1")]
    ZeroDerivativeOrder,

    /// Continuity constraints may not involve more control points than the curve has.
    #[error("continuity of order {requested} cannot be applied to a curve of order {order}")]
    ContinuityOrderTooHigh {
        /// Number of derivative constraints requested.
        requested: usize,
        /// Order of the curve being constrained.
        order: usize,
    },
}
