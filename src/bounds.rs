//! Axis-aligned bounding box.

use crate::{Point, Vector};

/// A 2D axis-aligned bounding box.
///
/// Defined by minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner (smallest x and y values).
    pub min: Point,
    /// Maximum corner (largest x and y values).
    pub max: Point,
}

impl BoundingBox {
    /// Creates a new bounding box from min and max corners.
    ///
    /// Does not validate that min <= max.
    #[inline]
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from two arbitrary corners.
    ///
    /// Correctly handles corners in any orientation.
    #[inline]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a bounding box containing a single point.
    #[inline]
    pub fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    /// Creates a bounding box from an iterator of points.
    ///
    /// Returns `None` if the iterator is empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;

        let mut bounds = Self::from_point(first);
        for p in iter {
            bounds = bounds.expand_to_include(p);
        }
        Some(bounds)
    }

    /// Returns the width of the box.
    #[inline]
    pub fn width(self) -> f64 {
        self.max.x - self.min.x
    }

    /// Returns the height of the box.
    #[inline]
    pub fn height(self) -> f64 {
        self.max.y - self.min.y
    }

    /// Returns the vector from the minimum to the maximum corner.
    #[inline]
    pub fn diagonal(self) -> Vector {
        self.max - self.min
    }

    /// Returns the center point of the box.
    #[inline]
    pub fn center(self) -> Point {
        (self.min + self.max) / 2.0
    }

    /// Returns a new box expanded to include the given point.
    #[inline]
    pub fn expand_to_include(self, p: Point) -> Self {
        Self {
            min: Point::new(self.min.x.min(p.x), self.min.y.min(p.y)),
            max: Point::new(self.max.x.max(p.x), self.max.y.max(p.y)),
        }
    }

    /// Returns the union of two boxes (smallest box containing both).
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Returns `true` if this box contains the given point.
    #[inline]
    pub fn contains_point(self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Returns `true` if this box intersects another box.
    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}
