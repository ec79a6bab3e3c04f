//! Common value types and traits for integer 3D geometry.
//!
//! All lengths are whole centimetres and all volumes are computed in `u64`,
//! so containment and overlap decisions never suffer from rounding.

use std::ops::Add;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Tolerance for mass comparisons in kg.
///
/// Masses are the only floating point quantities in the engine; sums are
/// recomputed from the placed items on every commit so drift cannot build up.
pub const EPSILON_MASS: f64 = 1e-6;

/// A point in container space, usually the minimum corner of a box.
///
/// # Examples
/// ```
/// use stowplan::types::{Dims, Point3};
///
/// let corner = Point3::new(10, 0, 0);
/// let far = corner + Dims::new(5, 5, 5);
/// assert_eq!(far, Point3::new(15, 5, 5));
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub struct Point3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Point3 {
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// The container origin (open-face, floor, left corner).
    #[inline]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Extents of a box along x (width), y (depth) and z (height).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub struct Dims {
    pub width: u32,
    pub depth: u32,
    pub height: u32,
}

impl Dims {
    #[inline]
    pub const fn new(width: u32, depth: u32, height: u32) -> Self {
        Self {
            width,
            depth,
            height,
        }
    }

    /// Volume in cubic centimetres.
    #[inline]
    pub fn volume(&self) -> u64 {
        u64::from(self.width) * u64::from(self.depth) * u64::from(self.height)
    }

    /// All three extents are non-zero.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.depth > 0 && self.height > 0
    }

    /// Component-wise `<=` without any rotation.
    #[inline]
    pub fn fits_within(&self, outer: &Self) -> bool {
        self.width <= outer.width && self.depth <= outer.depth && self.height <= outer.height
    }
}

impl Add<Dims> for Point3 {
    type Output = Point3;

    /// Saturates instead of wrapping; coordinates are validated against
    /// container bounds long before they approach `u32::MAX`.
    #[inline]
    fn add(self, rhs: Dims) -> Self::Output {
        Point3::new(
            self.x.saturating_add(rhs.width),
            self.y.saturating_add(rhs.depth),
            self.z.saturating_add(rhs.height),
        )
    }
}

/// One of the three container axes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Width,
    #[default]
    Depth,
    Height,
}

impl Axis {
    /// Coordinate of `point` along this axis.
    #[inline]
    pub fn of_point(self, point: &Point3) -> u32 {
        match self {
            Axis::Width => point.x,
            Axis::Depth => point.y,
            Axis::Height => point.z,
        }
    }

    /// Extent of `dims` along this axis.
    #[inline]
    pub fn of_dims(self, dims: &Dims) -> u32 {
        match self {
            Axis::Width => dims.width,
            Axis::Depth => dims.depth,
            Axis::Height => dims.height,
        }
    }

    /// The two axes spanning the plane perpendicular to this one.
    #[inline]
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::Width => (Axis::Depth, Axis::Height),
            Axis::Depth => (Axis::Width, Axis::Height),
            Axis::Height => (Axis::Width, Axis::Depth),
        }
    }
}

/// Axis-aligned cuboid given by its minimum corner and extents.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub struct Cuboid {
    pub origin: Point3,
    pub dims: Dims,
}

impl Cuboid {
    #[inline]
    pub const fn new(origin: Point3, dims: Dims) -> Self {
        Self { origin, dims }
    }

    /// Cuboid spanning a whole container.
    #[inline]
    pub const fn bounds(dims: Dims) -> Self {
        Self::new(Point3::origin(), dims)
    }

    /// Exclusive maximum corner.
    #[inline]
    pub fn max(&self) -> Point3 {
        self.origin + self.dims
    }

    #[inline]
    pub fn volume(&self) -> u64 {
        self.dims.volume()
    }

    /// Lower and (exclusive) upper bound along `axis`.
    #[inline]
    pub fn span(&self, axis: Axis) -> (u32, u32) {
        let lo = axis.of_point(&self.origin);
        (lo, lo.saturating_add(axis.of_dims(&self.dims)))
    }

    /// Separating axis test; touching faces do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        let a = self.max();
        let b = other.max();
        !(a.x <= other.origin.x
            || b.x <= self.origin.x
            || a.y <= other.origin.y
            || b.y <= self.origin.y
            || a.z <= other.origin.z
            || b.z <= self.origin.z)
    }

    /// `other` lies completely inside `self` (shared faces allowed).
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        let a = self.max();
        let b = other.max();
        other.origin.x >= self.origin.x
            && other.origin.y >= self.origin.y
            && other.origin.z >= self.origin.z
            && b.x <= a.x
            && b.y <= a.y
            && b.z <= a.z
    }
}

/// Shared validation for imported records.
pub mod validation {
    use crate::error::ValidationError;

    /// Converts a raw dimension into a positive centimetre value.
    pub fn validate_dimension(value: i64, name: &str) -> Result<u32, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::InvalidDimension(format!(
                "{} must be positive, got: {}",
                name, value
            )));
        }
        u32::try_from(value).map_err(|_| {
            ValidationError::InvalidDimension(format!("{} is too large: {}", name, value))
        })
    }

    /// Masses and weight limits must be finite and positive.
    pub fn validate_mass(value: f64, name: &str) -> Result<f64, ValidationError> {
        if value.is_nan() || value.is_infinite() || value <= 0.0 {
            return Err(ValidationError::InvalidMass(format!(
                "{} must be a positive finite number, got: {}",
                name, value
            )));
        }
        Ok(value)
    }

    pub fn validate_priority(value: i64) -> Result<u8, ValidationError> {
        if !(0..=100).contains(&value) {
            return Err(ValidationError::InvalidPriority(value));
        }
        Ok(value as u8)
    }

    /// Identifiers are trimmed and must not be empty.
    pub fn validate_id(raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Ok(trimmed.to_owned())
    }

    /// Blank labels count as "no label".
    pub fn normalize_label(raw: Option<String>) -> Option<String> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        })
    }
}
