//! Math type re-exports and scene-specific math utilities.
//!
//! Bounds are kept in double precision throughout: they are unioned and
//! transformed repeatedly during propagation and the error would accumulate.

pub use glam::{DMat4, DVec3};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// 3D bounding box with double precision.
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct BBox3d {
    pub min: DVec3,
    pub max: DVec3,
}

impl BBox3d {
    /// Empty bounding box (inverted, will expand on first point).
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };

    /// Create a new bounding box from min and max points.
    #[inline]
    pub const fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Bounding box of a point set; empty for no points.
    pub fn from_points(points: &[DVec3]) -> Self {
        let mut b = Self::EMPTY;
        for p in points {
            b.expand_by_point(*p);
        }
        b
    }

    /// Check if this box is empty (has no volume).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this box to include a point.
    #[inline]
    pub fn expand_by_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Expand this box to include another box.
    #[inline]
    pub fn expand_by_box(&mut self, other: &Self) {
        if !other.is_empty() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Union of two boxes.
    #[inline]
    pub fn union(mut self, other: &Self) -> Self {
        self.expand_by_box(other);
        self
    }

    /// Axis-aligned box enclosing this box after transformation by `m`.
    ///
    /// All eight corners are transformed, so rotations grow the box as needed.
    pub fn transformed(&self, m: &DMat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = DVec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_by_point(m.transform_point3(corner));
        }
        out
    }

    /// Linear interpolation of the corners.
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: self.min.lerp(other.min, t),
            max: self.max.lerp(other.max, t),
        }
    }
}

impl Default for BBox3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for BBox3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BBox3d({:?} - {:?})", self.min, self.max)
    }
}

/// Chrono type - time value (seconds).
pub type Chrono = f64;
