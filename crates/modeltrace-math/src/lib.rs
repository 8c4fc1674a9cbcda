#![warn(missing_docs)]

//! Math types for the modeltrace ray-intersection engine.
//!
//! Thin wrappers around nalgebra providing single-precision types for
//! triangle meshes and their acceleration structures: points, vectors,
//! axis-aligned boxes, affine transforms, and the numeric guards used to
//! keep divisions away from denormals.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f32>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f32>;

/// A point in 2D texture space.
pub type Point2 = nalgebra::Point2<f32>;

/// Smallest positive normal `f32`.
///
/// Magnitudes at or below this are treated as zero before dividing.
pub const SMALLEST_NON_DENORMAL: f32 = f32::MIN_POSITIVE;

/// Substitute reciprocal for a direction component too small to divide by.
///
/// Large enough that any slab distance scaled by it lands far outside
/// every real box, small enough that it stays finite when multiplied by
/// scene-sized offsets.
pub const HUGE_NUMBER: f32 = 1.844_674_3e19;

/// Reciprocal of `x`, or [`HUGE_NUMBER`] when `|x|` is denormal or zero.
#[inline]
pub fn safe_rcp(x: f32) -> f32 {
    if x.abs() > SMALLEST_NON_DENORMAL {
        1.0 / x
    } else {
        HUGE_NUMBER
    }
}

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// Build the tightest box around a set of points.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point has been added yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// True if `p` lies inside or on the boundary of the box.
    pub fn contains(&self, p: &Point3) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    /// Edge lengths along each axis.
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Expand the AABB by a tolerance in all directions.
    pub fn expand(&mut self, tol: f32) {
        self.min.x -= tol;
        self.min.y -= tol;
        self.min.z -= tol;
        self.max.x += tol;
        self.max.y += tol;
        self.max.z += tol;
    }
}

/// A 4x4 affine transformation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// The underlying 4x4 matrix.
    pub matrix: Matrix4<f32>,
}

impl Transform {
    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f32, dy: f32, dz: f32) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Non-uniform scale by `(sx, sy, sz)`.
    pub fn scale(sx: f32, sy: f32, sz: f32) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = sx;
        m[(1, 1)] = sy;
        m[(2, 2)] = sz;
        Self { matrix: m }
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Matrix4::identity();
        m[(0, 0)] = c;
        m[(0, 1)] = -s;
        m[(1, 0)] = s;
        m[(1, 1)] = c;
        Self { matrix: m }
    }

    /// Compose: `self` then `other` (self * other).
    ///
    /// Applying the result to a point applies `other` first.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let v = self.matrix * Vector4::new(p.x, p.y, p.z, 1.0);
        Point3::new(v.x, v.y, v.z)
    }

    /// Transform a normal vector (inverse transpose of the upper-left 3x3).
    pub fn apply_normal(&self, n: &Vec3) -> Vec3 {
        let m3: Matrix3<f32> = self.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        match m3.try_inverse() {
            Some(inv) => inv.transpose() * n,
            // Degenerate transform: leave the normal alone
            None => *n,
        }
    }

    /// Inverse of this transform, if it exists.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }
}
