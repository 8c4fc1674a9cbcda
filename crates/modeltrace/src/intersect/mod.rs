//! Ray-primitive intersection routines.
//!
//! Pure functions with no shared state: the slab test against an
//! axis-aligned box and the back-face culled ray-triangle test.

mod triangle;

pub use crate::ray::intersect_ray_bounds;
pub use triangle::intersect_ray_triangle;

/// Result of a ray-triangle intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Distance along the (unit) ray direction.
    pub t: f32,
    /// Barycentric weight of the second vertex.
    pub u: f32,
    /// Barycentric weight of the third vertex.
    pub v: f32,
}

impl TriangleHit {
    /// Weights of the three vertices at the hit: `[1 - u - v, u, v]`.
    #[inline]
    pub fn weights(&self) -> [f32; 3] {
        [1.0 - self.u - self.v, self.u, self.v]
    }
}
