//! Ray representation and ray-box slab tests.

use modeltrace_math::{safe_rcp, Aabb3, Point3, Vec3, HUGE_NUMBER, SMALLEST_NON_DENORMAL};

use crate::kdtree::LeafFace;

/// A ray segment in model space: origin, unit direction and length.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point of the ray.
    pub origin: Point3,
    /// Unit direction of the ray.
    pub direction: Vec3,
    /// Distance from `origin` to the segment end.
    pub length: f32,
    /// Reciprocal of direction components, with near-zero components
    /// replaced by [`modeltrace_math::HUGE_NUMBER`].
    inv_direction: Vec3,
}

impl Ray {
    /// Create a ray covering the segment `start -> end`.
    ///
    /// The segment must have non-zero length.
    pub fn from_segment(start: Point3, end: Point3) -> Self {
        let delta = end - start;
        let length = delta.norm();
        Self::with_direction(start, delta / length, length)
    }

    /// Create a ray from an already normalized direction.
    pub fn with_direction(origin: Point3, direction: Vec3, length: f32) -> Self {
        let inv_direction = Vec3::new(
            safe_rcp(direction.x),
            safe_rcp(direction.y),
            safe_rcp(direction.z),
        );
        Self {
            origin,
            direction,
            length,
            inv_direction,
        }
    }

    /// Evaluate the ray at distance `t`: `origin + t * direction`.
    #[inline]
    pub fn at(&self, t: f32) -> Point3 {
        self.origin + self.direction * t
    }

    /// Entry and exit distance of the slab between the min and max planes
    /// of `aabb`, per axis.
    ///
    /// An axis the ray runs parallel to never limits it while the origin
    /// lies within that slab (boundary planes included) and rules the box
    /// out otherwise.
    #[inline]
    fn slabs(&self, aabb: &Aabb3) -> ([f32; 3], [f32; 3]) {
        let mut near = [0.0; 3];
        let mut far = [0.0; 3];
        for axis in 0..3 {
            let lo = aabb.min[axis] - self.origin[axis];
            let hi = aabb.max[axis] - self.origin[axis];
            if self.direction[axis].abs() > SMALLEST_NON_DENORMAL {
                let s = lo * self.inv_direction[axis];
                let t = hi * self.inv_direction[axis];
                near[axis] = s.min(t);
                far[axis] = s.max(t);
            } else if lo <= 0.0 && hi >= 0.0 {
                near[axis] = -HUGE_NUMBER;
                far[axis] = HUGE_NUMBER;
            } else {
                near[axis] = HUGE_NUMBER;
                far[axis] = -HUGE_NUMBER;
            }
        }
        (near, far)
    }

    /// Slab test against `aabb`.
    ///
    /// Returns `Some((t0, t1))` with the entry and exit distances if the
    /// infinite line intersects the box (`t0 <= t1`). Distances are not
    /// clamped to the segment; `t0` is negative when the origin is inside.
    #[inline]
    pub fn intersect_bounds(&self, aabb: &Aabb3) -> Option<(f32, f32)> {
        let (near, far) = self.slabs(aabb);
        let t0 = near[0].max(near[1]).max(near[2]);
        let t1 = far[0].min(far[1]).min(far[2]);
        (t0 <= t1).then_some((t0, t1))
    }

    /// Distance at which the ray leaves `aabb` and the face it leaves through.
    ///
    /// Ties between axes resolve toward the later axis, matching the order
    /// x, y, z of the comparison chain.
    #[inline]
    pub fn exit(&self, aabb: &Aabb3) -> (f32, LeafFace) {
        let (_, far) = self.slabs(aabb);
        let axis = if far[0] < far[1] {
            if far[0] < far[2] {
                0
            } else {
                2
            }
        } else if far[1] < far[2] {
            1
        } else {
            2
        };
        (far[axis], LeafFace::new(axis, self.direction[axis] > 0.0))
    }
}

/// Ray-box slab test on raw vectors.
///
/// `ray_dir` does not have to be normalized; the returned distances are in
/// units of `ray_dir`. Returns `Some((t0, t1))` iff `t0 <= t1`.
pub fn intersect_ray_bounds(
    ray_start: &Point3,
    ray_dir: &Vec3,
    mins: &Point3,
    maxs: &Point3,
) -> Option<(f32, f32)> {
    Ray::with_direction(*ray_start, *ray_dir, 0.0).intersect_bounds(&Aabb3::new(*mins, *maxs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb3 {
        Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray::from_segment(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
        assert!((ray.length - 10.0).abs() < 1e-6);
        let p = ray.at(5.0);
        assert!((p.x - 5.0).abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }

    #[test]
    fn test_ray_aabb_hit() {
        let ray = Ray::from_segment(Point3::new(-5.0, 0.5, 0.5), Point3::new(5.0, 0.5, 0.5));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!((t0 - 5.0).abs() < 1e-5);
        assert!((t1 - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_aabb_miss() {
        let ray = Ray::from_segment(Point3::new(-5.0, 5.0, 5.0), Point3::new(5.0, 5.0, 5.0));
        assert!(ray.intersect_bounds(&unit_box()).is_none());
    }

    #[test]
    fn test_ray_inside_aabb() {
        let ray = Ray::from_segment(Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 0.5, 0.5));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!(t0 < 0.0);
        assert!((t1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ray_aabb_behind_is_reported() {
        // The line still crosses the box; callers clamp against the segment.
        let ray = Ray::from_segment(Point3::new(-5.0, 0.5, 0.5), Point3::new(-6.0, 0.5, 0.5));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!(t1 < 0.0);
        assert!(t0 <= t1);
    }

    #[test]
    fn test_flat_box_is_hit() {
        let flat = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0));
        let ray = Ray::from_segment(Point3::new(0.25, 0.25, 1.0), Point3::new(0.25, 0.25, -1.0));
        let (t0, t1) = ray.intersect_bounds(&flat).unwrap();
        assert!((t0 - 1.0).abs() < 1e-6);
        assert!((t1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_axis_parallel_ray() {
        // Zero y/z components must not produce NaN.
        let ray = Ray::from_segment(Point3::new(-1.0, 0.5, 0.5), Point3::new(3.0, 0.5, 0.5));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!(t0.is_finite() && t1.is_finite());
        let outside = Ray::from_segment(Point3::new(-1.0, 1.5, 0.5), Point3::new(3.0, 1.5, 0.5));
        assert!(outside.intersect_bounds(&unit_box()).is_none());
    }

    #[test]
    fn test_ray_in_boundary_plane() {
        // Runs along the top face, where the z slab has zero width.
        let ray = Ray::from_segment(Point3::new(-1.0, 0.5, 1.0), Point3::new(2.0, 0.5, 1.0));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!((t0 - 1.0).abs() < 1e-6);
        assert!((t1 - 2.0).abs() < 1e-6);

        let ray = Ray::from_segment(Point3::new(-1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        let (t0, t1) = ray.intersect_bounds(&unit_box()).unwrap();
        assert!((t0 - 1.0).abs() < 1e-6);
        assert!((t1 - 2.0).abs() < 1e-6);

        let above = Ray::from_segment(Point3::new(-1.0, 0.5, 1.5), Point3::new(2.0, 0.5, 1.5));
        assert!(above.intersect_bounds(&unit_box()).is_none());
    }

    #[test]
    fn test_exit_face_in_boundary_plane() {
        let ray = Ray::from_segment(Point3::new(0.5, 1.0, 1.0), Point3::new(-2.0, 1.0, 1.0));
        let (dist, face) = ray.exit(&unit_box());
        assert_eq!(face, LeafFace::NegX);
        assert!((dist - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_direction() {
        let outside = Ray::with_direction(Point3::new(2.0, 0.5, 0.5), Vec3::zeros(), 0.0);
        assert!(outside.intersect_bounds(&unit_box()).is_none());
        let inside = Ray::with_direction(Point3::new(0.5, 0.5, 0.5), Vec3::zeros(), 0.0);
        assert!(inside.intersect_bounds(&unit_box()).is_some());
    }

    #[test]
    fn test_exit_face() {
        let ray = Ray::from_segment(Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 0.6, 0.5));
        let (dist, face) = ray.exit(&unit_box());
        assert_eq!(face, LeafFace::PosX);
        assert!(dist > 0.4 && dist < 0.6);

        let ray = Ray::from_segment(Point3::new(0.5, 0.5, 0.5), Point3::new(0.5, 0.5, -3.0));
        let (dist, face) = ray.exit(&unit_box());
        assert_eq!(face, LeafFace::NegZ);
        assert!((dist - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unnormalized_direction() {
        let hit = intersect_ray_bounds(
            &Point3::new(-2.0, 0.5, 0.5),
            &Vec3::new(2.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 1.0, 1.0),
        );
        let (t0, t1) = hit.unwrap();
        assert!((t0 - 1.0).abs() < 1e-6);
        assert!((t1 - 1.5).abs() < 1e-6);
    }
}
