//! Ray-triangle intersection (Möller-Trumbore, back-face culled).

use modeltrace_math::{Point3, Vec3, SMALLEST_NON_DENORMAL};

use super::TriangleHit;

/// Intersect a ray with a triangle seen from its front side.
///
/// `ray_dir` must be unit length. A triangle is front facing when
/// `(v1 - v0) x (v2 - v0)` points against the ray; back-facing and
/// degenerate triangles never hit. The reciprocal determinant is only
/// computed once every rejection test has passed.
///
/// `t` is not clamped: a triangle behind `ray_start` reports a negative
/// distance and callers filter it.
///
/// On a hit, `ray_start + t * ray_dir == (1 - u - v) * v0 + u * v1 + v * v2`.
pub fn intersect_ray_triangle(
    ray_start: &Point3,
    ray_dir: &Vec3,
    v0: &Point3,
    v1: &Point3,
    v2: &Point3,
) -> Option<TriangleHit> {
    debug_assert!((ray_dir.norm_squared() - 1.0).abs() < 1e-3);

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pv = ray_dir.cross(&edge2);
    let det = edge1.dot(&pv);
    if det <= 0.0 {
        return None;
    }

    let tv = ray_start - v0;
    let s = tv.dot(&pv);
    if s < 0.0 || s > det {
        return None;
    }

    let qv = tv.cross(&edge1);
    let t = ray_dir.dot(&qv);
    if t < 0.0 || s + t > det {
        return None;
    }

    // Rays lying in the triangle plane end up here with a vanishing determinant.
    if det.abs() <= SMALLEST_NON_DENORMAL {
        return None;
    }

    let rcp_det = 1.0 / det;
    Some(TriangleHit {
        t: edge2.dot(&qv) * rcp_det,
        u: s * rcp_det,
        v: t * rcp_det,
    })
}
