//! Segment queries against a [`ModelTrace`].
//!
//! [`ModelTrace::trace`] walks the KD-tree without a stack, following the
//! rope scheme of Popov et al., "Stackless KD-Tree Traversal for High
//! Performance GPU Ray Tracing" (Eurographics 2007): descend from the
//! current node to the leaf containing the entry point, test its
//! triangles, then jump through the rope on the exit face straight into
//! the neighboring subtree.
//!
//! [`ModelTrace::trace_exhaustive`] tests every triangle and serves as the
//! reference the accelerated path must agree with.

use log::trace;
use modeltrace_math::{Point2, Point3, Transform, Vec3};

use crate::intersect::{intersect_ray_triangle, TriangleHit};
use crate::kdtree::{NodeKind, TriangleSlot, MAX_LEAF_TRIANGLES};
use crate::model::ModelTrace;
use crate::ray::Ray;

/// Upper bound on leaves visited by a single trace.
///
/// Only numerically pathological rays come near it; reaching it ends the
/// search with the best hit found so far.
pub const MAX_ITERATIONS: usize = 128;

/// Band around a split plane inside which the ray direction picks the side.
pub const SPLIT_EPSILON: f32 = 1e-5;

/// Slack added to the scene exit distance before it bounds the search.
pub const BOUNDS_EPSILON: f32 = 1e-5;

/// Outcome of a segment query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    /// Index-array offset of the hit triangle, `None` for no hit.
    pub triangle_index: Option<usize>,
    /// Hit distance as a fraction of the segment; `1.0` when nothing was hit.
    pub fraction: f32,
    /// Texture coordinate interpolated at the hit point.
    pub uv: Point2,
    /// Unit face normal of the hit triangle (zero when nothing was hit).
    pub normal: Vec3,
}

impl TraceResult {
    /// The "nothing hit" result.
    pub fn miss() -> Self {
        Self {
            triangle_index: None,
            fraction: 1.0,
            uv: Point2::origin(),
            normal: Vec3::zeros(),
        }
    }

    /// True if a triangle was hit.
    pub fn is_hit(&self) -> bool {
        self.triangle_index.is_some()
    }

    /// Ordinal of the hit triangle (`triangle_index / 3`).
    pub fn triangle(&self) -> Option<usize> {
        self.triangle_index.map(|offset| offset / 3)
    }

    /// Point along the queried segment at `fraction`.
    pub fn hit_point(&self, start: &Point3, end: &Point3) -> Point3 {
        start + (end - start) * self.fraction
    }
}

impl Default for TraceResult {
    fn default() -> Self {
        Self::miss()
    }
}

/// Closest accepted triangle so far.
#[derive(Clone, Copy)]
struct BestHit {
    offset: usize,
    hit: TriangleHit,
}

impl ModelTrace {
    /// Nearest front-facing triangle hit along `start -> end`, using the
    /// KD-tree and its ropes.
    ///
    /// The segment must have non-zero length. A model without tree nodes
    /// is traced with [`ModelTrace::trace_exhaustive`].
    pub fn trace(&self, start: &Point3, end: &Point3) -> TraceResult {
        if self.nodes.is_empty() {
            return self.trace_exhaustive(start, end);
        }
        let ray = Ray::from_segment(*start, *end);

        let Some((t0, t1)) = ray.intersect_bounds(&self.header.bounds) else {
            return TraceResult::miss();
        };

        let mut entry_distance = t0.max(0.0);
        let mut best_distance = (t1 + BOUNDS_EPSILON).min(ray.length);
        if entry_distance >= best_distance {
            return TraceResult::miss();
        }

        let mut best: Option<BestHit> = None;
        let mut current = 0;
        let mut iterations = 0;

        loop {
            if iterations == MAX_ITERATIONS {
                trace!("trace hit the {MAX_ITERATIONS} leaf limit, keeping best hit");
                break;
            }
            iterations += 1;

            let leaf_index = self.descend(current, &ray, entry_distance);
            let leaf = &self.leafs[leaf_index];

            self.for_each_leaf_triangle(&leaf.triangles, |offset| {
                if let Some(hit) = self.intersect_triangle(&ray, offset) {
                    if hit.t >= 0.0 && hit.t < best_distance {
                        best_distance = hit.t;
                        best = Some(BestHit { offset, hit });
                    }
                }
            });

            let (exit_distance, exit_face) = ray.exit(&leaf.bounds);
            entry_distance = exit_distance;
            if entry_distance >= best_distance {
                break;
            }

            match leaf.rope(exit_face) {
                Some(node) => current = node,
                None => break,
            }
        }

        match best {
            Some(best) => self.resolve(best, best_distance / ray.length),
            None => TraceResult::miss(),
        }
    }

    /// Same contract as [`ModelTrace::trace`], testing every triangle and
    /// ignoring the tree.
    pub fn trace_exhaustive(&self, start: &Point3, end: &Point3) -> TraceResult {
        let ray = Ray::from_segment(*start, *end);

        let mut best_distance = ray.length;
        let mut best: Option<BestHit> = None;

        for offset in (0..self.indices.len()).step_by(3) {
            if let Some(hit) = self.intersect_triangle(&ray, offset) {
                if hit.t >= 0.0 && hit.t < best_distance {
                    best_distance = hit.t;
                    best = Some(BestHit { offset, hit });
                }
            }
        }

        match best {
            Some(best) => self.resolve(best, best_distance / ray.length),
            None => TraceResult::miss(),
        }
    }

    /// Trace a world-space segment against this model placed in the world
    /// by `model_to_world`.
    ///
    /// The segment is moved into model space, traced, and the normal is
    /// carried back into world space. `fraction` needs no conversion since
    /// the endpoints map affinely. A singular transform never hits.
    pub fn trace_transformed(
        &self,
        model_to_world: &Transform,
        start: &Point3,
        end: &Point3,
    ) -> TraceResult {
        let Some(world_to_model) = model_to_world.inverse() else {
            return TraceResult::miss();
        };
        let local_start = world_to_model.apply_point(start);
        let local_end = world_to_model.apply_point(end);

        let mut result = self.trace(&local_start, &local_end);
        if result.is_hit() {
            let normal = model_to_world.apply_normal(&result.normal);
            result.normal = normal.try_normalize(0.0).unwrap_or(normal);
        }
        result
    }

    /// Walk down from `node` to the leaf containing the ray point at
    /// `entry_distance`, returning the leaf index.
    #[inline]
    fn descend(&self, mut node: usize, ray: &Ray, entry_distance: f32) -> usize {
        let entry_point = ray.at(entry_distance);
        loop {
            match self.nodes[node].kind() {
                NodeKind::Leaf { leaf } => return leaf,
                NodeKind::Interior {
                    axis,
                    split,
                    first_child,
                } => {
                    let offset = entry_point[axis] - split;
                    let above = if offset < -SPLIT_EPSILON {
                        false
                    } else if offset > SPLIT_EPSILON {
                        true
                    } else {
                        ray.direction[axis] > 0.0
                    };
                    node = first_child + above as usize;
                }
            }
        }
    }

    /// Call `visit` with every triangle offset of a leaf, following
    /// overflow continuations.
    #[inline]
    fn for_each_leaf_triangle(
        &self,
        inline: &[i32; MAX_LEAF_TRIANGLES],
        mut visit: impl FnMut(usize),
    ) {
        let mut slots: &[i32] = inline;
        let mut i = 0;
        while i < slots.len() {
            match TriangleSlot::decode(slots[i]) {
                TriangleSlot::Empty => return,
                TriangleSlot::Triangle(offset) => {
                    visit(offset);
                    i += 1;
                }
                TriangleSlot::Overflow(offset) => {
                    slots = &self.overflow[offset..];
                    i = 0;
                }
            }
        }
    }

    #[inline]
    fn intersect_triangle(&self, ray: &Ray, offset: usize) -> Option<TriangleHit> {
        let [v0, v1, v2] = self.triangle_vertices(offset);
        intersect_ray_triangle(&ray.origin, &ray.direction, &v0, &v1, &v2)
    }

    /// Fill in the result for the winning triangle.
    fn resolve(&self, best: BestHit, fraction: f32) -> TraceResult {
        let BestHit { offset, hit } = best;

        let uv = match self.triangle_uvs(offset) {
            Some([uv0, uv1, uv2]) => {
                let [w0, w1, w2] = hit.weights();
                Point2::from(uv0.coords * w0 + uv1.coords * w1 + uv2.coords * w2)
            }
            None => Point2::origin(),
        };

        let [v0, v1, v2] = self.triangle_vertices(offset);
        let normal = (v1 - v0).cross(&(v2 - v0)).normalize();

        TraceResult {
            triangle_index: Some(offset),
            fraction,
            uv,
            normal,
        }
    }
}
