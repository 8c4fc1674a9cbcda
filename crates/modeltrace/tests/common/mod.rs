//! Test fixtures: triangle soups and a reference KD-tree builder.
//!
//! The builder splits the mesh bounds at midpoints, cycling x, y, z, down
//! to a fixed depth, so every leaf is a cell of a regular grid and each
//! rope points straight at the neighboring cell's leaf node. Triangles go
//! into every cell their bounding box touches; cells with more than four
//! spill into the overflow array.

#![allow(dead_code)]

use modeltrace::format::{ModelTraceData, RawBounds, RawHeader, RawLeaf};
use modeltrace::kdtree::{KdNode, LeafFace, MAX_LEAF_TRIANGLES, NO_ROPE, SLOT_END};
use modeltrace::{ModelTrace, TraceResult};
use modeltrace_math::{Aabb3, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Triangle soup with optional per-vertex UVs.
#[derive(Debug, Clone, Default)]
pub struct Soup {
    pub vertices: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<i32>,
}

impl Soup {
    /// Append a triangle with its own three vertices.
    pub fn push_triangle(&mut self, a: [f32; 3], b: [f32; 3], c: [f32; 3]) {
        let base = self.vertices.len() as i32;
        for (p, uv) in [(a, [0.0, 0.0]), (b, [1.0, 0.0]), (c, [0.0, 1.0])] {
            self.vertices.push(p);
            self.uvs.push(uv);
        }
        self.indices.extend([base, base + 1, base + 2]);
    }

    /// Append an axis-aligned box with outward-facing triangles.
    pub fn push_box(&mut self, min: [f32; 3], max: [f32; 3]) {
        let c = |x: usize, y: usize, z: usize| {
            [
                if x == 0 { min[0] } else { max[0] },
                if y == 0 { min[1] } else { max[1] },
                if z == 0 { min[2] } else { max[2] },
            ]
        };
        let quads = [
            // -x, +x
            [c(0, 0, 0), c(0, 0, 1), c(0, 1, 1), c(0, 1, 0)],
            [c(1, 0, 0), c(1, 1, 0), c(1, 1, 1), c(1, 0, 1)],
            // -y, +y
            [c(0, 0, 0), c(1, 0, 0), c(1, 0, 1), c(0, 0, 1)],
            [c(0, 1, 0), c(0, 1, 1), c(1, 1, 1), c(1, 1, 0)],
            // -z, +z
            [c(0, 0, 0), c(0, 1, 0), c(1, 1, 0), c(1, 0, 0)],
            [c(0, 0, 1), c(1, 0, 1), c(1, 1, 1), c(0, 1, 1)],
        ];
        for [a, b, cc, d] in quads {
            self.push_triangle(a, b, cc);
            self.push_triangle(a, cc, d);
        }
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    fn triangle_bounds(&self, tri: usize) -> Aabb3 {
        let pts: Vec<Point3> = (0..3)
            .map(|k| Point3::from(self.vertices[self.indices[tri * 3 + k] as usize]))
            .collect();
        Aabb3::from_points(&pts)
    }

    fn bounds(&self) -> Aabb3 {
        let pts: Vec<Point3> = self.vertices.iter().map(|&v| Point3::from(v)).collect();
        Aabb3::from_points(&pts)
    }
}

/// `count` random triangles inside `[0, size]^3`, with mixed facings.
pub fn random_soup(rng: &mut StdRng, count: usize, size: f32) -> Soup {
    let mut soup = Soup::default();
    for _ in 0..count {
        let center = [
            rng.gen_range(0.0..size),
            rng.gen_range(0.0..size),
            rng.gen_range(0.0..size),
        ];
        let mut corner = || {
            [
                center[0] + rng.gen_range(-1.0..1.0),
                center[1] + rng.gen_range(-1.0..1.0),
                center[2] + rng.gen_range(-1.0..1.0),
            ]
        };
        let (a, b, c) = (corner(), corner(), corner());
        soup.push_triangle(a, b, c);
    }
    soup
}

/// Build a regular-grid KD-tree of the given depth over `soup`.
///
/// `depth` splits cycle x, y, z starting at x, giving `2^depth` leaves.
pub fn build_grid_tree(soup: &Soup, depth: u32) -> ModelTraceData {
    let bounds = soup.bounds();

    // Cells per axis after cycling axes `depth` times.
    let mut splits = [0u32; 3];
    for level in 0..depth {
        splits[(level % 3) as usize] += 1;
    }
    let cells = [1usize << splits[0], 1usize << splits[1], 1usize << splits[2]];
    let num_cells = cells[0] * cells[1] * cells[2];

    let mut grid = Grid {
        cells,
        depth,
        nodes: vec![KdNode::leaf(0)],
        cell_node: vec![0; num_cells],
        cell_leaf: vec![0; num_cells],
        cell_bounds: vec![bounds; num_cells],
        num_leafs: 0,
    };
    grid.fill(0, bounds, [0, 0, 0], cells, 0);

    let mut leafs = vec![RawLeaf::default(); num_cells];
    let mut overflow = Vec::new();
    for z in 0..cells[2] {
        for y in 0..cells[1] {
            for x in 0..cells[0] {
                let cell = grid.cell_index([x, y, z]);
                let cb = grid.cell_bounds[cell];

                let tris: Vec<i32> = (0..soup.num_triangles())
                    .filter(|&t| touches(&soup.triangle_bounds(t), &cb))
                    .map(|t| (t * 3) as i32)
                    .collect();

                let mut slots = [SLOT_END; MAX_LEAF_TRIANGLES];
                if tris.len() <= MAX_LEAF_TRIANGLES {
                    slots[..tris.len()].copy_from_slice(&tris);
                } else {
                    // Keep three inline, continue the rest in the overflow array.
                    slots[..3].copy_from_slice(&tris[..3]);
                    slots[3] = -(overflow.len() as i32) - 2;
                    overflow.extend_from_slice(&tris[3..]);
                    overflow.push(SLOT_END);
                }

                let coord = [x, y, z];
                let mut ropes = [NO_ROPE; 6];
                for face in LeafFace::ALL {
                    let axis = face.axis();
                    let mut n = coord;
                    if face.is_positive() {
                        if n[axis] + 1 == cells[axis] {
                            continue;
                        }
                        n[axis] += 1;
                    } else {
                        if n[axis] == 0 {
                            continue;
                        }
                        n[axis] -= 1;
                    }
                    ropes[face as usize] = grid.cell_node[grid.cell_index(n)] as i32;
                }

                leafs[grid.cell_leaf[cell]] = RawLeaf {
                    triangles: slots,
                    ropes,
                    bounds: cb.into(),
                };
            }
        }
    }

    let mut data = ModelTraceData {
        header: RawHeader {
            bounds: RawBounds::from(bounds),
            ..Default::default()
        },
        vertices: soup.vertices.clone(),
        uvs: soup.uvs.clone(),
        indices: soup.indices.clone(),
        nodes: grid.nodes,
        leafs,
        overflow,
    };
    data.sync_counts();
    data
}

/// Boxes overlap or share a face.
fn touches(a: &Aabb3, b: &Aabb3) -> bool {
    (0..3).all(|axis| a.min[axis] <= b.max[axis] && a.max[axis] >= b.min[axis])
}

struct Grid {
    cells: [usize; 3],
    depth: u32,
    nodes: Vec<KdNode>,
    cell_node: Vec<usize>,
    cell_leaf: Vec<usize>,
    cell_bounds: Vec<Aabb3>,
    num_leafs: usize,
}

impl Grid {
    fn cell_index(&self, c: [usize; 3]) -> usize {
        c[0] + self.cells[0] * (c[1] + self.cells[1] * c[2])
    }

    /// Fill node `slot` with the subtree covering cells `[lo, hi)`.
    ///
    /// Child pairs are appended when a node splits, so children always
    /// follow their parent.
    fn fill(&mut self, slot: usize, bounds: Aabb3, lo: [usize; 3], hi: [usize; 3], level: u32) {
        if level == self.depth {
            let leaf = self.num_leafs;
            self.num_leafs += 1;
            self.nodes[slot] = KdNode::leaf(leaf as u32);
            let cell = self.cell_index(lo);
            self.cell_node[cell] = slot;
            self.cell_leaf[cell] = leaf;
            self.cell_bounds[cell] = bounds;
            return;
        }

        let axis = (level % 3) as usize;
        let mid = (lo[axis] + hi[axis]) / 2;
        let split = 0.5 * (bounds.min[axis] + bounds.max[axis]);

        let first_child = self.nodes.len();
        self.nodes.push(KdNode::leaf(0));
        self.nodes.push(KdNode::leaf(0));
        self.nodes[slot] = KdNode::interior(axis, split, first_child as u32);

        let mut below = bounds;
        below.max[axis] = split;
        let mut below_hi = hi;
        below_hi[axis] = mid;
        self.fill(first_child, below, lo, below_hi, level + 1);

        let mut above = bounds;
        above.min[axis] = split;
        let mut above_lo = lo;
        above_lo[axis] = mid;
        self.fill(first_child + 1, above, above_lo, hi, level + 1);
    }
}

/// Both queries agree on what was hit and where.
pub fn assert_same_hit(a: &TraceResult, b: &TraceResult, context: &str) {
    assert_eq!(a.triangle_index, b.triangle_index, "{context}: {a:?} vs {b:?}");
    assert!(
        (a.fraction - b.fraction).abs() < 1e-5,
        "{context}: fraction {} vs {}",
        a.fraction,
        b.fraction
    );
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn model(soup: &Soup, depth: u32) -> ModelTrace {
    ModelTrace::new(build_grid_tree(soup, depth)).expect("grid tree is valid")
}
