//! The immutable trace model: triangle soup plus its flattened KD-tree.

use log::debug;
use modeltrace_math::{Aabb3, Point2, Point3};

use crate::error::{Result, TraceError};
use crate::format::{ModelTraceData, RawHeader, RawLeaf};
use crate::kdtree::{KdLeaf, KdNode, NodeKind, TriangleSlot, NO_ROPE};

/// Array sizes and scene bounds of a [`ModelTrace`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdHeader {
    /// Number of vertices.
    pub num_vertices: usize,
    /// Number of texture coordinates (0 if the model has none).
    pub num_uvs: usize,
    /// Number of indices, three per triangle.
    pub num_indices: usize,
    /// Number of tree nodes.
    pub num_nodes: usize,
    /// Number of leaves.
    pub num_leafs: usize,
    /// Number of overflow entries.
    pub num_overflow: usize,
    /// Bounds of the whole mesh.
    pub bounds: Aabb3,
}

/// Ray-traceable static triangle mesh.
///
/// Every array is owned here and refers to the others by index. The model
/// is validated once on construction and never mutated afterwards, so it
/// can be shared across threads and queried concurrently without locking.
#[derive(Debug, Clone)]
pub struct ModelTrace {
    pub(crate) header: KdHeader,
    pub(crate) vertices: Vec<Point3>,
    pub(crate) uvs: Vec<Point2>,
    pub(crate) indices: Vec<u32>,
    pub(crate) nodes: Vec<KdNode>,
    pub(crate) leafs: Vec<KdLeaf>,
    pub(crate) overflow: Vec<i32>,
}

impl ModelTrace {
    /// Validate builder output and take ownership of it.
    pub fn new(data: ModelTraceData) -> Result<Self> {
        let h = &data.header;
        check_count("vertices", h.num_vertices, data.vertices.len())?;
        check_count("uvs", h.num_uvs, data.uvs.len())?;
        check_count("indices", h.num_indices, data.indices.len())?;
        check_count("nodes", h.num_nodes, data.nodes.len())?;
        check_count("leafs", h.num_leafs, data.leafs.len())?;
        check_count("overflow", h.num_overflow, data.overflow.len())?;

        if data.indices.len() % 3 != 0 {
            return Err(TraceError::PartialTriangle(data.indices.len()));
        }
        let indices = check_indices(&data.indices, data.vertices.len(), data.uvs.len())?;

        let num_triangles = indices.len() / 3;
        if num_triangles > 0 && data.nodes.is_empty() {
            debug!("no tree for {num_triangles} triangles, traces will test every triangle");
        }

        check_nodes(&data.nodes, data.leafs.len())?;
        for (i, leaf) in data.leafs.iter().enumerate() {
            check_leaf(leaf, data.nodes.len(), indices.len(), data.overflow.len())
                .map_err(|reason| TraceError::InvalidLeaf { leaf: i, reason })?;
        }
        for (i, &raw) in data.overflow.iter().enumerate() {
            check_overflow_entry(i, raw, indices.len(), data.overflow.len())
                .map_err(|reason| TraceError::InvalidOverflow { entry: i, reason })?;
        }

        let header = KdHeader {
            num_vertices: data.vertices.len(),
            num_uvs: data.uvs.len(),
            num_indices: indices.len(),
            num_nodes: data.nodes.len(),
            num_leafs: data.leafs.len(),
            num_overflow: data.overflow.len(),
            bounds: data.header.bounds.into(),
        };
        debug!(
            "trace model: {} vertices, {} triangles, {} nodes, {} leafs, {} overflow",
            header.num_vertices,
            num_triangles,
            header.num_nodes,
            header.num_leafs,
            header.num_overflow
        );

        Ok(Self {
            header,
            vertices: data.vertices.into_iter().map(Point3::from).collect(),
            uvs: data.uvs.into_iter().map(Point2::from).collect(),
            indices,
            nodes: data.nodes,
            leafs: data.leafs.into_iter().map(KdLeaf::from).collect(),
            overflow: data.overflow,
        })
    }

    /// Load from the JSON layout.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(ModelTraceData::from_json(json)?)
    }

    /// Load from the binary layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::new(ModelTraceData::from_bytes(bytes)?)
    }

    /// Flatten back into builder layout.
    pub fn to_data(&self) -> ModelTraceData {
        ModelTraceData {
            header: RawHeader {
                num_vertices: self.header.num_vertices as i32,
                num_uvs: self.header.num_uvs as i32,
                num_indices: self.header.num_indices as i32,
                num_nodes: self.header.num_nodes as i32,
                num_leafs: self.header.num_leafs as i32,
                num_overflow: self.header.num_overflow as i32,
                bounds: self.header.bounds.into(),
            },
            vertices: self.vertices.iter().map(|p| p.coords.into()).collect(),
            uvs: self.uvs.iter().map(|p| p.coords.into()).collect(),
            indices: self.indices.iter().map(|&i| i as i32).collect(),
            nodes: self.nodes.clone(),
            leafs: self.leafs.iter().map(RawLeaf::from).collect(),
            overflow: self.overflow.clone(),
        }
    }

    /// Counts and bounds.
    pub fn header(&self) -> &KdHeader {
        &self.header
    }

    /// Bounds of the whole mesh.
    pub fn bounds(&self) -> &Aabb3 {
        &self.header.bounds
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex positions.
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Texture coordinates (empty if the model has none).
    pub fn uvs(&self) -> &[Point2] {
        &self.uvs
    }

    /// Triangle indices.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Tree nodes; node 0 is the root.
    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    /// Tree leaves.
    pub fn leafs(&self) -> &[KdLeaf] {
        &self.leafs
    }

    /// Overflow triangle slots.
    pub fn overflow(&self) -> &[i32] {
        &self.overflow
    }

    /// Corner positions of the triangle starting at index offset `offset`.
    #[inline]
    pub fn triangle_vertices(&self, offset: usize) -> [Point3; 3] {
        [
            self.vertices[self.indices[offset] as usize],
            self.vertices[self.indices[offset + 1] as usize],
            self.vertices[self.indices[offset + 2] as usize],
        ]
    }

    /// Texture coordinates of the triangle starting at `offset`, or `None`
    /// when the model carries no UVs.
    #[inline]
    pub fn triangle_uvs(&self, offset: usize) -> Option<[Point2; 3]> {
        if self.uvs.is_empty() {
            return None;
        }
        Some([
            self.uvs[self.indices[offset] as usize],
            self.uvs[self.indices[offset + 1] as usize],
            self.uvs[self.indices[offset + 2] as usize],
        ])
    }
}

fn check_count(array: &'static str, declared: i32, actual: usize) -> Result<()> {
    if usize::try_from(declared).ok() == Some(actual) {
        Ok(())
    } else {
        Err(TraceError::CountMismatch {
            array,
            declared: declared as i64,
            actual,
        })
    }
}

fn check_indices(raw: &[i32], num_vertices: usize, num_uvs: usize) -> Result<Vec<u32>> {
    raw.iter()
        .enumerate()
        .map(|(position, &value)| {
            let out_of_range = |array, len| TraceError::IndexOutOfRange {
                array,
                position,
                value: value as i64,
                len,
            };
            let index =
                usize::try_from(value).map_err(|_| out_of_range("vertices", num_vertices))?;
            if index >= num_vertices {
                return Err(out_of_range("vertices", num_vertices));
            }
            if num_uvs > 0 && index >= num_uvs {
                return Err(out_of_range("uvs", num_uvs));
            }
            Ok(index as u32)
        })
        .collect()
}

/// Children must follow their parent so descending always terminates.
fn check_nodes(nodes: &[KdNode], num_leafs: usize) -> Result<()> {
    for (i, node) in nodes.iter().enumerate() {
        let reason = match node.kind() {
            NodeKind::Leaf { leaf } if leaf >= num_leafs => {
                Some(format!("leaf index {leaf} out of range ({num_leafs} leafs)"))
            }
            NodeKind::Leaf { .. } => None,
            NodeKind::Interior { axis, .. } if axis > 2 => Some("invalid split axis".to_string()),
            NodeKind::Interior { first_child, .. } if first_child <= i => {
                Some(format!("child pair {first_child} does not follow its parent"))
            }
            NodeKind::Interior { first_child, .. } if first_child + 1 >= nodes.len() => Some(
                format!("child pair {first_child} out of range ({} nodes)", nodes.len()),
            ),
            NodeKind::Interior { split, .. } if !split.is_finite() => {
                Some(format!("non-finite split distance {split}"))
            }
            NodeKind::Interior { .. } => None,
        };
        if let Some(reason) = reason {
            return Err(TraceError::InvalidNode { node: i, reason });
        }
    }
    Ok(())
}

fn check_triangle_offset(offset: usize, num_indices: usize) -> std::result::Result<(), String> {
    if offset % 3 != 0 {
        Err(format!("triangle offset {offset} is not a multiple of 3"))
    } else if offset + 2 >= num_indices {
        Err(format!("triangle offset {offset} out of range ({num_indices} indices)"))
    } else {
        Ok(())
    }
}

fn check_leaf(
    leaf: &RawLeaf,
    num_nodes: usize,
    num_indices: usize,
    num_overflow: usize,
) -> std::result::Result<(), String> {
    for &raw in &leaf.triangles {
        match TriangleSlot::decode(raw) {
            TriangleSlot::Empty => {}
            TriangleSlot::Triangle(offset) => check_triangle_offset(offset, num_indices)?,
            TriangleSlot::Overflow(offset) if offset >= num_overflow => {
                return Err(format!(
                    "overflow offset {offset} out of range ({num_overflow} entries)"
                ))
            }
            TriangleSlot::Overflow(_) => {}
        }
    }
    for &rope in &leaf.ropes {
        if rope != NO_ROPE && !(0..num_nodes as i64).contains(&(rope as i64)) {
            return Err(format!("rope {rope} out of range ({num_nodes} nodes)"));
        }
    }
    if Aabb3::from(leaf.bounds).is_empty() {
        return Err("inverted bounds".to_string());
    }
    Ok(())
}

/// Overflow continuations must jump forward so a scan always ends.
fn check_overflow_entry(
    entry: usize,
    raw: i32,
    num_indices: usize,
    num_overflow: usize,
) -> std::result::Result<(), String> {
    match TriangleSlot::decode(raw) {
        TriangleSlot::Empty => Ok(()),
        TriangleSlot::Triangle(offset) => check_triangle_offset(offset, num_indices),
        TriangleSlot::Overflow(offset) if offset <= entry || offset >= num_overflow => Err(
            format!("continuation to {offset} must jump forward within {num_overflow} entries"),
        ),
        TriangleSlot::Overflow(_) => Ok(()),
    }
}
