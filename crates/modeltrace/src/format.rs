//! Serialized trace model layouts.
//!
//! The external model builder hands over a [`ModelTraceData`]: plain arrays
//! mirroring the in-memory layout. It can be read from and written to
//! JSON, or to a packed binary blob made of `#[repr(C)]` [`Pod`] records
//! in native byte order:
//!
//! ```text
//! "KDTR" | version: u32 | RawHeader | vertices | uvs | indices | nodes | leafs | overflow
//! ```
//!
//! Turning the data into a queryable [`crate::ModelTrace`] validates it;
//! nothing in this module checks more than framing.

use bytemuck::{Pod, Zeroable};
use modeltrace_math::{Aabb3, Point3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::kdtree::{KdLeaf, KdNode, MAX_LEAF_TRIANGLES};

/// Tag at the start of every binary trace model.
pub const BINARY_MAGIC: [u8; 4] = *b"KDTR";

/// Current binary layout version.
pub const BINARY_VERSION: u32 = 1;

/// Box as stored on disk.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct RawBounds {
    /// Minimum corner.
    pub min: [f32; 3],
    /// Maximum corner.
    pub max: [f32; 3],
}

impl From<RawBounds> for Aabb3 {
    fn from(b: RawBounds) -> Self {
        Aabb3::new(Point3::from(b.min), Point3::from(b.max))
    }
}

impl From<Aabb3> for RawBounds {
    fn from(b: Aabb3) -> Self {
        Self {
            min: b.min.coords.into(),
            max: b.max.coords.into(),
        }
    }
}

/// Header counts and scene bounds.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHeader {
    /// Number of vertices.
    pub num_vertices: i32,
    /// Number of texture coordinates.
    pub num_uvs: i32,
    /// Number of indices (three per triangle).
    pub num_indices: i32,
    /// Number of tree nodes.
    pub num_nodes: i32,
    /// Number of leaves.
    pub num_leafs: i32,
    /// Number of overflow entries.
    pub num_overflow: i32,
    /// Bounds of the whole mesh.
    pub bounds: RawBounds,
}

/// Leaf as stored on disk.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct RawLeaf {
    /// Triangle slots.
    pub triangles: [i32; MAX_LEAF_TRIANGLES],
    /// Neighbor node per face.
    pub ropes: [i32; 6],
    /// Leaf bounds.
    pub bounds: RawBounds,
}

impl From<RawLeaf> for KdLeaf {
    fn from(raw: RawLeaf) -> Self {
        KdLeaf {
            triangles: raw.triangles,
            ropes: raw.ropes,
            bounds: raw.bounds.into(),
        }
    }
}

impl From<&KdLeaf> for RawLeaf {
    fn from(leaf: &KdLeaf) -> Self {
        RawLeaf {
            triangles: leaf.triangles,
            ropes: leaf.ropes,
            bounds: leaf.bounds.into(),
        }
    }
}

/// Flattened trace model exactly as produced by the builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTraceData {
    /// Counts and bounds.
    pub header: RawHeader,
    /// Vertex positions.
    pub vertices: Vec<[f32; 3]>,
    /// Texture coordinates, indexed like the vertices. May be empty.
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    /// Three indices per triangle.
    pub indices: Vec<i32>,
    /// Tree nodes; node 0 is the root.
    pub nodes: Vec<KdNode>,
    /// Tree leaves.
    pub leafs: Vec<RawLeaf>,
    /// Continuation storage for leaves with more than four triangles.
    #[serde(default)]
    pub overflow: Vec<i32>,
}

impl ModelTraceData {
    /// Header with every count taken from the current array lengths.
    pub fn counted_header(&self) -> RawHeader {
        RawHeader {
            num_vertices: self.vertices.len() as i32,
            num_uvs: self.uvs.len() as i32,
            num_indices: self.indices.len() as i32,
            num_nodes: self.nodes.len() as i32,
            num_leafs: self.leafs.len() as i32,
            num_overflow: self.overflow.len() as i32,
            bounds: self.header.bounds,
        }
    }

    /// Set every header count from the current array lengths.
    pub fn sync_counts(&mut self) {
        self.header = self.counted_header();
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pack into the binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.counted_header();
        let mut out = Vec::new();
        out.extend_from_slice(&BINARY_MAGIC);
        out.extend_from_slice(bytemuck::bytes_of(&BINARY_VERSION));
        out.extend_from_slice(bytemuck::bytes_of(&header));
        out.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        out.extend_from_slice(bytemuck::cast_slice(&self.uvs));
        out.extend_from_slice(bytemuck::cast_slice(&self.indices));
        out.extend_from_slice(bytemuck::cast_slice(&self.nodes));
        out.extend_from_slice(bytemuck::cast_slice(&self.leafs));
        out.extend_from_slice(bytemuck::cast_slice(&self.overflow));
        out
    }

    /// Unpack the binary layout. The buffer need not be aligned.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader { bytes, pos: 0 };

        let magic: [u8; 4] = reader.read()?;
        if magic != BINARY_MAGIC {
            return Err(TraceError::Binary(format!("bad magic {magic:?}")));
        }
        let version: u32 = reader.read()?;
        if version != BINARY_VERSION {
            return Err(TraceError::Binary(format!("unsupported version {version}")));
        }

        let header: RawHeader = reader.read()?;
        let data = ModelTraceData {
            header,
            vertices: reader.read_array(header.num_vertices, "vertices")?,
            uvs: reader.read_array(header.num_uvs, "uvs")?,
            indices: reader.read_array(header.num_indices, "indices")?,
            nodes: reader.read_array(header.num_nodes, "nodes")?,
            leafs: reader.read_array(header.num_leafs, "leafs")?,
            overflow: reader.read_array(header.num_overflow, "overflow")?,
        };

        if reader.pos != bytes.len() {
            return Err(TraceError::Binary(format!(
                "{} trailing bytes",
                bytes.len() - reader.pos
            )));
        }
        Ok(data)
    }
}

/// Cursor over an unaligned byte buffer.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                TraceError::Binary(format!(
                    "need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.bytes.len() - self.pos
                ))
            })?;
        let chunk = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(chunk)
    }

    fn read<T: Pod>(&mut self) -> Result<T> {
        let chunk = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(chunk))
    }

    fn read_array<T: Pod>(&mut self, count: i32, what: &str) -> Result<Vec<T>> {
        let count = usize::try_from(count)
            .map_err(|_| TraceError::Binary(format!("negative {what} count {count}")))?;
        let size = std::mem::size_of::<T>();
        let len = count
            .checked_mul(size)
            .ok_or_else(|| TraceError::Binary(format!("{what} count {count} overflows")))?;
        let chunk = self.take(len)?;
        Ok(chunk
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }
}
