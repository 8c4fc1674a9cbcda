//! Flattened KD-tree records: interior/leaf nodes, leaves with ropes, and
//! the decoded views the traversal works with.
//!
//! Nodes keep the compact packed layout of the serialized asset. Callers
//! never see the bit packing; [`KdNode::kind`] and [`TriangleSlot::decode`]
//! turn a record into a small tagged value.

use bytemuck::{Pod, Zeroable};
use modeltrace_math::Aabb3;
use serde::{Deserialize, Serialize};

/// Number of triangle slots stored inline in a leaf.
pub const MAX_LEAF_TRIANGLES: usize = 4;

/// Slot value that terminates a leaf's triangle list.
pub const SLOT_END: i32 = -1;

/// Rope value marking a leaf face on the mesh boundary.
pub const NO_ROPE: i32 = -1;

/// Exclusive upper bound of a child or leaf index packed into a node.
pub const MAX_NODE_INDEX: u32 = 1 << 29;

/// Packed KD-tree node.
///
/// `data` layout:
/// - bit 0: leaf flag
/// - bits 1-2: split axis (0 = x, 1 = y, 2 = z, 3 = invalid)
/// - bits 3-31: index of the first child (the second is `+1`), or the
///   leaf index for leaf nodes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct KdNode {
    /// Packed flags and index.
    pub data: u32,
    /// Split plane offset along the split axis (interior nodes only).
    pub dist: f32,
}

/// Decoded form of a [`KdNode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeKind {
    /// Interior node splitting space at `split` along `axis`.
    Interior {
        /// Split axis, 0..=2 for valid nodes.
        axis: usize,
        /// Split plane offset.
        split: f32,
        /// Index of the child below the plane; the child above is `+1`.
        first_child: usize,
    },
    /// Leaf node referring into the leaf array.
    Leaf {
        /// Index into the leaf array.
        leaf: usize,
    },
}

impl KdNode {
    /// Pack an interior node.
    pub fn interior(axis: usize, split: f32, first_child: u32) -> Self {
        debug_assert!(axis < 3);
        debug_assert!(first_child < MAX_NODE_INDEX);
        Self {
            data: (first_child << 3) | ((axis as u32 & 3) << 1),
            dist: split,
        }
    }

    /// Pack a leaf node.
    pub fn leaf(leaf: u32) -> Self {
        debug_assert!(leaf < MAX_NODE_INDEX);
        Self {
            data: (leaf << 3) | 1,
            dist: 0.0,
        }
    }

    /// True if the leaf flag is set.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.data & 1 != 0
    }

    /// Raw split axis bits (3 means invalid).
    #[inline]
    pub fn axis_bits(&self) -> usize {
        ((self.data >> 1) & 3) as usize
    }

    /// The child-pair or leaf index.
    #[inline]
    pub fn index(&self) -> usize {
        (self.data >> 3) as usize
    }

    /// Decode the packed node.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        if self.is_leaf() {
            NodeKind::Leaf { leaf: self.index() }
        } else {
            NodeKind::Interior {
                axis: self.axis_bits(),
                split: self.dist,
                first_child: self.index(),
            }
        }
    }
}

/// Decoded triangle slot of a leaf or overflow list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriangleSlot {
    /// End of the triangle list.
    Empty,
    /// A triangle, given as its start offset in the index array.
    Triangle(usize),
    /// Continue reading at this offset in the overflow array.
    Overflow(usize),
}

impl TriangleSlot {
    /// Decode a raw slot: `-1` ends the list, `<= -2` escapes into the
    /// overflow array at `-value - 2`, anything else is a triangle offset.
    #[inline]
    pub fn decode(raw: i32) -> Self {
        match raw {
            SLOT_END => TriangleSlot::Empty,
            r if r < SLOT_END => TriangleSlot::Overflow((-(r as i64) - 2) as usize),
            r => TriangleSlot::Triangle(r as usize),
        }
    }
}

/// One of the six faces of a leaf box, in rope order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafFace {
    /// Min x plane.
    NegX = 0,
    /// Max x plane.
    PosX = 1,
    /// Min y plane.
    NegY = 2,
    /// Max y plane.
    PosY = 3,
    /// Min z plane.
    NegZ = 4,
    /// Max z plane.
    PosZ = 5,
}

impl LeafFace {
    /// All faces in rope order.
    pub const ALL: [LeafFace; 6] = [
        LeafFace::NegX,
        LeafFace::PosX,
        LeafFace::NegY,
        LeafFace::PosY,
        LeafFace::NegZ,
        LeafFace::PosZ,
    ];

    /// Face on `axis` (0..=2), on the max side if `positive`.
    #[inline]
    pub fn new(axis: usize, positive: bool) -> Self {
        Self::ALL[(axis << 1) | positive as usize]
    }

    /// Axis the face is perpendicular to.
    pub fn axis(self) -> usize {
        self as usize >> 1
    }

    /// True for the max-side face.
    pub fn is_positive(self) -> bool {
        self as usize & 1 == 1
    }
}

/// KD-tree leaf: up to four triangles, six ropes and its bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KdLeaf {
    /// Raw triangle slots, see [`TriangleSlot::decode`].
    pub triangles: [i32; MAX_LEAF_TRIANGLES],
    /// Node index of the neighbor across each face, or [`NO_ROPE`].
    pub ropes: [i32; 6],
    /// Leaf bounds.
    pub bounds: Aabb3,
}

impl KdLeaf {
    /// Node index of the neighbor across `face`, if any.
    #[inline]
    pub fn rope(&self, face: LeafFace) -> Option<usize> {
        let raw = self.ropes[face as usize];
        (raw >= 0).then_some(raw as usize)
    }
}
