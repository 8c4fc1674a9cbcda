#![warn(missing_docs)]

//! Ray-intersection engine for static triangle meshes.
//!
//! Answers "what does this segment hit first?" against a mesh whose
//! KD-tree was built offline. Queries are synchronous, allocation free and
//! side-effect free, so a single [`ModelTrace`] can serve any number of
//! threads at once.
//!
//! # Architecture
//!
//! - [`Ray`] - Segment origin, unit direction, length and slab tests
//! - [`intersect`] - Ray-box and back-face culled ray-triangle tests
//! - [`kdtree`] - Packed nodes, leaves with ropes, decoded slot/face views
//! - [`ModelTrace`] - Validated, immutable mesh plus tree
//! - [`format`] - JSON and binary layouts produced by the model builder
//! - [`ModelTrace::trace`] - Stackless rope traversal
//! - [`ModelTrace::trace_exhaustive`] - Brute-force reference
//!
//! # Example
//!
//! ```ignore
//! use modeltrace::ModelTrace;
//! use modeltrace_math::Point3;
//!
//! let model = ModelTrace::from_bytes(&std::fs::read("room.kdtr")?)?;
//! let hit = model.trace(&Point3::new(0.0, 1.7, 0.0), &Point3::new(0.0, 1.7, -10.0));
//! if let Some(offset) = hit.triangle_index {
//!     println!("looking at triangle {} (uv {:?})", offset / 3, hit.uv);
//! }
//! ```

mod error;
mod model;
mod ray;
mod trace;
pub mod format;
pub mod intersect;
pub mod kdtree;

pub use error::{Result, TraceError};
pub use format::ModelTraceData;
pub use model::{KdHeader, ModelTrace};
pub use ray::Ray;
pub use trace::{TraceResult, BOUNDS_EPSILON, MAX_ITERATIONS, SPLIT_EPSILON};
