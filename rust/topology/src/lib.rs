// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # topovec Topology
//!
//! Planar vector topology for GIS maps.
//!
//! Primitives (points, lines, boundaries and centroids) are stored as line
//! records addressed by stable integer ids. Line and boundary ends meet at
//! nodes that keep their incident lines in angle order. Closed rings of
//! boundaries form areas (clockwise) and isles (counter-clockwise holes);
//! centroids label the area they fall into, and a sorted category index maps
//! `(layer, category)` pairs to primitives.
//!
//! The store never owns vertices: the maintenance engine reads geometry back
//! through a [`GeometrySource`] implemented by the storage backend.
//!
//! ```
//! use topovec_topology::{BuildLevel, FeatureType, LineCats, LinePoints, MemorySource, Topology};
//!
//! let mut topo = Topology::new(false);
//! topo.set_built(BuildLevel::All);
//! let mut source = MemorySource::new();
//!
//! let ring = LinePoints::from_xy(&[
//!     (0.0, 0.0),
//!     (0.0, 10.0),
//!     (10.0, 10.0),
//!     (10.0, 0.0),
//!     (0.0, 0.0),
//! ]);
//! let offset = source.push(FeatureType::Boundary, &ring, &LineCats::new());
//! let (_, report) = topo
//!     .write_line(&mut source, FeatureType::Boundary, offset, &ring, &LineCats::new())
//!     .unwrap();
//!
//! assert_eq!(report.areas_built.len(), 1);
//! assert_eq!(topo.find_area(&mut source, 5.0, 5.0).unwrap(), Some(1));
//! ```

pub mod arena;
pub mod build;
pub mod cidx;
pub mod codec;
pub mod construction;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod keys;
pub mod query;
pub mod serialization;
pub mod source;
pub mod spatial;
pub mod traversal;

pub use arena::{
    AreaRecord, IsleRecord, LineRecord, LineTopo, NodeLink, NodeRecord, Topology, UpdateLog,
};
pub use build::BuildReport;
pub use cidx::{CatEntry, CategoryIndex, LayerStats};
pub use codec::{TopoHeader, decode_cidx, decode_sidx, read_topo_header};
pub use engine::{MaintenanceReport, RingDefect, RingFailure};
pub use error::{Error, Result};
pub use geometry::{LineCats, LinePoints};
pub use keys::{
    AreaId, BuildLevel, CatKind, CentroidLink, Face, FeatureType, IsleId, LineId, NodeId,
    PrimitiveClass, Side,
};
pub use serialization::{TopologySnapshot, TopologySummary};
pub use source::{GeometrySource, MemorySource};
pub use spatial::SpatialIndex;
pub use topovec_rtree::{ByteOrder, Dims, RTreeParams, Rect};
