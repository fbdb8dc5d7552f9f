// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # topovec Vector
//!
//! Vector maps with planar topology over interchangeable storage backends.
//!
//! A map lives in a directory holding a `head` metadata file and, for
//! external storage, a `frmt` file naming the backend:
//!
//! - **native**: `coor` holds primitives, and `topo`, `sidx` and `cidx` the
//!   persisted topology, spatial index and category index;
//! - **geojson**: a GeoJSON feature collection, split into pseudo-topology
//!   primitives on open;
//! - **topodb**: a SQLite database with a node / edge / face topology schema.
//!
//! All backends feed the same [`topovec_topology::Topology`], which the
//! [`Map`] handle keeps consistent as features are written, deleted and
//! restored.
//!
//! ```no_run
//! use std::path::Path;
//! use topovec_vector::{FeatureType, Format, LineCats, LinePoints, Map, MapConfig};
//!
//! let config = MapConfig::from_env();
//! let mut map = Map::create(Path::new("parcels"), Format::Native, false, &config)?;
//!
//! let ring = LinePoints::from_xy(&[
//!     (0.0, 0.0),
//!     (0.0, 10.0),
//!     (10.0, 10.0),
//!     (10.0, 0.0),
//!     (0.0, 0.0),
//! ]);
//! map.write(FeatureType::Boundary, &ring, &LineCats::new())?;
//! let label = LinePoints::from_xy(&[(5.0, 5.0)]);
//! map.write(FeatureType::Centroid, &label, &LineCats::from_pairs(&[(1, 7)]))?;
//!
//! assert_eq!(map.find_area(5.0, 5.0)?, Some(1));
//! map.close()?;
//! # Ok::<(), topovec_vector::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod constraints;
pub mod error;
pub mod format;
pub mod lock;
pub mod map;

pub use backend::Backend;
pub use config::MapConfig;
pub use constraints::{Constraints, TypeMask};
pub use error::{Error, Result};
pub use format::{Format, MapHead};
pub use lock::{LockOwner, MapLock};
pub use map::{AccessLevel, Map, MapInfo, OpenMode, Opened, ReadOutcome};
pub use topovec_topology::{
    AreaId, BuildLevel, FeatureType, LineCats, LineId, LinePoints, PrimitiveClass, Rect,
};
