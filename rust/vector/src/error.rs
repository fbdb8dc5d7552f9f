// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for map handles and backends.

use std::path::PathBuf;

use thiserror::Error;
use topovec_topology::FeatureType;

/// Result type alias for map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal outcomes of map operations. Recoverable problems are reported
/// through [`crate::Opened::Degraded`] and
/// [`topovec_topology::MaintenanceReport`] instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Topology(#[from] topovec_topology::Error),

    #[error("map {} is locked by process {pid} of user {user}", path.display())]
    Locked { path: PathBuf, pid: u32, user: String },

    #[error("map is not open for writing")]
    ReadOnly,

    #[error("map was opened for its header only")]
    HeaderOnly,

    #[error("operation requires topology; open the map at topology level or build it")]
    TopologyRequired,

    #[error("{backend} backend cannot store {kind} features")]
    UnsupportedType {
        backend: &'static str,
        kind: FeatureType,
    },

    #[error("map {0} does not exist")]
    NotFound(PathBuf),

    #[error("map {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("invalid {file} file: {reason}")]
    Format { file: &'static str, reason: String },

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("WKT error: {0}")]
    Wkt(String),

    #[error("{0} backend: {1}")]
    Backend(&'static str, String),
}

impl From<topovec_rtree::Error> for Error {
    fn from(e: topovec_rtree::Error) -> Self {
        Error::Topology(e.into())
    }
}
