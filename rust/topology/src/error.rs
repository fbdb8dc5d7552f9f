// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.

use crate::keys::{FeatureType, LineId};

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A line id outside the store.
    #[error("line {0} does not exist")]
    UnknownLine(LineId),

    /// Operation requires a live line.
    #[error("line {0} is dead")]
    DeadLine(LineId),

    /// Operation requires a dead line.
    #[error("line {0} is alive")]
    AliveLine(LineId),

    /// Geometry that cannot form the requested primitive.
    #[error("invalid {kind} geometry: {reason}")]
    InvalidGeometry { kind: FeatureType, reason: String },

    /// The geometry source failed to deliver a stored primitive.
    #[error("geometry source: {0}")]
    Source(String),

    /// Section does not start with the expected magic bytes.
    #[error("{section} section: bad magic")]
    BadMagic { section: &'static str },

    /// Section was written by a format this reader cannot parse.
    #[error("{section} section: version {major}.{minor} is too new")]
    VersionTooNew {
        section: &'static str,
        major: u8,
        minor: u8,
    },

    /// Section content contradicts itself.
    #[error("{section} section: {reason}")]
    Corrupt {
        section: &'static str,
        reason: String,
    },

    /// Low-level decoding failure.
    #[error(transparent)]
    Encoding(#[from] topovec_rtree::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
