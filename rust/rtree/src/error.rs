// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for R-tree encoding and validation.

/// Result type alias for R-tree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or validating an R-tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer ended before the expected number of bytes could be read.
    #[error("truncated buffer: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// Byte-order flag other than little (0) or big (1) endian.
    #[error("unknown byte-order flag {0}")]
    ByteOrderFlag(u8),

    /// Dimensionality other than 2 or 3.
    #[error("unsupported dimensionality {0}")]
    Dimensionality(u8),

    /// Stored fill parameters cannot describe a valid tree.
    #[error("invalid node fill parameters: min {min}, max {max}")]
    FillParameters { min: usize, max: usize },

    /// A structural invariant does not hold.
    #[error("inconsistent tree: {0}")]
    Inconsistent(String),
}
