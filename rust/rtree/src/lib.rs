// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # topovec R-tree
//!
//! A multidimensional index mapping axis-aligned boxes to integer primitive
//! identifiers. One tree is kept per primitive class (nodes, lines, areas,
//! isles) by the topology store.
//!
//! - Insertion descends by least enlargement, splits overflowing nodes with a
//!   quadratic grouping heuristic and, R\*-style, first tries to reinsert a
//!   share of an overflowing node's entries (at most once per level per
//!   top-level insertion).
//! - Deletion condenses underflowing nodes by reinserting their entries and
//!   collapses a single-child root.
//! - Search is a non-recursive, stack-based traversal bounded by the tree
//!   height; the visitor may stop it early.
//! - A tree is either 2D or 3D for its whole lifetime.
//!
//! ```
//! use std::ops::ControlFlow;
//! use topovec_rtree::{Dims, RTree, Rect};
//!
//! let mut tree = RTree::new(Dims::Two);
//! tree.insert(Rect::new_2d(0.0, 0.0, 10.0, 10.0), 1);
//! tree.insert(Rect::new_2d(20.0, 20.0, 30.0, 30.0), 2);
//!
//! let mut hits = Vec::new();
//! tree.search(&Rect::new_2d(5.0, 5.0, 6.0, 6.0), |id, _| {
//!     hits.push(id);
//!     ControlFlow::Continue(())
//! });
//! assert_eq!(hits, vec![1]);
//! ```

pub mod bulk;
pub mod codec;
pub mod error;
pub mod port;
pub mod rect;
mod split;
pub mod tree;

pub use error::{Error, Result};
pub use port::ByteOrder;
pub use rect::{Dims, Rect};
pub use tree::{ItemId, RTree, RTreeParams};
