// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial indexes for exact node lookup and box selection.
//!
//! One R-tree per primitive class. Nodes are indexed by degenerate point
//! boxes, so coordinate lookup is an exact-box search.

use std::ops::ControlFlow;

use topovec_rtree::{Dims, RTree, RTreeParams, Rect};

use crate::arena::Topology;
use crate::keys::{NodeId, PrimitiveClass};

/// The four per-class R-trees of a topology store.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    pub(crate) nodes: RTree,
    pub(crate) lines: RTree,
    pub(crate) areas: RTree,
    pub(crate) isles: RTree,
}

impl SpatialIndex {
    pub fn new(dims: Dims, params: RTreeParams) -> Self {
        Self {
            nodes: RTree::with_params(dims, params),
            lines: RTree::with_params(dims, params),
            areas: RTree::with_params(dims, params),
            isles: RTree::with_params(dims, params),
        }
    }

    /// Assembles an index from individually decoded trees.
    pub fn from_trees(nodes: RTree, lines: RTree, areas: RTree, isles: RTree) -> Self {
        Self {
            nodes,
            lines,
            areas,
            isles,
        }
    }

    pub fn dims(&self) -> Dims {
        self.nodes.dims()
    }

    pub fn params(&self) -> RTreeParams {
        self.nodes.params()
    }

    pub fn tree(&self, class: PrimitiveClass) -> &RTree {
        match class {
            PrimitiveClass::Node => &self.nodes,
            PrimitiveClass::Line => &self.lines,
            PrimitiveClass::Area => &self.areas,
            PrimitiveClass::Isle => &self.isles,
        }
    }

    /// Ids of `class` primitives whose box overlaps `rect`, ascending.
    pub fn select(&self, class: PrimitiveClass, rect: &Rect) -> Vec<i32> {
        let mut ids = self.tree(class).search_ids(rect);
        ids.sort_unstable();
        ids
    }

    /// The node at exactly `(x, y, z)`; z is ignored by planar indexes.
    pub fn find_node(&self, x: f64, y: f64, z: f64) -> Option<NodeId> {
        let target = Rect::point(x, y, z);
        let dims = self.dims();
        let mut found = None;
        self.nodes.search(&target, |id, rect| {
            if rect.same_as(&target, dims) {
                found = Some(id);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        found
    }
}

impl Topology {
    /// Ids of `class` primitives whose box overlaps `rect`, ascending.
    pub fn select_by_box(&self, class: PrimitiveClass, rect: &Rect) -> Vec<i32> {
        self.spatial.select(class, rect)
    }

    /// Replaces every spatial index by an STR bulk load over the stored
    /// boxes. Used when the persisted index is missing or unreadable.
    pub fn rebuild_spatial_index(&mut self) {
        let dims = self.spatial.dims();
        let params = self.spatial.params();

        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (Rect::point(n.x, n.y, n.z), i as i32)))
            .collect();
        let lines = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().filter(|l| l.alive).map(|l| (l.bbox, i as i32)))
            .collect();
        let areas = self
            .areas
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|a| (a.bbox, i as i32)))
            .collect();
        let isles = self
            .isles
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|a| (a.bbox, i as i32)))
            .collect();

        self.spatial = SpatialIndex {
            nodes: RTree::bulk_load(dims, params, nodes),
            lines: RTree::bulk_load(dims, params, lines),
            areas: RTree::bulk_load(dims, params, areas),
            isles: RTree::bulk_load(dims, params, isles),
        };
        tracing::debug!(
            nodes = self.spatial.nodes.len(),
            lines = self.spatial.lines.len(),
            areas = self.spatial.areas.len(),
            isles = self.spatial.isles.len(),
            "Rebuilt spatial index"
        );
    }

    /// Installs a decoded spatial index.
    pub fn set_spatial_index(&mut self, index: SpatialIndex) {
        self.spatial = index;
    }
}
