// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connectivity queries.
//!
//! Downward: area → boundaries → nodes, area → isles, isle → boundaries.
//! Upward: node → lines, boundary → faces, isle → enclosing area, centroid →
//! labeled area.

use rustc_hash::FxHashSet;

use crate::arena::Topology;
use crate::keys::*;

// =============================================================================
// Downward traversal
// =============================================================================

impl Topology {
    /// Start and end node of a live line or boundary.
    pub fn line_nodes(&self, line: LineId) -> Option<(NodeId, NodeId)> {
        self.line(line.abs())?.topo.nodes()
    }

    /// Signed boundary ring of an area, in walking order.
    pub fn area_boundaries(&self, area: AreaId) -> Option<&[LineId]> {
        self.area(area).map(|a| a.boundaries.as_slice())
    }

    /// Isles inside an area, ascending.
    pub fn area_isles(&self, area: AreaId) -> Option<&[IsleId]> {
        self.area(area).map(|a| a.isles.as_slice())
    }

    /// The centroid labeling an area, if any.
    pub fn area_centroid(&self, area: AreaId) -> Option<LineId> {
        self.area(area).map(|a| a.centroid).filter(|&c| c != 0)
    }

    /// Signed boundary ring of an isle, in walking order.
    pub fn isle_boundaries(&self, isle: IsleId) -> Option<&[LineId]> {
        self.isle(isle).map(|i| i.boundaries.as_slice())
    }

    /// Nodes on an area's outer ring, in walking order.
    pub fn area_nodes(&self, area: AreaId) -> Option<Vec<NodeId>> {
        let ring = self.area_boundaries(area)?;
        ring.iter().map(|&l| self.line_node(l)).collect()
    }

    /// Every boundary touching an area: outer ring and isle rings, unsigned.
    pub fn area_all_boundaries(&self, area: AreaId) -> Option<FxHashSet<LineId>> {
        let rec = self.area(area)?;
        let mut set: FxHashSet<LineId> = rec.boundaries.iter().map(|l| l.abs()).collect();
        for &isle in &rec.isles {
            if let Some(i) = self.isle(isle) {
                set.extend(i.boundaries.iter().map(|l| l.abs()));
            }
        }
        Some(set)
    }
}

// =============================================================================
// Upward traversal
// =============================================================================

impl Topology {
    /// Signed lines at a node in angle order.
    pub fn node_lines(&self, node: NodeId) -> Option<Vec<LineId>> {
        self.node(node).map(|n| n.lines.iter().map(|l| l.line).collect())
    }

    /// Live lines of `kind` at a node, unsigned and deduplicated.
    pub fn node_lines_of(&self, node: NodeId, kind: FeatureType) -> Vec<LineId> {
        let Some(rec) = self.node(node) else {
            return Vec::new();
        };
        let mut lines: Vec<LineId> = rec
            .lines
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.line.abs())
            .collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }

    /// `(left, right)` faces of a live boundary.
    pub fn line_faces(&self, line: LineId) -> Option<(Face, Face)> {
        let rec = self.line(line.abs())?;
        (rec.kind == FeatureType::Boundary).then(|| (rec.face(Side::Left), rec.face(Side::Right)))
    }

    /// The area enclosing an isle; `None` at the outermost level.
    pub fn isle_area(&self, isle: IsleId) -> Option<AreaId> {
        self.isle(isle).map(|i| i.area).filter(|&a| a != 0)
    }

    /// The area a live centroid is attached to or duplicates.
    pub fn centroid_area(&self, centroid: LineId) -> CentroidLink {
        self.line(centroid)
            .map_or(CentroidLink::Outside, |l| l.centroid_link())
    }

    /// Areas sharing a boundary with `area`, ascending.
    pub fn area_neighbours(&self, area: AreaId) -> Vec<AreaId> {
        let Some(rec) = self.area(area) else {
            return Vec::new();
        };
        let mut out: Vec<AreaId> = rec
            .boundaries
            .iter()
            .filter_map(|&l| match self.line_face(l, Side::of_signed(l).opposite()) {
                Face::Area(a) if a != area => Some(a),
                _ => None,
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}
