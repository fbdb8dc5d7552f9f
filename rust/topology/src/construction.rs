// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Base topology: nodes and line records.
//!
//! Every line or boundary is attached to a node at each end, found by exact
//! coordinate match or created on demand. The node keeps its incident lines
//! sorted by the angle at which they leave it; that order drives all ring
//! walking in the maintenance engine. Points and centroids have no nodes.

use std::cmp::Ordering;

use topovec_rtree::Rect;

use crate::arena::*;
use crate::error::{Error, Result};
use crate::geometry::{begin_angle, end_angle, LineCats, LinePoints};
use crate::keys::*;

impl Topology {
    /// Adds a primitive to the base topology: nodes, line record, line index
    /// and (when enabled) the primitive's own categories. Areas are left
    /// untouched; see [`Topology::write_line`] for the maintained variant.
    pub fn add_feature(
        &mut self,
        kind: FeatureType,
        offset: u64,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<LineId> {
        validate(kind, points)?;

        let id = self.lines.len() as LineId;
        let (start, end) = self.attach_nodes(id, kind, points);
        let bbox = points.bbox();
        self.lines.push(Some(LineRecord {
            kind,
            offset,
            bbox,
            alive: true,
            topo: LineTopo::detached(kind, start, end),
        }));
        self.spatial.lines.insert(bbox, id);

        if self.update_cidx {
            self.cidx.add_cats(cats, kind.into(), id);
        }
        if let Some(log) = &mut self.update_log {
            log.line(id);
        }
        tracing::trace!(line = id, %kind, start, end, "Added line");
        Ok(id)
    }

    /// Connects both ends of a line or boundary to nodes. Returns `(0, 0)`
    /// for point primitives.
    fn attach_nodes(
        &mut self,
        id: LineId,
        kind: FeatureType,
        points: &LinePoints) -> (NodeId, NodeId,
    ) {
        if kind.is_point_like() {
            return (0, 0);
        }
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return (0, 0);
        };
        let start = self.find_or_add_node(first.x, first.y, first.z);
        self.link_line(start, id, begin_angle(points), kind);
        let end = self.find_or_add_node(last.x, last.y, last.z);
        self.link_line(end, -id, end_angle(points), kind);
        (start, end)
    }

    /// The node at exactly `(x, y, z)`.
    pub fn find_node(&self, x: f64, y: f64, z: f64) -> Option<NodeId> {
        self.spatial.find_node(x, y, z)
    }

    fn find_or_add_node(&mut self, x: f64, y: f64, z: f64) -> NodeId {
        if let Some(node) = self.spatial.find_node(x, y, z) {
            return node;
        }
        let z = if self.with_z { z } else { 0.0 };
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Some(NodeRecord {
            x,
            y,
            z,
            lines: Vec::new(),
        }));
        self.spatial.nodes.insert(Rect::point(x, y, z), id);
        id
    }

    /// Inserts a signed line into a node's angle-ordered list, after any
    /// entries with the same angle.
    fn link_line(&mut self, node: NodeId, line: LineId, angle: Option<f64>, kind: FeatureType) {
        if let Some(rec) = self.node_mut(node) {
            let pos = rec
                .lines
                .partition_point(|l| angle_order(l.angle, angle) != Ordering::Greater);
            rec.lines.insert(pos, NodeLink { line, angle, kind });
        }
        if let Some(log) = &mut self.update_log {
            log.node(node);
        }
    }

    /// Removes a signed line from a node, dropping the node once it has no
    /// lines left.
    fn unlink_line(&mut self, node: NodeId, line: LineId) {
        let now_empty = match self.node_mut(node) {
            Some(rec) => {
                rec.lines.retain(|l| l.line != line);
                rec.lines.is_empty()
            }
            None => return,
        };
        if now_empty {
            if let Some(rec) = self.nodes[node as usize].take() {
                self.spatial.nodes.remove(&Rect::point(rec.x, rec.y, rec.z), node);
            }
        }
        if let Some(log) = &mut self.update_log {
            log.node(node);
        }
    }

    /// Takes a live line out of base topology and marks it dead in place.
    /// Faces and centroid links must already be released.
    pub(crate) fn kill_line(&mut self, id: LineId) -> Result<()> {
        let rec = self.live_line(id)?;
        let (kind, bbox, nodes) = (rec.kind, rec.bbox, rec.topo.nodes());

        if let Some((start, end)) = nodes {
            self.unlink_line(start, id);
            self.unlink_line(end, -id);
        }
        self.spatial.lines.remove(&bbox, id);
        if let Some(rec) = self.line_mut(id) {
            rec.alive = false;
            rec.topo = LineTopo::detached(kind, 0, 0);
        }
        if let Some(log) = &mut self.update_log {
            log.line(id);
        }
        tracing::trace!(line = id, %kind, "Killed line");
        Ok(())
    }

    /// Brings a dead line back under its old id with geometry `points`.
    pub(crate) fn revive_line(&mut self, id: LineId, points: &LinePoints) -> Result<()> {
        let rec = self.line_record(id).ok_or(Error::UnknownLine(id))?;
        if rec.alive {
            return Err(Error::AliveLine(id));
        }
        let kind = rec.kind;
        validate(kind, points)?;

        let (start, end) = self.attach_nodes(id, kind, points);
        let bbox = points.bbox();
        if let Some(rec) = self.line_mut(id) {
            rec.alive = true;
            rec.bbox = bbox;
            rec.topo = LineTopo::detached(kind, start, end);
        }
        self.spatial.lines.insert(bbox, id);
        if let Some(log) = &mut self.update_log {
            log.line(id);
        }
        Ok(())
    }
}

/// Degenerate (`None`) angles sort before every real angle.
fn angle_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Rejects vertex counts a primitive of `kind` cannot have.
pub fn validate(kind: FeatureType, points: &LinePoints) -> Result<()> {
    let ok = match kind {
        FeatureType::Point | FeatureType::Centroid => points.len() == 1,
        FeatureType::Line | FeatureType::Boundary => points.len() >= 2,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidGeometry {
            kind,
            reason: format!("{} vertices", points.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(topo: &mut Topology, kind: FeatureType, coords: &[(f64, f64)]) -> LineId {
        topo.add_feature(kind, 0, &LinePoints::from_xy(coords), &LineCats::new())
            .unwrap()
    }

    #[test]
    fn shared_endpoints_share_a_node() {
        let mut topo = Topology::new(false);
        let a = add(&mut topo, FeatureType::Line, &[(0.0, 0.0), (10.0, 0.0)]);
        let b = add(&mut topo, FeatureType::Line, &[(10.0, 0.0), (10.0, 10.0)]);
        assert_eq!(topo.node_count(), 3);

        let end_a = topo.line(a).unwrap().topo.nodes().unwrap().1;
        let start_b = topo.line(b).unwrap().topo.nodes().unwrap().0;
        assert_eq!(end_a, start_b);
        let node = topo.node(end_a).unwrap();
        assert_eq!(node.lines.len(), 2);
    }

    #[test]
    fn node_lines_are_angle_ordered() {
        let mut topo = Topology::new(false);
        // Spokes leaving the origin east, north, west and south.
        let east = add(&mut topo, FeatureType::Boundary, &[(0.0, 0.0), (1.0, 0.0)]);
        let west = add(&mut topo, FeatureType::Boundary, &[(0.0, 0.0), (-1.0, 0.0)]);
        let north = add(&mut topo, FeatureType::Boundary, &[(0.0, 1.0), (0.0, 0.0)]);
        let south = add(&mut topo, FeatureType::Boundary, &[(0.0, 0.0), (0.0, -1.0)]);

        let origin = topo.find_node(0.0, 0.0, 0.0).unwrap();
        let order: Vec<_> = topo.node(origin).unwrap().lines.iter().map(|l| l.line).collect();
        assert_eq!(order, vec![south, east, -north, west]);
    }

    #[test]
    fn degenerate_lines_sort_first() {
        let mut topo = Topology::new(false);
        add(&mut topo, FeatureType::Line, &[(0.0, 0.0), (-1.0, -1.0)]);
        let dot = add(&mut topo, FeatureType::Line, &[(0.0, 0.0), (0.0, 0.0)]);
        let origin = topo.find_node(0.0, 0.0, 0.0).unwrap();
        let node = topo.node(origin).unwrap();
        assert_eq!(node.lines[0].line.abs(), dot);
        assert_eq!(node.lines[0].angle, None);
    }

    #[test]
    fn points_do_not_create_nodes() {
        let mut topo = Topology::new(false);
        add(&mut topo, FeatureType::Point, &[(3.0, 3.0)]);
        add(&mut topo, FeatureType::Centroid, &[(4.0, 4.0)]);
        assert_eq!(topo.node_count(), 0);
        assert_eq!(topo.live_line_count(), 2);
    }

    #[test]
    fn kill_and_revive_keep_the_id() {
        let mut topo = Topology::new(false);
        let coords = [(0.0, 0.0), (5.0, 5.0)];
        let id = add(&mut topo, FeatureType::Line, &coords);
        topo.kill_line(id).unwrap();
        assert_eq!(topo.node_count(), 0);
        assert!(topo.line(id).is_none());
        assert!(topo.line_record(id).is_some());
        assert!(topo
            .select_by_box(PrimitiveClass::Line, &Rect::new_2d(0.0, 0.0, 5.0, 5.0))
            .is_empty());
        assert!(matches!(topo.kill_line(id), Err(Error::DeadLine(_))));

        topo.revive_line(id, &LinePoints::from_xy(&coords)).unwrap();
        assert_eq!(topo.node_count(), 2);
        assert_eq!(
            topo.select_by_box(PrimitiveClass::Line, &Rect::new_2d(1.0, 1.0, 2.0, 2.0)),
            vec![id]
        );
    }

    #[test]
    fn invalid_vertex_counts_are_rejected() {
        let mut topo = Topology::new(false);
        let err = topo
            .add_feature(
                FeatureType::Boundary,
                0,
                &LinePoints::from_xy(&[(0.0, 0.0)]),
                &LineCats::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { kind: FeatureType::Boundary, .. }));
    }
}
