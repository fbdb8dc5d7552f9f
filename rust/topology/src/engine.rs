// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Incremental topology maintenance.
//!
//! Areas and isles are derived from boundaries by ring walking: starting on
//! one side of a boundary, the walk repeatedly takes the angularly next
//! boundary at the node it arrives at until it returns to the start. A ring
//! that encloses space clockwise becomes an area; a counter-clockwise ring
//! becomes an isle. Each ring member records the new face on the side the
//! ring lies on (right for members walked forward, left for members walked
//! backward).
//!
//! Edits only touch the neighbourhood of the edited primitive. Faces that the
//! edit invalidates are torn down, the edited boundary's sides (or its former
//! neighbours' sides, on delete) are rebuilt, and every isle and centroid
//! inside the accumulated invalidation box is attached again.

use rustc_hash::FxHashSet;
use serde::Serialize;
use topovec_rtree::{Dims, Rect};

use crate::arena::*;
use crate::error::Result;
use crate::geometry::{point_in_ring, signed_ring_area, LineCats, LinePoints, RingLocation};
use crate::keys::*;
use crate::source::GeometrySource;

/// Why a ring walk stopped without closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RingDefect {
    /// No boundary to continue with at a node.
    NoNextLine,
    /// The walk came back to a boundary already in the ring.
    NotClosed,
    /// Two boundaries leave a node in the same direction.
    SameAngle,
}

/// A boundary side whose ring could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingFailure {
    pub line: LineId,
    pub side: Side,
    pub defect: RingDefect,
}

/// Consistency problems and structural changes of one edit or build.
///
/// Problems are logged as warnings when they occur and collected here; they
/// never abort the operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceReport {
    pub areas_built: Vec<AreaId>,
    pub isles_built: Vec<IsleId>,
    pub areas_removed: Vec<AreaId>,
    pub isles_removed: Vec<IsleId>,
    pub ring_failures: Vec<RingFailure>,
    /// Centroids inside an area that another centroid already labels.
    pub duplicate_centroids: Vec<LineId>,
    /// Centroids outside every area.
    pub outside_centroids: Vec<LineId>,
}

impl MaintenanceReport {
    /// `true` when no consistency problem was recorded.
    pub fn is_clean(&self) -> bool {
        self.ring_failures.is_empty()
            && self.duplicate_centroids.is_empty()
            && self.outside_centroids.is_empty()
    }

    pub fn merge(&mut self, other: MaintenanceReport) {
        self.areas_built.extend(other.areas_built);
        self.isles_built.extend(other.isles_built);
        self.areas_removed.extend(other.areas_removed);
        self.isles_removed.extend(other.isles_removed);
        self.ring_failures.extend(other.ring_failures);
        self.duplicate_centroids.extend(other.duplicate_centroids);
        self.outside_centroids.extend(other.outside_centroids);
    }
}

/// Scratch buffers for reading geometry during maintenance.
#[derive(Default)]
pub(crate) struct Scratch {
    pub(crate) points: LinePoints,
    pub(crate) cats: LineCats,
    pub(crate) ring: LinePoints,
}

impl Topology {
    // --- Angle order and ring walking ---

    /// The line following signed `current` at its node, turning to `side`.
    ///
    /// The node is the start node of `current` if positive, its end node if
    /// negative. Lines are visited in increasing angle order for
    /// [`Side::Right`] and decreasing order for [`Side::Left`], skipping
    /// degenerate lines and, if `kind` is given, lines of other types. When
    /// nothing else qualifies the walk wraps around to `current` itself.
    pub fn angle_next_line(
        &self,
        current: LineId,
        side: Side,
        kind: Option<FeatureType>,
    ) -> Option<LineId> {
        let node = self.node(self.line_node(current)?)?;
        let pos = node.position(current)?;
        node.lines[pos].angle?;

        let n = node.lines.len();
        (1..=n)
            .map(|step| match side {
                Side::Right => (pos + step) % n,
                Side::Left => (pos + n - step) % n,
            })
            .map(|i| &node.lines[i])
            .find(|link| link.angle.is_some() && kind.map_or(true, |k| link.kind == k))
            .map(|link| link.line)
    }

    /// Node a signed line leaves from: start node if positive, end if negative.
    pub fn line_node(&self, line: LineId) -> Option<NodeId> {
        let (start, end) = self.line(line.abs())?.topo.nodes()?;
        Some(if line > 0 { start } else { end })
    }

    fn link_angle(&self, line: LineId) -> Option<f64> {
        let node = self.node(self.line_node(line)?)?;
        node.lines[node.position(line)?].angle
    }

    /// Walks the ring on `side` of boundary `first`.
    pub(crate) fn walk_ring(
        &self,
        first: LineId,
        side: Side,
    ) -> std::result::Result<Vec<LineId>, RingDefect> {
        let first = match side {
            Side::Right => first,
            Side::Left => -first,
        };
        let mut ring = vec![first];
        let mut prev = -first;
        loop {
            let next = self
                .angle_next_line(prev, Side::Right, Some(FeatureType::Boundary))
                .ok_or(RingDefect::NoNextLine)?;
            if next != prev && self.link_angle(next) == self.link_angle(prev) {
                return Err(RingDefect::SameAngle);
            }
            if next == first {
                return Ok(ring);
            }
            if ring.iter().any(|l| l.abs() == next.abs()) {
                return Err(RingDefect::NotClosed);
            }
            ring.push(next);
            prev = -next;
        }
    }

    /// Chains the geometry of a signed boundary ring into a closed polygon.
    pub fn ring_points<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        ring: &[LineId],
        out: &mut LinePoints,
    ) -> Result<()> {
        let mut points = LinePoints::new();
        let mut cats = LineCats::new();
        out.clear();
        for &line in ring {
            let rec = self.line_record(line.abs()).ok_or(crate::Error::UnknownLine(line.abs()))?;
            source.read_at(rec.offset, &mut points, &mut cats)?;
            out.append_open(&points, line > 0);
        }
        out.close();
        Ok(())
    }

    /// Builds the area or isle on `side` of boundary `line`, unless that side
    /// already has a face. Returns the new face.
    pub(crate) fn build_line_area<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        line: LineId,
        side: Side,
        scratch: &mut Scratch,
        report: &mut MaintenanceReport,
    ) -> Result<Face> {
        let line = line.abs();
        match self.line(line) {
            Some(rec) if rec.kind == FeatureType::Boundary && rec.face(side).is_none() => {}
            _ => return Ok(Face::None),
        }

        let ring = match self.walk_ring(line, side) {
            Ok(ring) => ring,
            Err(defect) => {
                tracing::warn!(line, ?side, ?defect, "Cannot close ring");
                report.ring_failures.push(RingFailure { line, side, defect });
                return Ok(Face::None);
            }
        };

        self.ring_points(source, &ring, &mut scratch.ring)?;
        let size = signed_ring_area(scratch.ring.as_slice());
        let bbox = scratch.ring.bbox();
        let face = if size > 0.0 {
            let area = self.add_area(ring, bbox);
            report.areas_built.push(area);
            Face::Area(area)
        } else if size < 0.0 {
            let isle = self.add_isle(ring, bbox);
            report.isles_built.push(isle);
            Face::Isle(isle)
        } else {
            tracing::debug!(line, ?side, "Ring encloses no space");
            Face::None
        };
        Ok(face)
    }

    /// Installs the face bounded by a ring known from elsewhere, given as
    /// signed boundaries with the face on the right of positive ids. The
    /// ring must chain node to node and every side it claims must still be
    /// free. Returns [`Face::None`] and leaves the store untouched otherwise.
    pub fn add_face_ring<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        ring: &[LineId],
    ) -> Result<Face> {
        let Some(&first) = ring.first() else {
            return Ok(Face::None);
        };
        let mut ends = Vec::with_capacity(ring.len());
        for &line in ring {
            let rec = match self.line(line.abs()) {
                Some(rec) if rec.kind == FeatureType::Boundary => rec,
                _ => {
                    tracing::debug!(line, "Ring line is not a live boundary");
                    return Ok(Face::None);
                }
            };
            if !rec.face(Side::of_signed(line)).is_none() {
                tracing::debug!(line, "Ring side already has a face");
                return Ok(Face::None);
            }
            let Some((start, end)) = rec.topo.nodes() else {
                return Ok(Face::None);
            };
            ends.push(if line > 0 { (start, end) } else { (end, start) });
        }
        let mut seen = FxHashSet::default();
        if !ring.iter().all(|l| seen.insert(*l)) {
            tracing::debug!(line = first, "Ring repeats a side");
            return Ok(Face::None);
        }
        let chained = ends
            .iter()
            .zip(ends.iter().cycle().skip(1))
            .all(|(a, b)| a.1 == b.0);
        if !chained {
            tracing::debug!(line = first, "Ring does not chain");
            return Ok(Face::None);
        }

        let mut points = LinePoints::new();
        self.ring_points(source, ring, &mut points)?;
        let size = signed_ring_area(points.as_slice());
        let bbox = points.bbox();
        let face = if size > 0.0 {
            Face::Area(self.add_area(ring.to_vec(), bbox))
        } else if size < 0.0 {
            Face::Isle(self.add_isle(ring.to_vec(), bbox))
        } else {
            tracing::debug!(line = first, "Ring encloses no space");
            Face::None
        };
        Ok(face)
    }

    // --- Area and isle records ---

    fn add_area(&mut self, ring: Vec<LineId>, bbox: Rect) -> AreaId {
        let id = self.areas.len() as AreaId;
        for &line in &ring {
            self.set_line_face(line, Side::of_signed(line), Face::Area(id));
        }
        tracing::debug!(area = id, boundaries = ring.len(), "Built area");
        self.areas.push(Some(AreaRecord {
            boundaries: ring,
            centroid: 0,
            isles: Vec::new(),
            bbox,
        }));
        self.spatial.areas.insert(bbox, id);
        id
    }

    fn add_isle(&mut self, ring: Vec<LineId>, bbox: Rect) -> IsleId {
        let id = self.isles.len() as IsleId;
        for &line in &ring {
            self.set_line_face(line, Side::of_signed(line), Face::Isle(id));
        }
        tracing::debug!(isle = id, boundaries = ring.len(), "Built isle");
        self.isles.push(Some(IsleRecord {
            boundaries: ring,
            area: 0,
            bbox,
        }));
        self.spatial.isles.insert(bbox, id);
        id
    }

    /// Removes an area, releasing its boundary sides, centroid and isles.
    pub(crate) fn delete_area(&mut self, area: AreaId) {
        let Some(rec) = self.areas.get_mut(area as usize).and_then(Option::take) else {
            return;
        };
        for &line in &rec.boundaries {
            let side = Side::of_signed(line);
            if self.line_face(line, side) == Face::Area(area) {
                self.set_line_face(line, side, Face::None);
            }
        }
        if rec.centroid != 0 {
            self.set_centroid_link(rec.centroid, CentroidLink::Outside);
        }
        for &isle in &rec.isles {
            if let Some(i) = self.isle_mut(isle) {
                i.area = 0;
            }
        }
        self.spatial.areas.remove(&rec.bbox, area);
        tracing::debug!(area, "Deleted area");
    }

    /// Removes an isle, releasing its boundary sides and enclosing area.
    pub(crate) fn delete_isle(&mut self, isle: IsleId) {
        let Some(rec) = self.isles.get_mut(isle as usize).and_then(Option::take) else {
            return;
        };
        for &line in &rec.boundaries {
            let side = Side::of_signed(line);
            if self.line_face(line, side) == Face::Isle(isle) {
                self.set_line_face(line, side, Face::None);
            }
        }
        if let Some(area) = self.area_mut(rec.area) {
            area.isles.retain(|&i| i != isle);
        }
        self.spatial.isles.remove(&rec.bbox, isle);
        tracing::debug!(isle, "Deleted isle");
    }

    /// Tears down whatever face `face` names, widening `bbox` by its extent.
    fn tear_down<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        face: Face,
        bbox: &mut Rect,
        scratch: &mut Scratch,
        report: &mut MaintenanceReport,
    ) -> Result<()> {
        match face {
            Face::None => {}
            Face::Area(area) => {
                if let Some(rec) = self.area(area) {
                    bbox.extend(&rec.bbox);
                }
                self.delete_area_cats(source, area, scratch)?;
                self.delete_area(area);
                report.areas_removed.push(area);
            }
            Face::Isle(isle) => {
                if let Some(rec) = self.isle(isle) {
                    bbox.extend(&rec.bbox);
                }
                self.delete_isle(isle);
                report.isles_removed.push(isle);
            }
        }
        Ok(())
    }

    // --- Area categories ---

    fn area_cats_enabled(&self) -> bool {
        self.update_cidx && self.built >= BuildLevel::Centroids
    }

    /// Indexes the categories of an area's centroid under the area.
    pub(crate) fn add_area_cats<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        area: AreaId,
        scratch: &mut Scratch,
    ) -> Result<()> {
        if !self.update_cidx {
            return Ok(());
        }
        if let Some(offset) = self.area_centroid_offset(area) {
            source.read_at(offset, &mut scratch.points, &mut scratch.cats)?;
            self.cidx.add_cats(&scratch.cats, CatKind::Area, area);
        }
        Ok(())
    }

    fn delete_area_cats<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        area: AreaId,
        scratch: &mut Scratch,
    ) -> Result<()> {
        if !self.area_cats_enabled() {
            return Ok(());
        }
        if let Some(offset) = self.area_centroid_offset(area) {
            source.read_at(offset, &mut scratch.points, &mut scratch.cats)?;
            self.cidx.delete_cats(&scratch.cats, CatKind::Area, area);
        }
        Ok(())
    }

    fn area_centroid_offset(&self, area: AreaId) -> Option<u64> {
        let centroid = self.area(area)?.centroid;
        self.line(centroid).map(|c| c.offset)
    }

    // --- Attaching isles and centroids ---

    /// The smallest area whose outer ring strictly contains the isle.
    pub(crate) fn isle_find_area<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        isle: IsleId,
        scratch: &mut Scratch,
    ) -> Result<Option<AreaId>> {
        let Some(rec) = self.isle(isle) else {
            return Ok(None);
        };
        let Some(&first) = rec.boundaries.first() else {
            return Ok(None);
        };
        let Some(node) = self.line_node(first).and_then(|n| self.node(n)) else {
            return Ok(None);
        };
        let (x, y) = (node.x, node.y);
        // The area formed by the same ring from the inside.
        let inner = match self.line_face(first, Side::of_signed(first).opposite()) {
            Face::Area(a) => a,
            _ => 0,
        };

        let mut best: Option<(AreaId, f64)> = None;
        for area in self.spatial.select(PrimitiveClass::Area, &planar(&rec.bbox)) {
            if area == inner {
                continue;
            }
            let Some(candidate) = self.area(area) else {
                continue;
            };
            if !candidate.bbox.contains(&rec.bbox, Dims::Two) {
                continue;
            }
            self.ring_points(source, &candidate.boundaries, &mut scratch.ring)?;
            if point_in_ring(x, y, scratch.ring.as_slice()) != RingLocation::Inside {
                continue;
            }
            let size = signed_ring_area(scratch.ring.as_slice()).abs();
            if best.map_or(true, |(_, s)| size < s) {
                best = Some((area, size));
            }
        }
        Ok(best.map(|(a, _)| a))
    }

    fn detach_isle(&mut self, isle: IsleId) {
        let area = match self.isle_mut(isle) {
            Some(rec) => std::mem::take(&mut rec.area),
            None => return,
        };
        if let Some(rec) = self.area_mut(area) {
            rec.isles.retain(|&i| i != isle);
        }
    }

    fn attach_isle_to(&mut self, isle: IsleId, area: AreaId) {
        if let Some(rec) = self.isle_mut(isle) {
            rec.area = area;
        }
        if let Some(rec) = self.area_mut(area) {
            let pos = rec.isles.partition_point(|&i| i < isle);
            rec.isles.insert(pos, isle);
        }
    }

    /// Reattaches an isle to its enclosing area.
    pub(crate) fn attach_isle<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        isle: IsleId,
        scratch: &mut Scratch,
    ) -> Result<()> {
        self.detach_isle(isle);
        if let Some(area) = self.isle_find_area(source, isle, scratch)? {
            self.attach_isle_to(isle, area);
        }
        Ok(())
    }

    /// Reattaches every isle whose box overlaps `bbox`.
    fn attach_isles_in<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        bbox: &Rect,
        scratch: &mut Scratch,
    ) -> Result<()> {
        let isles = self.spatial.select(PrimitiveClass::Isle, bbox);
        for &isle in &isles {
            self.detach_isle(isle);
        }
        for &isle in &isles {
            if let Some(area) = self.isle_find_area(source, isle, scratch)? {
                self.attach_isle_to(isle, area);
            }
        }
        Ok(())
    }

    /// `true` if `(x, y)` is strictly inside the area's outer ring and outside
    /// all of its isles.
    pub fn point_in_area<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
        x: f64,
        y: f64,
    ) -> Result<bool> {
        let mut ring = LinePoints::new();
        self.point_in_area_with(source, area, x, y, &mut ring)
    }

    fn point_in_area_with<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
        x: f64,
        y: f64,
        ring: &mut LinePoints,
    ) -> Result<bool> {
        let Some(rec) = self.area(area) else {
            return Ok(false);
        };
        if !rec.bbox.contains_xy(x, y) {
            return Ok(false);
        }
        self.ring_points(source, &rec.boundaries, ring)?;
        if point_in_ring(x, y, ring.as_slice()) != RingLocation::Inside {
            return Ok(false);
        }
        for &isle in &rec.isles {
            let Some(isle_rec) = self.isle(isle) else {
                continue;
            };
            if !isle_rec.bbox.contains_xy(x, y) {
                continue;
            }
            self.ring_points(source, &isle_rec.boundaries, ring)?;
            if point_in_ring(x, y, ring.as_slice()) != RingLocation::Outside {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The area containing `(x, y)`, lowest id first.
    pub fn find_area<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        x: f64,
        y: f64,
    ) -> Result<Option<AreaId>> {
        let mut ring = LinePoints::new();
        let probe = planar(&Rect::point(x, y, 0.0));
        for area in self.spatial.select(PrimitiveClass::Area, &probe) {
            if self.point_in_area_with(source, area, x, y, &mut ring)? {
                return Ok(Some(area));
            }
        }
        Ok(None)
    }

    /// Attaches a centroid to the area it lies in. The first centroid of an
    /// area wins; later ones become duplicates. Returns the area if this call
    /// newly labeled it.
    pub(crate) fn attach_centroid<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        centroid: LineId,
        report: &mut MaintenanceReport,
    ) -> Result<Option<AreaId>> {
        let Some(rec) = self.line(centroid) else {
            return Ok(None);
        };
        let (x, y) = rec.point_xy();
        let Some(area) = self.find_area(source, x, y)? else {
            self.set_centroid_link(centroid, CentroidLink::Outside);
            report.outside_centroids.push(centroid);
            tracing::debug!(centroid, x, y, "Centroid outside any area");
            return Ok(None);
        };

        let labeled_by = self.area(area).map_or(0, |a| a.centroid);
        if labeled_by == 0 {
            if let Some(a) = self.area_mut(area) {
                a.centroid = centroid;
            }
            self.set_centroid_link(centroid, CentroidLink::Attached(area));
            Ok(Some(area))
        } else if labeled_by == centroid {
            Ok(None)
        } else {
            self.set_centroid_link(centroid, CentroidLink::Duplicate(area));
            report.duplicate_centroids.push(centroid);
            tracing::warn!(centroid, area, first = labeled_by, "Duplicate centroid");
            Ok(None)
        }
    }

    /// Attaches every centroid in `bbox` that is not attached yet. Returns
    /// the areas that gained a centroid.
    fn attach_centroids_in<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        bbox: &Rect,
        report: &mut MaintenanceReport,
    ) -> Result<Vec<AreaId>> {
        let centroids: Vec<LineId> = self
            .spatial
            .select(PrimitiveClass::Line, bbox)
            .into_iter()
            .filter(|&l| {
                self.line(l).is_some_and(|rec| {
                    rec.kind == FeatureType::Centroid
                        && !matches!(rec.centroid_link(), CentroidLink::Attached(_))
                })
            })
            .collect();

        let mut labeled = Vec::new();
        for centroid in centroids {
            if let Some(area) = self.attach_centroid(source, centroid, report)? {
                labeled.push(area);
            }
        }
        Ok(labeled)
    }

    /// Attaches isles and centroids inside `bbox` and indexes the categories
    /// of newly labeled areas, as far as the build level allows.
    fn settle<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        bbox: &Rect,
        scratch: &mut Scratch,
        report: &mut MaintenanceReport,
    ) -> Result<()> {
        if bbox.is_empty() {
            return Ok(());
        }
        let bbox = &planar(bbox);
        if self.built >= BuildLevel::AttachIsles {
            self.attach_isles_in(source, bbox, scratch)?;
        }
        if self.built >= BuildLevel::Centroids {
            let labeled = self.attach_centroids_in(source, bbox, report)?;
            if self.area_cats_enabled() {
                for area in labeled {
                    self.add_area_cats(source, area, scratch)?;
                }
            }
        }
        Ok(())
    }

    fn face_bbox(&self, face: Face) -> Option<Rect> {
        match face {
            Face::None => None,
            Face::Area(a) => self.area(a).map(|r| r.bbox),
            Face::Isle(i) => self.isle(i).map(|r| r.bbox),
        }
    }

    // --- Edits ---

    /// Adds a primitive and updates the topology around it.
    pub fn write_line<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        kind: FeatureType,
        offset: u64,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<(LineId, MaintenanceReport)> {
        let id = self.add_feature(kind, offset, points, cats)?;
        let report = self.maintain_added(source, id)?;
        Ok((id, report))
    }

    /// Area maintenance after `line` joined the base topology.
    fn maintain_added<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        line: LineId,
    ) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        let mut scratch = Scratch::default();
        let Some(rec) = self.line(line) else {
            return Ok(report);
        };
        let kind = rec.kind;

        if kind == FeatureType::Boundary && self.built >= BuildLevel::Areas {
            let mut bbox = Rect::empty();
            let (start, end) = rec.topo.nodes().unwrap_or((0, 0));

            for (node, signed) in [(start, line), (end, -line)] {
                if self.node(node).map_or(0, |n| n.lines.len()) < 2 {
                    continue;
                }
                let next = self.angle_next_line(signed, Side::Right, Some(FeatureType::Boundary));
                if let Some(next) = next {
                    let face = self.line_face(next, Side::of_signed(next));
                    self.tear_down(source, face, &mut bbox, &mut scratch, &mut report)?;
                }
            }

            for side in [Side::Left, Side::Right] {
                let face = self.build_line_area(source, line, side, &mut scratch, &mut report)?;
                if let Some(b) = self.face_bbox(face) {
                    bbox.extend(&b);
                }
            }
            self.settle(source, &bbox, &mut scratch, &mut report)?;
        } else if kind == FeatureType::Centroid && self.built >= BuildLevel::Centroids {
            if let Some(area) = self.attach_centroid(source, line, &mut report)? {
                if self.area_cats_enabled() {
                    self.add_area_cats(source, area, &mut scratch)?;
                }
            }
        }
        Ok(report)
    }

    /// Deletes a live primitive, marking it dead in place, and updates the
    /// topology around it.
    pub fn delete_line<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        line: LineId,
    ) -> Result<MaintenanceReport> {
        let rec = self.live_line(line)?;
        let (kind, offset, link) = (rec.kind, rec.offset, rec.centroid_link());
        let faces = (rec.face(Side::Left), rec.face(Side::Right));

        let mut report = MaintenanceReport::default();
        let mut scratch = Scratch::default();

        // Categories first: removing them needs the primitive's own record.
        if self.update_cidx {
            source.read_at(offset, &mut scratch.points, &mut scratch.cats)?;
            self.cidx.delete_cats(&scratch.cats, kind.into(), line);
        }

        if let CentroidLink::Attached(area) = link {
            if self.area_cats_enabled() {
                self.cidx.delete_cats(&scratch.cats, CatKind::Area, area);
            }
            if let Some(a) = self.area_mut(area) {
                a.centroid = 0;
            }
        }

        let maintain = kind == FeatureType::Boundary && self.built >= BuildLevel::Areas;
        let mut adjacent = Vec::new();
        let mut bbox = Rect::empty();
        if maintain {
            for (signed, side) in [
                (line, Side::Right),
                (line, Side::Left),
                (-line, Side::Right),
                (-line, Side::Left),
            ] {
                if let Some(next) = self.angle_next_line(signed, side, Some(FeatureType::Boundary))
                {
                    if next.abs() != line {
                        adjacent.push(match side {
                            Side::Right => next,
                            Side::Left => -next,
                        });
                    }
                }
            }
            self.tear_down(source, faces.0, &mut bbox, &mut scratch, &mut report)?;
            self.tear_down(source, faces.1, &mut bbox, &mut scratch, &mut report)?;
        }

        self.kill_line(line)?;

        if maintain {
            for adj in adjacent {
                let face = self.build_line_area(
                    source,
                    adj.abs(),
                    Side::of_signed(adj),
                    &mut scratch,
                    &mut report,
                )?;
                if let Some(b) = self.face_bbox(face) {
                    bbox.extend(&b);
                }
            }
            self.settle(source, &bbox, &mut scratch, &mut report)?;
        }
        tracing::debug!(line, %kind, "Deleted line");
        Ok(report)
    }

    /// Revives a dead primitive under its old id, reading its geometry back
    /// from `source`, and updates the topology around it.
    pub fn restore_line<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        line: LineId,
    ) -> Result<MaintenanceReport> {
        let rec = self.line_record(line).ok_or(crate::Error::UnknownLine(line))?;
        if rec.alive {
            return Err(crate::Error::AliveLine(line));
        }
        let (kind, offset) = (rec.kind, rec.offset);

        let mut points = LinePoints::new();
        let mut cats = LineCats::new();
        source.read_at(offset, &mut points, &mut cats)?;
        self.revive_line(line, &points)?;
        if self.update_cidx {
            self.cidx.add_cats(&cats, kind.into(), line);
        }
        tracing::debug!(line, %kind, "Restored line");
        self.maintain_added(source, line)
    }

    /// Replaces a primitive: deletes `line` and writes the new geometry
    /// stored at `offset`. Returns the new line id.
    pub fn rewrite_line<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        line: LineId,
        kind: FeatureType,
        offset: u64,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<(LineId, MaintenanceReport)> {
        let mut report = self.delete_line(source, line)?;
        let (id, written) = self.write_line(source, kind, offset, points, cats)?;
        report.merge(written);
        Ok((id, report))
    }
}

/// `rect` stretched over every elevation, so that area searches stay planar
/// in volumetric stores.
fn planar(rect: &Rect) -> Rect {
    let mut out = *rect;
    out.min[2] = f64::NEG_INFINITY;
    out.max[2] = f64::INFINITY;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn built() -> (Topology, MemorySource) {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        (topo, MemorySource::new())
    }

    fn write(
        topo: &mut Topology,
        src: &mut MemorySource,
        kind: FeatureType,
        coords: &[(f64, f64)],
        cats: &[(i32, i32)],
    ) -> (LineId, MaintenanceReport) {
        let points = LinePoints::from_xy(coords);
        let cats = LineCats::from_pairs(cats);
        let offset = src.push(kind, &points, &cats);
        topo.write_line(src, kind, offset, &points, &cats).unwrap()
    }

    #[test]
    fn closed_ring_makes_area_and_isle() {
        let (mut topo, mut src) = built();
        let (b, report) = write(
            &mut topo,
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
            &[],
        );
        assert_eq!(report.areas_built.len(), 1);
        assert_eq!(report.isles_built.len(), 1);
        let rec = topo.line(b).unwrap();
        assert!(matches!(rec.face(Side::Right), Face::Area(_)));
        assert!(matches!(rec.face(Side::Left), Face::Isle(_)));
    }

    #[test]
    fn dangling_boundary_reports_failure() {
        let (mut topo, mut src) = built();
        let (b, report) = write(
            &mut topo,
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (5.0, 0.0)],
            &[],
        );
        assert_eq!(topo.area_count(), 0);
        assert_eq!(report.ring_failures.len(), 2);
        assert!(report
            .ring_failures
            .iter()
            .all(|f| f.line == b && f.defect == RingDefect::NotClosed));
    }

    #[test]
    fn known_rings_become_faces() {
        let mut src = MemorySource::new();
        let mut topo = Topology::new(false);
        let halves: [&[(f64, f64)]; 2] = [
            &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0)],
            &[(10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
        ];
        let mut lines = Vec::new();
        for coords in halves {
            let points = LinePoints::from_xy(coords);
            let offset = src.push(FeatureType::Boundary, &points, &LineCats::new());
            let line = topo
                .add_feature(FeatureType::Boundary, offset, &points, &LineCats::new())
                .unwrap();
            lines.push(line);
        }
        let (a, b) = (lines[0], lines[1]);

        assert_eq!(topo.add_face_ring(&mut src, &[a, -b]).unwrap(), Face::None);
        let face = topo.add_face_ring(&mut src, &[a, b]).unwrap();
        let Face::Area(area) = face else {
            panic!("expected an area, got {face:?}");
        };
        assert_eq!(topo.area_boundaries(area), Some(&[a, b][..]));
        assert_eq!(topo.add_face_ring(&mut src, &[b, a]).unwrap(), Face::None);

        // The walk only fills the sides still free.
        let report = topo.build_to(&mut src, BuildLevel::All, 0).unwrap();
        assert_eq!(report.areas, 1);
        assert_eq!(report.isles, 1);
        assert!(report.issues.areas_built.is_empty());
        assert_eq!(topo.line(a).unwrap().face(Side::Right), Face::Area(area));
        assert!(matches!(topo.line(b).unwrap().face(Side::Left), Face::Isle(_)));
    }

    #[test]
    fn angle_next_wraps_to_itself() {
        let (mut topo, mut src) = built();
        let (b, _) = write(
            &mut topo,
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (5.0, 0.0)],
            &[],
        );
        assert_eq!(topo.angle_next_line(b, Side::Right, None), Some(b));
        assert_eq!(topo.angle_next_line(-b, Side::Left, None), Some(-b));
    }

    #[test]
    fn centroid_labels_area_and_indexes_cats() {
        let (mut topo, mut src) = built();
        write(
            &mut topo,
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
            &[],
        );
        let (c, _) = write(&mut topo, &mut src, FeatureType::Centroid, &[(5.0, 5.0)], &[(1, 42)]);
        let area = match topo.line(c).unwrap().centroid_link() {
            CentroidLink::Attached(a) => a,
            other => panic!("centroid not attached: {other:?}"),
        };
        assert_eq!(topo.area(area).unwrap().centroid, c);
        assert_eq!(topo.cidx().find_ids(1, 42, CatKind::Area), vec![area]);
        assert_eq!(topo.cidx().find_ids(1, 42, CatKind::Centroid), vec![c]);
    }

    #[test]
    fn delete_removes_cats_before_killing() {
        let (mut topo, mut src) = built();
        let (l, _) = write(
            &mut topo,
            &mut src,
            FeatureType::Line,
            &[(0.0, 0.0), (1.0, 1.0)],
            &[(1, 7)],
        );
        topo.delete_line(&mut src, l).unwrap();
        assert!(topo.cidx().find(1, 7).is_empty());
        topo.restore_line(&mut src, l).unwrap();
        assert_eq!(topo.cidx().find_ids(1, 7, CatKind::Line), vec![l]);
        assert!(topo.restore_line(&mut src, l).is_err());
    }

    #[test]
    fn base_level_does_no_area_work() {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::Base);
        let mut src = MemorySource::new();
        write(
            &mut topo,
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)],
            &[],
        );
        assert_eq!(topo.area_count(), 0);
        assert_eq!(topo.isle_count(), 0);
    }
}
