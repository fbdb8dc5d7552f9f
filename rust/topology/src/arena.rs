// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Record storage for planar vector topology.
//!
//! The [`Topology`] store owns four growable arrays (nodes, lines, areas and
//! isles) whose records reference one another only through integer ids, plus
//! one R-tree per primitive class and the category index. Index `0` of every
//! array is unused so that id `0` can mean "nothing".
//!
//! Lines are never removed: a deleted line stays in place with `alive` set to
//! `false`, which keeps every line id valid for the lifetime of the store and
//! lets the line be restored later. Nodes, areas and isles are rebuilt by the
//! maintenance engine and simply leave an empty slot when they disappear.

use topovec_rtree::{Dims, RTreeParams, Rect};

use crate::cidx::CategoryIndex;
use crate::error::{Error, Result};
use crate::keys::*;
use crate::spatial::SpatialIndex;

/// One line attached to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeLink {
    /// Signed line id: positive if the line starts here, negative if it ends here.
    pub line: LineId,
    /// Direction the line leaves the node in; `None` for degenerate lines
    /// whose vertices all coincide.
    pub angle: Option<f64>,
    pub kind: FeatureType,
}

/// A point where lines meet or a dangling line end.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Incident lines ordered by ascending angle, degenerate lines first.
    pub lines: Vec<NodeLink>,
}

impl NodeRecord {
    /// Position of the signed line in the angle-ordered list.
    pub fn position(&self, line: LineId) -> Option<usize> {
        self.lines.iter().position(|l| l.line == line)
    }
}

/// Per-type topology of a line record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineTopo {
    Point,
    Line {
        start: NodeId,
        end: NodeId,
    },
    Boundary {
        start: NodeId,
        end: NodeId,
        left: Face,
        right: Face,
    },
    Centroid {
        area: CentroidLink,
    },
}

impl LineTopo {
    /// Fresh topology for a primitive of `kind` between two nodes.
    pub(crate) fn detached(kind: FeatureType, start: NodeId, end: NodeId) -> Self {
        match kind {
            FeatureType::Point => LineTopo::Point,
            FeatureType::Line => LineTopo::Line { start, end },
            FeatureType::Boundary => LineTopo::Boundary {
                start,
                end,
                left: Face::None,
                right: Face::None,
            },
            FeatureType::Centroid => LineTopo::Centroid {
                area: CentroidLink::Outside,
            },
        }
    }

    /// Start and end node, for primitives that have them.
    pub fn nodes(&self) -> Option<(NodeId, NodeId)> {
        match *self {
            LineTopo::Line { start, end } | LineTopo::Boundary { start, end, .. } => {
                Some((start, end))
            }
            LineTopo::Point | LineTopo::Centroid { .. } => None,
        }
    }
}

/// A stored primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub kind: FeatureType,
    /// Where the backend keeps the geometry.
    pub offset: u64,
    pub bbox: Rect,
    pub alive: bool,
    pub topo: LineTopo,
}

impl LineRecord {
    /// The face on `side` of a boundary; `Face::None` for other primitives.
    pub fn face(&self, side: Side) -> Face {
        match (self.topo, side) {
            (LineTopo::Boundary { left, .. }, Side::Left) => left,
            (LineTopo::Boundary { right, .. }, Side::Right) => right,
            _ => Face::None,
        }
    }

    pub(crate) fn set_face(&mut self, side: Side, face: Face) {
        if let LineTopo::Boundary { left, right, .. } = &mut self.topo {
            match side {
                Side::Left => *left = face,
                Side::Right => *right = face,
            }
        }
    }

    /// Centroid attachment; `Outside` for other primitives.
    pub fn centroid_link(&self) -> CentroidLink {
        match self.topo {
            LineTopo::Centroid { area } => area,
            _ => CentroidLink::Outside,
        }
    }

    /// Planar position of a point or centroid.
    pub fn point_xy(&self) -> (f64, f64) {
        (self.bbox.min_x(), self.bbox.min_y())
    }
}

/// A closed region bounded by a ring of boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRecord {
    /// Outer ring: signed boundary ids walked in order, area on the right.
    pub boundaries: Vec<LineId>,
    /// Labeling centroid, `0` if none.
    pub centroid: LineId,
    pub isles: Vec<IsleId>,
    pub bbox: Rect,
}

/// A hole, bounded by a counter-clockwise ring of boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct IsleRecord {
    pub boundaries: Vec<LineId>,
    /// Enclosing area, `0` at the outermost level.
    pub area: AreaId,
    pub bbox: Rect,
}

/// Lines and nodes touched by the most recent edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateLog {
    pub lines: Vec<LineId>,
    pub nodes: Vec<NodeId>,
}

impl UpdateLog {
    pub fn clear(&mut self) {
        self.lines.clear();
        self.nodes.clear();
    }

    pub(crate) fn line(&mut self, line: LineId) {
        if !self.lines.contains(&line) {
            self.lines.push(line);
        }
    }

    pub(crate) fn node(&mut self, node: NodeId) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }
}

/// The topology store: records, spatial indexes and category index.
///
/// # Example
///
/// ```
/// use topovec_topology::{FeatureType, LineCats, LinePoints, Topology};
///
/// let mut topo = Topology::new(false);
/// let points = LinePoints::from_xy(&[(0.0, 0.0), (5.0, 0.0)]);
/// let line = topo.add_feature(FeatureType::Line, 0, &points, &LineCats::new()).unwrap();
///
/// assert_eq!(line, 1);
/// assert_eq!(topo.node_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Topology {
    pub(crate) with_z: bool,
    pub(crate) nodes: Vec<Option<NodeRecord>>,
    pub(crate) lines: Vec<Option<LineRecord>>,
    pub(crate) areas: Vec<Option<AreaRecord>>,
    pub(crate) isles: Vec<Option<IsleRecord>>,
    pub(crate) spatial: SpatialIndex,
    pub(crate) cidx: CategoryIndex,
    pub(crate) built: BuildLevel,
    pub(crate) update_cidx: bool,
    pub(crate) update_log: Option<UpdateLog>,
}

impl Topology {
    /// Creates an empty store with default index parameters.
    pub fn new(with_z: bool) -> Self {
        Self::with_params(with_z, RTreeParams::default())
    }

    /// Creates an empty store whose R-trees use `params`.
    pub fn with_params(with_z: bool, params: RTreeParams) -> Self {
        let dims = if with_z { Dims::Three } else { Dims::Two };
        Self {
            with_z,
            nodes: vec![None],
            lines: vec![None],
            areas: vec![None],
            isles: vec![None],
            spatial: SpatialIndex::new(dims, params),
            cidx: CategoryIndex::new(),
            built: BuildLevel::None,
            update_cidx: true,
            update_log: None,
        }
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    /// Highest build level reached.
    pub fn built(&self) -> BuildLevel {
        self.built
    }

    /// Marks an empty store as built up to `level`, so that edits maintain
    /// topology from the first write on.
    pub fn set_built(&mut self, level: BuildLevel) {
        self.built = level;
    }

    /// Enables or disables category index maintenance on edits.
    pub fn set_update_cidx(&mut self, on: bool) {
        self.update_cidx = on;
    }

    /// Starts (or stops) recording touched lines and nodes.
    pub fn set_update_log(&mut self, on: bool) {
        self.update_log = on.then(UpdateLog::default);
    }

    pub fn update_log(&self) -> Option<&UpdateLog> {
        self.update_log.as_ref()
    }

    pub fn clear_update_log(&mut self) {
        if let Some(log) = &mut self.update_log {
            log.clear();
        }
    }

    pub fn cidx(&self) -> &CategoryIndex {
        &self.cidx
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    // --- Nodes ---

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        slot(&self.nodes, id)
    }

    /// Number of node slots, including empty ones. Valid ids are `1..=this`.
    pub fn node_slots(&self) -> i32 {
        (self.nodes.len() - 1) as i32
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    // --- Lines ---

    /// Any line record, dead or alive.
    pub fn line_record(&self, id: LineId) -> Option<&LineRecord> {
        slot(&self.lines, id)
    }

    /// A live line record.
    pub fn line(&self, id: LineId) -> Option<&LineRecord> {
        self.line_record(id).filter(|l| l.alive)
    }

    /// A live line record, or an error naming why it is unavailable.
    pub fn live_line(&self, id: LineId) -> Result<&LineRecord> {
        let rec = self.line_record(id).ok_or(Error::UnknownLine(id))?;
        if !rec.alive {
            return Err(Error::DeadLine(id));
        }
        Ok(rec)
    }

    /// The line read from backend `offset`, dead or alive.
    pub fn line_at_offset(&self, offset: u64) -> Option<LineId> {
        self.lines
            .iter()
            .position(|l| l.as_ref().is_some_and(|l| l.offset == offset))
            .map(|i| i as LineId)
    }

    /// Number of line slots (dead ones included). Valid ids are `1..=this`.
    pub fn line_slots(&self) -> i32 {
        (self.lines.len() - 1) as i32
    }

    /// Number of live lines of `kind`.
    pub fn line_count(&self, kind: FeatureType) -> usize {
        self.lines
            .iter()
            .flatten()
            .filter(|l| l.alive && l.kind == kind)
            .count()
    }

    /// Number of live lines of any kind.
    pub fn live_line_count(&self) -> usize {
        self.lines.iter().flatten().filter(|l| l.alive).count()
    }

    /// Ids of live lines, ascending.
    pub fn live_lines(&self) -> impl Iterator<Item = LineId> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.as_ref().is_some_and(|l| l.alive))
            .map(|(i, _)| i as LineId)
    }

    // --- Areas ---

    pub fn area(&self, id: AreaId) -> Option<&AreaRecord> {
        slot(&self.areas, id)
    }

    pub fn area_slots(&self) -> i32 {
        (self.areas.len() - 1) as i32
    }

    pub fn area_count(&self) -> usize {
        self.areas.iter().flatten().count()
    }

    /// Ids of existing areas, ascending.
    pub fn area_ids(&self) -> impl Iterator<Item = AreaId> + '_ {
        ids(&self.areas)
    }

    // --- Isles ---

    pub fn isle(&self, id: IsleId) -> Option<&IsleRecord> {
        slot(&self.isles, id)
    }

    pub fn isle_slots(&self) -> i32 {
        (self.isles.len() - 1) as i32
    }

    pub fn isle_count(&self) -> usize {
        self.isles.iter().flatten().count()
    }

    pub fn isle_ids(&self) -> impl Iterator<Item = IsleId> + '_ {
        ids(&self.isles)
    }

    /// Box covering every live line.
    pub fn extent(&self) -> Rect {
        self.spatial.lines.extent()
    }

    // --- Mutable access for the engine ---

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        slot_mut(&mut self.nodes, id)
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> Option<&mut LineRecord> {
        slot_mut(&mut self.lines, id)
    }

    pub(crate) fn area_mut(&mut self, id: AreaId) -> Option<&mut AreaRecord> {
        slot_mut(&mut self.areas, id)
    }

    pub(crate) fn isle_mut(&mut self, id: IsleId) -> Option<&mut IsleRecord> {
        slot_mut(&mut self.isles, id)
    }

    /// Face on `side` of boundary `line` (absolute id).
    pub fn line_face(&self, line: LineId, side: Side) -> Face {
        self.line_record(line.abs())
            .map_or(Face::None, |l| l.face(side))
    }

    pub(crate) fn set_line_face(&mut self, line: LineId, side: Side, face: Face) {
        if let Some(rec) = self.line_mut(line.abs()) {
            rec.set_face(side, face);
        }
        if let Some(log) = &mut self.update_log {
            log.line(line.abs());
        }
    }

    pub(crate) fn set_centroid_link(&mut self, line: LineId, link: CentroidLink) {
        if let Some(LineRecord {
            topo: LineTopo::Centroid { area },
            ..
        }) = self.line_mut(line)
        {
            *area = link;
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(false)
    }
}

fn slot<T>(v: &[Option<T>], id: i32) -> Option<&T> {
    if id <= 0 {
        return None;
    }
    v.get(id as usize)?.as_ref()
}

fn slot_mut<T>(v: &mut [Option<T>], id: i32) -> Option<&mut T> {
    if id <= 0 {
        return None;
    }
    v.get_mut(id as usize)?.as_mut()
}

fn ids<T>(v: &[Option<T>]) -> impl Iterator<Item = i32> + '_ {
    v.iter()
        .enumerate()
        .filter(|(_, r)| r.is_some())
        .map(|(i, _)| i as i32)
}
