// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology schema in a SQLite database.
//!
//! The schema follows the usual node / edge / face layout:
//!
//! - `node`: coordinates and `containing_face`. Nodes no edge touches are
//!   primitives of their own: points when `containing_face` is `NULL`,
//!   centroids otherwise (`0` when outside every face).
//! - `edge_data`: WKT line geometry, start and end node, the faces on each
//!   side and the next edge around each of them. An edge touching no face is
//!   a line, any other edge a boundary.
//! - `face`: one row per area plus the universe face `0`.
//! - `element_cat`: `(layer, cat)` pairs of nodes (type 1) and edges (type 2).
//!
//! Faces walk their rings with the face on the left of each edge, which is
//! the reverse of the in-memory convention, so rings read from the database
//! are reversed with flipped signs before they become areas and isles. Sides
//! no stored ring covers are built by walking the edges. Faces, edge faces
//! and next-edge links are rewritten from memory on close.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use topovec_topology::serialization::canonical_ring;
use topovec_topology::{
    CentroidLink, Face, FeatureType, GeometrySource, LineCats, LineId, LinePoints, Side, Topology,
};
use wkt::{ToWkt, TryFromWkt};

use crate::error::{Error, Result};

const BACKEND: &str = "topodb";
const NODE_ELEMENT: i64 = 1;
const EDGE_ELEMENT: i64 = 2;

/// Tables and the universe face of a new topology database.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS node (
    node_id INTEGER PRIMARY KEY,
    containing_face INTEGER,
    x REAL NOT NULL,
    y REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS edge_data (
    edge_id INTEGER PRIMARY KEY,
    start_node INTEGER NOT NULL,
    end_node INTEGER NOT NULL,
    next_left_edge INTEGER NOT NULL DEFAULT 0,
    next_right_edge INTEGER NOT NULL DEFAULT 0,
    left_face INTEGER NOT NULL DEFAULT 0,
    right_face INTEGER NOT NULL DEFAULT 0,
    geom TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS face (
    face_id INTEGER PRIMARY KEY,
    min_x REAL,
    min_y REAL,
    max_x REAL,
    max_y REAL
);
CREATE TABLE IF NOT EXISTS element_cat (
    element_type INTEGER NOT NULL,
    element_id INTEGER NOT NULL,
    layer INTEGER NOT NULL,
    cat INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS element_cat_element ON element_cat (element_type, element_id);
INSERT OR IGNORE INTO face (face_id) VALUES (0);
";

/// Creates the topology tables if they are missing.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Node(i64),
    Edge { id: i64, start: i64, end: i64 },
}

#[derive(Debug, Clone)]
struct Primitive {
    kind: FeatureType,
    points: LinePoints,
    cats: LineCats,
    alive: bool,
    element: Element,
}

#[derive(Debug, Clone, Copy)]
struct EdgeLinks {
    id: i64,
    left_face: i64,
    right_face: i64,
    next_left: i64,
    next_right: i64,
}

/// Outcome of comparing stored faces with rebuilt areas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaceCheck {
    pub faces: usize,
    pub matched: usize,
}

#[derive(Debug)]
pub struct TopoDbBackend {
    path: PathBuf,
    conn: Connection,
    writable: bool,
    prims: Vec<Primitive>,
    /// Stored face rings as signed edge ids, face on the left.
    face_rings: HashMap<i64, Vec<Vec<i64>>>,
}

impl TopoDbBackend {
    /// Creates a database with an empty topology schema; fails if it exists.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            writable: true,
            prims: Vec::new(),
            face_rings: HashMap::new(),
        })
    }

    /// Opens an existing database and reads its topology into primitives.
    /// Fails if the schema is missing or references are broken.
    pub fn open(path: &Path, writable: bool) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let flags = if writable {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        };
        let conn = Connection::open_with_flags(path, flags)?;
        let mut backend = Self {
            path: path.to_path_buf(),
            conn,
            writable,
            prims: Vec::new(),
            face_rings: HashMap::new(),
        };
        backend.check_schema()?;
        backend.load()?;
        Ok(backend)
    }

    fn check_schema(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('node', 'edge_data', 'face', 'element_cat')",
            [],
            |row| row.get(0),
        )?;
        if tables != 4 {
            return Err(Error::Backend(BACKEND, "missing topology schema".into()));
        }
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let mut nodes: HashMap<i64, (Option<i64>, f64, f64)> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT node_id, containing_face, x, y FROM node ORDER BY node_id")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
            })?;
            for row in rows {
                let (id, node) = row?;
                nodes.insert(id, node);
            }
        }

        let mut cats: HashMap<(i64, i64), LineCats> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT element_type, element_id, layer, cat FROM element_cat ORDER BY rowid",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, i32>(3)?,
                ))
            })?;
            for row in rows {
                let (element_type, id, layer, cat) = row?;
                cats.entry((element_type, id)).or_default().add(layer, cat);
            }
        }

        let mut links = Vec::new();
        let mut endpoints = HashSet::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT edge_id, start_node, end_node, left_face, right_face,
                        next_left_edge, next_right_edge, geom
                 FROM edge_data ORDER BY edge_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    EdgeLinks {
                        id: row.get(0)?,
                        left_face: row.get(3)?,
                        right_face: row.get(4)?,
                        next_left: row.get(5)?,
                        next_right: row.get(6)?,
                    },
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(7)?,
                ))
            })?;
            for row in rows {
                let (edge, start, end, geom) = row?;
                endpoints.insert(start);
                endpoints.insert(end);
                if let Some(node) = [start, end].into_iter().find(|n| !nodes.contains_key(n)) {
                    tracing::warn!(edge = edge.id, node, "Skipping edge with missing node");
                    continue;
                }
                let points = match parse_line(&geom) {
                    Ok(points) => points,
                    Err(e) => {
                        tracing::warn!(
                            edge = edge.id,
                            error = %e,
                            "Skipping edge with bad geometry"
                        );
                        continue;
                    }
                };
                let kind = if edge.left_face == 0 && edge.right_face == 0 {
                    FeatureType::Line
                } else {
                    FeatureType::Boundary
                };
                self.prims.push(Primitive {
                    kind,
                    points,
                    cats: cats.remove(&(EDGE_ELEMENT, edge.id)).unwrap_or_default(),
                    alive: true,
                    element: Element::Edge { id: edge.id, start, end },
                });
                links.push(edge);
            }
        }

        let mut isolated: Vec<(i64, (Option<i64>, f64, f64))> = nodes
            .into_iter()
            .filter(|(id, _)| !endpoints.contains(id))
            .collect();
        isolated.sort_by_key(|(id, _)| *id);
        for (id, (containing_face, x, y)) in isolated {
            let mut points = LinePoints::new();
            points.push(x, y, 0.0);
            self.prims.push(Primitive {
                kind: if containing_face.is_some() {
                    FeatureType::Centroid
                } else {
                    FeatureType::Point
                },
                points,
                cats: cats.remove(&(NODE_ELEMENT, id)).unwrap_or_default(),
                alive: true,
                element: Element::Node(id),
            });
        }

        self.face_rings = face_rings(&links);
        tracing::info!(
            path = %self.path.display(),
            edges = links.len(),
            primitives = self.prims.len(),
            faces = self.face_rings.len(),
            "Opened topology database"
        );
        Ok(())
    }

    pub fn append(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<u64> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        // Stored faces stop describing the edges once they change.
        self.face_rings.clear();
        let element = if kind.is_point_like() {
            let p = points
                .first()
                .ok_or_else(|| Error::Backend(BACKEND, "point without coordinates".into()))?;
            let containing_face = (kind == FeatureType::Centroid).then_some(0i64);
            self.conn.execute(
                "INSERT INTO node (containing_face, x, y) VALUES (?1, ?2, ?3)",
                params![containing_face, p.x, p.y],
            )?;
            Element::Node(self.conn.last_insert_rowid())
        } else {
            let (Some(first), Some(last)) = (points.first(), points.last()) else {
                return Err(Error::Backend(BACKEND, "edge without coordinates".into()));
            };
            let start = self.endpoint_node(first.x, first.y)?;
            let end = if (first.x, first.y) == (last.x, last.y) {
                start
            } else {
                self.endpoint_node(last.x, last.y)?
            };
            self.conn.execute(
                "INSERT INTO edge_data (start_node, end_node, geom) VALUES (?1, ?2, ?3)",
                params![start, end, line_wkt(points)],
            )?;
            Element::Edge {
                id: self.conn.last_insert_rowid(),
                start,
                end,
            }
        };
        self.insert_cats(element, cats)?;

        let mut stored = points.clone();
        if stored.iter().any(|p| p.z != 0.0) {
            tracing::debug!("Dropping z values, topology databases are planar");
            let flat: Vec<(f64, f64)> = stored.iter().map(|p| (p.x, p.y)).collect();
            stored = LinePoints::from_xy(&flat);
        }
        self.prims.push(Primitive {
            kind,
            points: stored,
            cats: cats.clone(),
            alive: true,
            element,
        });
        Ok((self.prims.len() - 1) as u64)
    }

    /// Node shared with existing edges at `(x, y)`, or a new one.
    fn endpoint_node(&self, x: f64, y: f64) -> Result<i64> {
        let existing = self
            .prims
            .iter()
            .filter(|p| p.alive)
            .find_map(|p| match p.element {
                Element::Edge { start, end, .. } => {
                    let first = p.points.first()?;
                    let last = p.points.last()?;
                    if first.x == x && first.y == y {
                        Some(start)
                    } else if last.x == x && last.y == y {
                        Some(end)
                    } else {
                        None
                    }
                }
                Element::Node(_) => None,
            });
        if let Some(node) = existing {
            return Ok(node);
        }
        self.conn.execute(
            "INSERT INTO node (containing_face, x, y) VALUES (NULL, ?1, ?2)",
            params![x, y],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_cats(&self, element: Element, cats: &LineCats) -> Result<()> {
        let (element_type, id) = element_key(element);
        let mut stmt = self.conn.prepare(
            "INSERT INTO element_cat (element_type, element_id, layer, cat) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (layer, cat) in cats.iter() {
            stmt.execute(params![element_type, id, layer, cat])?;
        }
        Ok(())
    }

    /// Deleting removes the rows; restoring inserts them again under the
    /// same ids.
    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let prim = self
            .prims
            .get(offset as usize)
            .ok_or_else(|| Error::Backend(BACKEND, format!("no primitive at offset {offset}")))?;
        if prim.alive == alive {
            return Ok(());
        }
        self.face_rings.clear();
        let (kind, element) = (prim.kind, prim.element);
        let (element_type, id) = element_key(element);

        if alive {
            match element {
                Element::Node(id) => {
                    let p = prim
                        .points
                        .first()
                        .ok_or_else(|| {
                            Error::Backend(BACKEND, "point without coordinates".into())
                        })?;
                    let containing_face = (kind == FeatureType::Centroid).then_some(0i64);
                    self.conn.execute(
                        "INSERT INTO node (node_id, containing_face, x, y) VALUES (?1, ?2, ?3, ?4)",
                        params![id, containing_face, p.x, p.y],
                    )?;
                }
                Element::Edge { id, start, end } => {
                    self.conn.execute(
                        "INSERT INTO edge_data (edge_id, start_node, end_node, geom) \
                         VALUES (?1, ?2, ?3, ?4)",
                        params![id, start, end, line_wkt(&prim.points)],
                    )?;
                }
            }
            let cats = prim.cats.clone();
            self.insert_cats(element, &cats)?;
        } else {
            match element {
                Element::Node(id) => {
                    self.conn.execute("DELETE FROM node WHERE node_id = ?1", [id])?
                }
                Element::Edge { id, .. } => {
                    self.conn.execute("DELETE FROM edge_data WHERE edge_id = ?1", [id])?
                }
            };
            self.conn.execute(
                "DELETE FROM element_cat WHERE element_type = ?1 AND element_id = ?2",
                [element_type, id],
            )?;
        }
        if let Some(prim) = self.prims.get_mut(offset as usize) {
            prim.alive = alive;
        }
        Ok(())
    }

    pub fn next_live(&self, after: Option<u64>) -> Option<u64> {
        let start = after.map_or(0, |o| o as usize + 1);
        self.prims
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, p)| p.alive)
            .map(|(i, _)| i as u64)
    }

    pub fn read(
        &self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType> {
        let prim = self
            .prims
            .get(offset as usize)
            .ok_or_else(|| Error::Backend(BACKEND, format!("no primitive at offset {offset}")))?;
        points.clone_from(&prim.points);
        cats.clone_from(&prim.cats);
        Ok(prim.kind)
    }

    /// Edge id of the primitive a line record points at.
    fn edge_of(&self, topo: &Topology, line: LineId) -> Option<i64> {
        let offset = topo.line_record(line.abs())?.offset;
        match self.prims.get(offset as usize)?.element {
            Element::Edge { id, .. } => Some(if line < 0 { -id } else { id }),
            Element::Node(_) => None,
        }
    }

    /// Live lines of `topo` keyed by the edge they were read from.
    fn lines_by_edge(&self, topo: &Topology) -> HashMap<i64, LineId> {
        topo.live_lines()
            .filter_map(|l| Some((self.edge_of(topo, l)?, l)))
            .collect()
    }

    /// Stored face rings turned into boundary rings: reversed, with signs
    /// flipped. Rings naming an edge that did not load are left out.
    pub fn stored_rings(&self, topo: &Topology) -> Vec<(i64, Vec<LineId>)> {
        let lines = self.lines_by_edge(topo);
        let mut faces: Vec<(&i64, &Vec<Vec<i64>>)> = self.face_rings.iter().collect();
        faces.sort_unstable_by_key(|(face, _)| **face);

        let mut out = Vec::new();
        for (&face, rings) in faces {
            for ring in rings {
                match boundary_ring(ring, &lines) {
                    Some(ring) => out.push((face, ring)),
                    None => tracing::warn!(face, "Stored face ring names an unknown edge"),
                }
            }
        }
        out
    }

    /// Compares the stored face rings with the rings of `topo`'s areas and
    /// isles, logging faces that no longer match.
    pub fn check_faces(&self, topo: &Topology) -> FaceCheck {
        let lines = self.lines_by_edge(topo);
        let known: HashSet<Vec<LineId>> = topo
            .area_ids()
            .filter_map(|a| topo.area_boundaries(a).map(canonical_ring))
            .chain(topo.isle_ids().filter_map(|i| topo.isle_boundaries(i).map(canonical_ring)))
            .collect();

        let mut check = FaceCheck {
            faces: self.face_rings.len(),
            matched: 0,
        };
        for (face, rings) in &self.face_rings {
            let matched = rings.iter().all(|ring| {
                boundary_ring(ring, &lines).is_some_and(|r| known.contains(&canonical_ring(&r)))
            });
            if matched {
                check.matched += 1;
            } else {
                tracing::warn!(face, "Stored face does not match rebuilt topology");
            }
        }
        check
    }

    /// Writes faces, edge faces, next-edge links and centroid faces from
    /// `topo`, and drops endpoint nodes no edge uses any more.
    pub fn save(&mut self, topo: Option<&Topology>) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        let Some(topo) = topo else {
            return Ok(());
        };

        let mut edges = Vec::new();
        let mut centroids = Vec::new();
        let mut points = HashSet::new();
        for line in topo.live_lines() {
            let Some(rec) = topo.line(line) else {
                continue;
            };
            let Some(prim) = self.prims.get(rec.offset as usize) else {
                continue;
            };
            match (rec.kind, prim.element) {
                (FeatureType::Point, Element::Node(id)) => {
                    points.insert(id);
                }
                (FeatureType::Centroid, Element::Node(id)) => {
                    let face = match rec.centroid_link() {
                        CentroidLink::Attached(a) | CentroidLink::Duplicate(a) => a as i64,
                        CentroidLink::Outside => 0,
                    };
                    points.insert(id);
                    centroids.push((id, face));
                }
                (kind, Element::Edge { id, .. }) => {
                    let filter = (kind == FeatureType::Boundary).then_some(FeatureType::Boundary);
                    let (left, right) = if kind == FeatureType::Boundary {
                        (face_id(topo, rec.face(Side::Left)), face_id(topo, rec.face(Side::Right)))
                    } else {
                        (0, 0)
                    };
                    let next = |signed: LineId| {
                        topo.angle_next_line(signed, Side::Left, filter)
                            .and_then(|n| self.edge_of(topo, n))
                            .unwrap_or(0)
                    };
                    edges.push((id, left, right, next(-line), next(line)));
                }
                _ => {}
            }
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM face WHERE face_id <> 0", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO face (face_id, min_x, min_y, max_x, max_y) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for area in topo.area_ids() {
                if let Some(rec) = topo.area(area) {
                    let b = rec.bbox;
                    insert.execute(params![
                        area as i64,
                        b.min_x(),
                        b.min_y(),
                        b.max_x(),
                        b.max_y()
                    ])?;
                }
            }

            let mut update = tx.prepare(
                "UPDATE edge_data SET left_face = ?2, right_face = ?3,
                        next_left_edge = ?4, next_right_edge = ?5
                 WHERE edge_id = ?1",
            )?;
            for (id, left, right, next_left, next_right) in &edges {
                update.execute(params![id, left, right, next_left, next_right])?;
            }

            let mut label = tx.prepare("UPDATE node SET containing_face = ?2 WHERE node_id = ?1")?;
            for (id, face) in &centroids {
                label.execute(params![id, face])?;
            }

            let mut orphans = tx.prepare(
                "SELECT node_id FROM node WHERE containing_face IS NULL
                 AND node_id NOT IN (SELECT start_node FROM edge_data)
                 AND node_id NOT IN (SELECT end_node FROM edge_data)",
            )?;
            let unused: Vec<i64> = orphans
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?
                .into_iter()
                .filter(|id| !points.contains(id))
                .collect();
            for id in &unused {
                tx.execute("DELETE FROM node WHERE node_id = ?1", [id])?;
            }
        }
        tx.commit()?;

        tracing::info!(
            path = %self.path.display(),
            faces = topo.area_count(),
            edges = edges.len(),
            "Wrote topology database"
        );
        Ok(())
    }
}

impl GeometrySource for TopoDbBackend {
    fn read_at(
        &mut self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> topovec_topology::Result<FeatureType> {
        self.read(offset, points, cats)
            .map_err(|e| topovec_topology::Error::Source(e.to_string()))
    }
}

fn element_key(element: Element) -> (i64, i64) {
    match element {
        Element::Node(id) => (NODE_ELEMENT, id),
        Element::Edge { id, .. } => (EDGE_ELEMENT, id),
    }
}

/// Database face of a boundary side: isles belong to their enclosing area.
fn face_id(topo: &Topology, face: Face) -> i64 {
    match face {
        Face::Area(a) => a as i64,
        Face::Isle(i) => topo.isle_area(i).unwrap_or(0) as i64,
        Face::None => 0,
    }
}

/// A face ring (face on the left) as a boundary ring (face on the right).
fn boundary_ring(ring: &[i64], lines: &HashMap<i64, LineId>) -> Option<Vec<LineId>> {
    ring.iter()
        .rev()
        .map(|e| lines.get(&e.abs()).map(|&l| if *e > 0 { -l } else { l }))
        .collect()
}

fn parse_line(text: &str) -> Result<LinePoints> {
    let line = geo_types::LineString::<f64>::try_from_wkt_str(text)
        .map_err(|e| Error::Wkt(e.to_string()))?;
    let coords: Vec<(f64, f64)> = line.coords().map(|c| (c.x, c.y)).collect();
    Ok(LinePoints::from_xy(&coords))
}

fn line_wkt(points: &LinePoints) -> String {
    let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
    geo_types::LineString::from(coords).wkt_string()
}

/// Rings of every bounded face, following next-edge links with the face on
/// the left. Rings that do not close are dropped.
fn face_rings(edges: &[EdgeLinks]) -> HashMap<i64, Vec<Vec<i64>>> {
    let by_id: HashMap<i64, &EdgeLinks> = edges.iter().map(|e| (e.id, e)).collect();
    let mut visited = HashSet::new();
    let mut rings: HashMap<i64, Vec<Vec<i64>>> = HashMap::new();

    for edge in edges {
        for (first, face) in [(edge.id, edge.left_face), (-edge.id, edge.right_face)] {
            if face == 0 || visited.contains(&first) {
                continue;
            }
            let mut ring = Vec::new();
            let mut current = first;
            let closed = loop {
                if !visited.insert(current) || ring.len() > edges.len() * 2 {
                    break false;
                }
                ring.push(current);
                let Some(links) = by_id.get(&current.abs()) else {
                    break false;
                };
                let next = if current > 0 {
                    links.next_left
                } else {
                    links.next_right
                };
                if next == first {
                    break true;
                }
                current = next;
            };
            if closed {
                rings.entry(face).or_default().push(ring);
            } else {
                tracing::warn!(face, edge = first, "Stored face ring does not close");
            }
        }
    }
    rings
}
