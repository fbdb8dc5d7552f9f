// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk sections: topology, spatial index and category index.
//!
//! Every section starts with the same fixed header:
//!
//! | bytes | field |
//! |---|---|
//! | 4 | magic |
//! | 1+1 | format version (major, minor) |
//! | 1+1 | oldest reader version able to parse it (major, minor) |
//! | 1 | byte-order flag (0 little, 1 big) |
//! | 4 | total header size, in the section byte order |
//!
//! Section-specific header fields follow; readers skip any header bytes
//! beyond the fields they know. The body is written in the flagged order.

use bytes::{Buf, BufMut};
use topovec_rtree::port::{ensure, get_u8};
use topovec_rtree::{ByteOrder, Dims, RTree, RTreeParams, Rect};

use crate::arena::*;
use crate::cidx::{CatEntry, CategoryIndex};
use crate::error::{Error, Result};
use crate::keys::*;
use crate::spatial::SpatialIndex;

pub const TOPO_MAGIC: [u8; 4] = *b"TVTP";
pub const SIDX_MAGIC: [u8; 4] = *b"TVSI";
pub const CIDX_MAGIC: [u8; 4] = *b"TVCI";

/// Size of the fixed header part shared by all sections.
pub const FIXED_HEADER_SIZE: u32 = 13;

/// Format version of a section and the oldest reader version it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionVersion {
    pub major: u8,
    pub minor: u8,
    pub back_major: u8,
    pub back_minor: u8,
}

impl SectionVersion {
    pub const fn new(major: u8, minor: u8, back_major: u8, back_minor: u8) -> Self {
        Self {
            major,
            minor,
            back_major,
            back_minor,
        }
    }

    /// `true` if a reader of version `self` can parse a section written as `stored`.
    pub fn can_read(&self, stored: &SectionVersion) -> bool {
        (stored.back_major, stored.back_minor) <= (self.major, self.minor)
    }
}

pub const TOPO_VERSION: SectionVersion = SectionVersion::new(1, 0, 1, 0);
pub const SIDX_VERSION: SectionVersion = SectionVersion::new(1, 0, 1, 0);
pub const CIDX_VERSION: SectionVersion = SectionVersion::new(1, 0, 1, 0);

/// Parsed fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub version: SectionVersion,
    pub byte_order: ByteOrder,
    pub size: u32,
}

/// Writes the fixed header; `extra` is the size of the section-specific
/// header fields the caller writes next.
pub fn write_section_header(
    buf: &mut impl BufMut,
    magic: [u8; 4],
    version: SectionVersion,
    order: ByteOrder,
    extra: u32,
) {
    buf.put_slice(&magic);
    buf.put_u8(version.major);
    buf.put_u8(version.minor);
    buf.put_u8(version.back_major);
    buf.put_u8(version.back_minor);
    buf.put_u8(order.flag());
    order.put_u32(buf, FIXED_HEADER_SIZE + extra);
}

/// Reads and checks the fixed header of section `section`.
pub fn read_section_header(
    buf: &mut impl Buf,
    section: &'static str,
    magic: [u8; 4],
    reader: SectionVersion,
) -> Result<SectionHeader> {
    let mut found = [0u8; 4];
    ensure(&*buf, found.len()).map_err(|_| Error::BadMagic { section })?;
    buf.copy_to_slice(&mut found);
    if found != magic {
        return Err(Error::BadMagic { section });
    }

    let version = SectionVersion::new(get_u8(buf)?, get_u8(buf)?, get_u8(buf)?, get_u8(buf)?);
    if !reader.can_read(&version) {
        return Err(Error::VersionTooNew {
            section,
            major: version.major,
            minor: version.minor,
        });
    }
    let byte_order = ByteOrder::from_flag(get_u8(buf)?)?;
    let size = byte_order.get_u32(buf)?;
    if size < FIXED_HEADER_SIZE {
        return Err(Error::Corrupt {
            section,
            reason: format!("header size {size}"),
        });
    }
    Ok(SectionHeader {
        version,
        byte_order,
        size,
    })
}

/// Skips header bytes a newer writer added beyond `known` bytes.
fn skip_header_rest(buf: &mut impl Buf, header: &SectionHeader, known: u32) -> Result<()> {
    let rest = header.size.saturating_sub(known) as usize;
    ensure(&*buf, rest)?;
    buf.advance(rest);
    Ok(())
}

// =============================================================================
// Topology section
// =============================================================================

/// Topology-specific header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopoHeader {
    pub with_z: bool,
    pub level: BuildLevel,
    /// Coordinate section size the topology was built from.
    pub coor_size: u64,
    /// Coordinate section modification time (seconds since the epoch).
    pub coor_mtime: i64,
}

const TOPO_EXTRA: u32 = 1 + 1 + 8 + 8;

/// Reads only the topology header, for staleness checks.
pub fn read_topo_header(bytes: &[u8]) -> Result<TopoHeader> {
    let mut buf = bytes;
    read_topo_header_from(&mut buf).map(|(_, h)| h)
}

fn read_topo_header_from(buf: &mut &[u8]) -> Result<(ByteOrder, TopoHeader)> {
    let header = read_section_header(buf, "topo", TOPO_MAGIC, TOPO_VERSION)?;
    let order = header.byte_order;
    let with_z = get_u8(buf)? != 0;
    let level = BuildLevel::from_code(get_u8(buf)?).ok_or_else(|| corrupt("topo", "build level"))?;
    let coor_size = order.get_u64(buf)?;
    let coor_mtime = order.get_i64(buf)?;
    skip_header_rest(buf, &header, FIXED_HEADER_SIZE + TOPO_EXTRA)?;
    Ok((
        order,
        TopoHeader {
            with_z,
            level,
            coor_size,
            coor_mtime,
        },
    ))
}

fn corrupt(section: &'static str, reason: &str) -> Error {
    Error::Corrupt {
        section,
        reason: reason.to_string(),
    }
}

fn put_rect(buf: &mut impl BufMut, order: ByteOrder, rect: &Rect) {
    for v in rect.min.iter().chain(rect.max.iter()) {
        order.put_f64(buf, *v);
    }
}

fn get_rect(buf: &mut impl Buf, order: ByteOrder) -> Result<Rect> {
    let mut rect = Rect::empty();
    for v in rect.min.iter_mut().chain(rect.max.iter_mut()) {
        *v = order.get_f64(buf)?;
    }
    Ok(rect)
}

fn put_ids(buf: &mut impl BufMut, order: ByteOrder, ids: &[i32]) {
    order.put_u32(buf, ids.len() as u32);
    for &id in ids {
        order.put_i32(buf, id);
    }
}

fn get_ids(buf: &mut impl Buf, order: ByteOrder) -> Result<Vec<i32>> {
    let n = order.get_u32(buf)? as usize;
    ensure(&*buf, n * 4)?;
    (0..n).map(|_| Ok(order.get_i32(buf)?)).collect()
}

/// Reads `count` optional slots with `read`, prefixed by a presence byte.
fn get_slots<T>(
    buf: &mut &[u8],
    order: ByteOrder,
    mut read: impl FnMut(&mut &[u8], ByteOrder) -> Result<T>,
) -> Result<Vec<Option<T>>> {
    let count = order.get_u32(buf)? as usize;
    let mut slots = Vec::with_capacity(count.min(buf.len()) + 1);
    slots.push(None);
    for _ in 0..count {
        slots.push(match get_u8(buf)? {
            0 => None,
            _ => Some(read(buf, order)?),
        });
    }
    Ok(slots)
}

fn put_slots<T>(
    buf: &mut Vec<u8>,
    order: ByteOrder,
    slots: &[Option<T>],
    mut write: impl FnMut(&mut Vec<u8>, ByteOrder, &T),
) {
    order.put_u32(buf, (slots.len() - 1) as u32);
    for slot in &slots[1..] {
        match slot {
            None => buf.put_u8(0),
            Some(rec) => {
                buf.put_u8(1);
                write(buf, order, rec);
            }
        }
    }
}

impl Topology {
    /// Encodes nodes, lines, areas and isles with the given header.
    pub fn encode_topo(&self, coor_size: u64, coor_mtime: i64, order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::new();
        write_section_header(&mut buf, TOPO_MAGIC, TOPO_VERSION, order, TOPO_EXTRA);
        buf.put_u8(self.with_z as u8);
        buf.put_u8(self.built.code());
        order.put_u64(&mut buf, coor_size);
        order.put_i64(&mut buf, coor_mtime);

        put_slots(&mut buf, order, &self.nodes, |buf, order, node| {
            order.put_f64(buf, node.x);
            order.put_f64(buf, node.y);
            order.put_f64(buf, node.z);
            order.put_u32(buf, node.lines.len() as u32);
            for link in &node.lines {
                order.put_i32(buf, link.line);
                buf.put_u8(link.kind.code());
                match link.angle {
                    Some(angle) => {
                        buf.put_u8(1);
                        order.put_f64(buf, angle);
                    }
                    None => buf.put_u8(0),
                }
            }
        });

        put_slots(&mut buf, order, &self.lines, |buf, order, line| {
            buf.put_u8(line.kind.code());
            buf.put_u8(line.alive as u8);
            order.put_u64(buf, line.offset);
            put_rect(buf, order, &line.bbox);
            match line.topo {
                LineTopo::Point => {}
                LineTopo::Line { start, end } => {
                    order.put_i32(buf, start);
                    order.put_i32(buf, end);
                }
                LineTopo::Boundary {
                    start,
                    end,
                    left,
                    right,
                } => {
                    order.put_i32(buf, start);
                    order.put_i32(buf, end);
                    order.put_i32(buf, left.to_signed());
                    order.put_i32(buf, right.to_signed());
                }
                LineTopo::Centroid { area } => order.put_i32(buf, area.to_signed()),
            }
        });

        put_slots(&mut buf, order, &self.areas, |buf, order, area| {
            put_ids(buf, order, &area.boundaries);
            order.put_i32(buf, area.centroid);
            put_ids(buf, order, &area.isles);
            put_rect(buf, order, &area.bbox);
        });

        put_slots(&mut buf, order, &self.isles, |buf, order, isle| {
            put_ids(buf, order, &isle.boundaries);
            order.put_i32(buf, isle.area);
            put_rect(buf, order, &isle.bbox);
        });
        buf
    }

    /// Decodes a topology section. Spatial and category indexes start empty;
    /// install them with [`Topology::set_spatial_index`] /
    /// [`Topology::set_category_index`] or rebuild them.
    pub fn decode_topo(bytes: &[u8], params: RTreeParams) -> Result<(Topology, TopoHeader)> {
        let mut buf = bytes;
        let (order, header) = read_topo_header_from(&mut buf)?;
        let mut topo = Topology::with_params(header.with_z, params);
        topo.built = header.level;

        topo.nodes = get_slots(&mut buf, order, |buf, order| {
            let (x, y, z) = (order.get_f64(buf)?, order.get_f64(buf)?, order.get_f64(buf)?);
            let n = order.get_u32(buf)? as usize;
            let mut lines = Vec::with_capacity(n.min(buf.len()));
            for _ in 0..n {
                let line = order.get_i32(buf)?;
                let kind = FeatureType::from_code(get_u8(buf)?)
                    .ok_or_else(|| corrupt("topo", "node line type"))?;
                let angle = match get_u8(buf)? {
                    0 => None,
                    _ => Some(order.get_f64(buf)?),
                };
                lines.push(NodeLink { line, angle, kind });
            }
            Ok(NodeRecord { x, y, z, lines })
        })?;

        topo.lines = get_slots(&mut buf, order, |buf, order| {
            let kind =
                FeatureType::from_code(get_u8(buf)?).ok_or_else(|| corrupt("topo", "line type"))?;
            let alive = get_u8(buf)? != 0;
            let offset = order.get_u64(buf)?;
            let bbox = get_rect(buf, order)?;
            let topo = match kind {
                FeatureType::Point => LineTopo::Point,
                FeatureType::Line => LineTopo::Line {
                    start: order.get_i32(buf)?,
                    end: order.get_i32(buf)?,
                },
                FeatureType::Boundary => LineTopo::Boundary {
                    start: order.get_i32(buf)?,
                    end: order.get_i32(buf)?,
                    left: Face::from_signed(order.get_i32(buf)?),
                    right: Face::from_signed(order.get_i32(buf)?),
                },
                FeatureType::Centroid => LineTopo::Centroid {
                    area: CentroidLink::from_signed(order.get_i32(buf)?),
                },
            };
            Ok(LineRecord {
                kind,
                offset,
                bbox,
                alive,
                topo,
            })
        })?;

        topo.areas = get_slots(&mut buf, order, |buf, order| {
            Ok(AreaRecord {
                boundaries: get_ids(buf, order)?,
                centroid: order.get_i32(buf)?,
                isles: get_ids(buf, order)?,
                bbox: get_rect(buf, order)?,
            })
        })?;

        topo.isles = get_slots(&mut buf, order, |buf, order| {
            Ok(IsleRecord {
                boundaries: get_ids(buf, order)?,
                area: order.get_i32(buf)?,
                bbox: get_rect(buf, order)?,
            })
        })?;

        if buf.has_remaining() {
            return Err(corrupt("topo", "trailing bytes"));
        }
        tracing::debug!(
            nodes = topo.node_count(),
            lines = topo.line_slots(),
            areas = topo.area_count(),
            isles = topo.isle_count(),
            "Decoded topology"
        );
        Ok((topo, header))
    }

    /// Encodes the four spatial indexes.
    pub fn encode_sidx(&self, order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::new();
        write_section_header(&mut buf, SIDX_MAGIC, SIDX_VERSION, order, 0);
        for class in [
            PrimitiveClass::Node,
            PrimitiveClass::Line,
            PrimitiveClass::Area,
            PrimitiveClass::Isle,
        ] {
            self.spatial.tree(class).write_to(&mut buf, order);
        }
        buf
    }

    /// Encodes the category index.
    pub fn encode_cidx(&self, order: ByteOrder) -> Vec<u8> {
        let mut buf = Vec::new();
        write_section_header(&mut buf, CIDX_MAGIC, CIDX_VERSION, order, 0);
        let entries = self.cidx.entries();
        order.put_u32(&mut buf, entries.len() as u32);
        for e in entries {
            order.put_i32(&mut buf, e.layer);
            order.put_i32(&mut buf, e.cat);
            buf.put_u8(e.kind.code());
            order.put_i32(&mut buf, e.id);
        }
        buf
    }

    /// Installs a decoded category index.
    pub fn set_category_index(&mut self, cidx: CategoryIndex) {
        self.cidx = cidx;
    }

    /// Rebuilds the category index from every live primitive and labeled area.
    pub fn rebuild_category_index<S: crate::source::GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<()> {
        let mut points = crate::geometry::LinePoints::new();
        let mut cats = crate::geometry::LineCats::new();
        let mut entries = Vec::new();
        let lines: Vec<(LineId, u64, FeatureType)> = self
            .live_lines()
            .filter_map(|l| self.line(l).map(|r| (l, r.offset, r.kind)))
            .collect();
        for (id, offset, kind) in lines {
            source.read_at(offset, &mut points, &mut cats)?;
            let link = self.line(id).map(|r| r.centroid_link());
            for (layer, cat) in cats.iter() {
                entries.push(CatEntry {
                    layer,
                    cat,
                    kind: kind.into(),
                    id,
                });
                if let Some(CentroidLink::Attached(area)) = link {
                    entries.push(CatEntry {
                        layer,
                        cat,
                        kind: CatKind::Area,
                        id: area,
                    });
                }
            }
        }
        self.cidx = CategoryIndex::from_entries(entries);
        tracing::debug!(entries = self.cidx.len(), "Rebuilt category index");
        Ok(())
    }
}

/// Decodes a spatial index section and checks it against the store's
/// dimensionality.
pub fn decode_sidx(bytes: &[u8], dims: Dims) -> Result<SpatialIndex> {
    let mut buf = bytes;
    let header = read_section_header(&mut buf, "sidx", SIDX_MAGIC, SIDX_VERSION)?;
    skip_header_rest(&mut buf, &header, FIXED_HEADER_SIZE)?;
    let order = header.byte_order;
    let mut trees = Vec::with_capacity(4);
    for _ in 0..4 {
        let tree = RTree::read_from(&mut buf, order)?;
        if tree.dims() != dims {
            return Err(corrupt("sidx", "dimensionality differs from topology"));
        }
        trees.push(tree);
    }
    if buf.has_remaining() {
        return Err(corrupt("sidx", "trailing bytes"));
    }
    let mut trees = trees.into_iter();
    match (trees.next(), trees.next(), trees.next(), trees.next()) {
        (Some(nodes), Some(lines), Some(areas), Some(isles)) => {
            Ok(SpatialIndex::from_trees(nodes, lines, areas, isles))
        }
        _ => Err(corrupt("sidx", "missing tree")),
    }
}

/// Decodes a category index section.
pub fn decode_cidx(bytes: &[u8]) -> Result<CategoryIndex> {
    let mut buf = bytes;
    let header = read_section_header(&mut buf, "cidx", CIDX_MAGIC, CIDX_VERSION)?;
    skip_header_rest(&mut buf, &header, FIXED_HEADER_SIZE)?;
    let order = header.byte_order;
    let count = order.get_u32(&mut buf)? as usize;
    ensure(&buf, count * 13)?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let layer = order.get_i32(&mut buf)?;
        let cat = order.get_i32(&mut buf)?;
        let kind =
            CatKind::from_code(get_u8(&mut buf)?).ok_or_else(|| corrupt("cidx", "entry type"))?;
        let id = order.get_i32(&mut buf)?;
        entries.push(CatEntry { layer, cat, kind, id });
    }
    Ok(CategoryIndex::from_entries(entries))
}
