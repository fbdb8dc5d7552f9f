// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The map handle: a backend, its topology and the read cursor.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use topovec_rtree::Rect;
use topovec_topology::construction::validate;
use topovec_topology::{
    AreaId, BuildLevel, BuildReport, CatEntry, CategoryIndex, FeatureType, LineCats, LineId,
    LinePoints, MaintenanceReport, PrimitiveClass, Topology, TopologySummary, UpdateLog,
};

use crate::backend::{Appended, Backend, TopologyLoad};
use crate::config::MapConfig;
use crate::constraints::{Constraints, TypeMask};
use crate::error::{Error, Result};
use crate::format::{Format, MapHead, HEAD_FILE};
use crate::lock::MapLock;

/// How a map is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    /// Metadata only; no feature access.
    HeaderOnly,
}

/// Capability requested at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Sequential feature access without topology.
    Geometry,
    /// Topology, spatial and category indexes.
    Topology,
}

/// Result of a successful open.
#[derive(Debug)]
pub enum Opened {
    Full(Map),
    /// Topology was requested but could not be loaded; the map is usable at
    /// [`AccessLevel::Geometry`] until [`Map::build_topology`] is called.
    Degraded { map: Map, reason: String },
}

impl Opened {
    pub fn into_map(self) -> Map {
        match self {
            Opened::Full(map) | Opened::Degraded { map, .. } => map,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Opened::Degraded { .. })
    }
}

/// Outcome of a sequential read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A feature was read into the caller's buffers. `id` is its line id
    /// when topology is available.
    Feature { kind: FeatureType, id: Option<LineId> },
    EndOfData,
}

/// Metadata and record counts of an open map.
#[derive(Debug, Clone, Serialize)]
pub struct MapInfo {
    pub head: MapHead,
    pub format: &'static str,
    pub level: AccessLevel,
    pub topology: Option<TopologySummary>,
}

impl MapInfo {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Backend("info", e.to_string()))
    }
}

/// Sequential read position.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    /// Last line id returned at topology level.
    line: LineId,
    /// Last backend offset returned at geometry level.
    offset: Option<u64>,
}

/// An open vector map.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use topovec_vector::{
///     AccessLevel, FeatureType, LineCats, LinePoints, Map, MapConfig, OpenMode, ReadOutcome,
/// };
///
/// let config = MapConfig::from_env();
/// let dir = Path::new("roads");
/// let mut map = Map::open(dir, OpenMode::Read, AccessLevel::Topology, &config)?.into_map();
///
/// let mut points = LinePoints::new();
/// let mut cats = LineCats::new();
/// while let ReadOutcome::Feature { kind, .. } = map.read_next(&mut points, &mut cats)? {
///     if kind == FeatureType::Line {
///         println!("{} vertices", points.len());
///     }
/// }
/// map.close()?;
/// # Ok::<(), topovec_vector::Error>(())
/// ```
#[derive(Debug)]
pub struct Map {
    dir: PathBuf,
    mode: OpenMode,
    config: MapConfig,
    head: MapHead,
    format: Format,
    backend: Option<Backend>,
    topo: Option<Topology>,
    constraints: Constraints,
    cursor: Cursor,
    last_report: MaintenanceReport,
    lock: Option<MapLock>,
}

impl Map {
    /// Creates a new, empty map in `dir` and opens it for writing with full
    /// topology.
    pub fn create(dir: &Path, format: Format, with_z: bool, config: &MapConfig) -> Result<Self> {
        if dir.join(HEAD_FILE).exists() {
            return Err(Error::AlreadyExists(dir.to_path_buf()));
        }
        fs::create_dir_all(dir)?;
        let lock = config.locking.then(|| MapLock::acquire(dir)).transpose()?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let head = MapHead::new(&name, with_z);
        let backend = Backend::create(dir, &format, with_z, config)?;
        head.save(dir)?;
        format.save(dir)?;

        let mut topo = Topology::with_params(with_z, config.rtree_params());
        topo.set_update_cidx(config.update_cidx);
        topo.set_built(BuildLevel::All);

        tracing::info!(dir = %dir.display(), format = format.name(), with_z, "Created map");
        Ok(Self {
            dir: dir.to_path_buf(),
            mode: OpenMode::ReadWrite,
            config: config.clone(),
            head,
            format,
            backend: Some(backend),
            topo: Some(topo),
            constraints: Constraints::default(),
            cursor: Cursor::default(),
            last_report: MaintenanceReport::default(),
            lock,
        })
    }

    /// Opens the map in `dir`.
    ///
    /// Native maps whose topology is missing or stale open degraded at
    /// geometry level. Other backends build topology from their primitives,
    /// skipping primitives the topology rejects.
    pub fn open(
        dir: &Path,
        mode: OpenMode,
        level: AccessLevel,
        config: &MapConfig,
    ) -> Result<Opened> {
        if !dir.join(HEAD_FILE).exists() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        let head = MapHead::load(dir)?;
        let format = Format::load(dir)?;

        let mut map = Self {
            dir: dir.to_path_buf(),
            mode,
            config: config.clone(),
            head,
            format,
            backend: None,
            topo: None,
            constraints: Constraints::default(),
            cursor: Cursor::default(),
            last_report: MaintenanceReport::default(),
            lock: None,
        };
        if mode == OpenMode::HeaderOnly {
            return Ok(Opened::Full(map));
        }

        if mode == OpenMode::ReadWrite && config.locking {
            map.lock = Some(MapLock::acquire(dir)?);
        }
        let writable = mode == OpenMode::ReadWrite;
        let mut backend = Backend::open(dir, &map.format, map.head.with_z, writable)?;

        if level == AccessLevel::Geometry {
            map.backend = Some(backend);
            tracing::info!(
                dir = %dir.display(),
                format = map.format.name(),
                "Opened map without topology"
            );
            return Ok(Opened::Full(map));
        }

        let outcome = if let Backend::Native(native) = &mut backend {
            match native.load_topology(config)? {
                TopologyLoad::Loaded(topo) => {
                    map.topo = Some(topo);
                    None
                }
                TopologyLoad::Unavailable(reason) => Some(reason),
            }
        } else {
            let (topo, report) = backend.scan_topology(map.head.with_z, config)?;
            map.last_report = report.issues;
            if let Backend::TopoDb(db) = &backend {
                let check = db.check_faces(&topo);
                tracing::debug!(
                    faces = check.faces,
                    matched = check.matched,
                    "Checked stored faces"
                );
            }
            map.topo = Some(topo);
            None
        };
        map.backend = Some(backend);

        tracing::info!(
            dir = %dir.display(),
            format = map.format.name(),
            mode = ?mode,
            topology = map.topo.is_some(),
            "Opened map"
        );
        Ok(match outcome {
            None => Opened::Full(map),
            Some(reason) => {
                tracing::warn!(
                    dir = %dir.display(),
                    %reason,
                    "Topology unavailable, opened at geometry level"
                );
                Opened::Degraded { map, reason }
            }
        })
    }

    // --- Metadata ---

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn head(&self) -> &MapHead {
        &self.head
    }

    pub fn head_mut(&mut self) -> &mut MapHead {
        &mut self.head
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn with_z(&self) -> bool {
        self.head.with_z
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Capability currently available.
    pub fn level(&self) -> AccessLevel {
        if self.topo.is_some() {
            AccessLevel::Topology
        } else {
            AccessLevel::Geometry
        }
    }

    /// Build level of the topology, `None` at geometry level.
    pub fn built(&self) -> BuildLevel {
        self.topo.as_ref().map_or(BuildLevel::None, Topology::built)
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topo.as_ref()
    }

    pub fn info(&self) -> MapInfo {
        MapInfo {
            head: self.head.clone(),
            format: self.format.name(),
            level: self.level(),
            topology: self.topo.as_ref().map(Topology::summary),
        }
    }

    /// Changes and consistency problems of the most recent edit or topology
    /// build, including the build done on open.
    pub fn last_report(&self) -> &MaintenanceReport {
        &self.last_report
    }

    // --- Reading ---

    fn backend(&self) -> Result<&Backend> {
        self.backend.as_ref().ok_or(Error::HeaderOnly)
    }

    fn topo(&self) -> Result<&Topology> {
        self.backend()?;
        self.topo.as_ref().ok_or(Error::TopologyRequired)
    }

    /// Reads the next feature passing the constraints.
    pub fn read_next(
        &mut self,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<ReadOutcome> {
        let backend = self.backend.as_ref().ok_or(Error::HeaderOnly)?;

        if let Some(topo) = &self.topo {
            while self.cursor.line < topo.line_slots() {
                self.cursor.line += 1;
                let id = self.cursor.line;
                let Some(rec) = topo.line(id) else {
                    continue;
                };
                if !self.constraints.accepts_type(rec.kind)
                    || !self.constraints.accepts_box(&rec.bbox)
                {
                    continue;
                }
                let kind = backend.read(rec.offset, points, cats)?;
                return Ok(ReadOutcome::Feature { kind, id: Some(id) });
            }
            return Ok(ReadOutcome::EndOfData);
        }

        while let Some(offset) = backend.next_live(self.cursor.offset)? {
            self.cursor.offset = Some(offset);
            let kind = backend.read(offset, points, cats)?;
            if !self.constraints.accepts_type(kind) {
                continue;
            }
            if self.constraints.region.is_some() && !self.constraints.accepts_box(&points.bbox()) {
                continue;
            }
            return Ok(ReadOutcome::Feature { kind, id: None });
        }
        Ok(ReadOutcome::EndOfData)
    }

    /// Restarts sequential reading from the first feature.
    pub fn rewind(&mut self) {
        self.cursor = Cursor::default();
    }

    /// Reads the live line `id`, ignoring constraints.
    pub fn read_at(
        &self,
        id: LineId,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType> {
        let rec = self.topo()?.live_line(id)?;
        self.backend()?.read(rec.offset, points, cats)
    }

    // --- Constraints ---

    pub fn set_constraint_type(&mut self, types: TypeMask) {
        self.constraints.types = Some(types);
    }

    pub fn set_constraint_region(&mut self, region: Rect) {
        self.constraints.region = Some(region);
    }

    pub fn remove_constraints(&mut self) {
        self.constraints = Constraints::default();
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    // --- Editing ---

    fn editable(&mut self) -> Result<(&mut Backend, &mut Topology)> {
        match self.mode {
            OpenMode::HeaderOnly => return Err(Error::HeaderOnly),
            OpenMode::Read => return Err(Error::ReadOnly),
            OpenMode::ReadWrite => {}
        }
        let backend = self.backend.as_mut().ok_or(Error::HeaderOnly)?;
        let topo = self.topo.as_mut().ok_or(Error::TopologyRequired)?;
        Ok((backend, topo))
    }

    /// Writes a new feature and returns its line id.
    pub fn write(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<LineId> {
        self.store(None, kind, points, cats)
    }

    /// Replaces line `id` with new geometry and returns the new line id.
    pub fn rewrite(
        &mut self,
        id: LineId,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<LineId> {
        self.store(Some(id), kind, points, cats)
    }

    fn store(
        &mut self,
        replace: Option<LineId>,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<LineId> {
        let (backend, topo) = self.editable()?;
        validate(kind, points)?;
        let old = replace.map(|id| topo.live_line(id).map(|r| r.offset)).transpose()?;

        let appended = backend.append(kind, points, cats)?;
        let written = match replace {
            Some(id) => topo.rewrite_line(backend, id, kind, appended.offset, points, cats),
            None => topo.write_line(backend, kind, appended.offset, points, cats),
        };
        let (id, mut report) = match written {
            Ok(w) => w,
            Err(e) => {
                discard(backend, appended);
                return Err(e.into());
            }
        };
        if let Some(old) = old {
            backend.set_alive(old, false)?;
            sync_label(backend, topo, old, &mut report)?;
        }

        if let Some(label) = appended.centroid {
            let mut label_points = LinePoints::new();
            let mut label_cats = LineCats::new();
            backend.read(label, &mut label_points, &mut label_cats)?;
            let (_, labeled) =
                topo.write_line(backend, FeatureType::Centroid, label, &label_points, &label_cats)?;
            report.merge(labeled);
        }

        tracing::debug!(line = id, %kind, offset = appended.offset, "Wrote feature");
        self.last_report = report;
        Ok(id)
    }

    /// Deletes line `id`. The line stays restorable until the map is closed.
    pub fn delete(&mut self, id: LineId) -> Result<()> {
        let (backend, topo) = self.editable()?;
        let offset = topo.live_line(id)?.offset;
        let mut report = topo.delete_line(backend, id)?;
        backend.set_alive(offset, false)?;
        sync_label(backend, topo, offset, &mut report)?;
        tracing::debug!(line = id, "Deleted feature");
        self.last_report = report;
        Ok(())
    }

    /// Revives a line deleted during this session.
    pub fn restore(&mut self, id: LineId) -> Result<()> {
        let (backend, topo) = self.editable()?;
        let rec = topo
            .line_record(id)
            .ok_or(topovec_topology::Error::UnknownLine(id))?;
        if rec.alive {
            return Err(topovec_topology::Error::AliveLine(id).into());
        }
        let offset = rec.offset;
        backend.set_alive(offset, true)?;
        let mut report = topo.restore_line(backend, id)?;
        sync_label(backend, topo, offset, &mut report)?;
        tracing::debug!(line = id, "Restored feature");
        self.last_report = report;
        Ok(())
    }

    // --- Topology ---

    /// Rebuilds topology from every live primitive, replacing what was
    /// loaded. Also recovers a degraded open.
    pub fn build_topology(&mut self) -> Result<BuildReport> {
        let with_z = self.head.with_z;
        let update_log = self.topo.as_ref().is_some_and(|t| t.update_log().is_some());
        let backend = self.backend.as_mut().ok_or(Error::HeaderOnly)?;
        let (mut topo, report) = backend.scan_topology(with_z, &self.config)?;
        topo.set_update_log(update_log);
        self.topo = Some(topo);
        self.cursor = Cursor::default();
        self.last_report = report.issues.clone();
        Ok(report)
    }

    /// Builds up to, or degrades down to, `level`.
    pub fn build_partial(&mut self, level: BuildLevel) -> Result<BuildReport> {
        let backend = self.backend.as_mut().ok_or(Error::HeaderOnly)?;
        let topo = self.topo.as_mut().ok_or(Error::TopologyRequired)?;
        let report = topo.build_to(backend, level, self.config.progress_step)?;
        self.last_report = report.issues.clone();
        Ok(report)
    }

    /// Enables or disables recording of lines and nodes touched by edits.
    pub fn set_update_log(&mut self, on: bool) -> Result<()> {
        self.topo.as_mut().ok_or(Error::TopologyRequired)?.set_update_log(on);
        Ok(())
    }

    pub fn update_log(&self) -> Option<&UpdateLog> {
        self.topo.as_ref()?.update_log()
    }

    /// Ids of `class` primitives whose box overlaps `rect`.
    pub fn select_by_box(&self, class: PrimitiveClass, rect: &Rect) -> Result<Vec<i32>> {
        Ok(self.topo()?.select_by_box(class, rect))
    }

    pub fn cidx(&self) -> Result<&CategoryIndex> {
        Ok(self.topo()?.cidx())
    }

    /// Primitives carrying `(layer, cat)`.
    pub fn find_cat(&self, layer: i32, cat: i32) -> Result<&[CatEntry]> {
        Ok(self.topo()?.cidx().find(layer, cat))
    }

    fn query_parts(&mut self) -> Result<(&mut Backend, &Topology)> {
        let backend = self.backend.as_mut().ok_or(Error::HeaderOnly)?;
        let topo = self.topo.as_ref().ok_or(Error::TopologyRequired)?;
        Ok((backend, topo))
    }

    /// The area containing `(x, y)`.
    pub fn find_area(&mut self, x: f64, y: f64) -> Result<Option<AreaId>> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.find_area(backend, x, y)?)
    }

    /// Whether `(x, y)` lies in `area` and outside its isles.
    pub fn point_in_area(&mut self, area: AreaId, x: f64, y: f64) -> Result<bool> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.point_in_area(backend, area, x, y)?)
    }

    /// Outer ring of `area`; `false` if there is no such area.
    pub fn area_points(&mut self, area: AreaId, out: &mut LinePoints) -> Result<bool> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.area_points(backend, area, out)?)
    }

    /// Outer ring followed by the rings of the isles of `area`.
    pub fn area_rings(&mut self, area: AreaId) -> Result<Vec<LinePoints>> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.area_rings(backend, area)?)
    }

    pub fn area_size(&mut self, area: AreaId) -> Result<f64> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.area_size(backend, area)?)
    }

    pub fn area_perimeter(&mut self, area: AreaId) -> Result<f64> {
        let (backend, topo) = self.query_parts()?;
        Ok(topo.area_perimeter(backend, area)?)
    }

    // --- Closing ---

    /// Flushes the backend and, for writable maps, persists topology.
    pub fn close(mut self) -> Result<()> {
        if self.mode == OpenMode::ReadWrite {
            if let Some(backend) = self.backend.as_mut() {
                backend.save(self.topo.as_ref(), &self.config)?;
            }
            self.head.save(&self.dir)?;
        }
        tracing::info!(dir = %self.dir.display(), "Closed map");
        drop(self.lock.take());
        Ok(())
    }
}

/// Marks a stored record dead after the topology rejected it.
/// Keeps a polygon's synthetic centroid alive exactly while one of its
/// rings is, after the ring at `offset` was deleted or restored.
fn sync_label(
    backend: &mut Backend,
    topo: &mut Topology,
    offset: u64,
    report: &mut MaintenanceReport,
) -> Result<()> {
    let Some((label, rings_alive)) = backend.label_of(offset) else {
        return Ok(());
    };
    let Some(line) = topo.line_at_offset(label) else {
        return Ok(());
    };
    let alive = topo.line(line).is_some();
    if alive && !rings_alive {
        report.merge(topo.delete_line(backend, line)?);
        backend.set_alive(label, false)?;
        tracing::debug!(line, "Deleted polygon label");
    } else if !alive && rings_alive {
        backend.set_alive(label, true)?;
        report.merge(topo.restore_line(backend, line)?);
        tracing::debug!(line, "Restored polygon label");
    }
    Ok(())
}

fn discard(backend: &mut Backend, appended: Appended) {
    for offset in std::iter::once(appended.offset).chain(appended.centroid) {
        if let Err(e) = backend.set_alive(offset, false) {
            tracing::warn!(offset, error = %e, "Failed to discard rejected record");
        }
    }
}
