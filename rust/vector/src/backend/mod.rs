// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage backends behind a map handle.
//!
//! Every backend stores primitives at stable offsets and serves them back
//! through [`GeometrySource`], so the topology engine is shared. Only the
//! native backend persists topology; the others rebuild it on open.

pub mod coor;
pub mod geojson;
pub mod native;
pub mod topodb;

use std::path::Path;

use topovec_topology::{
    BuildLevel, BuildReport, FeatureType, GeometrySource, LineCats, LinePoints, Topology,
};

pub use self::geojson::{Appended, GeoJsonBackend};
pub use self::native::{NativeBackend, TopologyLoad};
pub use self::topodb::{FaceCheck, TopoDbBackend};

use crate::config::MapConfig;
use crate::error::Result;
use crate::format::Format;

#[derive(Debug)]
pub enum Backend {
    Native(NativeBackend),
    GeoJson(GeoJsonBackend),
    TopoDb(TopoDbBackend),
}

impl Backend {
    /// Creates the storage for a new map in `dir`.
    pub fn create(dir: &Path, format: &Format, with_z: bool, config: &MapConfig) -> Result<Self> {
        Ok(match format {
            Format::Native => Backend::Native(NativeBackend::create(dir, with_z, config)?),
            Format::GeoJson {
                dsn,
                category_field,
            } => Backend::GeoJson(GeoJsonBackend::create(dsn, category_field.clone(), with_z)?),
            Format::TopoDb { dsn } => {
                if with_z {
                    return Err(crate::Error::Backend(
                        "topodb",
                        "3D maps are not supported".into(),
                    ));
                }
                Backend::TopoDb(TopoDbBackend::create(dsn)?)
            }
        })
    }

    pub fn open(dir: &Path, format: &Format, with_z: bool, writable: bool) -> Result<Self> {
        Ok(match format {
            Format::Native => Backend::Native(NativeBackend::open(dir, writable)?),
            Format::GeoJson {
                dsn,
                category_field,
            } => Backend::GeoJson(GeoJsonBackend::open(
                dsn,
                category_field.clone(),
                with_z,
                writable,
            )?),
            Format::TopoDb { dsn } => Backend::TopoDb(TopoDbBackend::open(dsn, writable)?),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Native(_) => "native",
            Backend::GeoJson(_) => "geojson",
            Backend::TopoDb(_) => "topodb",
        }
    }

    pub fn append(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<Appended> {
        match self {
            Backend::Native(b) => Ok(Appended {
                offset: b.append(kind, points, cats)?,
                centroid: None,
            }),
            Backend::GeoJson(b) => b.append(kind, points, cats),
            Backend::TopoDb(b) => Ok(Appended {
                offset: b.append(kind, points, cats)?,
                centroid: None,
            }),
        }
    }

    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        match self {
            Backend::Native(b) => b.set_alive(offset, alive),
            Backend::GeoJson(b) => b.set_alive(offset, alive),
            Backend::TopoDb(b) => b.set_alive(offset, alive),
        }
    }

    /// Synthetic centroid paired with the boundary at `offset`, with whether
    /// any ring of its polygon is still alive. Only pseudo-topology pairs
    /// boundaries with centroids.
    pub fn label_of(&self, offset: u64) -> Option<(u64, bool)> {
        match self {
            Backend::GeoJson(b) => b.label_of(offset),
            Backend::Native(_) | Backend::TopoDb(_) => None,
        }
    }

    /// First live offset after `after`, or the first one when `None`.
    pub fn next_live(&self, after: Option<u64>) -> Result<Option<u64>> {
        match self {
            Backend::Native(b) => b.next_live(after),
            Backend::GeoJson(b) => Ok(b.next_live(after)),
            Backend::TopoDb(b) => Ok(b.next_live(after)),
        }
    }

    pub fn read(
        &self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType> {
        match self {
            Backend::Native(b) => b.read(offset, points, cats),
            Backend::GeoJson(b) => b.read(offset, points, cats),
            Backend::TopoDb(b) => b.read(offset, points, cats),
        }
    }

    /// Builds topology from scratch over every live primitive. Primitives
    /// the topology rejects are skipped with a warning. Faces stored by the
    /// database backend are taken over before the remaining sides are walked.
    pub fn scan_topology(
        &mut self,
        with_z: bool,
        config: &MapConfig,
    ) -> Result<(Topology, BuildReport)> {
        let mut topo = Topology::with_params(with_z, config.rtree_params());
        topo.set_update_cidx(config.update_cidx);

        let mut points = LinePoints::new();
        let mut cats = LineCats::new();
        let mut skipped = 0usize;
        let mut offset = self.next_live(None)?;
        while let Some(o) = offset {
            let kind = self.read(o, &mut points, &mut cats)?;
            if let Err(e) = topo.add_feature(kind, o, &points, &cats) {
                tracing::warn!(
                    backend = self.name(),
                    offset = o,
                    %kind,
                    error = %e,
                    "Skipping primitive"
                );
                skipped += 1;
            }
            offset = self.next_live(Some(o))?;
        }
        tracing::debug!(
            backend = self.name(),
            primitives = topo.live_line_count(),
            skipped,
            "Scanned primitives"
        );

        let stored = match self {
            Backend::TopoDb(db) => db.stored_rings(&topo),
            _ => Vec::new(),
        };
        for (face, ring) in &stored {
            if topo.add_face_ring(self, ring)?.is_none() {
                tracing::warn!(face, "Stored face ring rejected, walking its edges instead");
            }
        }

        let report = topo.build_to(self, BuildLevel::All, config.progress_step)?;
        Ok((topo, report))
    }

    /// Flushes the backend, persisting topology where the backend keeps it.
    pub fn save(&mut self, topo: Option<&Topology>, config: &MapConfig) -> Result<()> {
        match self {
            Backend::Native(b) => b.save(topo, config),
            Backend::GeoJson(b) => b.save(),
            Backend::TopoDb(b) => b.save(topo),
        }
    }
}

impl GeometrySource for Backend {
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
