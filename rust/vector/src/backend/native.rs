// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native map directory: `coor`, `topo`, `sidx` and `cidx` sections.
//!
//! Topology is trusted only if the size and modification time of `coor`
//! match what the topology header recorded. The spatial and category
//! indexes are optional: when they are missing or unreadable they are
//! rebuilt from the topology instead of degrading the open.

use std::fs;
use std::path::{Path, PathBuf};

use topovec_rtree::Dims;
use topovec_topology::{
    decode_cidx, decode_sidx, read_topo_header, FeatureType, GeometrySource, LineCats, LinePoints,
    Topology,
};

use super::coor::{CoorFile, COOR_FILE};
use crate::config::MapConfig;
use crate::error::Result;

pub const TOPO_FILE: &str = "topo";
pub const SIDX_FILE: &str = "sidx";
pub const CIDX_FILE: &str = "cidx";

/// Result of loading persisted topology.
#[derive(Debug)]
pub enum TopologyLoad {
    Loaded(Topology),
    /// Topology cannot be used; the reason is reported to the caller.
    Unavailable(String),
}

#[derive(Debug)]
pub struct NativeBackend {
    dir: PathBuf,
    coor: CoorFile,
}

impl NativeBackend {
    pub fn create(dir: &Path, with_z: bool, config: &MapConfig) -> Result<Self> {
        let coor = CoorFile::create(&dir.join(COOR_FILE), with_z, config.byte_order)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            coor,
        })
    }

    pub fn open(dir: &Path, writable: bool) -> Result<Self> {
        let coor = CoorFile::open(&dir.join(COOR_FILE), writable)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            coor,
        })
    }

    pub fn with_z(&self) -> bool {
        self.coor.with_z()
    }

    pub fn append(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<u64> {
        self.coor.append(kind, points, cats)
    }

    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        self.coor.set_alive(offset, alive)
    }

    pub fn next_live(&self, after: Option<u64>) -> Result<Option<u64>> {
        self.coor.next_live(after)
    }

    pub fn read(
        &self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType> {
        self.coor.read(offset, points, cats).map(|(kind, _)| kind)
    }

    /// Loads the persisted topology and its indexes.
    pub fn load_topology(&mut self, config: &MapConfig) -> Result<TopologyLoad> {
        let topo_path = self.dir.join(TOPO_FILE);
        let bytes = match fs::read(&topo_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TopologyLoad::Unavailable("no topology section".into()));
            }
            Err(e) => return Err(e.into()),
        };

        let header = match read_topo_header(&bytes) {
            Ok(h) => h,
            Err(e) => return Ok(TopologyLoad::Unavailable(format!("topology header: {e}"))),
        };
        let (size, mtime) = (self.coor.size(), self.coor.mtime()?);
        if header.coor_size != size || header.coor_mtime != mtime {
            return Ok(TopologyLoad::Unavailable(format!(
                "stale topology: built for coor size {} mtime {}, found size {size} mtime {mtime}",
                header.coor_size, header.coor_mtime
            )));
        }

        let mut topo = match Topology::decode_topo(&bytes, config.rtree_params()) {
            Ok((topo, _)) => topo,
            Err(e) => return Ok(TopologyLoad::Unavailable(format!("topology section: {e}"))),
        };
        topo.set_update_cidx(config.update_cidx);

        let dims = if topo.with_z() { Dims::Three } else { Dims::Two };
        match read_section(&self.dir.join(SIDX_FILE), |b| decode_sidx(b, dims)) {
            Ok(index) => topo.set_spatial_index(index),
            Err(e) => {
                tracing::warn!(error = %e, "Spatial index unavailable, rebuilding");
                topo.rebuild_spatial_index();
            }
        }

        match read_section(&self.dir.join(CIDX_FILE), decode_cidx) {
            Ok(cidx) => topo.set_category_index(cidx),
            Err(e) => {
                tracing::warn!(error = %e, "Category index unavailable, rebuilding");
                topo.rebuild_category_index(self)?;
            }
        }

        tracing::info!(
            level = ?topo.built(),
            nodes = topo.node_count(),
            lines = topo.live_line_count(),
            areas = topo.area_count(),
            "Loaded topology"
        );
        Ok(TopologyLoad::Loaded(topo))
    }

    /// Flushes `coor` and writes the topology sections stamped with its
    /// final size and modification time.
    pub fn save(&mut self, topo: Option<&Topology>, config: &MapConfig) -> Result<()> {
        self.coor.sync()?;
        let Some(topo) = topo else {
            return Ok(());
        };
        let order = config.byte_order;
        let topo_bytes = topo.encode_topo(self.coor.size(), self.coor.mtime()?, order);
        fs::write(self.dir.join(TOPO_FILE), topo_bytes)?;
        fs::write(self.dir.join(SIDX_FILE), topo.encode_sidx(order))?;
        fs::write(self.dir.join(CIDX_FILE), topo.encode_cidx(order))?;
        tracing::debug!(dir = %self.dir.display(), "Wrote topology sections");
        Ok(())
    }
}

fn read_section<T>(
    path: &Path,
    decode: impl FnOnce(&[u8]) -> topovec_topology::Result<T>,
) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(decode(&bytes)?)
}

impl GeometrySource for NativeBackend {
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
