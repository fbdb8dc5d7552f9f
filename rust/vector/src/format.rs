// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text files of a map directory.
//!
//! `frmt` selects the backend:
//!
//! ```text
//! FORMAT: geojson
//! DSN: roads.geojson
//! CATEGORY_FIELD: id
//! ```
//!
//! `head` carries descriptive metadata. Both use `KEY: value` lines; unknown
//! keys are ignored and kept out of the way of newer writers.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Error, Result};

pub const FRMT_FILE: &str = "frmt";
pub const HEAD_FILE: &str = "head";

/// Physical realization of a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    /// Coordinate, topology, spatial and category sections in the map directory.
    Native,
    /// A GeoJSON feature collection with pseudo-topology.
    GeoJson {
        dsn: PathBuf,
        /// Integer property used as category; the feature id when unset.
        category_field: Option<String>,
    },
    /// A SQLite database holding a node/edge/face topology schema.
    TopoDb { dsn: PathBuf },
}

impl Format {
    /// Backend name as written to `frmt`.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Native => "native",
            Format::GeoJson { .. } => "geojson",
            Format::TopoDb { .. } => "topodb",
        }
    }

    /// Reads `frmt`; a map without one is native.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FRMT_FILE);
        if !path.exists() {
            return Ok(Format::Native);
        }
        let text = fs::read_to_string(&path)?;
        let entries = parse_entries(&text);
        let get = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.clone())
        };
        let dsn = || {
            get("DSN").map(|d| dir.join(d)).ok_or_else(|| Error::Format {
                file: FRMT_FILE,
                reason: "missing DSN".into(),
            })
        };

        match get("FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("native") => Ok(Format::Native),
            Some("geojson") | Some("ogr") => Ok(Format::GeoJson {
                dsn: dsn()?,
                category_field: get("CATEGORY_FIELD").filter(|f| !f.is_empty()),
            }),
            Some("topodb") | Some("postgis") => Ok(Format::TopoDb { dsn: dsn()? }),
            Some(other) => Err(Error::Format {
                file: FRMT_FILE,
                reason: format!("unknown format {other}"),
            }),
        }
    }

    /// Writes `frmt`, storing the DSN relative to `dir` when possible.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut text = format!("FORMAT: {}\n", self.name());
        match self {
            Format::Native => {}
            Format::GeoJson {
                dsn,
                category_field,
            } => {
                let _ = writeln!(text, "DSN: {}", relative(dir, dsn).display());
                if let Some(field) = category_field {
                    let _ = writeln!(text, "CATEGORY_FIELD: {field}");
                }
            }
            Format::TopoDb { dsn } => {
                let _ = writeln!(text, "DSN: {}", relative(dir, dsn).display());
            }
        }
        fs::write(dir.join(FRMT_FILE), text)?;
        Ok(())
    }
}

/// Descriptive metadata of a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapHead {
    pub organization: String,
    /// Creation time, seconds since the epoch.
    pub created: u64,
    pub name: String,
    pub comment: String,
    pub with_z: bool,
}

impl MapHead {
    pub fn new(name: &str, with_z: bool) -> Self {
        Self {
            name: name.to_string(),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            with_z,
            ..Self::default()
        }
    }

    /// Reads `head`; a missing file yields defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(HEAD_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut head = Self::default();
        for (key, value) in parse_entries(&fs::read_to_string(path)?) {
            match key.to_ascii_uppercase().as_str() {
                "ORGANIZATION" => head.organization = value,
                "CREATED" => {
                    head.created = value.parse().map_err(|_| Error::Format {
                        file: HEAD_FILE,
                        reason: format!("bad CREATED value {value:?}"),
                    })?
                }
                "MAP NAME" => head.name = value,
                "COMMENT" => head.comment = value,
                "3D" => head.with_z = value.eq_ignore_ascii_case("yes"),
                _ => {}
            }
        }
        Ok(head)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let text = format!(
            "ORGANIZATION: {}\nCREATED: {}\nMAP NAME: {}\nCOMMENT: {}\n3D: {}\n",
            self.organization,
            self.created,
            self.name,
            self.comment,
            if self.with_z { "yes" } else { "no" },
        );
        fs::write(dir.join(HEAD_FILE), text)?;
        Ok(())
    }
}

fn parse_entries(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty() && !k.starts_with('#'))
        .collect()
}

fn relative(dir: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(dir).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_frmt_means_native() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Format::load(dir.path()).unwrap(), Format::Native);
    }

    #[test]
    fn frmt_round_trip_keeps_dsn_relative() {
        let dir = tempfile::tempdir().unwrap();
        let format = Format::GeoJson {
            dsn: dir.path().join("roads.geojson"),
            category_field: Some("id".into()),
        };
        format.save(dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join(FRMT_FILE)).unwrap();
        assert!(text.contains("DSN: roads.geojson"));
        assert_eq!(Format::load(dir.path()).unwrap(), format);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FRMT_FILE), "FORMAT: shapefile\n").unwrap();
        assert!(matches!(Format::load(dir.path()), Err(Error::Format { .. })));

        fs::write(dir.path().join(FRMT_FILE), "FORMAT: topodb\n").unwrap();
        assert!(matches!(Format::load(dir.path()), Err(Error::Format { .. })));
    }

    #[test]
    fn head_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut head = MapHead::new("roads", true);
        head.organization = "Survey".into();
        head.save(dir.path()).unwrap();
        assert_eq!(MapHead::load(dir.path()).unwrap(), head);
    }
}
