// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GeoJSON feature collections with pseudo-topology.
//!
//! Simple features know nothing about boundaries or centroids, so every
//! source geometry is split into primitives on open:
//!
//! - points and multipoints become points, line strings become lines;
//! - every polygon ring becomes a boundary, and each polygon gets a
//!   synthetic centroid at an interior point.
//!
//! Points, lines and centroids carry `(1, cat)` where `cat` is the feature
//! id or the configured integer property. Boundaries carry no categories;
//! the polygon is labeled through its centroid. Primitives are addressed by
//! their position in the primitive list, and the collection is written back
//! on close when it changed.

use std::fs;
use std::path::{Path, PathBuf};

use geo::InteriorPoint;
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use topovec_topology::{FeatureType, GeometrySource, LineCats, LinePoints};

use crate::error::{Error, Result};

const BACKEND: &str = "geojson";
/// Layer that receives feature categories.
pub const CATEGORY_LAYER: i32 = 1;

/// One primitive derived from a source feature.
#[derive(Debug, Clone)]
struct Primitive {
    kind: FeatureType,
    points: LinePoints,
    cats: LineCats,
    alive: bool,
    /// Source feature the primitive was derived from.
    fid: i64,
    /// Polygon number within the feature, for boundaries and centroids.
    part: u32,
}

#[derive(Debug, Clone)]
struct SourceFeature {
    fid: i64,
    properties: Option<JsonObject>,
    /// Geometry that could not be split into primitives, written back as is.
    rejected: Option<Geometry>,
}

/// Offsets of a newly written feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub offset: u64,
    /// Synthetic centroid written along with a boundary.
    pub centroid: Option<u64>,
}

#[derive(Debug)]
pub struct GeoJsonBackend {
    path: PathBuf,
    category_field: Option<String>,
    with_z: bool,
    writable: bool,
    prims: Vec<Primitive>,
    features: Vec<SourceFeature>,
    next_fid: i64,
    dirty: bool,
}

impl GeoJsonBackend {
    /// Creates an empty collection at `path`; fails if it exists.
    pub fn create(path: &Path, category_field: Option<String>, with_z: bool) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        let backend = Self {
            path: path.to_path_buf(),
            category_field,
            with_z,
            writable: true,
            prims: Vec::new(),
            features: Vec::new(),
            next_fid: 1,
            dirty: true,
        };
        backend.write_collection()?;
        Ok(backend)
    }

    pub fn open(
        path: &Path,
        category_field: Option<String>,
        with_z: bool,
        writable: bool,
    ) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(g) => vec![Feature {
                geometry: Some(g),
                ..Feature::default()
            }],
        };

        let mut backend = Self {
            path: path.to_path_buf(),
            category_field,
            with_z,
            writable,
            prims: Vec::new(),
            features: Vec::with_capacity(features.len()),
            next_fid: 1,
            dirty: false,
        };
        for (index, feature) in features.into_iter().enumerate() {
            backend.load_feature(index, feature);
        }
        backend.next_fid = backend.features.iter().map(|f| f.fid).max().unwrap_or(0) + 1;

        tracing::info!(
            path = %path.display(),
            features = backend.features.len(),
            primitives = backend.prims.len(),
            "Opened GeoJSON source"
        );
        Ok(backend)
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    /// Splits one feature into primitives. A feature whose geometry cannot
    /// be read contributes none and keeps its geometry for write-back.
    fn load_feature(&mut self, index: usize, feature: Feature) {
        let fid = match &feature.id {
            Some(Id::Number(n)) => n.as_i64().unwrap_or(index as i64 + 1),
            Some(Id::String(s)) => s.parse().unwrap_or(index as i64 + 1),
            None => index as i64 + 1,
        };
        let cat = self.feature_cat(fid, feature.properties.as_ref());
        let mut cats = LineCats::new();
        if let Some(cat) = cat {
            cats.add(CATEGORY_LAYER, cat);
        }

        let mut part = 0;
        let mut rejected = None;
        if let Some(geometry) = feature.geometry {
            let first = self.prims.len();
            if let Err(e) = self.load_value(fid, &cats, &geometry.value, &mut part) {
                tracing::warn!(fid, error = %e, "Skipping feature with unreadable geometry");
                self.prims.truncate(first);
                rejected = Some(geometry);
            }
        }
        self.features.push(SourceFeature {
            fid,
            properties: feature.properties,
            rejected,
        });
    }

    fn feature_cat(&self, fid: i64, properties: Option<&JsonObject>) -> Option<i32> {
        let Some(field) = &self.category_field else {
            return i32::try_from(fid).ok();
        };
        let value = properties.and_then(|p| p.get(field));
        let cat = value.and_then(|v| v.as_i64()).and_then(|c| i32::try_from(c).ok());
        if cat.is_none() {
            tracing::warn!(fid, field = %field, "Feature has no integer category");
        }
        cat
    }

    fn load_value(
        &mut self,
        fid: i64,
        cats: &LineCats,
        value: &Value,
        part: &mut u32,
    ) -> Result<()> {
        match value {
            Value::Point(p) => {
                let points = self.positions(std::slice::from_ref(p))?;
                self.push(FeatureType::Point, points, cats.clone(), fid, 0);
            }
            Value::MultiPoint(ps) => {
                for p in ps {
                    let points = self.positions(std::slice::from_ref(p))?;
                    self.push(FeatureType::Point, points, cats.clone(), fid, 0);
                }
            }
            Value::LineString(ls) => {
                let points = self.positions(ls)?;
                self.push(FeatureType::Line, points, cats.clone(), fid, 0);
            }
            Value::MultiLineString(lss) => {
                for ls in lss {
                    let points = self.positions(ls)?;
                    self.push(FeatureType::Line, points, cats.clone(), fid, 0);
                }
            }
            Value::Polygon(rings) => {
                self.load_polygon(fid, cats, rings, *part)?;
                *part += 1;
            }
            Value::MultiPolygon(polygons) => {
                for rings in polygons {
                    self.load_polygon(fid, cats, rings, *part)?;
                    *part += 1;
                }
            }
            Value::GeometryCollection(geometries) => {
                for g in geometries {
                    self.load_value(fid, cats, &g.value, part)?;
                }
            }
        }
        Ok(())
    }

    fn load_polygon(
        &mut self,
        fid: i64,
        cats: &LineCats,
        rings: &[Vec<Vec<f64>>],
        part: u32,
    ) -> Result<()> {
        for ring in rings {
            let points = self.positions(ring)?;
            self.push(FeatureType::Boundary, points, LineCats::new(), fid, part);
        }
        match interior_point(rings) {
            Some((x, y)) => {
                let mut points = LinePoints::new();
                points.push(x, y, 0.0);
                self.push(FeatureType::Centroid, points, cats.clone(), fid, part);
            }
            None => tracing::warn!(fid, part, "Polygon has no interior point, no centroid"),
        }
        Ok(())
    }

    fn positions(&self, positions: &[Vec<f64>]) -> Result<LinePoints> {
        let mut points = LinePoints::new();
        for p in positions {
            match p.as_slice() {
                [x, y] => points.push(*x, *y, 0.0),
                [x, y, z, ..] => points.push(*x, *y, if self.with_z { *z } else { 0.0 }),
                _ => {
                    let reason = format!("position with {} coordinates", p.len());
                    return Err(Error::Backend(BACKEND, reason));
                }
            }
        }
        Ok(points)
    }

    fn push(
        &mut self,
        kind: FeatureType,
        points: LinePoints,
        cats: LineCats,
        fid: i64,
        part: u32,
    ) -> u64 {
        self.prims.push(Primitive {
            kind,
            points,
            cats,
            alive: true,
            fid,
            part,
        });
        (self.prims.len() - 1) as u64
    }

    /// Stores a new feature. Boundaries must be closed rings and become
    /// polygons with a synthetic centroid; centroids cannot be written.
    pub fn append(
        &mut self,
        kind: FeatureType,
        points: &LinePoints,
        cats: &LineCats,
    ) -> Result<Appended> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        if kind == FeatureType::Centroid {
            return Err(Error::UnsupportedType { backend: BACKEND, kind });
        }
        if kind == FeatureType::Boundary && !points.is_closed() {
            return Err(Error::Backend(BACKEND, "boundaries must be closed rings".into()));
        }

        let fid = self.next_fid;
        self.next_fid += 1;
        let cat = cats.get(CATEGORY_LAYER).or_else(|| i32::try_from(fid).ok());
        let mut properties = JsonObject::new();
        if let Some(cat) = cat {
            let field = self.category_field.clone().unwrap_or_else(|| "cat".into());
            properties.insert(field, cat.into());
        }
        self.features.push(SourceFeature {
            fid,
            properties: Some(properties),
            rejected: None,
        });
        self.dirty = true;

        if kind != FeatureType::Boundary {
            let offset = self.push(kind, points.clone(), cats.clone(), fid, 0);
            return Ok(Appended { offset, centroid: None });
        }

        let offset = self.push(FeatureType::Boundary, points.clone(), LineCats::new(), fid, 0);
        let ring: Vec<Vec<f64>> = points.iter().map(|p| vec![p.x, p.y]).collect();
        let centroid = interior_point(std::slice::from_ref(&ring)).map(|(x, y)| {
            let mut label = LinePoints::new();
            label.push(x, y, 0.0);
            self.push(FeatureType::Centroid, label, cats.clone(), fid, 0)
        });
        Ok(Appended { offset, centroid })
    }

    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let prim = self
            .prims
            .get_mut(offset as usize)
            .ok_or_else(|| Error::Backend(BACKEND, format!("no primitive at offset {offset}")))?;
        prim.alive = alive;
        self.dirty = true;
        Ok(())
    }

    /// Offset of the synthetic centroid of the polygon the boundary at
    /// `offset` belongs to, and whether any ring of that polygon is alive.
    pub fn label_of(&self, offset: u64) -> Option<(u64, bool)> {
        let ring = self
            .prims
            .get(offset as usize)
            .filter(|p| p.kind == FeatureType::Boundary)?;
        let same_polygon = |p: &Primitive| p.fid == ring.fid && p.part == ring.part;
        let label = self
            .prims
            .iter()
            .position(|p| p.kind == FeatureType::Centroid && same_polygon(p))?;
        let rings_alive = self
            .prims
            .iter()
            .any(|p| p.kind == FeatureType::Boundary && p.alive && same_polygon(p));
        Some((label as u64, rings_alive))
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

    /// Writes the collection back if it changed.
    pub fn save(&mut self) -> Result<()> {
        if !self.writable || !self.dirty {
            return Ok(());
        }
        self.write_collection()?;
        self.dirty = false;
        Ok(())
    }

    fn write_collection(&self) -> Result<()> {
        let features: Vec<Feature> = self
            .features
            .iter()
            .filter_map(|f| {
                let geometry = match &f.rejected {
                    Some(rejected) => rejected.clone(),
                    None => Geometry::new(self.feature_geometry(f.fid)?),
                };
                Some(Feature {
                    geometry: Some(geometry),
                    id: Some(Id::Number(f.fid.into())),
                    properties: f.properties.clone(),
                    ..Feature::default()
                })
            })
            .collect();
        let count = features.len();
        let collection = GeoJson::from(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        });
        fs::write(&self.path, collection.to_string())?;
        tracing::debug!(path = %self.path.display(), features = count, "Wrote GeoJSON source");
        Ok(())
    }

    fn positions_of(&self, points: &LinePoints) -> Vec<Vec<f64>> {
        points
            .iter()
            .map(|v| {
                if self.with_z {
                    vec![v.x, v.y, v.z]
                } else {
                    vec![v.x, v.y]
                }
            })
            .collect()
    }

    /// Geometry of the live primitives of one source feature; `None` when
    /// nothing of it survives.
    fn feature_geometry(&self, fid: i64) -> Option<Value> {
        let prims: Vec<&Primitive> =
            self.prims.iter().filter(|p| p.fid == fid && p.alive).collect();
        let of_kind = |kind: FeatureType| prims.iter().filter(move |p| p.kind == kind);

        let mut points: Vec<Vec<f64>> = of_kind(FeatureType::Point)
            .flat_map(|p| self.positions_of(&p.points))
            .collect();
        let mut lines: Vec<Vec<Vec<f64>>> = of_kind(FeatureType::Line)
            .map(|p| self.positions_of(&p.points))
            .collect();

        let mut parts: Vec<u32> = of_kind(FeatureType::Boundary).map(|p| p.part).collect();
        parts.dedup();
        let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = parts
            .into_iter()
            .map(|part| {
                of_kind(FeatureType::Boundary)
                    .filter(|p| p.part == part)
                    .map(|p| self.positions_of(&p.points))
                    .collect()
            })
            .collect();

        let mut values = Vec::new();
        match points.len() {
            0 => {}
            1 => values.extend(points.pop().map(Value::Point)),
            _ => values.push(Value::MultiPoint(points)),
        }
        match lines.len() {
            0 => {}
            1 => values.extend(lines.pop().map(Value::LineString)),
            _ => values.push(Value::MultiLineString(lines)),
        }
        match polygons.len() {
            0 => {}
            1 => values.extend(polygons.pop().map(Value::Polygon)),
            _ => values.push(Value::MultiPolygon(polygons)),
        }
        match values.len() {
            0 => None,
            1 => values.pop(),
            _ => Some(Value::GeometryCollection(values.into_iter().map(Geometry::new).collect())),
        }
    }
}

impl GeometrySource for GeoJsonBackend {
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

/// A point strictly inside the polygon formed by `rings` (first ring outer).
fn interior_point(rings: &[Vec<Vec<f64>>]) -> Option<(f64, f64)> {
    let mut rings = rings.iter().map(|ring| {
        geo_types::LineString::from(
            ring.iter()
                .filter(|p| p.len() >= 2)
                .map(|p| (p[0], p[1]))
                .collect::<Vec<_>>(),
        )
    });
    let exterior = rings.next()?;
    let polygon = geo_types::Polygon::new(exterior, rings.collect());
    polygon.interior_point().map(|p| (p.x(), p.y()))
}
