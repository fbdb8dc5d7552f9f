// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON views of a topology store.
//!
//! [`TopologySummary`] is a compact count report. [`TopologySnapshot`] is a
//! structural description that does not depend on area, isle or node ids:
//! faces are named by their canonical boundary ring (rotated to start at the
//! smallest line id) and nodes by their coordinates. Two stores with the same
//! snapshot have identical topology even if their derived records were built
//! in a different order, which is what delete/restore round trips need.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::arena::*;
use crate::error::{Error, Result};
use crate::keys::*;

/// Record counts of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySummary {
    pub level: BuildLevel,
    pub with_z: bool,
    pub nodes: usize,
    pub points: usize,
    pub lines: usize,
    pub boundaries: usize,
    pub centroids: usize,
    pub dead_lines: usize,
    pub areas: usize,
    pub isles: usize,
    /// `[min_x, min_y, max_x, max_y]` of all live lines; `None` when empty.
    pub extent: Option<[f64; 4]>,
}

/// A face named by its canonical ring.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FaceRef {
    None,
    Area { ring: Vec<LineId> },
    Isle { ring: Vec<LineId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub lines: Vec<LineId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub id: LineId,
    pub kind: FeatureType,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<FaceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<FaceRef>,
    /// Face a centroid is attached to; duplicates and outside centroids
    /// carry `FaceRef::None` plus `duplicate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid_of: Option<FaceRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AreaSnapshot {
    pub ring: Vec<LineId>,
    pub centroid: LineId,
    pub isles: Vec<Vec<LineId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsleSnapshot {
    pub ring: Vec<LineId>,
    pub area: Option<Vec<LineId>>,
}

/// Id-independent structure of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub level: BuildLevel,
    pub nodes: Vec<NodeSnapshot>,
    pub lines: Vec<LineSnapshot>,
    pub areas: Vec<AreaSnapshot>,
    pub isles: Vec<IsleSnapshot>,
}

impl TopologySnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Rotates a ring to start at its smallest line id.
pub fn canonical_ring(ring: &[LineId]) -> Vec<LineId> {
    let Some(start) = ring
        .iter()
        .enumerate()
        .min_by_key(|(_, l)| (l.abs(), l.signum()))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    ring[start..].iter().chain(&ring[..start]).copied().collect()
}

impl Topology {
    pub fn summary(&self) -> TopologySummary {
        let extent = self.extent();
        TopologySummary {
            level: self.built,
            with_z: self.with_z,
            nodes: self.node_count(),
            points: self.line_count(FeatureType::Point),
            lines: self.line_count(FeatureType::Line),
            boundaries: self.line_count(FeatureType::Boundary),
            centroids: self.line_count(FeatureType::Centroid),
            dead_lines: self.lines.iter().flatten().filter(|l| !l.alive).count(),
            areas: self.area_count(),
            isles: self.isle_count(),
            extent: (!extent.is_empty())
                .then(|| [extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()]),
        }
    }

    /// Serializes the summary to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.summary())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Creates an id-independent snapshot of the store.
    pub fn snapshot(&self) -> TopologySnapshot {
        let area_rings: FxHashMap<AreaId, Vec<LineId>> = self
            .area_ids()
            .filter_map(|a| Some((a, canonical_ring(self.area_boundaries(a)?))))
            .collect();
        let isle_rings: FxHashMap<IsleId, Vec<LineId>> = self
            .isle_ids()
            .filter_map(|i| Some((i, canonical_ring(self.isle_boundaries(i)?))))
            .collect();
        let face_ref = |face: Face| match face {
            Face::None => FaceRef::None,
            Face::Area(a) => area_rings
                .get(&a)
                .map_or(FaceRef::None, |r| FaceRef::Area { ring: r.clone() }),
            Face::Isle(i) => isle_rings
                .get(&i)
                .map_or(FaceRef::None, |r| FaceRef::Isle { ring: r.clone() }),
        };

        let mut nodes: Vec<NodeSnapshot> = self
            .nodes
            .iter()
            .flatten()
            .map(|n| NodeSnapshot {
                x: n.x,
                y: n.y,
                z: n.z,
                lines: n.lines.iter().map(|l| l.line).collect(),
            })
            .collect();
        nodes.sort_by(|a, b| {
            a.x.total_cmp(&b.x)
                .then(a.y.total_cmp(&b.y))
                .then(a.z.total_cmp(&b.z))
        });

        let lines = self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(id, rec)| Some((id as LineId, rec.as_ref()?)))
            .map(|(id, rec)| {
                let boundary = rec.alive && rec.kind == FeatureType::Boundary;
                let centroid = rec.alive && rec.kind == FeatureType::Centroid;
                let link = rec.centroid_link();
                LineSnapshot {
                    id,
                    kind: rec.kind,
                    alive: rec.alive,
                    left: boundary.then(|| face_ref(rec.face(Side::Left))),
                    right: boundary.then(|| face_ref(rec.face(Side::Right))),
                    centroid_of: centroid.then(|| match link {
                        CentroidLink::Attached(a) => face_ref(Face::Area(a)),
                        _ => FaceRef::None,
                    }),
                    duplicate: centroid && matches!(link, CentroidLink::Duplicate(_)),
                }
            })
            .collect();

        let mut areas: Vec<AreaSnapshot> = self
            .area_ids()
            .filter_map(|a| {
                let rec = self.area(a)?;
                let mut isles: Vec<Vec<LineId>> = rec
                    .isles
                    .iter()
                    .filter_map(|i| isle_rings.get(i).cloned())
                    .collect();
                isles.sort();
                Some(AreaSnapshot {
                    ring: area_rings.get(&a)?.clone(),
                    centroid: rec.centroid,
                    isles,
                })
            })
            .collect();
        areas.sort();

        let mut isles: Vec<IsleSnapshot> = self
            .isle_ids()
            .filter_map(|i| {
                let rec = self.isle(i)?;
                Some(IsleSnapshot {
                    ring: isle_rings.get(&i)?.clone(),
                    area: area_rings.get(&rec.area).cloned(),
                })
            })
            .collect();
        isles.sort();

        TopologySnapshot {
            level: self.built,
            nodes,
            lines,
            areas,
            isles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LineCats, LinePoints};
    use crate::source::MemorySource;

    #[test]
    fn rings_rotate_to_smallest_id() {
        assert_eq!(canonical_ring(&[5, -2, 9]), vec![-2, 9, 5]);
        assert_eq!(canonical_ring(&[3]), vec![3]);
        assert!(canonical_ring(&[]).is_empty());
    }

    #[test]
    fn summary_counts() {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        let mut src = MemorySource::new();
        let ring = LinePoints::from_xy(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (0.0, 0.0)]);
        let offset = src.push(FeatureType::Boundary, &ring, &LineCats::new());
        topo.write_line(&mut src, FeatureType::Boundary, offset, &ring, &LineCats::new())
            .unwrap();

        let summary = topo.summary();
        assert_eq!(summary.boundaries, 1);
        assert_eq!(summary.areas, 1);
        assert_eq!(summary.isles, 1);
        assert_eq!(summary.extent, Some([0.0, 0.0, 2.0, 2.0]));
        let json = topo.to_json().unwrap();
        assert!(json.contains("\"boundaries\": 1"));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        let mut src = MemorySource::new();
        let ring = LinePoints::from_xy(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (0.0, 0.0)]);
        let offset = src.push(FeatureType::Boundary, &ring, &LineCats::new());
        topo.write_line(&mut src, FeatureType::Boundary, offset, &ring, &LineCats::new())
            .unwrap();

        let snapshot = topo.snapshot();
        assert_eq!(snapshot.areas.len(), 1);
        assert_eq!(snapshot.areas[0].ring, vec![1]);
        let restored = TopologySnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(restored, snapshot);
    }
}
