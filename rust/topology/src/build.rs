// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Full topology build and partial degrade.
//!
//! A build raises the store level by level: base topology is assumed to be
//! loaded already (see [`Topology::add_feature`]), then areas are built from
//! every live boundary, isles are attached, and centroids are attached with
//! their categories indexed under the areas they label. Lowering the level
//! discards the derived records of every stage above the target.

use std::time::Instant;

use serde::Serialize;

use crate::arena::*;
use crate::engine::{MaintenanceReport, Scratch};
use crate::error::Result;
use crate::keys::*;
use crate::source::GeometrySource;

/// Outcome of [`Topology::build_to`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub level: BuildLevel,
    pub nodes: usize,
    pub lines: usize,
    pub areas: usize,
    pub isles: usize,
    /// Areas with an attached centroid.
    pub labeled_areas: usize,
    pub issues: MaintenanceReport,
}

/// Emits a log line each time a stage crosses another `step` percent.
struct Progress {
    stage: &'static str,
    total: usize,
    step: u8,
    next: usize,
}

impl Progress {
    fn new(stage: &'static str, total: usize, step: u8) -> Self {
        Self {
            stage,
            total,
            step,
            next: step as usize,
        }
    }

    fn tick(&mut self, done: usize) {
        if self.step == 0 || self.total == 0 {
            return;
        }
        let percent = done * 100 / self.total;
        if percent >= self.next {
            tracing::info!(stage = self.stage, percent, "Building topology");
            while self.next <= percent {
                self.next += self.step as usize;
            }
        }
    }
}

impl Topology {
    /// Builds (or degrades) topology to `target`.
    ///
    /// `progress_step` is the percentage interval at which progress is
    /// logged per stage; `0` disables progress output.
    pub fn build_to<S: GeometrySource + ?Sized>(
        &mut self,
        source: &mut S,
        target: BuildLevel,
        progress_step: u8,
    ) -> Result<BuildReport> {
        let started = Instant::now();
        let mut report = BuildReport::default();

        if target < self.built {
            self.degrade_to(target);
        }
        if self.built < BuildLevel::Base && target >= BuildLevel::Base {
            // Base records are present whenever primitives have been added.
            self.built = BuildLevel::Base;
        }

        let mut scratch = Scratch::default();

        if self.built < BuildLevel::Areas && target >= BuildLevel::Areas {
            let boundaries: Vec<LineId> = self
                .live_lines()
                .filter(|&l| self.line(l).is_some_and(|r| r.kind == FeatureType::Boundary))
                .collect();
            let mut progress = Progress::new("areas", boundaries.len(), progress_step);
            for (i, &line) in boundaries.iter().enumerate() {
                for side in [Side::Left, Side::Right] {
                    self.build_line_area(source, line, side, &mut scratch, &mut report.issues)?;
                }
                progress.tick(i + 1);
            }
            self.built = BuildLevel::Areas;
        }

        if self.built < BuildLevel::AttachIsles && target >= BuildLevel::AttachIsles {
            let isles: Vec<IsleId> = self.isle_ids().collect();
            let mut progress = Progress::new("isles", isles.len(), progress_step);
            for (i, &isle) in isles.iter().enumerate() {
                self.attach_isle(source, isle, &mut scratch)?;
                progress.tick(i + 1);
            }
            self.built = BuildLevel::AttachIsles;
        }

        if self.built < BuildLevel::Centroids && target >= BuildLevel::Centroids {
            let centroids: Vec<LineId> = self
                .live_lines()
                .filter(|&l| self.line(l).is_some_and(|r| r.kind == FeatureType::Centroid))
                .collect();
            let mut progress = Progress::new("centroids", centroids.len(), progress_step);
            let mut labeled = Vec::new();
            for (i, &centroid) in centroids.iter().enumerate() {
                if let Some(area) = self.attach_centroid(source, centroid, &mut report.issues)? {
                    labeled.push(area);
                }
                progress.tick(i + 1);
            }
            for area in labeled {
                self.add_area_cats(source, area, &mut scratch)?;
            }
            self.built = BuildLevel::Centroids;
        }

        if target >= BuildLevel::All {
            self.built = BuildLevel::All;
        }

        report.level = self.built;
        report.nodes = self.node_count();
        report.lines = self.live_line_count();
        report.areas = self.area_count();
        report.isles = self.isle_count();
        report.labeled_areas = self
            .area_ids()
            .filter(|&a| self.area(a).is_some_and(|r| r.centroid != 0))
            .count();

        tracing::info!(
            level = ?report.level,
            nodes = report.nodes,
            lines = report.lines,
            areas = report.areas,
            isles = report.isles,
            ring_failures = report.issues.ring_failures.len(),
            duplicate_centroids = report.issues.duplicate_centroids.len(),
            outside_centroids = report.issues.outside_centroids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Topology built"
        );
        Ok(report)
    }

    /// Drops every derived record above `level`.
    pub fn degrade_to(&mut self, level: BuildLevel) {
        if level >= self.built {
            return;
        }
        if self.built >= BuildLevel::Centroids && level < BuildLevel::Centroids {
            self.cidx.retain(|e| e.kind != CatKind::Area);
            let centroids: Vec<LineId> = self
                .live_lines()
                .filter(|&l| self.line(l).is_some_and(|r| r.kind == FeatureType::Centroid))
                .collect();
            for c in centroids {
                self.set_centroid_link(c, CentroidLink::Outside);
            }
            for area in self.areas.iter_mut().flatten() {
                area.centroid = 0;
            }
        }
        if self.built >= BuildLevel::AttachIsles && level < BuildLevel::AttachIsles {
            for area in self.areas.iter_mut().flatten() {
                area.isles.clear();
            }
            for isle in self.isles.iter_mut().flatten() {
                isle.area = 0;
            }
        }
        if self.built >= BuildLevel::Areas && level < BuildLevel::Areas {
            for line in self.lines.iter_mut().flatten() {
                line.set_face(Side::Left, Face::None);
                line.set_face(Side::Right, Face::None);
            }
            self.areas.truncate(1);
            self.isles.truncate(1);
            self.spatial.areas.clear();
            self.spatial.isles.clear();
        }
        if level < BuildLevel::Base {
            self.nodes.truncate(1);
            self.lines.truncate(1);
            self.spatial.nodes.clear();
            self.spatial.lines.clear();
            self.cidx.clear();
        }
        tracing::debug!(from = ?self.built, to = ?level, "Degraded topology");
        self.built = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{LineCats, LinePoints};
    use crate::source::MemorySource;

    fn load(src: &mut MemorySource, kind: FeatureType, coords: &[(f64, f64)], cats: &[(i32, i32)]) {
        src.push(kind, &LinePoints::from_xy(coords), &LineCats::from_pairs(cats));
    }

    fn base(src: &mut MemorySource) -> Topology {
        let mut topo = Topology::new(false);
        let mut points = LinePoints::new();
        let mut cats = LineCats::new();
        let offsets: Vec<u64> = src.live_offsets().collect();
        for offset in offsets {
            let kind = src.read_at(offset, &mut points, &mut cats).unwrap();
            topo.add_feature(kind, offset, &points, &cats).unwrap();
        }
        topo
    }

    fn square_with_centroid() -> MemorySource {
        let mut src = MemorySource::new();
        load(
            &mut src,
            FeatureType::Boundary,
            &[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0), (0.0, 0.0)],
            &[],
        );
        load(&mut src, FeatureType::Centroid, &[(2.0, 2.0)], &[(1, 9)]);
        src
    }

    #[test]
    fn builds_every_level() {
        let mut src = square_with_centroid();
        let mut topo = base(&mut src);
        let report = topo.build_to(&mut src, BuildLevel::All, 10).unwrap();
        assert_eq!(report.level, BuildLevel::All);
        assert_eq!(report.areas, 1);
        assert_eq!(report.isles, 1);
        assert_eq!(report.labeled_areas, 1);
        assert!(report.issues.is_clean());
        assert_eq!(topo.cidx().find_ids(1, 9, CatKind::Area), vec![1]);
    }

    #[test]
    fn stops_at_the_requested_level() {
        let mut src = square_with_centroid();
        let mut topo = base(&mut src);
        topo.build_to(&mut src, BuildLevel::Areas, 0).unwrap();
        assert_eq!(topo.built(), BuildLevel::Areas);
        assert_eq!(topo.area(1).unwrap().centroid, 0);
        assert_eq!(topo.line(2).unwrap().centroid_link(), CentroidLink::Outside);
    }

    #[test]
    fn degrade_then_rebuild() {
        let mut src = square_with_centroid();
        let mut topo = base(&mut src);
        topo.build_to(&mut src, BuildLevel::All, 0).unwrap();

        topo.build_to(&mut src, BuildLevel::AttachIsles, 0).unwrap();
        assert_eq!(topo.area(1).unwrap().centroid, 0);
        assert!(topo.cidx().find_ids(1, 9, CatKind::Area).is_empty());
        assert_eq!(topo.cidx().find_ids(1, 9, CatKind::Centroid), vec![2]);

        topo.degrade_to(BuildLevel::Base);
        assert_eq!(topo.area_count(), 0);
        assert_eq!(topo.line_face(1, Side::Right), Face::None);

        topo.build_to(&mut src, BuildLevel::All, 0).unwrap();
        assert_eq!(topo.area_count(), 1);
        assert_eq!(topo.line(2).unwrap().centroid_link(), CentroidLink::Attached(1));
    }

    #[test]
    fn degrade_to_none_empties_the_store() {
        let mut src = square_with_centroid();
        let mut topo = base(&mut src);
        topo.build_to(&mut src, BuildLevel::All, 0).unwrap();
        topo.degrade_to(BuildLevel::None);
        assert_eq!(topo.live_line_count(), 0);
        assert_eq!(topo.node_count(), 0);
        assert!(topo.cidx().is_empty());
    }
}
