// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access to stored geometry from inside the topology engine.
//!
//! The store only keeps boxes and ids; whenever the engine needs vertices
//! (to close a ring, to test a point against an area) it asks the backend
//! through [`GeometrySource`], addressing features by the offset recorded in
//! their line record.

use crate::error::{Error, Result};
use crate::geometry::{LineCats, LinePoints};
use crate::keys::FeatureType;

/// Reads stored primitives by backend offset.
pub trait GeometrySource {
    /// Fills `points` and `cats` with the primitive stored at `offset`.
    fn read_at(
        &mut self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType>;
}

/// A primitive kept in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFeature {
    pub kind: FeatureType,
    pub points: LinePoints,
    pub cats: LineCats,
    pub alive: bool,
}

/// Vec-backed geometry store whose offsets are vector indexes.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    features: Vec<MemoryFeature>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a feature and returns its offset.
    pub fn push(&mut self, kind: FeatureType, points: &LinePoints, cats: &LineCats) -> u64 {
        self.features.push(MemoryFeature {
            kind,
            points: points.clone(),
            cats: cats.clone(),
            alive: true,
        });
        (self.features.len() - 1) as u64
    }

    pub fn get(&self, offset: u64) -> Option<&MemoryFeature> {
        self.features.get(offset as usize)
    }

    pub fn set_alive(&mut self, offset: u64, alive: bool) -> Result<()> {
        let feature = self
            .features
            .get_mut(offset as usize)
            .ok_or_else(|| Error::Source(format!("no feature at offset {offset}")))?;
        feature.alive = alive;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Offsets of live features, in storage order.
    pub fn live_offsets(&self) -> impl Iterator<Item = u64> + '_ {
        self.features
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive)
            .map(|(i, _)| i as u64)
    }
}

impl GeometrySource for MemorySource {
    fn read_at(
        &mut self,
        offset: u64,
        points: &mut LinePoints,
        cats: &mut LineCats,
    ) -> Result<FeatureType> {
        let feature = self
            .features
            .get(offset as usize)
            .ok_or_else(|| Error::Source(format!("no feature at offset {offset}")))?;
        points.clone_from(&feature.points);
        cats.clone_from(&feature.cats);
        Ok(feature.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_positions() {
        let mut source = MemorySource::new();
        let points = LinePoints::from_xy(&[(1.0, 2.0)]);
        let cats = LineCats::from_pairs(&[(1, 3)]);
        assert_eq!(source.push(FeatureType::Point, &points, &cats), 0);
        assert_eq!(source.push(FeatureType::Centroid, &points, &cats), 1);

        let mut p = LinePoints::new();
        let mut c = LineCats::new();
        assert_eq!(source.read_at(1, &mut p, &mut c).unwrap(), FeatureType::Centroid);
        assert_eq!(p, points);
        assert_eq!(c.get(1), Some(3));
        assert!(source.read_at(5, &mut p, &mut c).is_err());
    }

    #[test]
    fn dead_features_are_skipped_by_live_offsets() {
        let mut source = MemorySource::new();
        let points = LinePoints::from_xy(&[(0.0, 0.0)]);
        for _ in 0..3 {
            source.push(FeatureType::Point, &points, &LineCats::new());
        }
        source.set_alive(1, false).unwrap();
        assert_eq!(source.live_offsets().collect::<Vec<_>>(), vec![0, 2]);
    }
}
