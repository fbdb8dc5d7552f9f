// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Category index: `(layer, category)` to primitive ids.
//!
//! A single array kept sorted by `(layer, cat, kind, id)`. Insertion finds its
//! slot by binary search and shifts the tail; lookups binary-search the start
//! of a `(layer, cat)` run and scan it.

use serde::{Deserialize, Serialize};

use crate::geometry::LineCats;
use crate::keys::CatKind;

/// One index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatEntry {
    pub layer: i32,
    pub cat: i32,
    pub kind: CatKind,
    /// Line id, or area id for [`CatKind::Area`].
    pub id: i32,
}

/// Entry counts for one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer: i32,
    pub entries: usize,
    pub unique_cats: usize,
    pub points: usize,
    pub lines: usize,
    pub boundaries: usize,
    pub centroids: usize,
    pub areas: usize,
}

/// Sorted `(layer, category)` index over live primitives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryIndex {
    entries: Vec<CatEntry>,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from entries in any order.
    pub fn from_entries(mut entries: Vec<CatEntry>) -> Self {
        entries.sort_unstable();
        entries.dedup();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Inserts an entry at its sorted position. Returns `false` if the exact
    /// entry is already present.
    pub fn add(&mut self, layer: i32, cat: i32, kind: CatKind, id: i32) -> bool {
        let entry = CatEntry {
            layer,
            cat,
            kind,
            id,
        };
        match self.entries.binary_search(&entry) {
            Ok(_) => false,
            Err(pos) => {
                self.entries.insert(pos, entry);
                true
            }
        }
    }

    /// Removes the exact `(layer, cat, kind, id)` entry.
    pub fn delete(&mut self, layer: i32, cat: i32, kind: CatKind, id: i32) -> bool {
        let entry = CatEntry {
            layer,
            cat,
            kind,
            id,
        };
        match self.entries.binary_search(&entry) {
            Ok(pos) => {
                self.entries.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Keeps only the entries matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&CatEntry) -> bool) {
        self.entries.retain(keep);
    }

    /// Adds every pair of `cats` for one primitive.
    pub fn add_cats(&mut self, cats: &LineCats, kind: CatKind, id: i32) {
        for (layer, cat) in cats.iter() {
            self.add(layer, cat, kind, id);
        }
    }

    /// Removes every pair of `cats` for one primitive. Returns how many
    /// entries were missing.
    pub fn delete_cats(&mut self, cats: &LineCats, kind: CatKind, id: i32) -> usize {
        cats.iter()
            .filter(|&(layer, cat)| !self.delete(layer, cat, kind, id))
            .count()
    }

    /// All entries tagged `(layer, cat)`.
    pub fn find(&self, layer: i32, cat: i32) -> &[CatEntry] {
        let start = self
            .entries
            .partition_point(|e| (e.layer, e.cat) < (layer, cat));
        let len = self.entries[start..]
            .iter()
            .take_while(|e| e.layer == layer && e.cat == cat)
            .count();
        &self.entries[start..start + len]
    }

    /// Ids of `kind` primitives tagged `(layer, cat)`.
    pub fn find_ids(&self, layer: i32, cat: i32, kind: CatKind) -> Vec<i32> {
        self.find(layer, cat)
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .collect()
    }

    /// Entries of `layer` with `min <= cat <= max`.
    pub fn find_range(&self, layer: i32, min: i32, max: i32) -> &[CatEntry] {
        if min > max {
            return &[];
        }
        let start = self.entries.partition_point(|e| (e.layer, e.cat) < (layer, min));
        let end = self.entries.partition_point(|e| (e.layer, e.cat) <= (layer, max));
        &self.entries[start..end.max(start)]
    }

    /// Entries of `layer` whose category is in `cats`.
    pub fn find_list(&self, layer: i32, cats: &[i32]) -> Vec<CatEntry> {
        let mut sorted = cats.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .flat_map(|cat| self.find(layer, cat).iter().copied())
            .collect()
    }

    /// Layers present, ascending.
    pub fn layers(&self) -> Vec<i32> {
        let mut layers: Vec<i32> = self.entries.iter().map(|e| e.layer).collect();
        layers.dedup();
        layers
    }

    /// Entry and per-type counts for `layer`.
    pub fn layer_stats(&self, layer: i32) -> LayerStats {
        let start = self.entries.partition_point(|e| e.layer < layer);
        let run = self.entries[start..]
            .iter()
            .take_while(|e| e.layer == layer);

        let mut stats = LayerStats {
            layer,
            ..LayerStats::default()
        };
        let mut last_cat = None;
        for e in run {
            stats.entries += 1;
            if last_cat != Some(e.cat) {
                stats.unique_cats += 1;
                last_cat = Some(e.cat);
            }
            match e.kind {
                CatKind::Point => stats.points += 1,
                CatKind::Line => stats.lines += 1,
                CatKind::Boundary => stats.boundaries += 1,
                CatKind::Centroid => stats.centroids += 1,
                CatKind::Area => stats.areas += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CategoryIndex {
        let mut cidx = CategoryIndex::new();
        cidx.add(1, 20, CatKind::Line, 4);
        cidx.add(1, 10, CatKind::Point, 2);
        cidx.add(2, 10, CatKind::Area, 1);
        cidx.add(1, 10, CatKind::Centroid, 7);
        cidx.add(1, 10, CatKind::Area, 3);
        cidx.add(1, 30, CatKind::Point, 5);
        cidx
    }

    #[test]
    fn insertion_keeps_order() {
        let cidx = sample();
        let entries = cidx.entries();
        assert!(entries.windows(2).all(|w| w[0] < w[1]));
        assert!(!sample().add(1, 10, CatKind::Point, 2));
    }

    #[test]
    fn lookup_returns_the_whole_run() {
        let cidx = sample();
        let run = cidx.find(1, 10);
        assert_eq!(run.len(), 3);
        assert_eq!(cidx.find_ids(1, 10, CatKind::Area), vec![3]);
        assert!(cidx.find(1, 11).is_empty());
        assert!(cidx.find(3, 10).is_empty());
    }

    #[test]
    fn delete_needs_the_exact_tuple() {
        let mut cidx = sample();
        assert!(!cidx.delete(1, 10, CatKind::Point, 99));
        assert!(cidx.delete(1, 10, CatKind::Point, 2));
        assert_eq!(cidx.find(1, 10).len(), 2);
    }

    #[test]
    fn range_and_list_queries() {
        let cidx = sample();
        assert_eq!(cidx.find_range(1, 15, 30).len(), 2);
        assert!(cidx.find_range(1, 30, 15).is_empty());
        let listed = cidx.find_list(1, &[30, 20, 20]);
        assert_eq!(listed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn layer_statistics() {
        let cidx = sample();
        assert_eq!(cidx.layers(), vec![1, 2]);
        let stats = cidx.layer_stats(1);
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.unique_cats, 3);
        assert_eq!(stats.points, 2);
        assert_eq!(stats.areas, 1);
        assert_eq!(cidx.layer_stats(7).entries, 0);
    }

    #[test]
    fn cat_sets_round_trip() {
        let mut cidx = CategoryIndex::new();
        let cats = LineCats::from_pairs(&[(1, 5), (2, 6)]);
        cidx.add_cats(&cats, CatKind::Boundary, 11);
        assert_eq!(cidx.len(), 2);
        assert_eq!(cidx.delete_cats(&cats, CatKind::Boundary, 11), 0);
        assert!(cidx.is_empty());
        assert_eq!(cidx.delete_cats(&cats, CatKind::Boundary, 11), 2);
    }
}
