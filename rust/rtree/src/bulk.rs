// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sort-tile-recursive bulk loading.
//!
//! Used when a spatial index has to be rebuilt from scratch, e.g. after the
//! persisted copy turned out to be missing or unreadable. Groups are sized
//! evenly so every produced node respects the minimum fill.

use std::cmp::Ordering;

use crate::rect::{Dims, Rect};
use crate::tree::{Branch, Child, ItemId, Node, RTree, RTreeParams};

impl RTree {
    /// Builds a packed tree from `items` in one pass.
    pub fn bulk_load(dims: Dims, params: RTreeParams, items: Vec<(Rect, ItemId)>) -> RTree {
        let mut tree = RTree::with_params(dims, params);
        if items.is_empty() {
            return tree;
        }
        tree.nodes.clear();
        tree.len = items.len();

        let max = tree.params.max_children;
        let mut level = 0_u32;
        let mut entries: Vec<Branch> = items
            .into_iter()
            .map(|(rect, id)| Branch {
                rect,
                child: Child::Item(id),
            })
            .collect();

        while entries.len() > max {
            let mut parents = Vec::new();
            for group in tile(entries, max) {
                let rect = group.iter().fold(Rect::empty(), |acc, b| acc.union(&b.rect));
                let idx = tree.alloc(Node {
                    level,
                    branches: group,
                });
                parents.push(Branch {
                    rect,
                    child: Child::Node(idx),
                });
            }
            entries = parents;
            level += 1;
        }

        tree.root = tree.alloc(Node {
            level,
            branches: entries,
        });
        tree
    }
}

/// Splits `entries` into groups of at most `max`: vertical slices by x
/// center, then runs by y center inside each slice.
fn tile(mut entries: Vec<Branch>, max: usize) -> Vec<Vec<Branch>> {
    let groups = entries.len().div_ceil(max);
    let mut slices = 1_usize;
    while slices * slices < groups {
        slices += 1;
    }

    entries.sort_by(|a, b| by_center(a, b, 0));
    let mut out = Vec::with_capacity(groups);
    for mut slice in even_chunks(entries, slices) {
        slice.sort_by(|a, b| by_center(a, b, 1));
        let runs = slice.len().div_ceil(max);
        out.extend(even_chunks(slice, runs));
    }
    out
}

fn by_center(a: &Branch, b: &Branch, axis: usize) -> Ordering {
    a.rect
        .center(axis)
        .partial_cmp(&b.rect.center(axis))
        .unwrap_or(Ordering::Equal)
}

/// Cuts `v` into `parts` consecutive chunks whose sizes differ by at most one.
fn even_chunks(mut v: Vec<Branch>, parts: usize) -> Vec<Vec<Branch>> {
    let parts = parts.clamp(1, v.len().max(1));
    let base = v.len() / parts;
    let extra = v.len() % parts;
    let mut out = Vec::with_capacity(parts);
    for i in (0..parts).rev() {
        let size = base + usize::from(i < extra);
        let rest = v.split_off(v.len() - size);
        out.push(rest);
    }
    out.reverse();
    out
}
