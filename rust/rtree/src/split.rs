// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quadratic node split.

use crate::rect::{Dims, Rect};
use crate::tree::Branch;

/// Distributes an overflowing node's branches into two groups, each holding
/// at least `min_fill` entries.
pub(crate) fn quadratic_partition(
    mut branches: Vec<Branch>,
    min_fill: usize,
    dims: Dims,
) -> (Vec<Branch>, Vec<Branch>) {
    let total = branches.len();
    let min_fill = min_fill.min(total / 2).max(1);

    let (seed_a, seed_b) = pick_seeds(&branches, dims);
    // Remove the higher index first so the lower one stays valid.
    let second = branches.swap_remove(seed_a.max(seed_b));
    let first = branches.swap_remove(seed_a.min(seed_b));

    let mut cover = [first.rect, second.rect];
    let mut groups = [vec![first], vec![second]];

    while !branches.is_empty() {
        // Once a group needs every remaining entry to reach its minimum,
        // it takes them all.
        for g in 0..2 {
            if groups[g].len() + branches.len() <= min_fill {
                for b in branches.drain(..) {
                    cover[g].extend(&b.rect);
                    groups[g].push(b);
                }
            }
        }
        if branches.is_empty() {
            break;
        }

        let (pick, d0, d1) = pick_next(&branches, &cover, dims);
        let b = branches.swap_remove(pick);
        let g = if d0 != d1 {
            usize::from(d1 < d0)
        } else {
            let m0 = cover[0].measure(dims);
            let m1 = cover[1].measure(dims);
            if m0 != m1 {
                usize::from(m1 < m0)
            } else {
                usize::from(groups[1].len() < groups[0].len())
            }
        };
        cover[g].extend(&b.rect);
        groups[g].push(b);
    }

    let [a, b] = groups;
    (a, b)
}

/// The pair whose common box wastes the most space.
fn pick_seeds(branches: &[Branch], dims: Dims) -> (usize, usize) {
    let mut best = (0, 1);
    let mut worst_waste = f64::NEG_INFINITY;
    for i in 0..branches.len() {
        for j in i + 1..branches.len() {
            let a = &branches[i].rect;
            let b = &branches[j].rect;
            let waste = a.union(b).measure(dims) - a.measure(dims) - b.measure(dims);
            if waste > worst_waste {
                worst_waste = waste;
                best = (i, j);
            }
        }
    }
    best
}

/// The entry with the strongest preference for one group, with its
/// enlargement cost for each group.
fn pick_next(branches: &[Branch], cover: &[Rect; 2], dims: Dims) -> (usize, f64, f64) {
    let mut best = (0, 0.0, 0.0);
    let mut best_diff = f64::NEG_INFINITY;
    for (i, b) in branches.iter().enumerate() {
        let d0 = cover[0].enlargement(&b.rect, dims);
        let d1 = cover[1].enlargement(&b.rect, dims);
        let diff = (d0 - d1).abs();
        if diff > best_diff {
            best_diff = diff;
            best = (i, d0, d1);
        }
    }
    best
}
