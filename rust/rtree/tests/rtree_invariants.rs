// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mixed insert/remove workloads checked against a brute-force list.

use std::ops::ControlFlow;

use topovec_rtree::{ByteOrder, Dims, ItemId, RTree, RTreeParams, Rect};

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn rect(&mut self, dims: Dims) -> Rect {
        let x = self.next_f64() * 1000.0;
        let y = self.next_f64() * 1000.0;
        let w = self.next_f64() * 20.0;
        let h = self.next_f64() * 20.0;
        match dims {
            Dims::Two => Rect::new_2d(x, y, x + w, y + h),
            Dims::Three => {
                let z = self.next_f64() * 100.0;
                Rect::new_3d([x, y, z], [x + w, y + h, z + 5.0])
            }
        }
    }
}

fn brute_force(items: &[(Rect, ItemId)], query: &Rect, dims: Dims) -> Vec<ItemId> {
    let mut ids: Vec<_> = items
        .iter()
        .filter(|(r, _)| r.overlaps(query, dims))
        .map(|(_, id)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

fn sorted(mut ids: Vec<ItemId>) -> Vec<ItemId> {
    ids.sort_unstable();
    ids
}

fn churn(dims: Dims, params: RTreeParams) {
    let mut rng = Lcg(42);
    let mut tree = RTree::with_params(dims, params);
    let mut live: Vec<(Rect, ItemId)> = Vec::new();

    for id in 0..600 {
        let rect = rng.rect(dims);
        tree.insert(rect, id);
        live.push((rect, id));
        assert!(tree.search_ids(&rect).contains(&id));
        tree.check().unwrap();

        // Remove roughly every third entry along the way.
        if id % 3 == 2 {
            let victim = (rng.next_f64() * live.len() as f64) as usize % live.len();
            let (rect, gone) = live.swap_remove(victim);
            assert!(tree.remove(&rect, gone));
            assert!(!tree.search_ids(&rect).contains(&gone));
            tree.check().unwrap();
        }
    }

    assert_eq!(tree.len(), live.len());
    for _ in 0..50 {
        let query = rng.rect(dims);
        let query = Rect::new_3d(
            query.min,
            [query.max[0] + 80.0, query.max[1] + 80.0, query.max[2] + 10.0],
        );
        assert_eq!(sorted(tree.search_ids(&query)), brute_force(&live, &query, dims));
    }

    for (rect, id) in live.drain(..) {
        assert!(tree.remove(&rect, id));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    tree.check().unwrap();
}

#[test]
fn planar_churn_keeps_invariants() {
    churn(Dims::Two, RTreeParams::default());
}

#[test]
fn small_fanout_churn_keeps_invariants() {
    churn(Dims::Two, RTreeParams::with_max_children(4));
}

#[test]
fn churn_without_forced_reinsertion() {
    churn(Dims::Two, RTreeParams::with_max_children(8).with_reinsert_percent(0));
}

#[test]
fn volumetric_churn_keeps_invariants() {
    churn(Dims::Three, RTreeParams::with_max_children(6));
}

#[test]
fn duplicate_boxes_are_told_apart_by_id() {
    let mut tree = RTree::new(Dims::Two);
    let rect = Rect::new_2d(5.0, 5.0, 6.0, 6.0);
    for id in 1..=40 {
        tree.insert(rect, id);
    }
    assert!(tree.remove(&rect, 17));
    let ids = sorted(tree.search_ids(&rect));
    assert_eq!(ids.len(), 39);
    assert!(!ids.contains(&17));
    tree.check().unwrap();
}

#[test]
fn search_visitor_can_stop_after_first_hit() {
    let mut tree = RTree::new(Dims::Two);
    for id in 0..100 {
        let x = f64::from(id);
        tree.insert(Rect::new_2d(x, 0.0, x + 0.5, 0.5), id);
    }
    let mut first = None;
    let visited = tree.search(&Rect::new_2d(0.0, 0.0, 100.0, 1.0), |id, _| {
        first = Some(id);
        ControlFlow::Break(())
    });
    assert_eq!(visited, 1);
    assert!(first.is_some());
}

#[test]
fn encoded_tree_answers_like_the_original() {
    let mut rng = Lcg(7);
    let mut tree = RTree::new(Dims::Two);
    let mut items = Vec::new();
    for id in 1..=300 {
        let rect = rng.rect(Dims::Two);
        tree.insert(rect, id);
        items.push((rect, id));
    }

    let mut buf = Vec::new();
    tree.write_to(&mut buf, ByteOrder::Big);
    let back = RTree::read_from(&mut &buf[..], ByteOrder::Big).unwrap();
    assert_eq!(back.len(), tree.len());
    assert_eq!(back.height(), tree.height());

    let query = Rect::new_2d(200.0, 200.0, 600.0, 600.0);
    assert_eq!(sorted(back.search_ids(&query)), brute_force(&items, &query, Dims::Two));
}
