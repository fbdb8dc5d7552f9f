// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end maintenance scenarios over an in-memory geometry source.

use topovec_topology::geometry::{point_in_ring, RingLocation};
use topovec_topology::serialization::{AreaSnapshot, IsleSnapshot};
use topovec_topology::{
    BuildLevel, CatKind, CentroidLink, FeatureType, GeometrySource, LineCats, LineId, LinePoints,
    MaintenanceReport, MemorySource, Topology,
};

struct Map {
    topo: Topology,
    src: MemorySource,
}

impl Map {
    fn new() -> Self {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        Self {
            topo,
            src: MemorySource::new(),
        }
    }

    fn write(
        &mut self,
        kind: FeatureType,
        coords: &[(f64, f64)],
        cats: &[(i32, i32)]) -> (LineId, MaintenanceReport,
    ) {
        let points = LinePoints::from_xy(coords);
        let cats = LineCats::from_pairs(cats);
        let offset = self.src.push(kind, &points, &cats);
        self.topo
            .write_line(&mut self.src, kind, offset, &points, &cats)
            .unwrap()
    }

    fn boundary(&mut self, coords: &[(f64, f64)]) -> LineId {
        self.write(FeatureType::Boundary, coords, &[]).0
    }

    fn centroid(&mut self, x: f64, y: f64, cat: i32) -> (LineId, MaintenanceReport) {
        self.write(FeatureType::Centroid, &[(x, y)], &[(1, cat)])
    }

    fn delete(&mut self, line: LineId) {
        let offset = self.topo.line(line).unwrap().offset;
        self.topo.delete_line(&mut self.src, line).unwrap();
        self.src.set_alive(offset, false).unwrap();
    }

    fn restore(&mut self, line: LineId) {
        let offset = self.topo.line_record(line).unwrap().offset;
        self.src.set_alive(offset, true).unwrap();
        self.topo.restore_line(&mut self.src, line).unwrap();
    }

    /// Area labeled by the centroid with category `cat` in layer 1.
    fn area_of_cat(&self, cat: i32) -> Vec<i32> {
        self.topo.cidx().find_ids(1, cat, CatKind::Area)
    }

    /// Rebuilds the same data from scratch with a full build.
    fn full_build(&mut self) -> Topology {
        let mut topo = Topology::new(false);
        let mut points = LinePoints::new();
        let mut cats = LineCats::new();
        let offsets: Vec<u64> = self.src.live_offsets().collect();
        for offset in offsets {
            let kind = self.src.read_at(offset, &mut points, &mut cats).unwrap();
            topo.add_feature(kind, offset, &points, &cats).unwrap();
        }
        topo.build_to(&mut self.src, BuildLevel::All, 0).unwrap();
        topo
    }

    /// Checks ring closure, face back-references and isle containment.
    fn check(&mut self) {
        let topo = &self.topo;
        let rings = topo
            .area_ids()
            .map(|a| (topo.area_boundaries(a).unwrap().to_vec(), true, a))
            .chain(topo.isle_ids().map(|i| (topo.isle_boundaries(i).unwrap().to_vec(), false, i)));
        for (ring, is_area, id) in rings {
            assert!(!ring.is_empty());
            for (i, &line) in ring.iter().enumerate() {
                let next = ring[(i + 1) % ring.len()];
                assert_eq!(
                    topo.line_node(-line),
                    topo.line_node(next),
                    "ring {ring:?} breaks after {line}"
                );
                let side = topovec_topology::Side::of_signed(line);
                let face = topo.line_face(line, side);
                let expected = if is_area {
                    topovec_topology::Face::Area(id)
                } else {
                    topovec_topology::Face::Isle(id)
                };
                assert_eq!(face, expected);
            }
        }

        let areas: Vec<i32> = topo.area_ids().collect();
        for area in areas {
            let isles = self.topo.area_isles(area).unwrap().to_vec();
            if isles.is_empty() {
                continue;
            }
            let mut outer = LinePoints::new();
            self.topo.area_points(&mut self.src, area, &mut outer).unwrap();
            let mut isle_rings = Vec::new();
            for isle in isles {
                let mut ring = LinePoints::new();
                self.topo.isle_points(&mut self.src, isle, &mut ring).unwrap();
                for p in ring.iter() {
                    assert_eq!(point_in_ring(p.x, p.y, outer.as_slice()), RingLocation::Inside);
                }
                isle_rings.push(ring);
            }
            for (i, a) in isle_rings.iter().enumerate() {
                for (j, b) in isle_rings.iter().enumerate() {
                    if i != j {
                        let p = a.first().unwrap();
                        assert_eq!(point_in_ring(p.x, p.y, b.as_slice()), RingLocation::Outside);
                    }
                }
            }
        }
    }
}

/// Clockwise square with its lower-left corner at `(x, y)`.
fn square(x: f64, y: f64, side: f64) -> Vec<(f64, f64)> {
    vec![(x, y), (x, y + side), (x + side, y + side), (x + side, y), (x, y)]
}

#[test]
fn single_square_with_duplicate_centroid() {
    let mut map = Map::new();
    let ring = map.boundary(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]);
    assert_eq!(map.topo.area_count(), 1);
    let area = map.topo.area_ids().next().unwrap();
    assert_eq!(map.topo.area_boundaries(area).unwrap(), &[-ring]);
    assert!(map.topo.area_isles(area).unwrap().is_empty());

    let (first, report) = map.centroid(5.0, 5.0, 1);
    assert!(report.is_clean());
    assert_eq!(map.topo.centroid_area(first), CentroidLink::Attached(area));

    let (second, report) = map.centroid(5.0, 5.0, 2);
    assert_eq!(report.duplicate_centroids, vec![second]);
    assert_eq!(map.topo.centroid_area(second), CentroidLink::Duplicate(area));
    assert_eq!(map.topo.area_centroid(area), Some(first));
    assert_eq!(map.area_of_cat(1), vec![area]);
    assert!(map.area_of_cat(2).is_empty());
    map.check();
}

#[test]
fn centroid_outside_every_area() {
    let mut map = Map::new();
    map.boundary(&square(0.0, 0.0, 10.0));
    let (c, report) = map.centroid(50.0, 50.0, 1);
    assert_eq!(report.outside_centroids, vec![c]);
    assert_eq!(map.topo.centroid_area(c), CentroidLink::Outside);
}

#[test]
fn nesting_does_not_depend_on_write_order() {
    let rings = [
        ("C", square(0.0, 0.0, 30.0)),
        ("A", square(5.0, 5.0, 20.0)),
        ("B", square(10.0, 10.0, 10.0)),
    ];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let mut map = Map::new();
        let mut ids = [0; 3];
        for i in order {
            ids[i] = map.boundary(&rings[i].1);
            map.check();
        }
        let [c, a, b] = ids;

        let snapshot = map.topo.snapshot();
        let mut expected_areas = vec![
            AreaSnapshot {
                ring: vec![c],
                centroid: 0,
                isles: vec![vec![-a]],
            },
            AreaSnapshot {
                ring: vec![a],
                centroid: 0,
                isles: vec![vec![-b]],
            },
            AreaSnapshot {
                ring: vec![b],
                centroid: 0,
                isles: vec![],
            },
        ];
        expected_areas.sort();
        assert_eq!(snapshot.areas, expected_areas, "order {order:?}");

        let mut expected_isles = vec![
            IsleSnapshot {
                ring: vec![-c],
                area: None,
            },
            IsleSnapshot {
                ring: vec![-a],
                area: Some(vec![c]),
            },
            IsleSnapshot {
                ring: vec![-b],
                area: Some(vec![a]),
            },
        ];
        expected_isles.sort();
        assert_eq!(snapshot.isles, expected_isles, "order {order:?}");
    }
}

/// Two 10x10 squares sharing the edge x = 10, with one centroid each.
fn two_squares(map: &mut Map) -> LineId {
    map.boundary(&[(10.0, 0.0), (0.0, 0.0), (0.0, 10.0), (10.0, 10.0)]);
    let shared = map.boundary(&[(10.0, 0.0), (10.0, 10.0)]);
    map.boundary(&[(10.0, 10.0), (20.0, 10.0), (20.0, 0.0), (10.0, 0.0)]);
    map.centroid(5.0, 5.0, 1);
    map.centroid(15.0, 5.0, 2);
    shared
}

#[test]
fn deleting_a_shared_boundary_merges_areas() {
    let mut map = Map::new();
    let shared = two_squares(&mut map);
    assert_eq!(map.topo.area_count(), 2);
    assert_ne!(map.area_of_cat(1), map.area_of_cat(2));

    map.delete(shared);
    map.check();
    assert_eq!(map.topo.area_count(), 1);
    let merged = map.topo.area_ids().next().unwrap();
    let mut ring: Vec<LineId> =
        map.topo.area_boundaries(merged).unwrap().iter().map(|l| l.abs()).collect();
    ring.sort_unstable();
    assert_eq!(ring, vec![1, 3]);
    assert_eq!(map.area_of_cat(1), vec![merged]);
    assert!(map.area_of_cat(2).is_empty());
    assert!(matches!(map.topo.centroid_area(5), CentroidLink::Duplicate(_)));

    // Writing the same geometry again splits the area back.
    map.boundary(&[(10.0, 0.0), (10.0, 10.0)]);
    map.check();
    assert_eq!(map.topo.area_count(), 2);
    let left = map.topo.find_area(&mut map.src, 5.0, 5.0).unwrap().unwrap();
    let right = map.topo.find_area(&mut map.src, 15.0, 5.0).unwrap().unwrap();
    assert_eq!(map.area_of_cat(1), vec![left]);
    assert_eq!(map.area_of_cat(2), vec![right]);
    assert_eq!(map.topo.centroid_area(4), CentroidLink::Attached(left));
    assert_eq!(map.topo.centroid_area(5), CentroidLink::Attached(right));
}

#[test]
fn delete_then_restore_is_idempotent() {
    let mut map = Map::new();
    two_squares(&mut map);
    map.boundary(&square(2.0, 2.0, 2.0));
    map.centroid(3.0, 3.0, 3);
    let before = map.topo.snapshot();

    let lines: Vec<LineId> = map.topo.live_lines().collect();
    for line in lines {
        map.delete(line);
        map.check();
        map.restore(line);
        map.check();
        assert_eq!(map.topo.snapshot(), before, "after deleting and restoring {line}");
    }
    for cat in 1..=3 {
        let areas = map.area_of_cat(cat);
        assert_eq!(areas.len(), 1);
        assert!(map.topo.area_centroid(areas[0]).is_some());
    }
}

#[test]
fn ring_closed_by_a_single_boundary() {
    let mut map = Map::new();
    let ring = map.boundary(&square(0.0, 0.0, 4.0));
    let (left, right) = map.topo.line_faces(ring).unwrap();
    assert!(matches!(right, topovec_topology::Face::Area(_)));
    assert!(matches!(left, topovec_topology::Face::Isle(_)));
    assert_eq!(map.topo.line_nodes(ring).map(|(s, e)| s == e), Some(true));
}

/// Small linear congruential generator for reproducible shuffles.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

/// Unit segments of an `n` x `n` grid plus a centroid per cell.
fn grid(n: usize) -> Vec<(FeatureType, Vec<(f64, f64)>, i32)> {
    let mut features = Vec::new();
    for i in 0..=n {
        for j in 0..n {
            let (i, j) = (i as f64, j as f64);
            features.push((FeatureType::Boundary, vec![(j, i), (j + 1.0, i)], 0));
            features.push((FeatureType::Boundary, vec![(i, j), (i, j + 1.0)], 0));
        }
    }
    for i in 0..n {
        for j in 0..n {
            let cat = (i * n + j + 1) as i32;
            features.push((FeatureType::Centroid, vec![(i as f64 + 0.5, j as f64 + 0.5)], cat));
        }
    }
    features
}

#[test]
fn incremental_edits_match_a_full_build() {
    for seed in [1, 7, 42] {
        let mut features = grid(3);
        let mut rng = Lcg(seed);
        rng.shuffle(&mut features);

        let mut map = Map::new();
        for (kind, coords, cat) in &features {
            let cats: Vec<(i32, i32)> = if *cat > 0 { vec![(1, *cat)] } else { vec![] };
            map.write(*kind, coords, &cats);
            map.check();
        }
        assert_eq!(map.topo.area_count(), 9);
        for cat in 1..=9 {
            assert_eq!(map.area_of_cat(cat).len(), 1, "seed {seed} cat {cat}");
        }

        let full = map.full_build();
        assert_eq!(map.topo.snapshot(), full.snapshot(), "seed {seed}");

        let mut boundaries: Vec<LineId> = map
            .topo
            .live_lines()
            .filter(|&l| map.topo.line(l).unwrap().kind == FeatureType::Boundary)
            .collect();
        rng.shuffle(&mut boundaries);
        for &line in boundaries.iter().take(6) {
            map.delete(line);
            map.check();
        }
        for &line in boundaries.iter().take(6).rev() {
            map.restore(line);
            map.check();
        }
        assert_eq!(map.topo.snapshot(), full.snapshot(), "seed {seed} after restores");
    }
}
