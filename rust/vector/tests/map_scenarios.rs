// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology maintenance driven through a native map handle.

use std::path::Path;

use topovec_topology::{CatKind, CentroidLink};
use topovec_vector::{
    AccessLevel, BuildLevel, Error, FeatureType, Format, LineCats, LineId, LinePoints, Map,
    MapConfig, OpenMode,
};

fn square(x0: f64, y0: f64, size: f64) -> LinePoints {
    LinePoints::from_xy(&[
        (x0, y0),
        (x0, y0 + size),
        (x0 + size, y0 + size),
        (x0 + size, y0),
        (x0, y0),
    ])
}

fn new_map(dir: &Path) -> Map {
    Map::create(dir, Format::Native, false, &MapConfig::default()).unwrap()
}

fn boundary(map: &mut Map, points: &LinePoints) -> LineId {
    map.write(FeatureType::Boundary, points, &LineCats::new()).unwrap()
}

fn centroid(map: &mut Map, x: f64, y: f64, cat: i32) -> LineId {
    map.write(
        FeatureType::Centroid,
        &LinePoints::from_xy(&[(x, y)]),
        &LineCats::from_pairs(&[(1, cat)]),
    )
    .unwrap()
}

/// Every area ring starts where it ends.
fn assert_rings_closed(map: &mut Map) {
    let areas: Vec<i32> = map.topology().unwrap().area_ids().collect();
    let mut ring = LinePoints::new();
    for area in areas {
        assert!(map.area_points(area, &mut ring).unwrap());
        assert!(ring.is_closed(), "area {area} ring is open");
    }
}

/// Absolute boundary ids of the single isle of `area`.
fn isle_lines(map: &Map, area: i32) -> Vec<LineId> {
    let topo = map.topology().unwrap();
    let isles = &topo.area(area).unwrap().isles;
    assert_eq!(isles.len(), 1);
    let mut lines: Vec<LineId> =
        topo.isle(isles[0]).unwrap().boundaries.iter().map(|l| l.abs()).collect();
    lines.sort_unstable();
    lines
}

#[test]
fn square_with_duplicate_centroid() {
    let tmp = tempfile::tempdir().unwrap();
    let mut map = new_map(&tmp.path().join("square"));

    let ring = boundary(&mut map, &square(0.0, 0.0, 10.0));
    let topo = map.topology().unwrap();
    assert_eq!(topo.area_count(), 1);
    let area = topo.area_ids().next().unwrap();
    let lines: Vec<LineId> = topo.area(area).unwrap().boundaries.iter().map(|l| l.abs()).collect();
    assert_eq!(lines, vec![ring]);
    assert!(topo.area(area).unwrap().isles.is_empty());

    let first = centroid(&mut map, 5.0, 5.0, 1);
    assert!(map.last_report().is_clean());
    assert_eq!(map.find_area(5.0, 5.0).unwrap(), Some(area));
    assert_eq!(map.topology().unwrap().area(area).unwrap().centroid, first);

    let second = centroid(&mut map, 5.0, 5.0, 2);
    assert_eq!(map.last_report().duplicate_centroids, vec![second]);
    let topo = map.topology().unwrap();
    assert_eq!(topo.area(area).unwrap().centroid, first);
    assert_eq!(topo.line(second).unwrap().centroid_link(), CentroidLink::Duplicate(area));
    assert_eq!(topo.cidx().find_ids(1, 1, CatKind::Area), vec![area]);
    assert!(topo.cidx().find_ids(1, 2, CatKind::Area).is_empty());
}

#[test]
fn nesting_does_not_depend_on_write_order() {
    let rings = [
        ("C", square(0.0, 0.0, 30.0)),
        ("A", square(5.0, 5.0, 20.0)),
        ("B", square(10.0, 10.0, 10.0)),
    ];
    let orders: [[usize; 3]; 6] =
        [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    for order in orders {
        let tmp = tempfile::tempdir().unwrap();
        let mut map = new_map(&tmp.path().join("nested"));
        let mut ids = [0; 3];
        for &i in &order {
            ids[i] = boundary(&mut map, &rings[i].1);
            assert_rings_closed(&mut map);
        }
        let [c, a, b] = ids;

        let area_c = map.find_area(2.0, 2.0).unwrap().unwrap();
        let area_a = map.find_area(7.0, 7.0).unwrap().unwrap();
        let area_b = map.find_area(15.0, 15.0).unwrap().unwrap();
        assert_eq!(map.topology().unwrap().area_count(), 3, "order {order:?}");
        assert_eq!(isle_lines(&map, area_c), vec![a], "order {order:?}");
        assert_eq!(isle_lines(&map, area_a), vec![b], "order {order:?}");
        assert!(map.topology().unwrap().area(area_b).unwrap().isles.is_empty());

        // The outermost isle lies at the top level.
        let topo = map.topology().unwrap();
        let outer = topo
            .isle_ids()
            .find(|&i| topo.isle(i).unwrap().boundaries.iter().any(|l| l.abs() == c))
            .unwrap();
        assert_eq!(topo.isle_area(outer), None);
        approx::assert_relative_eq!(map.area_size(area_c).unwrap(), 900.0 - 400.0);
    }
}

#[test]
fn shared_boundary_delete_and_restore() {
    let tmp = tempfile::tempdir().unwrap();
    let mut map = new_map(&tmp.path().join("pair"));

    let west = LinePoints::from_xy(&[(5.0, 0.0), (0.0, 0.0), (0.0, 10.0), (5.0, 10.0)]);
    let east = LinePoints::from_xy(&[(5.0, 0.0), (10.0, 0.0), (10.0, 10.0), (5.0, 10.0)]);
    let west = boundary(&mut map, &west);
    let east = boundary(&mut map, &east);
    let shared = boundary(&mut map, &LinePoints::from_xy(&[(5.0, 0.0), (5.0, 10.0)]));
    centroid(&mut map, 2.5, 5.0, 1);
    centroid(&mut map, 7.5, 5.0, 2);
    assert_rings_closed(&mut map);
    let before = map.topology().unwrap().snapshot();
    assert_eq!(map.topology().unwrap().area_count(), 2);

    map.delete(shared).unwrap();
    assert_rings_closed(&mut map);
    assert_eq!(map.topology().unwrap().area_count(), 1);
    let merged = map.find_area(2.5, 5.0).unwrap().unwrap();
    assert_eq!(map.find_area(7.5, 5.0).unwrap(), Some(merged));
    let mut ring: Vec<LineId> = map
        .topology()
        .unwrap()
        .area(merged)
        .unwrap()
        .boundaries
        .iter()
        .map(|l| l.abs())
        .collect();
    ring.sort_unstable();
    assert_eq!(ring, vec![west, east]);
    assert!(matches!(
        map.read_at(shared, &mut LinePoints::new(), &mut LineCats::new()),
        Err(Error::Topology(_))
    ));

    map.restore(shared).unwrap();
    assert_rings_closed(&mut map);
    assert_eq!(map.topology().unwrap().snapshot(), before);
    let west_area = map.find_area(2.5, 5.0).unwrap().unwrap();
    let east_area = map.find_area(7.5, 5.0).unwrap().unwrap();
    assert_ne!(west_area, east_area);
    let cidx = map.cidx().unwrap();
    assert_eq!(cidx.find_ids(1, 1, CatKind::Area), vec![west_area]);
    assert_eq!(cidx.find_ids(1, 2, CatKind::Area), vec![east_area]);

    // Rewriting with the same geometry yields an equivalent topology.
    let same = LinePoints::from_xy(&[(5.0, 0.0), (5.0, 10.0)]);
    let rewritten = map.rewrite(shared, FeatureType::Boundary, &same, &LineCats::new()).unwrap();
    assert_ne!(rewritten, shared);
    assert!(map.topology().unwrap().line(shared).is_none());
    assert_eq!(map.topology().unwrap().area_count(), 2);
    assert_rings_closed(&mut map);

    map.close().unwrap();
    let config = MapConfig::default();
    let map = Map::open(&tmp.path().join("pair"), OpenMode::Read, AccessLevel::Topology, &config)
        .unwrap()
        .into_map();
    assert_eq!(map.topology().unwrap().area_count(), 2);
    assert_eq!(map.topology().unwrap().live_line_count(), 5);
}

#[test]
fn update_log_and_partial_builds() {
    let tmp = tempfile::tempdir().unwrap();
    let mut map = new_map(&tmp.path().join("levels"));
    map.set_update_log(true).unwrap();

    let ring = boundary(&mut map, &square(0.0, 0.0, 10.0));
    assert!(map.update_log().unwrap().lines.contains(&ring));
    centroid(&mut map, 5.0, 5.0, 9);

    let report = map.build_partial(BuildLevel::Base).unwrap();
    assert_eq!(report.level, BuildLevel::Base);
    assert_eq!(map.built(), BuildLevel::Base);
    assert_eq!(map.topology().unwrap().area_count(), 0);

    let report = map.build_partial(BuildLevel::All).unwrap();
    assert_eq!(report.areas, 1);
    assert_eq!(report.labeled_areas, 1);
    assert_eq!(map.built(), BuildLevel::All);
    assert_eq!(map.cidx().unwrap().find_ids(1, 9, CatKind::Area).len(), 1);
}
