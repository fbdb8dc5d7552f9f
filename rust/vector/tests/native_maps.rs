// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native map directories: persistence, degraded opens, locking and reads.

use std::fs;
use std::path::Path;

use topovec_rtree::ByteOrder;
use topovec_vector::backend::native::{CIDX_FILE, SIDX_FILE};
use topovec_vector::lock::LOCK_FILE;
use topovec_vector::{
    AccessLevel, Error, FeatureType, Format, LineCats, LinePoints, Map, MapConfig, OpenMode, Opened,
    PrimitiveClass, ReadOutcome, Rect, TypeMask,
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

fn point(x: f64, y: f64) -> LinePoints {
    LinePoints::from_xy(&[(x, y)])
}

fn cats(pairs: &[(i32, i32)]) -> LineCats {
    LineCats::from_pairs(pairs)
}

fn open(dir: &Path, mode: OpenMode, level: AccessLevel) -> Map {
    Map::open(dir, mode, level, &MapConfig::default()).unwrap().into_map()
}

/// Every feature returned by sequential reads.
fn read_all(map: &mut Map) -> Vec<(FeatureType, LinePoints, LineCats)> {
    let mut points = LinePoints::new();
    let mut cats = LineCats::new();
    let mut out = Vec::new();
    map.rewind();
    while let ReadOutcome::Feature { kind, .. } = map.read_next(&mut points, &mut cats).unwrap() {
        out.push((kind, points.clone(), cats.clone()));
    }
    out
}

fn bits(points: &LinePoints) -> Vec<[u64; 3]> {
    points
        .iter()
        .map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
        .collect()
}

#[test]
fn round_trip_is_bit_exact() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("survey");

    let mut line = LinePoints::new();
    line.push(0.1, 0.2, 0.3);
    line.push(1.0 / 3.0, 2.0 / 7.0, -5.5);
    line.push(1e-12, 123_456.789_012_345, 1e300);
    let mut spot = LinePoints::new();
    spot.push(std::f64::consts::PI, std::f64::consts::E, 7.25);
    let written = vec![
        (FeatureType::Line, line, cats(&[(1, 5), (2, 9), (1, 6)])),
        (FeatureType::Point, spot, cats(&[(3, -4)])),
        (FeatureType::Line, LinePoints::from_xy(&[(10.0, 10.0), (20.0, 10.0)]), LineCats::new()),
    ];

    for order in [ByteOrder::Little, ByteOrder::Big] {
        let dir = dir.join(format!("{order:?}"));
        let config = MapConfig {
            byte_order: order,
            ..MapConfig::default()
        };
        let mut map = Map::create(&dir, Format::Native, true, &config).unwrap();
        for (kind, points, cats) in &written {
            map.write(*kind, points, cats).unwrap();
        }
        map.close().unwrap();

        let opened = Map::open(&dir, OpenMode::Read, AccessLevel::Topology, &config).unwrap();
        assert!(!opened.is_degraded());
        let mut map = opened.into_map();
        assert!(map.with_z());

        let read = read_all(&mut map);
        assert_eq!(read.len(), written.len());
        for ((kind, points, cats), (read_kind, read_points, read_cats)) in written.iter().zip(&read)
        {
            assert_eq!(kind, read_kind);
            assert_eq!(bits(points), bits(read_points));
            assert_eq!(cats, read_cats);
        }
    }
}

#[test]
fn reopened_topology_matches_what_was_closed() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("parcels");

    let mut map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    map.write(FeatureType::Boundary, &square(0.0, 0.0, 10.0), &LineCats::new()).unwrap();
    map.write(FeatureType::Boundary, &square(20.0, 0.0, 10.0), &LineCats::new()).unwrap();
    map.write(FeatureType::Centroid, &point(5.0, 5.0), &cats(&[(1, 7)])).unwrap();
    map.write(FeatureType::Centroid, &point(25.0, 5.0), &cats(&[(1, 8)])).unwrap();
    let before = map.topology().unwrap().snapshot();
    map.close().unwrap();

    let mut map = open(&dir, OpenMode::Read, AccessLevel::Topology);
    assert_eq!(map.topology().unwrap().snapshot(), before);
    assert_eq!(map.topology().unwrap().area_count(), 2);

    let area = map.find_area(5.0, 5.0).unwrap().unwrap();
    assert!(map.find_cat(1, 7).unwrap().iter().any(|e| e.id == area));
    approx::assert_relative_eq!(map.area_size(area).unwrap(), 100.0);
    assert_eq!(map.find_area(15.0, 5.0).unwrap(), None);

    let info = map.info();
    assert_eq!(info.head.name, "parcels");
    assert_eq!(info.topology.map(|t| t.areas), Some(2));
    assert!(map.info().to_json().unwrap().contains("\"format\": \"native\""));
}

#[test]
fn stale_topology_degrades_until_rebuilt() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("roads");

    let mut map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    map.write(FeatureType::Line, &LinePoints::from_xy(&[(0.0, 0.0), (5.0, 0.0)]), &cats(&[(1, 1)]))
        .unwrap();
    map.close().unwrap();

    // Edited without closing: coor grows, topo keeps the old stamp.
    let mut map = open(&dir, OpenMode::ReadWrite, AccessLevel::Topology);
    map.write(FeatureType::Line, &LinePoints::from_xy(&[(5.0, 0.0), (9.0, 3.0)]), &cats(&[(1, 2)]))
        .unwrap();
    drop(map);

    let opened =
        Map::open(&dir, OpenMode::Read, AccessLevel::Topology, &MapConfig::default()).unwrap();
    let Opened::Degraded { mut map, reason } = opened else {
        panic!("stale topology was trusted");
    };
    assert!(reason.contains("stale"));
    assert_eq!(map.level(), AccessLevel::Geometry);
    assert_eq!(read_all(&mut map).len(), 2);
    assert!(matches!(
        map.read_at(1, &mut LinePoints::new(), &mut LineCats::new()),
        Err(Error::TopologyRequired)
    ));

    let report = map.build_topology().unwrap();
    assert_eq!(report.lines, 2);
    assert_eq!(map.level(), AccessLevel::Topology);
    assert_eq!(map.topology().unwrap().node_count(), 3);
    assert_eq!(map.find_cat(1, 2).unwrap().len(), 1);
}

#[test]
fn missing_indexes_are_rebuilt() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("blocks");

    let mut map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    map.write(FeatureType::Boundary, &square(0.0, 0.0, 10.0), &LineCats::new()).unwrap();
    map.write(FeatureType::Centroid, &point(5.0, 5.0), &cats(&[(1, 3)])).unwrap();
    map.write(FeatureType::Point, &point(50.0, 50.0), &cats(&[(1, 4)])).unwrap();
    map.close().unwrap();

    fs::remove_file(dir.join(SIDX_FILE)).unwrap();
    fs::write(dir.join(CIDX_FILE), b"garbage").unwrap();

    let opened =
        Map::open(&dir, OpenMode::Read, AccessLevel::Topology, &MapConfig::default()).unwrap();
    assert!(!opened.is_degraded());
    let map = opened.into_map();

    let areas = map
        .select_by_box(PrimitiveClass::Area, &Rect::new_2d(2.0, 2.0, 3.0, 3.0))
        .unwrap();
    assert_eq!(areas, vec![1]);
    let lines = map
        .select_by_box(PrimitiveClass::Line, &Rect::new_2d(40.0, 40.0, 60.0, 60.0))
        .unwrap();
    assert_eq!(lines, vec![3]);
    assert_eq!(map.find_cat(1, 3).unwrap().len(), 2);
    assert_eq!(map.find_cat(1, 4).unwrap().len(), 1);
}

#[test]
fn constraints_filter_sequential_reads() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("mixed");

    let mut map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    map.write(FeatureType::Point, &point(1.0, 1.0), &cats(&[(1, 1)])).unwrap();
    map.write(FeatureType::Line, &LinePoints::from_xy(&[(0.0, 0.0), (10.0, 0.0)]), &LineCats::new())
        .unwrap();
    map.write(FeatureType::Point, &point(50.0, 50.0), &cats(&[(1, 2)])).unwrap();
    map.close().unwrap();

    for level in [AccessLevel::Geometry, AccessLevel::Topology] {
        let mut map = open(&dir, OpenMode::Read, level);
        assert_eq!(map.level(), level);
        assert_eq!(read_all(&mut map).len(), 3);

        map.set_constraint_type(TypeMask::POINTS);
        let kinds: Vec<FeatureType> = read_all(&mut map).into_iter().map(|(k, _, _)| k).collect();
        assert_eq!(kinds, vec![FeatureType::Point, FeatureType::Point]);

        map.set_constraint_region(Rect::new_2d(0.0, 0.0, 5.0, 5.0));
        let read = read_all(&mut map);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].2, cats(&[(1, 1)]));

        map.remove_constraints();
        assert!(map.constraints().is_empty());
        assert_eq!(read_all(&mut map).len(), 3);
    }
}

#[test]
fn locks_exclude_writers_only() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("shared");

    let map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    assert!(dir.join(LOCK_FILE).exists());
    map.close().unwrap();
    assert!(!dir.join(LOCK_FILE).exists());

    // Process 1 is always alive.
    fs::write(dir.join(LOCK_FILE), "1 someone\n").unwrap();
    let err = Map::open(&dir, OpenMode::ReadWrite, AccessLevel::Topology, &MapConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::Locked { pid: 1, .. }));

    let mut reader = open(&dir, OpenMode::Read, AccessLevel::Topology);
    assert!(matches!(
        reader.write(FeatureType::Point, &point(0.0, 0.0), &LineCats::new()),
        Err(Error::ReadOnly)
    ));

    let unlocked = MapConfig {
        locking: false,
        ..MapConfig::default()
    };
    assert!(Map::open(&dir, OpenMode::ReadWrite, AccessLevel::Topology, &unlocked).is_ok());
}

#[test]
fn second_writer_in_one_process_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("twice");
    Map::create(&dir, Format::Native, false, &MapConfig::default())
        .unwrap()
        .close()
        .unwrap();

    let first = open(&dir, OpenMode::ReadWrite, AccessLevel::Topology);
    let err = Map::open(&dir, OpenMode::ReadWrite, AccessLevel::Topology, &MapConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::Locked { pid, .. } if pid == std::process::id()));
    // The refused open leaves the first writer's lock alone.
    assert!(dir.join(LOCK_FILE).exists());

    first.close().unwrap();
    assert!(!dir.join(LOCK_FILE).exists());
    open(&dir, OpenMode::ReadWrite, AccessLevel::Topology).close().unwrap();
}

#[test]
fn header_only_opens_skip_features() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("meta");

    let mut map = Map::create(&dir, Format::Native, false, &MapConfig::default()).unwrap();
    map.head_mut().organization = "Survey office".into();
    map.close().unwrap();

    let mut map = open(&dir, OpenMode::HeaderOnly, AccessLevel::Topology);
    assert_eq!(map.head().organization, "Survey office");
    assert_eq!(map.head().name, "meta");
    assert!(matches!(
        map.read_next(&mut LinePoints::new(), &mut LineCats::new()),
        Err(Error::HeaderOnly)
    ));
    map.close().unwrap();

    assert!(matches!(
        Map::create(&dir, Format::Native, false, &MapConfig::default()),
        Err(Error::AlreadyExists(_))
    ));
    assert!(matches!(
        Map::open(
            &tmp.path().join("missing"),
            OpenMode::Read,
            AccessLevel::Geometry,
            &MapConfig::default()
        ),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn writes_need_topology() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("plain");
    Map::create(&dir, Format::Native, false, &MapConfig::default())
        .unwrap()
        .close()
        .unwrap();

    let mut map = open(&dir, OpenMode::ReadWrite, AccessLevel::Geometry);
    assert!(matches!(
        map.write(FeatureType::Point, &point(0.0, 0.0), &LineCats::new()),
        Err(Error::TopologyRequired)
    ));
    map.build_topology().unwrap();
    assert_eq!(map.write(FeatureType::Point, &point(0.0, 0.0), &LineCats::new()).unwrap(), 1);
    assert!(matches!(
        map.write(FeatureType::Line, &point(0.0, 0.0), &LineCats::new()),
        Err(Error::Topology(_))
    ));
}
