// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reusable geometry buffers and planar computations on them.
//!
//! [`LinePoints`] and [`LineCats`] are owned by the caller and passed by
//! `&mut` into every read, so one pair of buffers can serve a whole feature
//! stream without reallocating. The free functions implement the planar
//! primitives the topology engine needs: node angles, signed ring area and
//! point-in-ring classification.

use nalgebra::Point3;
use topovec_rtree::Rect;

/// Ordered vertex sequence of one feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinePoints {
    coords: Vec<Point3<f64>>,
}

impl LinePoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a buffer from planar coordinates.
    pub fn from_xy(coords: &[(f64, f64)]) -> Self {
        Self {
            coords: coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect(),
        }
    }

    /// Empties the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.coords.clear();
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.coords.push(Point3::new(x, y, z));
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Point3<f64>> {
        self.coords.get(i)
    }

    pub fn first(&self) -> Option<&Point3<f64>> {
        self.coords.first()
    }

    pub fn last(&self) -> Option<&Point3<f64>> {
        self.coords.last()
    }

    pub fn as_slice(&self) -> &[Point3<f64>] {
        &self.coords
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Point3<f64>> {
        self.coords.iter()
    }

    pub fn reverse(&mut self) {
        self.coords.reverse();
    }

    /// Appends `other` walked forward or backward, leaving out its final
    /// vertex. Used to chain boundaries into a ring without repeating the
    /// shared node vertices.
    pub fn append_open(&mut self, other: &LinePoints, forward: bool) {
        let n = other.coords.len();
        if n == 0 {
            return;
        }
        if forward {
            self.coords.extend_from_slice(&other.coords[..n - 1]);
        } else {
            self.coords.extend(other.coords[1..].iter().rev());
        }
    }

    /// Repeats the first vertex at the end if the sequence is not closed.
    pub fn close(&mut self) {
        if let (Some(first), Some(last)) = (self.coords.first(), self.coords.last()) {
            if first != last {
                let first = *first;
                self.coords.push(first);
            }
        }
    }

    /// `true` if first and last vertices coincide exactly.
    pub fn is_closed(&self) -> bool {
        match (self.coords.first(), self.coords.last()) {
            (Some(first), Some(last)) => self.coords.len() > 1 && first == last,
            _ => false,
        }
    }

    /// Bounding box of all vertices (empty box for an empty buffer).
    pub fn bbox(&self) -> Rect {
        let mut rect = Rect::empty();
        for p in &self.coords {
            rect.extend_point(p.x, p.y, p.z);
        }
        rect
    }
}

/// Ordered `(layer, category)` pairs attached to one feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineCats {
    cats: Vec<(i32, i32)>,
}

impl LineCats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(i32, i32)]) -> Self {
        let mut cats = Self::new();
        for &(layer, cat) in pairs {
            cats.add(layer, cat);
        }
        cats
    }

    pub fn clear(&mut self) {
        self.cats.clear();
    }

    /// Adds a pair unless it is already present.
    pub fn add(&mut self, layer: i32, cat: i32) {
        if !self.cats.contains(&(layer, cat)) {
            self.cats.push((layer, cat));
        }
    }

    /// First category on `layer`.
    pub fn get(&self, layer: i32) -> Option<i32> {
        self.cats.iter().find(|(l, _)| *l == layer).map(|(_, c)| *c)
    }

    pub fn has(&self, layer: i32, cat: i32) -> bool {
        self.cats.contains(&(layer, cat))
    }

    /// Removes every pair on `layer`, returning how many were dropped.
    pub fn remove_layer(&mut self, layer: i32) -> usize {
        let before = self.cats.len();
        self.cats.retain(|(l, _)| *l != layer);
        before - self.cats.len()
    }

    pub fn len(&self) -> usize {
        self.cats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.cats.iter().copied()
    }
}

/// Direction in which a line leaves its start vertex, in radians
/// (`-PI..=PI`), taken from the first vertex that differs from the start.
/// `None` when every vertex coincides.
pub fn begin_angle(points: &LinePoints) -> Option<f64> {
    let first = points.first()?;
    points
        .iter()
        .skip(1)
        .find(|p| p.x != first.x || p.y != first.y)
        .map(|p| (p.y - first.y).atan2(p.x - first.x))
}

/// Direction in which a line leaves its end vertex when walked backwards.
pub fn end_angle(points: &LinePoints) -> Option<f64> {
    let last = points.last()?;
    points
        .iter()
        .rev()
        .skip(1)
        .find(|p| p.x != last.x || p.y != last.y)
        .map(|p| (p.y - last.y).atan2(p.x - last.x))
}

/// Shoelace area of a closed planar ring. Positive for clockwise rings.
pub fn signed_ring_area(ring: &[Point3<f64>]) -> f64 {
    ring.windows(2)
        .map(|w| (w[1].x - w[0].x) * (w[1].y + w[0].y))
        .sum::<f64>()
        / 2.0
}

/// Where a point lies relative to a closed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingLocation {
    Outside,
    Inside,
    OnBoundary,
}

/// Crossing-number point-in-ring test with explicit boundary detection.
pub fn point_in_ring(x: f64, y: f64, ring: &[Point3<f64>]) -> RingLocation {
    let mut inside = false;
    for w in ring.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if on_segment(x, y, a, b) {
            return RingLocation::OnBoundary;
        }
        if (a.y > y) != (b.y > y) {
            let cross_x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x < cross_x {
                inside = !inside;
            }
        }
    }
    if inside {
        RingLocation::Inside
    } else {
        RingLocation::Outside
    }
}

fn on_segment(x: f64, y: f64, a: &Point3<f64>, b: &Point3<f64>) -> bool {
    let cross = (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x);
    cross == 0.0
        && x >= a.x.min(b.x)
        && x <= a.x.max(b.x)
        && y >= a.y.min(b.y)
        && y <= a.y.max(b.y)
}
