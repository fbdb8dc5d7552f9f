// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry of derived faces.
//!
//! Areas and isles store only boundary ids, so their rings are assembled from
//! the backend on demand.

use crate::arena::Topology;
use crate::error::Result;
use crate::geometry::{signed_ring_area, LinePoints};
use crate::keys::*;
use crate::source::GeometrySource;

impl Topology {
    /// Outer ring of an area, closed. Returns `false` if the area does not exist.
    pub fn area_points<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
        out: &mut LinePoints,
    ) -> Result<bool> {
        let Some(rec) = self.area(area) else {
            out.clear();
            return Ok(false);
        };
        self.ring_points(source, &rec.boundaries, out)?;
        Ok(true)
    }

    /// Ring of an isle, closed. Returns `false` if the isle does not exist.
    pub fn isle_points<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        isle: IsleId,
        out: &mut LinePoints,
    ) -> Result<bool> {
        let Some(rec) = self.isle(isle) else {
            out.clear();
            return Ok(false);
        };
        self.ring_points(source, &rec.boundaries, out)?;
        Ok(true)
    }

    /// Outer ring followed by every isle ring, each closed.
    pub fn area_rings<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
    ) -> Result<Vec<LinePoints>> {
        let Some(rec) = self.area(area) else {
            return Ok(Vec::new());
        };
        let mut rings = Vec::with_capacity(1 + rec.isles.len());
        let mut outer = LinePoints::new();
        self.ring_points(source, &rec.boundaries, &mut outer)?;
        rings.push(outer);
        for &isle in &rec.isles {
            let mut ring = LinePoints::new();
            if self.isle_points(source, isle, &mut ring)? {
                rings.push(ring);
            }
        }
        Ok(rings)
    }

    /// Planar size of an area: outer ring minus its isles.
    pub fn area_size<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
    ) -> Result<f64> {
        let rings = self.area_rings(source, area)?;
        let mut rings = rings.iter().map(|r| signed_ring_area(r.as_slice()).abs());
        let Some(outer) = rings.next() else {
            return Ok(0.0);
        };
        Ok(outer - rings.sum::<f64>())
    }

    /// Perimeter of an area's outer ring.
    pub fn area_perimeter<S: GeometrySource + ?Sized>(
        &self,
        source: &mut S,
        area: AreaId,
    ) -> Result<f64> {
        let mut ring = LinePoints::new();
        if !self.area_points(source, area, &mut ring)? {
            return Ok(0.0);
        }
        Ok(ring
            .as_slice()
            .windows(2)
            .map(|w| ((w[1].x - w[0].x).powi(2) + (w[1].y - w[0].y).powi(2)).sqrt())
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineCats;
    use crate::source::MemorySource;
    use approx::assert_relative_eq;

    fn write(
        topo: &mut Topology,
        src: &mut MemorySource,
        kind: FeatureType,
        coords: &[(f64, f64)],
    ) {
        let points = LinePoints::from_xy(coords);
        let offset = src.push(kind, &points, &LineCats::new());
        topo.write_line(src, kind, offset, &points, &LineCats::new())
            .unwrap();
    }

    fn square(x0: f64, y0: f64, side: f64) -> Vec<(f64, f64)> {
        vec![
            (x0, y0),
            (x0, y0 + side),
            (x0 + side, y0 + side),
            (x0 + side, y0),
            (x0, y0),
        ]
    }

    #[test]
    fn area_with_hole() {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        let mut src = MemorySource::new();
        write(&mut topo, &mut src, FeatureType::Boundary, &square(0.0, 0.0, 10.0));
        write(&mut topo, &mut src, FeatureType::Boundary, &square(2.0, 2.0, 2.0));

        let outer = topo
            .area_ids()
            .find(|&a| topo.area_isles(a).is_some_and(|i| !i.is_empty()))
            .unwrap();
        assert_relative_eq!(topo.area_size(&mut src, outer).unwrap(), 96.0);
        assert_relative_eq!(topo.area_perimeter(&mut src, outer).unwrap(), 40.0);

        let rings = topo.area_rings(&mut src, outer).unwrap();
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.is_closed()));

        let mut ring = LinePoints::new();
        assert!(!topo.area_points(&mut src, 99, &mut ring).unwrap());
        assert!(ring.is_empty());
    }

    #[test]
    fn point_location() {
        let mut topo = Topology::new(false);
        topo.set_built(BuildLevel::All);
        let mut src = MemorySource::new();
        write(&mut topo, &mut src, FeatureType::Boundary, &square(0.0, 0.0, 10.0));
        write(&mut topo, &mut src, FeatureType::Boundary, &square(2.0, 2.0, 2.0));

        let outer = topo.find_area(&mut src, 1.0, 1.0).unwrap().unwrap();
        let inner = topo.find_area(&mut src, 3.0, 3.0).unwrap().unwrap();
        assert_ne!(outer, inner);
        assert!(!topo.point_in_area(&mut src, outer, 3.0, 3.0).unwrap());
        assert_eq!(topo.find_area(&mut src, 20.0, 20.0).unwrap(), None);
    }
}
