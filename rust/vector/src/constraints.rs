// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filters applied to sequential reads.

use topovec_rtree::{Dims, Rect};
use topovec_topology::FeatureType;

bitflags::bitflags! {
    /// Primitive types accepted by [`Constraints`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeMask: u8 {
        const POINT    = 0b0001;
        const LINE     = 0b0010;
        const BOUNDARY = 0b0100;
        const CENTROID = 0b1000;
        const LINES    = Self::LINE.bits() | Self::BOUNDARY.bits();
        const POINTS   = Self::POINT.bits() | Self::CENTROID.bits();
    }
}

impl Default for TypeMask {
    fn default() -> Self {
        Self::all()
    }
}

impl From<FeatureType> for TypeMask {
    fn from(kind: FeatureType) -> Self {
        match kind {
            FeatureType::Point => TypeMask::POINT,
            FeatureType::Line => TypeMask::LINE,
            FeatureType::Boundary => TypeMask::BOUNDARY,
            FeatureType::Centroid => TypeMask::CENTROID,
        }
    }
}

/// Type and region filter for `read_next`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub types: Option<TypeMask>,
    /// Features whose box does not overlap this region are skipped.
    pub region: Option<Rect>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.types.is_none() && self.region.is_none()
    }

    pub fn accepts_type(&self, kind: FeatureType) -> bool {
        self.types.map_or(true, |mask| mask.contains(kind.into()))
    }

    /// Planar overlap test between the region and a feature box.
    pub fn accepts_box(&self, bbox: &Rect) -> bool {
        self.region
            .map_or(true, |region| !bbox.is_empty() && region.overlaps(bbox, Dims::Two))
    }
}
