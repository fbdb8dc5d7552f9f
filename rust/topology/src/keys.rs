// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifier and discriminant types for the topology store.
//!
//! Records reference each other through plain 1-based integer ids that index
//! into the store's arrays; `0` never names a record. Line ids inside node and
//! ring lists are signed: a positive id means the line is walked from its
//! start node, a negative id means it is walked backwards.

use serde::{Deserialize, Serialize};

/// Identifier of a node record.
pub type NodeId = i32;
/// Identifier of a line record (any primitive: point, line, boundary, centroid).
pub type LineId = i32;
/// Identifier of an area record.
pub type AreaId = i32;
/// Identifier of an isle record.
pub type IsleId = i32;

/// Geometric primitive type of a stored feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    Point = 0,
    Line = 1,
    Boundary = 2,
    Centroid = 3,
}

impl FeatureType {
    pub const ALL: [FeatureType; 4] = [
        FeatureType::Point,
        FeatureType::Line,
        FeatureType::Boundary,
        FeatureType::Centroid,
    ];

    /// Returns the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Point => "point",
            FeatureType::Line => "line",
            FeatureType::Boundary => "boundary",
            FeatureType::Centroid => "centroid",
        }
    }

    /// Numeric code used in on-disk records.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FeatureType::Point),
            1 => Some(FeatureType::Line),
            2 => Some(FeatureType::Boundary),
            3 => Some(FeatureType::Centroid),
            _ => None,
        }
    }

    /// Points and centroids are single-vertex primitives without nodes.
    pub fn is_point_like(self) -> bool {
        matches!(self, FeatureType::Point | FeatureType::Centroid)
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of primitive an entry of the category index points at. Areas carry
/// the categories of their centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CatKind {
    Point = 0,
    Line = 1,
    Boundary = 2,
    Centroid = 3,
    Area = 4,
}

impl CatKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(CatKind::Area),
            other => FeatureType::from_code(other).map(CatKind::from),
        }
    }
}

impl From<FeatureType> for CatKind {
    fn from(t: FeatureType) -> Self {
        match t {
            FeatureType::Point => CatKind::Point,
            FeatureType::Line => CatKind::Line,
            FeatureType::Boundary => CatKind::Boundary,
            FeatureType::Centroid => CatKind::Centroid,
        }
    }
}

/// Primitive class, one spatial index each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveClass {
    Node,
    Line,
    Area,
    Isle,
}

impl PrimitiveClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveClass::Node => "node",
            PrimitiveClass::Line => "line",
            PrimitiveClass::Area => "area",
            PrimitiveClass::Isle => "isle",
        }
    }
}

impl std::fmt::Display for PrimitiveClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side of a boundary relative to its digitizing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// The side a signed ring member occupies: walked forward the ring lies on
    /// the line's right, walked backward on its left.
    pub fn of_signed(line: LineId) -> Side {
        if line > 0 {
            Side::Right
        } else {
            Side::Left
        }
    }
}

/// What lies on one side of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Face {
    /// Not yet assigned (or the ring could not be closed).
    #[default]
    None,
    Area(AreaId),
    Isle(IsleId),
}

impl Face {
    /// Signed encoding: `0` none, positive area, negative isle.
    pub fn to_signed(self) -> i32 {
        match self {
            Face::None => 0,
            Face::Area(a) => a,
            Face::Isle(i) => -i,
        }
    }

    pub fn from_signed(v: i32) -> Self {
        match v {
            0 => Face::None,
            a if a > 0 => Face::Area(a),
            i => Face::Isle(-i),
        }
    }

    pub fn is_none(self) -> bool {
        self == Face::None
    }
}

/// Area attachment of a centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CentroidLink {
    /// Lies outside every area.
    #[default]
    Outside,
    /// Labels this area.
    Attached(AreaId),
    /// Lies inside an area that is already labeled by another centroid.
    Duplicate(AreaId),
}

impl CentroidLink {
    /// Signed encoding: `0` outside, positive attached, negative duplicate.
    pub fn to_signed(self) -> i32 {
        match self {
            CentroidLink::Outside => 0,
            CentroidLink::Attached(a) => a,
            CentroidLink::Duplicate(a) => -a,
        }
    }

    pub fn from_signed(v: i32) -> Self {
        match v {
            0 => CentroidLink::Outside,
            a if a > 0 => CentroidLink::Attached(a),
            d => CentroidLink::Duplicate(-d),
        }
    }
}

/// How far topology has been built. Each level includes the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BuildLevel {
    /// Nothing built.
    #[default]
    None = 0,
    /// Nodes and lines.
    Base = 1,
    /// Areas and isles.
    Areas = 2,
    /// Isles attached to their enclosing areas.
    AttachIsles = 3,
    /// Centroids attached to areas.
    Centroids = 4,
    /// Everything, including area categories in the category index.
    All = 5,
}

impl BuildLevel {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BuildLevel::None),
            1 => Some(BuildLevel::Base),
            2 => Some(BuildLevel::Areas),
            3 => Some(BuildLevel::AttachIsles),
            4 => Some(BuildLevel::Centroids),
            5 => Some(BuildLevel::All),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_type_names() {
        assert_eq!(FeatureType::Point.as_str(), "point");
        assert_eq!(FeatureType::Boundary.to_string(), "boundary");
        for t in FeatureType::ALL {
            assert_eq!(FeatureType::from_code(t.code()), Some(t));
        }
        assert_eq!(FeatureType::from_code(9), None);
    }

    #[test]
    fn signed_encodings() {
        assert_eq!(Face::from_signed(-3), Face::Isle(3));
        assert_eq!(Face::Area(7).to_signed(), 7);
        assert_eq!(Face::from_signed(0), Face::None);
        assert_eq!(CentroidLink::from_signed(-2), CentroidLink::Duplicate(2));
        assert_eq!(CentroidLink::Attached(4).to_signed(), 4);
    }

    #[test]
    fn build_level_ordering() {
        assert!(BuildLevel::Base < BuildLevel::Areas);
        assert!(BuildLevel::Centroids < BuildLevel::All);
        assert_eq!(BuildLevel::from_code(3), Some(BuildLevel::AttachIsles));
    }

    #[test]
    fn ring_member_sides() {
        assert_eq!(Side::of_signed(5), Side::Right);
        assert_eq!(Side::of_signed(-5), Side::Left);
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(CatKind::from(FeatureType::Centroid), CatKind::Centroid);
        assert_eq!(CatKind::from_code(4), Some(CatKind::Area));
    }
}
