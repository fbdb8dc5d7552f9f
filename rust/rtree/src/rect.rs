// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned boxes used as index keys.

/// Dimensionality of an index. A tree never mixes 2D and 3D comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dims {
    Two,
    Three,
}

impl Dims {
    /// Number of compared axes.
    pub const fn count(self) -> usize {
        match self {
            Dims::Two => 2,
            Dims::Three => 3,
        }
    }

    pub(crate) fn from_count(count: u8) -> Option<Self> {
        match count {
            2 => Some(Dims::Two),
            3 => Some(Dims::Three),
            _ => None,
        }
    }
}

/// Axis-aligned extent: `min`/`max` are `[x, y, z]`.
///
/// A 2D index simply ignores the z components. Intervals are closed, so boxes
/// that only touch still overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Rect {
    /// Creates a flat box with zero vertical extent.
    pub const fn new_2d(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: [min_x, min_y, 0.0],
            max: [max_x, max_y, 0.0],
        }
    }

    pub const fn new_3d(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// A degenerate box around a single point.
    pub const fn point(x: f64, y: f64, z: f64) -> Self {
        Self {
            min: [x, y, z],
            max: [x, y, z],
        }
    }

    /// The empty box: the identity for [`Rect::union`].
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    pub fn min_x(&self) -> f64 {
        self.min[0]
    }

    pub fn min_y(&self) -> f64 {
        self.min[1]
    }

    pub fn max_x(&self) -> f64 {
        self.max[0]
    }

    pub fn max_y(&self) -> f64 {
        self.max[1]
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let mut out = *self;
        out.extend(other);
        out
    }

    /// Grows `self` to contain `other`.
    pub fn extend(&mut self, other: &Rect) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(other.min[axis]);
            self.max[axis] = self.max[axis].max(other.max[axis]);
        }
    }

    pub fn extend_point(&mut self, x: f64, y: f64, z: f64) {
        self.extend(&Rect::point(x, y, z));
    }

    /// Closed-interval overlap test on the first `dims` axes.
    pub fn overlaps(&self, other: &Rect, dims: Dims) -> bool {
        (0..dims.count()).all(|axis| {
            self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis]
        })
    }

    /// `true` if `other` lies entirely inside `self` (boundary included).
    pub fn contains(&self, other: &Rect, dims: Dims) -> bool {
        (0..dims.count()).all(|axis| {
            self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis]
        })
    }

    /// Planar containment of a point, boundary included.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        self.min[0] <= x && x <= self.max[0] && self.min[1] <= y && y <= self.max[1]
    }

    /// Area (2D) or volume (3D); zero for an empty box.
    pub fn measure(&self, dims: Dims) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (0..dims.count())
            .map(|axis| self.max[axis] - self.min[axis])
            .product()
    }

    /// How much `self` must grow to also cover `other`.
    pub fn enlargement(&self, other: &Rect, dims: Dims) -> f64 {
        self.union(other).measure(dims) - self.measure(dims)
    }

    pub fn center(&self, axis: usize) -> f64 {
        0.5 * (self.min[axis] + self.max[axis])
    }

    /// Equality restricted to the compared axes.
    pub fn same_as(&self, other: &Rect, dims: Dims) -> bool {
        (0..dims.count())
            .all(|axis| self.min[axis] == other.min[axis] && self.max[axis] == other.max[axis])
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::empty()
    }
}
