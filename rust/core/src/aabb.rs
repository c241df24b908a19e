// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounding boxes in f64 precision
//!
//! Geometry boundaries are kept in f64 so that world-space boxes of meshes
//! placed far from the layer origin stay exact before RTC shifting.

use nalgebra::{Matrix4, Point3};

/// Axis-aligned 3D bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3 {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb3 {
    /// Create a box from its corners
    #[inline]
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create a collapsed (inverted) box, ready to be expanded
    #[inline]
    pub fn collapsed() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Create from `[xmin, ymin, zmin, xmax, ymax, zmax]`
    #[inline]
    pub fn from_array(a: [f64; 6]) -> Self {
        Self {
            min: Point3::new(a[0], a[1], a[2]),
            max: Point3::new(a[3], a[4], a[5]),
        }
    }

    /// Flatten to `[xmin, ymin, zmin, xmax, ymax, zmax]`
    #[inline]
    pub fn to_array(&self) -> [f64; 6] {
        [self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z]
    }

    /// Check if the box contains at least one point
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Expand the box to include a point
    #[inline]
    pub fn expand_point(&mut self, p: &Point3<f64>) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand the box to include another box
    #[inline]
    pub fn expand_aabb(&mut self, other: &Aabb3) {
        if other.is_valid() {
            self.expand_point(&other.min);
            self.expand_point(&other.max);
        }
    }

    /// Center of the box, origin when collapsed
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        if !self.is_valid() {
            return Point3::origin();
        }
        nalgebra::center(&self.min, &self.max)
    }

    /// The eight corners of the box (an oriented box with identity axes)
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(b.x, b.y, b.z),
            Point3::new(a.x, b.y, b.z),
        ]
    }

    /// World box of this box's corners after an affine transform.
    ///
    /// With `None` the corners are taken untransformed.
    pub fn transformed(&self, matrix: Option<&Matrix4<f64>>) -> Aabb3 {
        let mut out = Aabb3::collapsed();
        if !self.is_valid() {
            return out;
        }
        for corner in self.corners() {
            match matrix {
                Some(m) => out.expand_point(&m.transform_point(&corner)),
                None => out.expand_point(&corner),
            }
        }
        out
    }
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::collapsed()
    }
}
