// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitive kinds a layer can hold

use std::fmt;

/// Primitive type drawn by a layer. Every layer holds exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitive {
    Points = 0,
    Lines = 1,
    Triangles = 2,
}

impl Primitive {
    /// Number of index entries per primitive (1, 2 or 3)
    #[inline]
    pub fn verts_per_primitive(self) -> usize {
        match self {
            Primitive::Points => 1,
            Primitive::Lines => 2,
            Primitive::Triangles => 3,
        }
    }

    /// Returns the primitive name as a string.
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Points => "points",
            Primitive::Lines => "lines",
            Primitive::Triangles => "triangles",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
