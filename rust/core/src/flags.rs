// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Visual-state bits carried by every scene object

bitflags::bitflags! {
    /// Per-object visual state as seen by a layer.
    ///
    /// Transparency is not a flag here: it follows from the mesh opacity and
    /// is passed alongside the flags to the render-flag encoder.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Rendered at all
        const VISIBLE = 1 << 0;
        /// Excluded by view culling
        const CULLED = 1 << 1;
        /// Eligible for picking
        const PICKABLE = 1 << 2;
        /// Subject to section planes
        const CLIPPABLE = 1 << 3;
        /// Included in collision/boundary queries
        const COLLIDABLE = 1 << 4;
        /// Drawn with the X-ray material
        const XRAYED = 1 << 5;
        /// Drawn with the selection material
        const SELECTED = 1 << 6;
        /// Drawn with the highlight material
        const HIGHLIGHTED = 1 << 7;
        /// Edges emphasised
        const EDGES = 1 << 8;
    }
}

impl ObjectFlags {
    /// Flags of a freshly created, ordinary scene object.
    pub fn initial() -> Self {
        ObjectFlags::VISIBLE | ObjectFlags::PICKABLE | ObjectFlags::CLIPPABLE | ObjectFlags::COLLIDABLE
    }
}
