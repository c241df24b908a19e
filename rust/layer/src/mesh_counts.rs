// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-layer aggregate mesh counters
//!
//! Renderers skip whole layers using these (no transparent meshes, nothing
//! selected, ...) instead of scanning every mesh each frame.

use dtx_lite_core::ObjectFlags;

/// Number of meshes in a layer holding each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshCounts {
    pub num_meshes: usize,
    pub num_visible: usize,
    pub num_highlighted: usize,
    pub num_xrayed: usize,
    pub num_selected: usize,
    pub num_clippable: usize,
    pub num_edges: usize,
    pub num_pickable: usize,
    pub num_culled: usize,
    pub num_transparent: usize,
}

impl MeshCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move one mesh's contribution from its old state to its new state.
    ///
    /// Each counter moves by at most one, and only where the state differs.
    pub fn update(
        &mut self,
        before: ObjectFlags,
        before_transparent: bool,
        after: ObjectFlags,
        after_transparent: bool,
    ) {
        let changed = before ^ after;
        for (flag, counter) in [
            (ObjectFlags::VISIBLE, &mut self.num_visible),
            (ObjectFlags::HIGHLIGHTED, &mut self.num_highlighted),
            (ObjectFlags::XRAYED, &mut self.num_xrayed),
            (ObjectFlags::SELECTED, &mut self.num_selected),
            (ObjectFlags::CLIPPABLE, &mut self.num_clippable),
            (ObjectFlags::EDGES, &mut self.num_edges),
            (ObjectFlags::PICKABLE, &mut self.num_pickable),
            (ObjectFlags::CULLED, &mut self.num_culled),
        ] {
            if changed.contains(flag) {
                step(counter, after.contains(flag));
            }
        }
        if before_transparent != after_transparent {
            step(&mut self.num_transparent, after_transparent);
        }
    }
}

#[inline]
fn step(counter: &mut usize, up: bool) {
    if up {
        *counter += 1;
    } else {
        *counter = counter.saturating_sub(1);
    }
}
