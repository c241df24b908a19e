// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render-state flag encoding
//!
//! A mesh's visual state is folded into one render pass code per draw pass
//! (color, silhouette, edges) plus a pick bit, so that each pass selects
//! its meshes with a single texel comparison.

use dtx_lite_core::ObjectFlags;

/// Draw pass a mesh participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RenderPass {
    NotRendered = 0,
    ColorOpaque = 1,
    ColorTransparent = 2,
    SilhouetteHighlighted = 3,
    SilhouetteSelected = 4,
    SilhouetteXrayed = 5,
    EdgesColorOpaque = 6,
    EdgesColorTransparent = 7,
    EdgesHighlighted = 8,
    EdgesSelected = 9,
    EdgesXrayed = 10,
    Pick = 11,
}

impl RenderPass {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Encoded render flags of one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedFlags {
    pub color: RenderPass,
    pub silhouette: RenderPass,
    pub edges: RenderPass,
    pub pick: RenderPass,
    pub clippable: bool,
}

impl EncodedFlags {
    /// `[color, silhouette, edges, pick]` texel
    #[inline]
    pub fn flags_texel(&self) -> [u8; 4] {
        [
            self.color.code(),
            self.silhouette.code(),
            self.edges.code(),
            self.pick.code(),
        ]
    }

    /// `[clippable, 0, 0, 0]` texel
    #[inline]
    pub fn clip_texel(&self) -> [u8; 4] {
        [if self.clippable { 255 } else { 0 }, 0, 0, 0]
    }
}

/// Encode a mesh's object flags and transparency into render pass codes.
///
/// Highlight and selection are layered on top of the color pass, while
/// X-ray replaces it.
pub fn encode_render_flags(flags: ObjectFlags, transparent: bool) -> EncodedFlags {
    let visible = flags.contains(ObjectFlags::VISIBLE);
    let culled = flags.contains(ObjectFlags::CULLED);
    let xrayed = flags.contains(ObjectFlags::XRAYED);
    let highlighted = flags.contains(ObjectFlags::HIGHLIGHTED);
    let selected = flags.contains(ObjectFlags::SELECTED);
    let edges = flags.contains(ObjectFlags::EDGES);
    let pickable = flags.contains(ObjectFlags::PICKABLE);

    let shown = visible && !culled;

    let color = if !shown || xrayed {
        RenderPass::NotRendered
    } else if transparent {
        RenderPass::ColorTransparent
    } else {
        RenderPass::ColorOpaque
    };

    let silhouette = if !shown {
        RenderPass::NotRendered
    } else if selected {
        RenderPass::SilhouetteSelected
    } else if highlighted {
        RenderPass::SilhouetteHighlighted
    } else if xrayed {
        RenderPass::SilhouetteXrayed
    } else {
        RenderPass::NotRendered
    };

    let edges = if !shown {
        RenderPass::NotRendered
    } else if selected {
        RenderPass::EdgesSelected
    } else if highlighted {
        RenderPass::EdgesHighlighted
    } else if xrayed {
        RenderPass::EdgesXrayed
    } else if edges {
        if transparent {
            RenderPass::EdgesColorTransparent
        } else {
            RenderPass::EdgesColorOpaque
        }
    } else {
        RenderPass::NotRendered
    };

    let pick = if shown && pickable {
        RenderPass::Pick
    } else {
        RenderPass::NotRendered
    };

    EncodedFlags {
        color,
        silhouette,
        edges,
        pick,
        clippable: flags.contains(ObjectFlags::CLIPPABLE),
    }
}
