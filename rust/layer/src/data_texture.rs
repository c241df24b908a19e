// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data textures
//!
//! Every layer table is a 2D integer or float texture of fixed row width.
//! Tables are built on the CPU as tightly packed bytes, row-major, and
//! zero-padded to whole rows.
//!
//! ## Per-mesh-part attribute record
//!
//! One row of 7 RGBA8 texels per mesh part:
//!
//! | texel | content |
//! |---|---|
//! | 0 | base color RGBA |
//! | 1 | pick color RGBA |
//! | 2 | render flags `[color, silhouette, edges, pick]` |
//! | 3 | clip flags `[clippable, 0, 0, 0]` |
//! | 4 | vertex portion base, u32 LE |
//! | 5 | vertex portion offset, i32 LE |
//! | 6 | edge indices offset, i32 LE |

use crate::backend::{TexelRegion, TextureHandle};
use crate::tier::IndexTier;
use bytemuck::{Pod, Zeroable};

/// Texel component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    U8,
    U16,
    U32,
    F32,
}

impl Component {
    #[inline]
    pub fn size(self) -> usize {
        match self {
            Component::U8 => 1,
            Component::U16 => 2,
            Component::U32 | Component::F32 => 4,
        }
    }
}

/// Texel layout: 1 to 4 channels of one component type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexelFormat {
    pub channels: usize,
    pub component: Component,
}

impl TexelFormat {
    pub const R16UI: TexelFormat = TexelFormat::new(1, Component::U16);
    pub const RGB16UI: TexelFormat = TexelFormat::new(3, Component::U16);
    pub const RGBA8UI: TexelFormat = TexelFormat::new(4, Component::U8);
    pub const RGB32F: TexelFormat = TexelFormat::new(3, Component::F32);
    pub const RGBA32F: TexelFormat = TexelFormat::new(4, Component::F32);

    pub const fn new(channels: usize, component: Component) -> Self {
        Self { channels, component }
    }

    #[inline]
    pub fn bytes_per_texel(&self) -> usize {
        self.channels * self.component.size()
    }
}

/// Texels per attribute record
pub const ATTRIBUTE_TEXELS: usize = 7;

/// Texels per matrix row: decompression matrix then model matrix
pub const MATRIX_TEXELS: usize = 8;

/// Primitives (or edges) covered by one mesh-part lookup entry; indices and
/// edge indices are padded to whole groups.
pub const INDICES_ALIGNMENT: usize = 8;

pub const COLOR_TEXEL: usize = 0;
pub const PICK_COLOR_TEXEL: usize = 1;
pub const FLAGS_TEXEL: usize = 2;
pub const CLIP_TEXEL: usize = 3;
pub const MODEL_MATRIX_TEXEL: usize = 4;

/// A CPU-side texture image
#[derive(Debug, Clone, PartialEq)]
pub struct DataTexture {
    pub label: &'static str,
    pub format: TexelFormat,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl DataTexture {
    /// Pack components into a texture of the given width, padding the last
    /// row with zeros. An empty table still gets one row, and a zero width
    /// is taken as one texel.
    pub fn from_components<T: Pod>(
        label: &'static str,
        format: TexelFormat,
        width: usize,
        components: &[T],
    ) -> Self {
        let width = width.max(1);
        let bytes: &[u8] = bytemuck::cast_slice(components);
        let texels = bytes.len().div_ceil(format.bytes_per_texel());
        let height = texels.div_ceil(width).max(1);
        let mut data = Vec::with_capacity(width * height * format.bytes_per_texel());
        data.extend_from_slice(bytes);
        data.resize(width * height * format.bytes_per_texel(), 0);
        Self {
            label,
            format,
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width * self.format.bytes_per_texel()
    }

    /// Number of texels the texture holds
    #[inline]
    pub fn num_texels(&self) -> usize {
        self.width * self.height
    }

    /// Check that a region lies inside the texture
    pub fn contains(&self, region: &TexelRegion) -> bool {
        region.x + region.width <= self.width && region.y + region.height <= self.height
    }

    /// Bytes of one texel
    pub fn texel(&self, x: usize, y: usize) -> &[u8] {
        let bpt = self.format.bytes_per_texel();
        let start = y * self.row_bytes() + x * bpt;
        &self.data[start..start + bpt]
    }

    /// Overwrite a texel
    pub fn set_texel(&mut self, x: usize, y: usize, bytes: &[u8]) {
        let bpt = self.format.bytes_per_texel();
        let start = y * self.row_bytes() + x * bpt;
        self.data[start..start + bpt].copy_from_slice(&bytes[..bpt]);
    }

    /// Tightly packed bytes of a region, row by row
    pub fn region_bytes(&self, region: &TexelRegion) -> Vec<u8> {
        let bpt = self.format.bytes_per_texel();
        let mut out = Vec::with_capacity(region.width * region.height * bpt);
        for y in region.y..region.y + region.height {
            let start = y * self.row_bytes() + region.x * bpt;
            out.extend_from_slice(&self.data[start..start + region.width * bpt]);
        }
        out
    }

    /// Copy tightly packed region bytes into the image
    pub fn write_region(&mut self, region: &TexelRegion, bytes: &[u8]) {
        let bpt = self.format.bytes_per_texel();
        let span = region.width * bpt;
        for (row, src) in bytes.chunks_exact(span).take(region.height).enumerate() {
            let start = (region.y + row) * self.row_bytes() + region.x * bpt;
            self.data[start..start + span].copy_from_slice(src);
        }
    }
}

/// Attribute record of one mesh part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct MeshAttributeRecord {
    pub color: [u8; 4],
    pub pick_color: [u8; 4],
    pub flags: [u8; 4],
    pub clip_flags: [u8; 4],
    vertex_base: [u8; 4],
    vertex_offset: [u8; 4],
    edge_indices_offset: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<MeshAttributeRecord>() == ATTRIBUTE_TEXELS * 4);

impl MeshAttributeRecord {
    pub fn new(
        color: [u8; 4],
        pick_color: [u8; 4],
        vertex_base: u32,
        vertex_offset: i32,
        edge_indices_offset: i32,
    ) -> Self {
        Self {
            color,
            pick_color,
            flags: [0; 4],
            clip_flags: [0; 4],
            vertex_base: vertex_base.to_le_bytes(),
            vertex_offset: vertex_offset.to_le_bytes(),
            edge_indices_offset: edge_indices_offset.to_le_bytes(),
        }
    }

    /// Copy of this record placed at another vertex portion
    pub fn with_portion(&self, vertex_base: u32, vertex_offset: i32, edge_indices_offset: i32) -> Self {
        Self {
            vertex_base: vertex_base.to_le_bytes(),
            vertex_offset: vertex_offset.to_le_bytes(),
            edge_indices_offset: edge_indices_offset.to_le_bytes(),
            ..*self
        }
    }

    /// Decode a record from one attribute table row
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytemuck::try_pod_read_unaligned(bytes.get(..ATTRIBUTE_TEXELS * 4)?).ok()
    }

    #[inline]
    pub fn vertex_base(&self) -> u32 {
        u32::from_le_bytes(self.vertex_base)
    }

    /// Primitive index offset from a part's draw range to its geometry's
    /// indices; negative when the geometry was stored ahead of earlier draws.
    #[inline]
    pub fn vertex_offset(&self) -> i32 {
        i32::from_le_bytes(self.vertex_offset)
    }

    #[inline]
    pub fn edge_indices_offset(&self) -> i32 {
        i32::from_le_bytes(self.edge_indices_offset)
    }
}

/// Texture handles of a finalized layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTextureSet {
    pub positions: TextureHandle,
    pub indices: [TextureHandle; 3],
    pub edge_indices: [TextureHandle; 3],
    pub each_primitive_mesh: [TextureHandle; 3],
    pub each_edge_mesh: [TextureHandle; 3],
    pub each_mesh_attributes: TextureHandle,
    pub each_mesh_matrices: TextureHandle,
    pub each_mesh_offsets: TextureHandle,
}

impl DataTextureSet {
    /// Index texture of a tier
    #[inline]
    pub fn indices(&self, tier: IndexTier) -> TextureHandle {
        self.indices[tier.index()]
    }

    /// Edge index texture of a tier
    #[inline]
    pub fn edge_indices(&self, tier: IndexTier) -> TextureHandle {
        self.edge_indices[tier.index()]
    }

    /// Every handle in the set
    pub fn handles(&self) -> Vec<TextureHandle> {
        let mut handles = vec![self.positions];
        handles.extend_from_slice(&self.indices);
        handles.extend_from_slice(&self.edge_indices);
        handles.extend_from_slice(&self.each_primitive_mesh);
        handles.extend_from_slice(&self.each_edge_mesh);
        handles.extend_from_slice(&[
            self.each_mesh_attributes,
            self.each_mesh_matrices,
            self.each_mesh_offsets,
        ]);
        handles
    }
}
