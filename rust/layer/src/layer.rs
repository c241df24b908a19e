// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layers
//!
//! A [`Layer`] packs meshes of one primitive kind around one RTC origin into
//! a fixed set of data textures. It moves through three states:
//!
//! - **Open**: geometry and meshes accumulate in a [`LayerBuilder`]
//! - **Finalized**: buffers are encoded and uploaded; only per-mesh state
//!   can change
//! - **Destroyed**: textures are released; every operation fails
//!
//! Per-mesh state changes write the mesh's attribute texels to a CPU mirror
//! of the attribute table. Outside a deferred scope each change is uploaded
//! at once; inside one, changes only mark rows dirty and
//! [`Layer::commit_deferred_flags`] uploads each dirty table once.
//!
//! A new layer starts inside a deferred scope, so the initial flags of all
//! its meshes are uploaded by a single [`Layer::flush_init_flags`].

use crate::backend::{DataTextureBackend, TexelRegion, TextureHandle};
use crate::data_texture::{
    DataTexture, DataTextureSet, MeshAttributeRecord, ATTRIBUTE_TEXELS, CLIP_TEXEL, COLOR_TEXEL,
    FLAGS_TEXEL, MODEL_MATRIX_TEXEL,
};
use crate::mesh_counts::MeshCounts;
use crate::mirror::MirroredTexture;
use crate::packer::{EncodedTables, LayerBuilder, MeshId, MeshPartHandle};
use crate::render_flags::{encode_render_flags, EncodedFlags};
use dtx_lite_core::{
    Aabb3, Config, Error, GeometryCompressedParams, MeshParams, ObjectFlags, Primitive, Result,
};
use nalgebra::Matrix4;
use std::rc::Rc;

/// Deterministic key of a layer's primitive kind and origin
pub fn layer_hash(primitive: Primitive, origin: [f64; 3]) -> String {
    format!(
        "layer-{}-{}-{}-{}",
        primitive, origin[0], origin[1], origin[2]
    )
}

/// What a renderer needs to draw a layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRenderState {
    pub primitive: Primitive,
    pub origin: [f64; 3],
    /// Indices drawn per index tier
    pub num_indices: [usize; 3],
    /// Edge indices drawn per index tier
    pub num_edge_indices: [usize; 3],
    pub num_vertices: usize,
    /// Data textures, once finalized
    pub textures: Option<DataTextureSet>,
}

/// Current state of one mesh
#[derive(Debug, Clone, Copy, PartialEq)]
struct MeshState {
    flags: ObjectFlags,
    transparent: bool,
    color: [u8; 3],
    colorize: Option<[u8; 3]>,
    opacity: u8,
    offset: [f32; 3],
    matrix: Matrix4<f64>,
    /// Geometry bounds before the mesh transform
    local_aabb: Aabb3,
    aabb: Aabb3,
    first_part: u32,
    num_parts: u32,
}

impl MeshState {
    #[inline]
    fn encoded(&self) -> EncodedFlags {
        encode_render_flags(self.flags, self.transparent)
    }

    #[inline]
    fn effective_color(&self) -> [u8; 4] {
        let [r, g, b] = self.colorize.unwrap_or(self.color);
        [r, g, b, self.opacity]
    }

    /// `width` texels starting at column `x` in every row of this mesh's parts
    #[inline]
    fn parts_region(&self, x: usize, width: usize) -> TexelRegion {
        TexelRegion::new(x, self.first_part as usize, width, self.num_parts as usize)
    }
}

#[derive(Debug)]
struct FinalizedTables {
    textures: DataTextureSet,
    attributes: MirroredTexture,
    matrices: MirroredTexture,
    offsets: MirroredTexture,
}

#[derive(Debug)]
enum LayerState {
    Open(Box<LayerBuilder>),
    Finalized(Box<FinalizedTables>),
    Destroyed,
}

impl LayerState {
    fn name(&self) -> &'static str {
        match self {
            LayerState::Open(_) => "open",
            LayerState::Finalized(_) => "finalized",
            LayerState::Destroyed => "destroyed",
        }
    }
}

fn open_builder(state: &mut LayerState) -> Result<&mut LayerBuilder> {
    match state {
        LayerState::Open(builder) => Ok(builder),
        LayerState::Finalized(_) => Err(Error::invalid_state("layer already finalized")),
        LayerState::Destroyed => Err(Error::invalid_state("layer destroyed")),
    }
}

fn finalized_tables(state: &mut LayerState) -> Result<&mut FinalizedTables> {
    match state {
        LayerState::Finalized(tables) => Ok(tables),
        LayerState::Open(_) => Err(Error::invalid_state("layer not finalized")),
        LayerState::Destroyed => Err(Error::invalid_state("layer destroyed")),
    }
}

/// Creates textures, remembering them so a failed upload can be undone
struct TextureUploader<'a> {
    backend: &'a dyn DataTextureBackend,
    created: Vec<TextureHandle>,
}

impl<'a> TextureUploader<'a> {
    fn new(backend: &'a dyn DataTextureBackend) -> Self {
        Self {
            backend,
            created: Vec::new(),
        }
    }

    fn create(&mut self, texture: &DataTexture) -> Result<TextureHandle> {
        let handle = self.backend.create_texture(texture)?;
        self.created.push(handle);
        Ok(handle)
    }

    fn create_tiers(&mut self, textures: &[DataTexture; 3]) -> Result<[TextureHandle; 3]> {
        Ok([
            self.create(&textures[0])?,
            self.create(&textures[1])?,
            self.create(&textures[2])?,
        ])
    }

    fn upload(&mut self, tables: &EncodedTables) -> Result<DataTextureSet> {
        Ok(DataTextureSet {
            positions: self.create(&tables.positions)?,
            indices: self.create_tiers(&tables.indices)?,
            edge_indices: self.create_tiers(&tables.edge_indices)?,
            each_primitive_mesh: self.create_tiers(&tables.each_primitive_mesh)?,
            each_edge_mesh: self.create_tiers(&tables.each_edge_mesh)?,
            each_mesh_attributes: self.create(&tables.attributes)?,
            each_mesh_matrices: self.create(&tables.matrices)?,
            each_mesh_offsets: self.create(&tables.offsets)?,
        })
    }

    fn rollback(self) {
        for handle in self.created {
            self.backend.destroy_texture(handle);
        }
    }
}

/// A fixed-capacity container of meshes sharing one primitive kind and one
/// RTC origin.
pub struct Layer {
    primitive: Primitive,
    origin: [f64; 3],
    layer_index: usize,
    config: Config,
    backend: Rc<dyn DataTextureBackend>,
    state: LayerState,
    meshes: Vec<MeshState>,
    parts: Vec<MeshPartHandle>,
    counts: MeshCounts,
    num_vertices: usize,
    num_indices: [usize; 3],
    num_edge_indices: [usize; 3],
    deferred: bool,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("hash", &self.hash())
            .field("layer_index", &self.layer_index)
            .field("state", &self.state.name())
            .field("meshes", &self.meshes.len())
            .field("parts", &self.parts.len())
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

impl Layer {
    /// Create an open layer, inside a deferred-flags scope. Limits outside
    /// what a layer can address are clamped (see [`Config::clamped`]).
    pub fn new(
        primitive: Primitive,
        origin: [f64; 3],
        layer_index: usize,
        config: Config,
        backend: Rc<dyn DataTextureBackend>,
    ) -> Self {
        Self {
            primitive,
            origin,
            layer_index,
            config: config.clamped(),
            backend,
            state: LayerState::Open(Box::new(LayerBuilder::new(primitive))),
            meshes: Vec::new(),
            parts: Vec::new(),
            counts: MeshCounts::new(),
            num_vertices: 0,
            num_indices: [0; 3],
            num_edge_indices: [0; 3],
            deferred: true,
        }
    }

    /// `layer-{primitive}-{x}-{y}-{z}`
    pub fn hash(&self) -> String {
        layer_hash(self.primitive, self.origin)
    }

    #[inline]
    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    #[inline]
    pub fn layer_index(&self) -> usize {
        self.layer_index
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self.state, LayerState::Open(_))
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, LayerState::Finalized(_))
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, LayerState::Destroyed)
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// True when no mesh was ever created in the layer
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.num_meshes == 0
    }

    #[inline]
    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn num_mesh_parts(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn mesh_counts(&self) -> &MeshCounts {
        &self.counts
    }

    /// Whether a geometry is registered; always false once finalized
    pub fn has_geometry(&self, geometry_id: &str) -> bool {
        match &self.state {
            LayerState::Open(builder) => builder.has_geometry(geometry_id),
            _ => false,
        }
    }

    /// Whether one more mesh of `geometry` fits, registering the geometry
    /// first if it is not in the layer yet. Never mutates; false unless open.
    pub fn can_accept_mesh(&self, geometry: &GeometryCompressedParams) -> bool {
        match &self.state {
            LayerState::Open(builder) => builder.can_accept(geometry, &self.config),
            _ => false,
        }
    }

    /// Register a geometry's buckets
    pub fn create_geometry_compressed(&mut self, geometry: &GeometryCompressedParams) -> Result<()> {
        let builder = open_builder(&mut self.state)?;
        builder.check_geometry(geometry)?;
        if !builder.can_accept(geometry, &self.config) {
            return Err(Error::CapacityExceeded(format!(
                "geometry '{}' does not fit layer {}",
                geometry.id,
                layer_hash(self.primitive, self.origin)
            )));
        }
        builder.add_geometry(geometry);
        Ok(())
    }

    /// Create a mesh instance of a registered geometry.
    ///
    /// The mesh starts with no flags set; give it its initial state with
    /// [`init_mesh_flags`](Self::init_mesh_flags) after finalizing.
    pub fn create_mesh(&mut self, params: &MeshParams) -> Result<MeshId> {
        let builder = open_builder(&mut self.state)?;

        let mesh = MeshId(self.meshes.len() as u32);
        let flags = ObjectFlags::empty();
        let transparent = params.is_transparent();
        let encoded = encode_render_flags(flags, transparent);

        let [r, g, b] = params.color;
        let mut initial =
            MeshAttributeRecord::new([r, g, b, params.opacity], params.pick_color, 0, 0, 0);
        initial.flags = encoded.flags_texel();
        initial.clip_flags = encoded.clip_texel();

        let (parts, local_aabb) = builder.add_mesh(mesh, params, &initial, &self.config)?;

        let matrix = params.matrix.unwrap_or_else(Matrix4::identity);
        self.meshes.push(MeshState {
            flags,
            transparent,
            color: params.color,
            colorize: None,
            opacity: params.opacity,
            offset: [0.0; 3],
            matrix,
            local_aabb,
            aabb: local_aabb.transformed(params.matrix.as_ref()),
            first_part: self.parts.len() as u32,
            num_parts: parts.len() as u32,
        });
        self.parts.extend(parts);

        self.counts.num_meshes += 1;
        self.counts.update(ObjectFlags::empty(), false, flags, transparent);

        Ok(mesh)
    }

    /// Encode and upload all tables, then drop the accumulation buffers
    pub fn finalize(&mut self) -> Result<()> {
        let builder = match &self.state {
            LayerState::Open(builder) => builder,
            LayerState::Finalized(_) => {
                return Err(Error::invalid_state("layer already finalized"))
            }
            LayerState::Destroyed => return Err(Error::invalid_state("layer destroyed")),
        };

        let tables = builder.encode(self.config.data_texture_width);
        let mut uploader = TextureUploader::new(self.backend.as_ref());
        let textures = match uploader.upload(&tables) {
            Ok(textures) => textures,
            Err(e) => {
                uploader.rollback();
                return Err(e);
            }
        };

        self.num_vertices = builder.num_vertices();
        self.num_indices = builder.num_indices();
        self.num_edge_indices = builder.num_edge_indices();

        let EncodedTables {
            attributes,
            matrices,
            offsets,
            ..
        } = tables;

        tracing::debug!(
            layer = %self.hash(),
            meshes = self.meshes.len(),
            parts = self.parts.len(),
            vertices = self.num_vertices,
            "layer finalized"
        );

        self.state = LayerState::Finalized(Box::new(FinalizedTables {
            attributes: MirroredTexture::new(textures.each_mesh_attributes, attributes),
            matrices: MirroredTexture::new(textures.each_mesh_matrices, matrices),
            offsets: MirroredTexture::new(textures.each_mesh_offsets, offsets),
            textures,
        }));
        Ok(())
    }

    /// Summary of the layer for rendering
    pub fn render_state(&self) -> Result<LayerRenderState> {
        let (num_indices, num_edge_indices, num_vertices, textures) = match &self.state {
            LayerState::Open(builder) => (
                builder.num_indices(),
                builder.num_edge_indices(),
                builder.num_vertices(),
                None,
            ),
            LayerState::Finalized(tables) => (
                self.num_indices,
                self.num_edge_indices,
                self.num_vertices,
                Some(tables.textures.clone()),
            ),
            LayerState::Destroyed => return Err(Error::invalid_state("layer destroyed")),
        };
        Ok(LayerRenderState {
            primitive: self.primitive,
            origin: self.origin,
            num_indices,
            num_edge_indices,
            num_vertices,
            textures,
        })
    }

    fn mesh(&self, mesh: MeshId) -> Result<&MeshState> {
        if self.is_destroyed() {
            return Err(Error::invalid_state("layer destroyed"));
        }
        self.meshes
            .get(mesh.index())
            .ok_or(Error::MeshNotFound(mesh.0))
    }

    /// World bounds of a mesh
    pub fn mesh_aabb(&self, mesh: MeshId) -> Result<Aabb3> {
        Ok(self.mesh(mesh)?.aabb)
    }

    pub fn mesh_flags(&self, mesh: MeshId) -> Result<ObjectFlags> {
        Ok(self.mesh(mesh)?.flags)
    }

    pub fn is_mesh_transparent(&self, mesh: MeshId) -> Result<bool> {
        Ok(self.mesh(mesh)?.transparent)
    }

    /// Part handles of a mesh, one per bucket of its geometry
    pub fn mesh_parts(&self, mesh: MeshId) -> Result<&[MeshPartHandle]> {
        let state = self.mesh(mesh)?;
        let first = state.first_part as usize;
        Ok(&self.parts[first..first + state.num_parts as usize])
    }

    /// Attribute records of a mesh's parts as currently mirrored
    pub fn mesh_attributes(&self, mesh: MeshId) -> Result<Vec<MeshAttributeRecord>> {
        let state = *self.mesh(mesh)?;
        let tables = match &self.state {
            LayerState::Finalized(tables) => tables,
            _ => return Err(Error::invalid_state("layer not finalized")),
        };
        let region = state.parts_region(0, ATTRIBUTE_TEXELS);
        let bytes = tables.attributes.image.region_bytes(&region);
        Ok(bytes
            .chunks_exact(ATTRIBUTE_TEXELS * 4)
            .filter_map(MeshAttributeRecord::from_bytes)
            .collect())
    }

    /// World bounds of all meshes
    pub fn aabb(&self) -> Aabb3 {
        let mut aabb = Aabb3::collapsed();
        for mesh in &self.meshes {
            aabb.expand_aabb(&mesh.aabb);
        }
        aabb
    }

    /// Apply a state change to one mesh, keep the counters in step and
    /// write every attribute texel whose encoding changed.
    fn update_mesh(&mut self, mesh: MeshId, update: impl FnOnce(&mut MeshState)) -> Result<()> {
        let tables = finalized_tables(&mut self.state)?;
        let state = self
            .meshes
            .get_mut(mesh.index())
            .ok_or(Error::MeshNotFound(mesh.0))?;

        let before = *state;
        update(state);
        let after = *state;
        if before == after {
            return Ok(());
        }

        self.counts
            .update(before.flags, before.transparent, after.flags, after.transparent);

        if after.num_parts == 0 {
            return Ok(());
        }

        let backend = self.backend.as_ref();
        let deferred = self.deferred;
        let n = after.num_parts as usize;
        let (encoded_before, encoded_after) = (before.encoded(), after.encoded());

        // Every changed table is written even after a failed upload, so the
        // mirrors always hold the new state for the next commit.
        let mut outcome = Ok(());
        if encoded_before.flags_texel() != encoded_after.flags_texel() {
            outcome = outcome.and(tables.attributes.write(
                backend,
                after.parts_region(FLAGS_TEXEL, 1),
                &encoded_after.flags_texel().repeat(n),
                deferred,
            ));
        }
        if encoded_before.clip_texel() != encoded_after.clip_texel() {
            outcome = outcome.and(tables.attributes.write(
                backend,
                after.parts_region(CLIP_TEXEL, 1),
                &encoded_after.clip_texel().repeat(n),
                deferred,
            ));
        }
        if before.effective_color() != after.effective_color() {
            outcome = outcome.and(tables.attributes.write(
                backend,
                after.parts_region(COLOR_TEXEL, 1),
                &after.effective_color().repeat(n),
                deferred,
            ));
        }
        if before.offset != after.offset {
            let texel: &[u8] = bytemuck::cast_slice(&after.offset);
            outcome = outcome.and(tables.offsets.write(
                backend,
                after.parts_region(0, 1),
                &texel.repeat(n),
                deferred,
            ));
        }
        if before.matrix != after.matrix {
            let model: Matrix4<f32> = after.matrix.cast();
            let texels: &[u8] = bytemuck::cast_slice(model.as_slice());
            outcome = outcome.and(tables.matrices.write(
                backend,
                after.parts_region(MODEL_MATRIX_TEXEL, 4),
                &texels.repeat(n),
                deferred,
            ));
        }
        if let Err(e) = &outcome {
            tracing::warn!(mesh = mesh.0, error = %e, "mesh state upload failed, kept for next commit");
        }
        outcome
    }

    fn set_mesh_flag(&mut self, mesh: MeshId, flag: ObjectFlags, value: bool) -> Result<()> {
        self.update_mesh(mesh, |state| state.flags.set(flag, value))
    }

    /// Give a mesh its initial state after finalizing
    pub fn init_mesh_flags(
        &mut self,
        mesh: MeshId,
        flags: ObjectFlags,
        transparent: bool,
    ) -> Result<()> {
        self.update_mesh(mesh, |state| {
            state.flags = flags;
            state.transparent = transparent;
        })
    }

    /// Upload the initial flags written since the layer was created
    pub fn flush_init_flags(&mut self) -> Result<()> {
        self.commit_deferred_flags()
    }

    pub fn set_mesh_visible(&mut self, mesh: MeshId, visible: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::VISIBLE, visible)
    }

    pub fn set_mesh_highlighted(&mut self, mesh: MeshId, highlighted: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::HIGHLIGHTED, highlighted)
    }

    pub fn set_mesh_xrayed(&mut self, mesh: MeshId, xrayed: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::XRAYED, xrayed)
    }

    pub fn set_mesh_selected(&mut self, mesh: MeshId, selected: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::SELECTED, selected)
    }

    pub fn set_mesh_edges(&mut self, mesh: MeshId, edges: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::EDGES, edges)
    }

    pub fn set_mesh_clippable(&mut self, mesh: MeshId, clippable: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::CLIPPABLE, clippable)
    }

    pub fn set_mesh_culled(&mut self, mesh: MeshId, culled: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::CULLED, culled)
    }

    pub fn set_mesh_pickable(&mut self, mesh: MeshId, pickable: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::PICKABLE, pickable)
    }

    /// Collision state has no render encoding; only the stored flag changes
    pub fn set_mesh_collidable(&mut self, mesh: MeshId, collidable: bool) -> Result<()> {
        self.set_mesh_flag(mesh, ObjectFlags::COLLIDABLE, collidable)
    }

    pub fn set_mesh_transparent(&mut self, mesh: MeshId, transparent: bool) -> Result<()> {
        self.update_mesh(mesh, |state| state.transparent = transparent)
    }

    /// Set the base color
    pub fn set_mesh_color(&mut self, mesh: MeshId, color: [u8; 3]) -> Result<()> {
        self.update_mesh(mesh, |state| state.color = color)
    }

    /// Override the base color, or restore it with `None`
    pub fn set_mesh_colorize(&mut self, mesh: MeshId, colorize: Option<[u8; 3]>) -> Result<()> {
        self.update_mesh(mesh, |state| state.colorize = colorize)
    }

    /// Set opacity; the mesh is transparent below 255
    pub fn set_mesh_opacity(&mut self, mesh: MeshId, opacity: u8) -> Result<()> {
        self.update_mesh(mesh, |state| {
            state.opacity = opacity;
            state.transparent = opacity < 255;
        })
    }

    /// Translate the mesh in the layer's RTC frame
    pub fn set_mesh_offset(&mut self, mesh: MeshId, offset: [f32; 3]) -> Result<()> {
        self.update_mesh(mesh, |state| state.offset = offset)
    }

    /// Replace the modeling transform
    pub fn set_mesh_matrix(&mut self, mesh: MeshId, matrix: Matrix4<f64>) -> Result<()> {
        self.update_mesh(mesh, |state| {
            state.matrix = matrix;
            state.aabb = state.local_aabb.transformed(Some(&matrix));
        })
    }

    /// Start batching state changes into the CPU mirrors
    pub fn begin_deferred_flags(&mut self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::invalid_state("layer destroyed"));
        }
        self.deferred = true;
        Ok(())
    }

    /// End the deferred scope, uploading each dirty table once
    pub fn commit_deferred_flags(&mut self) -> Result<()> {
        self.deferred = false;
        let tables = match &mut self.state {
            LayerState::Finalized(tables) => tables,
            LayerState::Open(_) => return Ok(()),
            LayerState::Destroyed => return Err(Error::invalid_state("layer destroyed")),
        };

        let backend = self.backend.as_ref();
        let mut uploads = 0;
        for table in [
            &mut tables.attributes,
            &mut tables.matrices,
            &mut tables.offsets,
        ] {
            if table.flush(backend)? {
                uploads += 1;
            }
        }

        if uploads > 0 {
            tracing::trace!(layer = self.layer_index, uploads, "deferred flags committed");
        }
        Ok(())
    }

    /// Release all textures. Safe to call in any state and more than once.
    pub fn destroy(&mut self) {
        match std::mem::replace(&mut self.state, LayerState::Destroyed) {
            LayerState::Finalized(tables) => {
                for handle in tables.textures.handles() {
                    self.backend.destroy_texture(handle);
                }
                tracing::debug!(layer = %self.hash(), "layer destroyed");
            }
            LayerState::Open(_) => {
                tracing::debug!(layer = %self.hash(), "open layer destroyed");
            }
            LayerState::Destroyed => {}
        }
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        self.destroy();
    }
}
