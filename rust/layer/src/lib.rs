// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # DTX-Lite Layers
//!
//! Packs bucketed geometry and mesh instances into fixed-capacity layers of
//! GPU data textures, and keeps per-mesh render state in sync with them.
//!
//! ## Overview
//!
//! - **Packing**: [`LayerBuilder`] accumulates positions, tiered indices and
//!   per-part lookup tables while a layer is open
//! - **Layers**: [`Layer`] finalizes the buffers into textures and applies
//!   per-mesh state changes, immediately or in deferred batches
//! - **Flag encoding**: [`encode_render_flags`] folds object flags into
//!   render pass codes
//! - **Allocation**: [`LayerSet`] opens a new layer whenever the current one
//!   is full
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dtx_lite_layer::{LayerSet, RecordingBackend};
//! use dtx_lite_core::{Config, MeshParams, ObjectFlags};
//! use std::rc::Rc;
//!
//! let mut layers = LayerSet::new(Config::default(), Rc::new(RecordingBackend::new()));
//! let (key, mesh) = layers.create_mesh([0.0; 3], &geometry, &MeshParams::new("wall", &geometry.id))?;
//! layers.finalize_all()?;
//!
//! let layer = layers.layer_mut(key).unwrap();
//! layer.init_mesh_flags(mesh, ObjectFlags::initial(), false)?;
//! layer.flush_init_flags()?;
//! layer.set_mesh_selected(mesh, true)?;
//! ```

pub mod allocator;
pub mod backend;
pub mod data_texture;
pub mod layer;
pub mod mesh_counts;
pub mod mirror;
pub mod packer;
pub mod render_flags;
pub mod tier;

pub use dtx_lite_core::{Error, Result};

pub use allocator::{LayerKey, LayerSet};
pub use backend::{DataTextureBackend, RecordingBackend, TexelRegion, TextureHandle};
pub use data_texture::{
    DataTexture, DataTextureSet, MeshAttributeRecord, TexelFormat, ATTRIBUTE_TEXELS,
    INDICES_ALIGNMENT,
};
pub use layer::{layer_hash, Layer, LayerRenderState};
pub use mesh_counts::MeshCounts;
pub use packer::{
    EncodedTables, GeometryBucketHandle, GeometryHandle, LayerBuilder, MeshId, MeshPartHandle,
};
pub use render_flags::{encode_render_flags, EncodedFlags, RenderPass};
pub use tier::IndexTier;
