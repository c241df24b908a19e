// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer allocation
//!
//! A [`LayerSet`] routes each new mesh to the open layer of its primitive
//! kind and RTC origin, opening a fresh layer whenever the current one
//! refuses the mesh. Layers live in a slot map so that keys handed out to
//! callers stay valid while other layers are destroyed.

use crate::backend::DataTextureBackend;
use crate::layer::{layer_hash, Layer};
use crate::packer::MeshId;
use dtx_lite_core::{Config, Error, GeometryCompressedParams, MeshParams, Result};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::rc::Rc;

new_key_type! {
    /// Key of a layer in a [`LayerSet`]
    pub struct LayerKey;
}

pub struct LayerSet {
    config: Config,
    backend: Rc<dyn DataTextureBackend>,
    layers: SlotMap<LayerKey, Layer>,
    /// Current open layer per layer hash
    open: FxHashMap<String, LayerKey>,
    next_layer_index: usize,
}

impl std::fmt::Debug for LayerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerSet")
            .field("config", &self.config)
            .field("layers", &self.layers.len())
            .field("open", &self.open.len())
            .finish_non_exhaustive()
    }
}

impl LayerSet {
    pub fn new(config: Config, backend: Rc<dyn DataTextureBackend>) -> Self {
        Self {
            config: config.clamped(),
            backend,
            layers: SlotMap::with_key(),
            open: FxHashMap::default(),
            next_layer_index: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, key: LayerKey) -> Option<&Layer> {
        self.layers.get(key)
    }

    pub fn layer_mut(&mut self, key: LayerKey) -> Option<&mut Layer> {
        self.layers.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerKey, &Layer)> {
        self.layers.iter()
    }

    /// Key of the layer currently accepting meshes for `hash`
    pub fn open_layer(&self, hash: &str) -> Option<LayerKey> {
        self.open.get(hash).copied()
    }

    fn new_layer(&mut self, geometry: &GeometryCompressedParams, origin: [f64; 3]) -> Layer {
        let layer = Layer::new(
            geometry.primitive,
            origin,
            self.next_layer_index,
            self.config.clone(),
            self.backend.clone(),
        );
        self.next_layer_index += 1;
        layer
    }

    /// Create a mesh of `geometry` around `origin`, registering the geometry
    /// in the chosen layer if needed.
    pub fn create_mesh(
        &mut self,
        origin: [f64; 3],
        geometry: &GeometryCompressedParams,
        params: &MeshParams,
    ) -> Result<(LayerKey, MeshId)> {
        if params.geometry_id != geometry.id {
            return Err(Error::invalid_geometry(format!(
                "mesh '{}' refers to geometry '{}', got '{}'",
                params.id, params.geometry_id, geometry.id
            )));
        }

        // Reject bad buckets before a fresh layer can be opened for them
        for bucket in &geometry.geometry_buckets {
            bucket.validate(geometry.primitive)?;
        }

        let hash = layer_hash(geometry.primitive, origin);
        let current = self
            .open
            .get(&hash)
            .copied()
            .filter(|&key| {
                self.layers
                    .get(key)
                    .is_some_and(|layer| layer.can_accept_mesh(geometry))
            });

        // Open layer replaced by a fresh one, restored if the mesh fails
        let mut replaced = None;
        let key = match current {
            Some(key) => key,
            None => {
                let layer = self.new_layer(geometry, origin);
                if !layer.can_accept_mesh(geometry) {
                    self.next_layer_index -= 1;
                    return Err(Error::CapacityExceeded(format!(
                        "geometry '{}' does not fit an empty layer",
                        geometry.id
                    )));
                }
                if let Some(full) = self.open.get(&hash).and_then(|&k| self.layers.get(k)) {
                    tracing::debug!(
                        layer = %hash,
                        retired = full.layer_index(),
                        opened = layer.layer_index(),
                        meshes = full.num_meshes(),
                        "layer full, opening another"
                    );
                }
                let key = self.layers.insert(layer);
                replaced = Some(self.open.insert(hash.clone(), key));
                key
            }
        };

        let created = match self.layers.get_mut(key) {
            Some(layer) => add_mesh(layer, geometry, params),
            None => Err(Error::invalid_state("open layer missing")),
        };
        match created {
            Ok(mesh) => Ok((key, mesh)),
            Err(e) => {
                if let Some(previous) = replaced {
                    self.layers.remove(key);
                    self.next_layer_index -= 1;
                    match previous {
                        Some(previous) => self.open.insert(hash, previous),
                        None => self.open.remove(&hash),
                    };
                }
                Err(e)
            }
        }
    }

    /// Finalize every layer still open. Returns how many were finalized.
    pub fn finalize_all(&mut self) -> Result<usize> {
        self.open.clear();
        let mut finalized = 0;
        for (_, layer) in self.layers.iter_mut().filter(|(_, l)| l.is_open()) {
            layer.finalize()?;
            finalized += 1;
        }
        tracing::debug!(finalized, layers = self.layers.len(), "layers finalized");
        Ok(finalized)
    }

    pub fn begin_deferred_flags(&mut self) -> Result<()> {
        for layer in self.layers.values_mut() {
            layer.begin_deferred_flags()?;
        }
        Ok(())
    }

    pub fn commit_deferred_flags(&mut self) -> Result<()> {
        for layer in self.layers.values_mut() {
            layer.commit_deferred_flags()?;
        }
        Ok(())
    }

    /// Destroy and remove one layer. Unknown keys are ignored.
    pub fn destroy(&mut self, key: LayerKey) {
        if let Some(mut layer) = self.layers.remove(key) {
            self.open.retain(|_, open| *open != key);
            layer.destroy();
        }
    }

    /// Destroy every layer
    pub fn clear(&mut self) {
        self.open.clear();
        for (_, mut layer) in self.layers.drain() {
            layer.destroy();
        }
    }
}

fn add_mesh(
    layer: &mut Layer,
    geometry: &GeometryCompressedParams,
    params: &MeshParams,
) -> Result<MeshId> {
    if !layer.has_geometry(&geometry.id) {
        layer.create_geometry_compressed(geometry)?;
    }
    layer.create_mesh(params)
}
