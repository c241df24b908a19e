// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data texture backend abstraction
//!
//! Layers never talk to a graphics API directly. They create, update and
//! release textures through a [`DataTextureBackend`], implemented by the
//! WebGL2 or wgpu front end, or by [`RecordingBackend`] for headless use.

use crate::data_texture::DataTexture;
use dtx_lite_core::{Error, Result};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};

/// Opaque handle to a backend texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Rectangle of texels, in texel units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexelRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl TexelRegion {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whole rows `rows.start..rows.end` of a texture `width` texels wide
    pub fn rows(width: usize, rows: std::ops::Range<usize>) -> Self {
        Self::new(0, rows.start, width, rows.end - rows.start)
    }
}

/// GPU-side texture storage used by layers
pub trait DataTextureBackend {
    /// Upload a whole texture
    fn create_texture(&self, texture: &DataTexture) -> Result<TextureHandle>;

    /// Overwrite a region of a texture with tightly packed texel bytes
    fn write_texels(&self, handle: TextureHandle, region: TexelRegion, data: &[u8]) -> Result<()>;

    /// Release a texture; unknown handles are ignored
    fn destroy_texture(&self, handle: TextureHandle);
}

/// Headless backend keeping a CPU copy of every texture.
///
/// Counts every write so that callers can assert how many uploads a batch
/// of state changes cost.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    textures: RefCell<FxHashMap<TextureHandle, DataTexture>>,
    next_handle: Cell<u32>,
    uploads: Cell<usize>,
    uploads_per_texture: RefCell<FxHashMap<TextureHandle, usize>>,
    rejected_writes: Cell<usize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region writes since creation or the last [`reset_uploads`](Self::reset_uploads)
    pub fn uploads(&self) -> usize {
        self.uploads.get()
    }

    /// Region writes to one texture
    pub fn uploads_to(&self, handle: TextureHandle) -> usize {
        self.uploads_per_texture
            .borrow()
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_uploads(&self) {
        self.uploads.set(0);
        self.uploads_per_texture.borrow_mut().clear();
    }

    /// Copy of a live texture's current contents
    pub fn texture(&self, handle: TextureHandle) -> Option<DataTexture> {
        self.textures.borrow().get(&handle).cloned()
    }

    /// Number of textures created and not yet destroyed
    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    /// Reject the next `count` region writes with a backend error, as a lost
    /// device would
    pub fn reject_next_writes(&self, count: usize) {
        self.rejected_writes.set(count);
    }
}

impl DataTextureBackend for RecordingBackend {
    fn create_texture(&self, texture: &DataTexture) -> Result<TextureHandle> {
        let expected = texture.num_texels() * texture.format.bytes_per_texel();
        if texture.data.len() != expected {
            return Err(Error::Backend(format!(
                "texture '{}' has {} bytes, expected {}",
                texture.label,
                texture.data.len(),
                expected
            )));
        }

        let handle = TextureHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);

        tracing::trace!(
            label = texture.label,
            width = texture.width,
            height = texture.height,
            handle = handle.0,
            "creating data texture"
        );

        self.textures.borrow_mut().insert(handle, texture.clone());
        Ok(handle)
    }

    fn write_texels(&self, handle: TextureHandle, region: TexelRegion, data: &[u8]) -> Result<()> {
        let rejected = self.rejected_writes.get();
        if rejected > 0 {
            self.rejected_writes.set(rejected - 1);
            return Err(Error::Backend(format!("write to texture {} rejected", handle.0)));
        }

        let mut textures = self.textures.borrow_mut();
        let texture = textures
            .get_mut(&handle)
            .ok_or_else(|| Error::Backend(format!("unknown texture {}", handle.0)))?;

        if !texture.contains(&region) {
            return Err(Error::Backend(format!(
                "region {:?} outside '{}' ({}x{})",
                region, texture.label, texture.width, texture.height
            )));
        }
        let expected = region.width * region.height * texture.format.bytes_per_texel();
        if data.len() != expected {
            return Err(Error::Backend(format!(
                "{} bytes for a region of {} bytes",
                data.len(),
                expected
            )));
        }

        texture.write_region(&region, data);
        self.uploads.set(self.uploads.get() + 1);
        *self
            .uploads_per_texture
            .borrow_mut()
            .entry(handle)
            .or_insert(0) += 1;
        Ok(())
    }

    fn destroy_texture(&self, handle: TextureHandle) {
        if self.textures.borrow_mut().remove(&handle).is_some() {
            tracing::trace!(handle = handle.0, "destroyed data texture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_texture::TexelFormat;

    fn attrs() -> DataTexture {
        DataTexture::from_components::<u8>("attrs", TexelFormat::RGBA8UI, 7, &[0; 56])
    }

    #[test]
    fn test_create_write_destroy() {
        let backend = RecordingBackend::new();
        let handle = backend.create_texture(&attrs()).unwrap();
        assert_eq!(backend.live_textures(), 1);

        backend
            .write_texels(handle, TexelRegion::new(2, 1, 1, 1), &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(backend.uploads(), 1);
        assert_eq!(backend.uploads_to(handle), 1);
        assert_eq!(backend.texture(handle).unwrap().texel(2, 1), &[1, 2, 3, 4]);

        backend.destroy_texture(handle);
        assert_eq!(backend.live_textures(), 0);
        assert!(backend.texture(handle).is_none());
    }

    #[test]
    fn test_rejects_bad_writes() {
        let backend = RecordingBackend::new();
        let handle = backend.create_texture(&attrs()).unwrap();
        assert!(matches!(
            backend.write_texels(handle, TexelRegion::new(0, 2, 1, 1), &[0; 4]),
            Err(Error::Backend(_))
        ));
        assert!(backend
            .write_texels(handle, TexelRegion::new(0, 0, 2, 1), &[0; 4])
            .is_err());
        assert!(backend
            .write_texels(TextureHandle(99), TexelRegion::new(0, 0, 1, 1), &[0; 4])
            .is_err());
        assert_eq!(backend.uploads(), 0);
    }

    #[test]
    fn test_rows_region() {
        let region = TexelRegion::rows(7, 3..5);
        assert_eq!(region, TexelRegion::new(0, 3, 7, 2));
    }
}
