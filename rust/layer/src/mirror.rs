// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CPU mirrors of mutable layer tables
//!
//! Every write lands in the mirror first. Immediate writes are then
//! uploaded as-is; deferred writes only widen the dirty row range, which
//! [`MirroredTexture::flush`] uploads in one call. An immediate upload the
//! backend rejects is treated like a deferred write.

use crate::backend::{DataTextureBackend, TexelRegion, TextureHandle};
use crate::data_texture::DataTexture;
use dtx_lite_core::Result;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct MirroredTexture {
    pub handle: TextureHandle,
    pub image: DataTexture,
    dirty_rows: Option<Range<usize>>,
}

impl MirroredTexture {
    pub fn new(handle: TextureHandle, image: DataTexture) -> Self {
        Self {
            handle,
            image,
            dirty_rows: None,
        }
    }

    /// Rows written since the last flush
    pub fn dirty_rows(&self) -> Option<Range<usize>> {
        self.dirty_rows.clone()
    }

    /// Write a region into the mirror, uploading it unless `deferred`
    pub fn write(
        &mut self,
        backend: &dyn DataTextureBackend,
        region: TexelRegion,
        bytes: &[u8],
        deferred: bool,
    ) -> Result<()> {
        self.image.write_region(&region, bytes);
        let rows = region.y..region.y + region.height;
        if deferred {
            self.mark_dirty(rows);
            return Ok(());
        }
        // A failed upload leaves the rows dirty for the next flush
        if let Err(e) = backend.write_texels(self.handle, region, bytes) {
            self.mark_dirty(rows);
            return Err(e);
        }
        Ok(())
    }

    fn mark_dirty(&mut self, rows: Range<usize>) {
        self.dirty_rows = Some(match self.dirty_rows.take() {
            Some(dirty) => dirty.start.min(rows.start)..dirty.end.max(rows.end),
            None => rows,
        });
    }

    /// Upload the dirty row range, if any, as one region write.
    ///
    /// Returns whether an upload happened. On a backend error the range
    /// stays dirty.
    pub fn flush(&mut self, backend: &dyn DataTextureBackend) -> Result<bool> {
        let Some(rows) = self.dirty_rows.take() else {
            return Ok(false);
        };
        let region = TexelRegion::rows(self.image.width, rows.clone());
        if let Err(e) = backend.write_texels(self.handle, region, &self.image.region_bytes(&region)) {
            self.dirty_rows = Some(rows);
            return Err(e);
        }
        Ok(true)
    }
}
