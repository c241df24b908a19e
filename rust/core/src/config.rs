// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration, optionally overridden from environment variables.

/// Maximum mesh parts per layer (12-bit part IDs)
pub const MAX_MESH_PARTS: usize = 1 << 12;

/// Maximum data texture height in rows
pub const MAX_DATA_TEXTURE_HEIGHT: usize = 1 << 11;

/// Data texture row width in texels
pub const DATA_TEXTURE_WIDTH: usize = 1024;

/// Mesh part IDs are 16-bit in the lookup tables
pub const MAX_PART_IDS: usize = 1 << 16;

/// Default bucketing budget: buckets addressable with 8-bit indices
pub const DEFAULT_BITS_PER_BUCKET: u32 = 8;

/// Layer packing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of mesh parts per layer.
    pub max_mesh_parts: usize,
    /// Maximum data texture height; bounds vertices and indices per layer.
    pub max_data_texture_height: usize,
    /// Texels per data texture row.
    pub data_texture_width: usize,
    /// Index-width budget used when bucketing geometry.
    pub bits_per_bucket: u32,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// built-in defaults for anything missing or unparseable.
    pub fn from_env() -> Self {
        Self {
            max_mesh_parts: env_or("DTX_MAX_MESH_PARTS", MAX_MESH_PARTS),
            max_data_texture_height: env_or("DTX_MAX_DATA_TEXTURE_HEIGHT", MAX_DATA_TEXTURE_HEIGHT),
            data_texture_width: env_or("DTX_DATA_TEXTURE_WIDTH", DATA_TEXTURE_WIDTH),
            bits_per_bucket: env_or("DTX_BITS_PER_BUCKET", DEFAULT_BITS_PER_BUCKET),
        }
        .clamped()
    }

    /// Pull every limit into the range layers can address: at most
    /// [`MAX_PART_IDS`] mesh parts, and textures at least one texel wide
    /// and tall.
    pub fn clamped(self) -> Self {
        Self {
            max_mesh_parts: self.max_mesh_parts.min(MAX_PART_IDS),
            max_data_texture_height: self.max_data_texture_height.max(1),
            data_texture_width: self.data_texture_width.max(1),
            bits_per_bucket: self.bits_per_bucket,
        }
    }

    /// Maximum vertices, and separately indices, a layer may hold.
    #[inline]
    pub fn max_texels(&self) -> usize {
        self.max_data_texture_height * self.data_texture_width
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_mesh_parts: MAX_MESH_PARTS,
            max_data_texture_height: MAX_DATA_TEXTURE_HEIGHT,
            data_texture_width: DATA_TEXTURE_WIDTH,
            bits_per_bucket: DEFAULT_BITS_PER_BUCKET,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
