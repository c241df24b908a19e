// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry and mesh descriptors handed over by the scene graph
//!
//! These are plain data: a layer copies what it needs out of them, so the
//! scene graph keeps ownership of its own buffers.

use crate::aabb::Aabb3;
use crate::error::{Error, Result};
use crate::primitive::Primitive;
use nalgebra::Matrix4;

/// One bucket of a compressed geometry, small enough to be addressed with
/// the bucket's index width.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeometryBucketParams {
    /// Quantized positions (x, y, z)
    pub positions_compressed: Vec<u16>,
    /// Primitive indices into `positions_compressed`
    pub indices: Option<Vec<u32>>,
    /// Unique edge vertex pairs
    pub edge_indices: Option<Vec<u32>>,
}

impl GeometryBucketParams {
    #[inline]
    pub fn num_positions(&self) -> usize {
        self.positions_compressed.len() / 3
    }

    #[inline]
    pub fn num_indices(&self) -> usize {
        self.indices.as_ref().map_or(0, |i| i.len())
    }

    #[inline]
    pub fn num_edge_indices(&self) -> usize {
        self.edge_indices.as_ref().map_or(0, |e| e.len())
    }

    /// Check index ranges and array shapes for the given primitive
    pub fn validate(&self, primitive: Primitive) -> Result<()> {
        if self.positions_compressed.len() % 3 != 0 {
            return Err(Error::invalid_geometry(format!(
                "positions length {} is not a multiple of 3",
                self.positions_compressed.len()
            )));
        }
        let num_positions = self.num_positions() as u32;
        if let Some(indices) = &self.indices {
            let stride = primitive.verts_per_primitive();
            if indices.len() % stride != 0 {
                return Err(Error::invalid_geometry(format!(
                    "{} indices is not a multiple of {} for {}",
                    indices.len(),
                    stride,
                    primitive
                )));
            }
            if let Some(&bad) = indices.iter().find(|&&i| i >= num_positions) {
                return Err(Error::invalid_geometry(format!(
                    "index {} out of range for {} positions",
                    bad, num_positions
                )));
            }
        }
        if let Some(edge_indices) = &self.edge_indices {
            if edge_indices.len() % 2 != 0 {
                return Err(Error::invalid_geometry(format!(
                    "{} edge indices is not a multiple of 2",
                    edge_indices.len()
                )));
            }
            if let Some(&bad) = edge_indices.iter().find(|&&i| i >= num_positions) {
                return Err(Error::invalid_geometry(format!(
                    "edge index {} out of range for {} positions",
                    bad, num_positions
                )));
            }
        }
        Ok(())
    }
}

/// A logical geometry, already split into buckets
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeometryCompressedParams {
    /// Unique geometry ID within its scene model
    pub id: String,
    pub primitive: Primitive,
    /// Dequantizes `positions_compressed` into model space
    pub positions_decompress_matrix: Matrix4<f64>,
    /// Model-space boundary of the decompressed positions
    pub aabb: Aabb3,
    pub geometry_buckets: Vec<GeometryBucketParams>,
}

impl GeometryCompressedParams {
    /// Total positions over all buckets
    pub fn num_positions(&self) -> usize {
        self.geometry_buckets.iter().map(|b| b.num_positions()).sum()
    }

    /// Total primitive indices over all buckets
    pub fn num_indices(&self) -> usize {
        self.geometry_buckets.iter().map(|b| b.num_indices()).sum()
    }
}

/// An object instance referencing a geometry
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshParams {
    /// Mesh ID within its scene model
    pub id: String,
    pub geometry_id: String,
    /// Modeling transform; identity when absent
    pub matrix: Option<Matrix4<f64>>,
    /// RGB, 0..255
    pub color: [u8; 3],
    /// 0..255, opaque at 255
    pub opacity: u8,
    pub metallic: u8,
    pub roughness: u8,
    /// RGBA color identifying this mesh in the pick pass
    pub pick_color: [u8; 4],
}

impl MeshParams {
    /// Opaque white mesh instance of a geometry
    pub fn new(id: impl Into<String>, geometry_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry_id: geometry_id.into(),
            matrix: None,
            color: [255, 255, 255],
            opacity: 255,
            metallic: 0,
            roughness: 255,
            pick_color: [0, 0, 0, 0],
        }
    }

    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.opacity < 255
    }
}
