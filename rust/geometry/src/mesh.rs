// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compressed mesh data structures

use dtx_lite_core::{Error, GeometryBucketParams, Result};

/// Triangle mesh with quantized positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedMesh {
    /// Quantized vertex positions (x, y, z)
    pub positions_compressed: Vec<u16>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
    /// Unique edge vertex pairs (e0, e1)
    pub edge_indices: Vec<u32>,
}

impl CompressedMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions_compressed: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
            edge_indices: Vec::new(),
        }
    }

    /// Add a quantized vertex, returning its index
    #[inline]
    pub fn add_vertex(&mut self, position: [u16; 3]) -> u32 {
        let index = self.vertex_count() as u32;
        self.positions_compressed.extend_from_slice(&position);
        index
    }

    /// Add a triangle
    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.extend_from_slice(&[i0, i1, i2]);
    }

    /// Add an edge
    #[inline]
    pub fn add_edge(&mut self, e0: u32, e1: u32) {
        self.edge_indices.extend_from_slice(&[e0, e1]);
    }

    /// Merge another mesh into this one
    pub fn merge(&mut self, other: &CompressedMesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = self.vertex_count() as u32;

        self.positions_compressed
            .extend_from_slice(&other.positions_compressed);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
        self.edge_indices
            .extend(other.edge_indices.iter().map(|&i| i + vertex_offset));
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions_compressed.len() / 3
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get edge count
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edge_indices.len() / 2
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions_compressed.is_empty()
    }

    /// Quantized position of a vertex
    #[inline]
    pub fn position(&self, index: u32) -> [u16; 3] {
        let i = index as usize * 3;
        [
            self.positions_compressed[i],
            self.positions_compressed[i + 1],
            self.positions_compressed[i + 2],
        ]
    }

    /// Check array shapes and index ranges
    pub fn validate(&self) -> Result<()> {
        if self.positions_compressed.len() % 3 != 0 {
            return Err(Error::invalid_geometry(
                "positions length is not a multiple of 3",
            ));
        }
        if self.indices.len() % 3 != 0 {
            return Err(Error::invalid_geometry(
                "indices length is not a multiple of 3",
            ));
        }
        if self.edge_indices.len() % 2 != 0 {
            return Err(Error::invalid_geometry(
                "edge indices length is not a multiple of 2",
            ));
        }
        let n = self.vertex_count() as u32;
        if let Some(&bad) = self
            .indices
            .iter()
            .chain(self.edge_indices.iter())
            .find(|&&i| i >= n)
        {
            return Err(Error::invalid_geometry(format!(
                "index {} out of range for {} positions",
                bad, n
            )));
        }
        Ok(())
    }

    /// Convert into the bucket descriptor a layer consumes
    pub fn into_bucket_params(self) -> GeometryBucketParams {
        GeometryBucketParams {
            positions_compressed: self.positions_compressed,
            indices: if self.indices.is_empty() {
                None
            } else {
                Some(self.indices)
            },
            edge_indices: if self.edge_indices.is_empty() {
                None
            } else {
                Some(self.edge_indices)
            },
        }
    }
}
