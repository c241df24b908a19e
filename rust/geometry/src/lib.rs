// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DTX-Lite Geometry Processing
//!
//! Quantized meshes and the bucketing that lets large meshes be drawn with
//! narrow (8/16-bit) indices.

pub mod batch;
pub mod builder;
pub mod mesh;
pub mod quantize;
pub mod rebucket;

pub use dtx_lite_core::{Error, Result};

pub use batch::rebucket_all;
pub use builder::build_geometry_params;
pub use mesh::CompressedMesh;
pub use quantize::{decompress_position, decompressed_aabb, quantize_positions};
pub use rebucket::{
    bucket_capacity, rebucket_positions, unbucket, verify_buckets, GeometryBucket,
    MAX_REBUCKET_FAN_OUT,
};
