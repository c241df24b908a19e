// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry descriptor construction

use crate::mesh::CompressedMesh;
use crate::quantize::decompressed_aabb;
use crate::rebucket::{rebucket_positions, GeometryBucket};
use dtx_lite_core::{GeometryCompressedParams, Matrix4, Primitive};

/// Build the descriptor a layer consumes from a compressed mesh.
///
/// Triangle meshes are bucketed with `bits_per_bucket`; point and line
/// meshes are passed through as a single bucket.
pub fn build_geometry_params(
    id: impl Into<String>,
    primitive: Primitive,
    mesh: &CompressedMesh,
    positions_decompress_matrix: Matrix4<f64>,
    bits_per_bucket: u32,
) -> GeometryCompressedParams {
    let aabb = decompressed_aabb(&mesh.positions_compressed, &positions_decompress_matrix);

    let buckets = match primitive {
        Primitive::Triangles => rebucket_positions(mesh, bits_per_bucket),
        Primitive::Lines | Primitive::Points => vec![GeometryBucket::unsplit(mesh)],
    };

    GeometryCompressedParams {
        id: id.into(),
        primitive,
        positions_decompress_matrix,
        aabb,
        geometry_buckets: buckets
            .into_iter()
            .map(|b| b.mesh.into_bucket_params())
            .collect(),
    }
}
