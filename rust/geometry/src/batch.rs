// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Batch bucketing for model loading
//!
//! Bucketing is pure per mesh, so a whole model's geometries can be split in
//! one parallel pass before any layer is touched.

use crate::mesh::CompressedMesh;
use crate::rebucket::{rebucket_positions, GeometryBucket};

/// Bucket many meshes, returning one bucket list per mesh in input order
pub fn rebucket_all(meshes: &[CompressedMesh], bits_per_bucket: u32) -> Vec<Vec<GeometryBucket>> {
    // On native: spread meshes over the rayon pool
    // On WASM: no threads available, run sequentially
    #[cfg(not(target_arch = "wasm32"))]
    let buckets: Vec<Vec<GeometryBucket>> = {
        use rayon::prelude::*;
        meshes
            .par_iter()
            .map(|mesh| rebucket_positions(mesh, bits_per_bucket))
            .collect()
    };

    #[cfg(target_arch = "wasm32")]
    let buckets: Vec<Vec<GeometryBucket>> = meshes
        .iter()
        .map(|mesh| rebucket_positions(mesh, bits_per_bucket))
        .collect();

    tracing::debug!(
        meshes = meshes.len(),
        buckets = buckets.iter().map(Vec::len).sum::<usize>(),
        "batch bucketing complete"
    );

    buckets
}
