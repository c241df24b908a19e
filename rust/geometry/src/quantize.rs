// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Position quantization to 16-bit integers
//!
//! Positions are mapped onto `0..=65535` per axis across their bounding box.
//! The returned decompression matrix maps quantized positions back into
//! model space: `p = translate(min) * scale(extent / 65535) * q`.

use dtx_lite_core::{Aabb3, Matrix4, Point3, Vector3};

const QUANTIZED_MAX: f64 = 65535.0;

/// Quantize flat XYZ positions, returning the quantized positions and the
/// matrix that decompresses them.
pub fn quantize_positions(positions: &[f64]) -> (Vec<u16>, Matrix4<f64>) {
    let mut aabb = Aabb3::collapsed();
    for p in positions.chunks_exact(3) {
        aabb.expand_point(&Point3::new(p[0], p[1], p[2]));
    }
    if !aabb.is_valid() {
        return (Vec::new(), Matrix4::identity());
    }

    let extent = aabb.max - aabb.min;
    let scale = Vector3::new(
        axis_scale(extent.x),
        axis_scale(extent.y),
        axis_scale(extent.z),
    );

    let mut quantized = Vec::with_capacity(positions.len() - positions.len() % 3);
    for p in positions.chunks_exact(3) {
        for axis in 0..3 {
            let q = ((p[axis] - aabb.min[axis]) / scale[axis]).round();
            quantized.push(q.clamp(0.0, QUANTIZED_MAX) as u16);
        }
    }

    let decompress =
        Matrix4::new_translation(&aabb.min.coords) * Matrix4::new_nonuniform_scaling(&scale);

    (quantized, decompress)
}

#[inline]
fn axis_scale(extent: f64) -> f64 {
    if extent > 0.0 {
        extent / QUANTIZED_MAX
    } else {
        1.0
    }
}

/// Decompress one quantized position
#[inline]
pub fn decompress_position(position: [u16; 3], decompress: &Matrix4<f64>) -> Point3<f64> {
    decompress.transform_point(&Point3::new(
        position[0] as f64,
        position[1] as f64,
        position[2] as f64,
    ))
}

/// Model-space bounds of quantized positions
pub fn decompressed_aabb(positions_compressed: &[u16], decompress: &Matrix4<f64>) -> Aabb3 {
    let mut min = [u16::MAX; 3];
    let mut max = [0u16; 3];
    let mut any = false;
    for p in positions_compressed.chunks_exact(3) {
        any = true;
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    if !any {
        return Aabb3::collapsed();
    }

    let quantized = Aabb3::new(
        Point3::new(min[0] as f64, min[1] as f64, min[2] as f64),
        Point3::new(max[0] as f64, max[1] as f64, max[2] as f64),
    );
    quantized.transformed(Some(decompress))
}
