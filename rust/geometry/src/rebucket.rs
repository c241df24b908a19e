// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry bucketing
//!
//! Splits a compressed mesh into buckets whose vertex counts fit a smaller
//! index width than the whole mesh needs. A mesh with 3000 vertices needs
//! 16-bit indices; split into 8-bit buckets it can be drawn with 8-bit
//! indices at the cost of duplicating the vertices shared across buckets.
//!
//! ## Algorithm
//!
//! 1. Triangles are stably sorted by the minimum, then maximum, bucket
//!    affinity of their corners (`index >> bits_per_bucket`), so that
//!    index-adjacent triangles land in the same bucket.
//! 2. One forward scan places each triangle into the active bucket, opening
//!    a new bucket when the triangle's unseen vertices would overflow it.
//! 3. Each unique edge is emitted once, into the bucket of the first placed
//!    triangle that has it as a side.
//! 4. The bucketed form is kept only if it encodes smaller than the original.
//!
//! Bucketing never fails: whenever splitting is unsafe or not worth it the
//! original mesh comes back as a single bucket.

use crate::mesh::CompressedMesh;
use dtx_lite_core::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};

/// Maximum bucket number before bucketing is abandoned
pub const MAX_REBUCKET_FAN_OUT: usize = 8;

const UNASSIGNED: u32 = u32::MAX;

/// A capacity-bounded part of a mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryBucket {
    /// Bucket-local positions, indices and edge indices
    pub mesh: CompressedMesh,
    /// Capacity in positions
    pub max_num_positions: usize,
    /// Positions used
    pub num_positions: usize,
}

impl GeometryBucket {
    fn empty(max_num_positions: usize) -> Self {
        Self {
            mesh: CompressedMesh::new(),
            max_num_positions,
            num_positions: 0,
        }
    }

    /// The whole mesh as a single, exactly full bucket
    pub fn unsplit(mesh: &CompressedMesh) -> Self {
        let n = mesh.vertex_count();
        Self {
            mesh: mesh.clone(),
            max_num_positions: n,
            num_positions: n,
        }
    }
}

/// Indices addressable with `bits` bits, saturating at `usize::MAX`
#[inline]
fn addressable(bits: u32) -> usize {
    1usize.checked_shl(bits).unwrap_or(usize::MAX)
}

/// Positions a bucket may hold for the given budget.
///
/// Shaved by `bits_per_bucket` below the addressable range, and never below
/// one triangle's worth. Budgets that cannot address a triangle are never
/// split, so the floor only matters to direct callers.
#[inline]
pub fn bucket_capacity(bits_per_bucket: u32) -> usize {
    addressable(bits_per_bucket)
        .saturating_sub(bits_per_bucket as usize)
        .max(3)
}

/// Split `mesh` into buckets addressable with `bits_per_bucket`-bit indices.
///
/// Returns the unsplit mesh as a single bucket when the mesh is too large
/// for the fan-out limit, when the fan-out limit is hit while scanning, when
/// an edge is not a side of any triangle, or when bucketing would not shrink
/// the encoded size.
pub fn rebucket_positions(mesh: &CompressedMesh, bits_per_bucket: u32) -> Vec<GeometryBucket> {
    match try_rebucket(mesh, bits_per_bucket) {
        Some(buckets) => buckets,
        None => vec![GeometryBucket::unsplit(mesh)],
    }
}

fn try_rebucket(mesh: &CompressedMesh, bits: u32) -> Option<Vec<GeometryBucket>> {
    // A bucket must address at least one triangle's corners
    if bits >= 31
        || addressable(bits) < 3
        || mesh.indices.is_empty()
        || mesh.validate().is_err()
    {
        return None;
    }

    let num_positions = mesh.vertex_count();
    if num_positions > addressable(bits).saturating_mul(MAX_REBUCKET_FAN_OUT) {
        tracing::trace!(num_positions, bits, "mesh too large to bucket");
        return None;
    }

    let indices = pre_sort_indices(&mesh.indices, bits);
    let edges = pre_sort_edge_indices(&mesh.edge_indices);
    let mut edge_emitted = vec![false; edges.len()];

    let max_num_positions = bucket_capacity(bits);
    let mut remap = vec![UNASSIGNED; num_positions];
    let mut finished: Vec<GeometryBucket> = Vec::new();
    let mut current = GeometryBucket::empty(max_num_positions);

    for tri in indices.chunks_exact(3) {
        let additional = tri
            .iter()
            .filter(|&&i| remap[i as usize] == UNASSIGNED)
            .count();

        if additional + current.num_positions > current.max_num_positions {
            finished.push(std::mem::replace(
                &mut current,
                GeometryBucket::empty(max_num_positions),
            ));
            remap.fill(UNASSIGNED);
        }

        if finished.len() > MAX_REBUCKET_FAN_OUT {
            tracing::trace!(buckets = finished.len() + 1, "bucket fan-out exceeded");
            return None;
        }

        let mut local = [0u32; 3];
        for (corner, &i) in tri.iter().enumerate() {
            let slot = &mut remap[i as usize];
            if *slot == UNASSIGNED {
                *slot = current.num_positions as u32;
                current.num_positions += 1;
                current
                    .mesh
                    .positions_compressed
                    .extend_from_slice(&mesh.position(i));
            }
            local[corner] = *slot;
        }
        current.mesh.indices.extend_from_slice(&local);

        for (a, b) in [(tri[0], tri[1]), (tri[0], tri[2]), (tri[1], tri[2])] {
            if let Some(e) = edge_search(&edges, a, b) {
                if !edge_emitted[e] {
                    edge_emitted[e] = true;
                    let (e0, e1) = edges[e];
                    current
                        .mesh
                        .edge_indices
                        .extend_from_slice(&[remap[e0 as usize], remap[e1 as usize]]);
                }
            }
        }
    }
    finished.push(current);

    if edge_emitted.iter().any(|&emitted| !emitted) {
        tracing::trace!("edge without adjacent triangle, keeping mesh unsplit");
        return None;
    }

    let prev_bytes_per_index = bits as f64 / 8.0 * 2.0;
    let new_bytes_per_index = bits as f64 / 8.0;

    let original_size = (mesh.positions_compressed.len() * 2) as f64
        + (mesh.indices.len() + mesh.edge_indices.len()) as f64 * prev_bytes_per_index;

    let new_size: f64 = finished
        .iter()
        .map(|b| {
            (b.mesh.positions_compressed.len() * 2) as f64
                + (b.mesh.indices.len() + b.mesh.edge_indices.len()) as f64 * new_bytes_per_index
        })
        .sum();

    if new_size >= original_size {
        tracing::trace!(original_size, new_size, "bucketing does not shrink mesh");
        return None;
    }

    tracing::trace!(
        buckets = finished.len(),
        positions = finished.iter().map(|b| b.num_positions).sum::<usize>(),
        original_positions = num_positions,
        "mesh bucketed"
    );

    Some(finished)
}

/// Triangle indices reordered by (min, max) bucket affinity of their corners
fn pre_sort_indices(indices: &[u32], bits: u32) -> Vec<u32> {
    let keys: Vec<(u32, u32)> = indices
        .chunks_exact(3)
        .map(|tri| {
            let (a, b, c) = (tri[0] >> bits, tri[1] >> bits, tri[2] >> bits);
            (a.min(b).min(c), a.max(b).max(c))
        })
        .collect();

    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));

    let mut sorted = Vec::with_capacity(indices.len());
    for t in order {
        sorted.extend_from_slice(&indices[t * 3..t * 3 + 3]);
    }
    sorted
}

/// Unique edges as (min, max) pairs in ascending order
fn pre_sort_edge_indices(edge_indices: &[u32]) -> Vec<(u32, u32)> {
    let mut edges: Vec<(u32, u32)> = edge_indices
        .chunks_exact(2)
        .map(|e| (e[0].min(e[1]), e[0].max(e[1])))
        .collect();
    edges.sort_unstable();
    edges.dedup();
    edges
}

#[inline]
fn edge_search(edges: &[(u32, u32)], a: u32, b: u32) -> Option<usize> {
    edges.binary_search(&(a.min(b), a.max(b))).ok()
}

/// Reassemble buckets into one mesh, offsetting each bucket's indices by the
/// positions of the buckets before it.
pub fn unbucket(buckets: &[GeometryBucket]) -> CompressedMesh {
    let mut mesh = CompressedMesh::with_capacity(
        buckets.iter().map(|b| b.num_positions).sum(),
        buckets.iter().map(|b| b.mesh.indices.len()).sum(),
    );
    for bucket in buckets {
        mesh.merge(&bucket.mesh);
    }
    mesh
}

type TriangleKey = [[u16; 3]; 3];
type EdgeKey = [[u16; 3]; 2];

fn triangle_keys(mesh: &CompressedMesh) -> FxHashMap<TriangleKey, usize> {
    let mut keys = FxHashMap::default();
    for tri in mesh.indices.chunks_exact(3) {
        let key = [mesh.position(tri[0]), mesh.position(tri[1]), mesh.position(tri[2])];
        *keys.entry(key).or_insert(0) += 1;
    }
    keys
}

fn edge_keys(mesh: &CompressedMesh) -> FxHashSet<EdgeKey> {
    mesh.edge_indices
        .chunks_exact(2)
        .map(|e| {
            let (p0, p1) = (mesh.position(e[0]), mesh.position(e[1]));
            if p0 <= p1 {
                [p0, p1]
            } else {
                [p1, p0]
            }
        })
        .collect()
}

/// Check that `buckets` is a faithful split of `mesh`: every bucket within
/// capacity and self-contained, every triangle present exactly once, and
/// the same set of edges.
pub fn verify_buckets(mesh: &CompressedMesh, buckets: &[GeometryBucket]) -> Result<()> {
    for (n, bucket) in buckets.iter().enumerate() {
        if bucket.num_positions > bucket.max_num_positions {
            return Err(Error::invalid_geometry(format!(
                "bucket {} holds {} positions, capacity {}",
                n, bucket.num_positions, bucket.max_num_positions
            )));
        }
        if bucket.mesh.vertex_count() != bucket.num_positions {
            return Err(Error::invalid_geometry(format!(
                "bucket {} records {} positions but stores {}",
                n,
                bucket.num_positions,
                bucket.mesh.vertex_count()
            )));
        }
        bucket.mesh.validate()?;
    }

    let merged = unbucket(buckets);
    if triangle_keys(&merged) != triangle_keys(mesh) {
        return Err(Error::invalid_geometry("bucketed triangles differ from mesh"));
    }
    if edge_keys(&merged) != edge_keys(mesh) {
        return Err(Error::invalid_geometry("bucketed edges differ from mesh"));
    }
    Ok(())
}
