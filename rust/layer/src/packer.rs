// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh-part packing
//!
//! While a layer is open, geometry buckets and mesh instances accumulate in
//! a [`LayerBuilder`]. Geometry data is stored once per geometry; each mesh
//! instance adds one mesh part per bucket of its geometry, which draws the
//! shared indices through its own slot of the per-primitive lookup tables.
//!
//! Indices and edge indices are zero-padded to whole groups of
//! [`INDICES_ALIGNMENT`] primitives so that one lookup entry maps a group of
//! drawn primitives to its mesh part.

use crate::data_texture::{
    DataTexture, MeshAttributeRecord, TexelFormat, ATTRIBUTE_TEXELS, INDICES_ALIGNMENT,
    MATRIX_TEXELS,
};
use crate::tier::{IndexTier, TierBuffers};
use dtx_lite_core::{
    Aabb3, Config, Error, GeometryCompressedParams, MeshParams, Primitive, Result, MAX_PART_IDS,
};
use nalgebra::Matrix4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Identifier of a mesh within its layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl MeshId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement of one geometry bucket in the layer buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBucketHandle {
    /// First vertex in the positions table
    pub vertex_base: u32,
    pub num_vertices: u32,
    /// Primitives stored, including alignment padding
    pub num_primitives: u32,
    /// Edges stored, including alignment padding
    pub num_edges: u32,
    /// First primitive in the tier's index table
    pub indices_base: u32,
    /// First edge in the tier's edge index table
    pub edge_indices_base: u32,
    pub tier: IndexTier,
}

/// A geometry registered in an open layer
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryHandle {
    pub aabb: Aabb3,
    pub positions_decompress_matrix: Matrix4<f64>,
    pub buckets: SmallVec<[GeometryBucketHandle; 4]>,
}

/// One (mesh × bucket) pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshPartHandle {
    pub mesh: MeshId,
    pub vertex_base: u32,
    pub num_vertices: u32,
    pub num_primitives: u32,
    pub num_edges: u32,
    pub tier: IndexTier,
}

/// What adding a mesh of a geometry would cost a layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Footprint {
    parts: usize,
    vertices: usize,
    indices: usize,
    edge_indices: usize,
    primitive_lookups: [usize; 3],
    edge_lookups: [usize; 3],
}

/// Round a primitive count up to whole lookup groups
#[inline]
fn align(count: usize) -> usize {
    count.div_ceil(INDICES_ALIGNMENT) * INDICES_ALIGNMENT
}

/// Mesh part limit, never more than the lookup tables can name
#[inline]
fn max_parts(config: &Config) -> usize {
    config.max_mesh_parts.min(MAX_PART_IDS)
}

const INDICES_LABELS: [&str; 3] = ["indices_8bits", "indices_16bits", "indices_32bits"];
const EDGE_INDICES_LABELS: [&str; 3] = [
    "edge_indices_8bits",
    "edge_indices_16bits",
    "edge_indices_32bits",
];
const PRIMITIVE_MESH_LABELS: [&str; 3] = [
    "each_primitive_mesh_8bits",
    "each_primitive_mesh_16bits",
    "each_primitive_mesh_32bits",
];
const EDGE_MESH_LABELS: [&str; 3] = [
    "each_edge_mesh_8bits",
    "each_edge_mesh_16bits",
    "each_edge_mesh_32bits",
];

/// Textures encoded from a builder, ready for upload
#[derive(Debug, Clone)]
pub struct EncodedTables {
    pub positions: DataTexture,
    pub indices: [DataTexture; 3],
    pub edge_indices: [DataTexture; 3],
    pub each_primitive_mesh: [DataTexture; 3],
    pub each_edge_mesh: [DataTexture; 3],
    pub attributes: DataTexture,
    pub matrices: DataTexture,
    pub offsets: DataTexture,
}

/// Accumulation buffers of an open layer
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    primitive: Primitive,
    positions_compressed: Vec<u16>,
    indices: TierBuffers,
    edge_indices: TierBuffers,
    each_primitive_mesh: [Vec<u16>; 3],
    each_edge_mesh: [Vec<u16>; 3],
    attributes: Vec<MeshAttributeRecord>,
    matrices: Vec<f32>,
    offsets: Vec<f32>,
    /// Indices drawn per tier, over all mesh parts
    num_indices: [usize; 3],
    /// Edge indices drawn per tier, over all mesh parts
    num_edge_indices: [usize; 3],
    geometries: FxHashMap<String, GeometryHandle>,
}

impl LayerBuilder {
    pub fn new(primitive: Primitive) -> Self {
        Self {
            primitive,
            positions_compressed: Vec::new(),
            indices: TierBuffers::new(),
            edge_indices: TierBuffers::new(),
            each_primitive_mesh: Default::default(),
            each_edge_mesh: Default::default(),
            attributes: Vec::new(),
            matrices: Vec::new(),
            offsets: Vec::new(),
            num_indices: [0; 3],
            num_edge_indices: [0; 3],
            geometries: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.positions_compressed.len() / 3
    }

    #[inline]
    pub fn num_mesh_parts(&self) -> usize {
        self.attributes.len()
    }

    /// Indices drawn per tier
    #[inline]
    pub fn num_indices(&self) -> [usize; 3] {
        self.num_indices
    }

    /// Edge indices drawn per tier
    #[inline]
    pub fn num_edge_indices(&self) -> [usize; 3] {
        self.num_edge_indices
    }

    pub fn has_geometry(&self, id: &str) -> bool {
        self.geometries.contains_key(id)
    }

    pub fn geometry(&self, id: &str) -> Option<&GeometryHandle> {
        self.geometries.get(id)
    }

    fn footprint(&self, geometry: &GeometryCompressedParams) -> Footprint {
        let vpp = self.primitive.verts_per_primitive();
        let registered = self.has_geometry(&geometry.id);
        let mut footprint = Footprint {
            parts: geometry.geometry_buckets.len(),
            ..Default::default()
        };
        for bucket in &geometry.geometry_buckets {
            let tier = IndexTier::for_vertex_count(bucket.num_positions());
            let primitives = align(bucket.num_indices() / vpp);
            let edges = align(bucket.num_edge_indices() / 2);
            footprint.primitive_lookups[tier.index()] += primitives / INDICES_ALIGNMENT;
            footprint.edge_lookups[tier.index()] += edges / INDICES_ALIGNMENT;
            if !registered {
                footprint.vertices += bucket.num_positions();
                footprint.indices += primitives * vpp;
                footprint.edge_indices += edges * 2;
            }
        }
        footprint
    }

    /// Whether one more mesh of `geometry`, registering the geometry first
    /// if needed, fits within the layer's capacity.
    pub fn can_accept(&self, geometry: &GeometryCompressedParams, config: &Config) -> bool {
        let footprint = self.footprint(geometry);
        let max_texels = config.max_texels();

        if self.num_mesh_parts() + footprint.parts > max_parts(config) {
            return false;
        }
        if self.num_vertices() + footprint.vertices > max_texels {
            return false;
        }
        if self.indices.total_len() + footprint.indices > max_texels {
            return false;
        }
        if self.edge_indices.total_len() + footprint.edge_indices > max_texels {
            return false;
        }
        IndexTier::ALL.iter().all(|tier| {
            let t = tier.index();
            self.each_primitive_mesh[t].len() + footprint.primitive_lookups[t] <= max_texels
                && self.each_edge_mesh[t].len() + footprint.edge_lookups[t] <= max_texels
        })
    }

    /// Check that a geometry can be stored in this builder
    pub fn check_geometry(&self, geometry: &GeometryCompressedParams) -> Result<()> {
        if geometry.primitive != self.primitive {
            return Err(Error::invalid_geometry(format!(
                "geometry '{}' is {}, layer holds {}",
                geometry.id, geometry.primitive, self.primitive
            )));
        }
        if self.has_geometry(&geometry.id) {
            return Err(Error::DuplicateGeometry(geometry.id.clone()));
        }
        for bucket in &geometry.geometry_buckets {
            bucket.validate(self.primitive)?;
        }
        Ok(())
    }

    /// Store a geometry's buckets. The geometry must have passed
    /// [`check_geometry`](Self::check_geometry).
    pub fn add_geometry(&mut self, geometry: &GeometryCompressedParams) {
        let vpp = self.primitive.verts_per_primitive();
        let mut buckets = SmallVec::new();

        for bucket in &geometry.geometry_buckets {
            let num_vertices = bucket.num_positions();
            let tier = IndexTier::for_vertex_count(num_vertices);
            let vertex_base = self.num_vertices() as u32;
            self.positions_compressed
                .extend_from_slice(&bucket.positions_compressed);

            let indices_base = self.indices.len(tier) / vpp;
            let mut num_primitives = 0;
            if let Some(indices) = &bucket.indices {
                num_primitives = align(indices.len() / vpp);
                self.indices.extend(tier, indices);
                self.indices.pad(tier, num_primitives * vpp - indices.len());
            }

            let edge_indices_base = self.edge_indices.len(tier) / 2;
            let mut num_edges = 0;
            if let Some(edge_indices) = &bucket.edge_indices {
                num_edges = align(edge_indices.len() / 2);
                self.edge_indices.extend(tier, edge_indices);
                self.edge_indices.pad(tier, num_edges * 2 - edge_indices.len());
            }

            buckets.push(GeometryBucketHandle {
                vertex_base,
                num_vertices: num_vertices as u32,
                num_primitives: num_primitives as u32,
                num_edges: num_edges as u32,
                indices_base: indices_base as u32,
                edge_indices_base: edge_indices_base as u32,
                tier,
            });
        }

        self.geometries.insert(
            geometry.id.clone(),
            GeometryHandle {
                aabb: geometry.aabb,
                positions_decompress_matrix: geometry.positions_decompress_matrix,
                buckets,
            },
        );
    }

    /// Add one mesh part per bucket of the mesh's geometry, returning the
    /// part handles and the geometry's model-space bounds.
    pub fn add_mesh(
        &mut self,
        mesh: MeshId,
        params: &MeshParams,
        initial: &MeshAttributeRecord,
        config: &Config,
    ) -> Result<(Vec<MeshPartHandle>, Aabb3)> {
        let geometry = self
            .geometries
            .get(&params.geometry_id)
            .ok_or_else(|| Error::GeometryNotFound(params.geometry_id.clone()))?;
        let buckets = geometry.buckets.clone();
        let decompress = geometry.positions_decompress_matrix;
        let aabb = geometry.aabb;

        let max_texels = config.max_texels();
        if self.num_mesh_parts() + buckets.len() > max_parts(config) {
            return Err(Error::CapacityExceeded(format!(
                "mesh '{}' needs {} parts, {} of {} used",
                params.id,
                buckets.len(),
                self.num_mesh_parts(),
                max_parts(config)
            )));
        }
        for tier in IndexTier::ALL {
            let t = tier.index();
            let (primitives, edges) = buckets
                .iter()
                .filter(|b| b.tier == tier)
                .fold((0, 0), |(p, e), b| {
                    (p + b.num_primitives as usize, e + b.num_edges as usize)
                });
            if self.each_primitive_mesh[t].len() + primitives / INDICES_ALIGNMENT > max_texels
                || self.each_edge_mesh[t].len() + edges / INDICES_ALIGNMENT > max_texels
            {
                return Err(Error::CapacityExceeded(format!(
                    "mesh '{}' overflows the {}-bit lookup tables",
                    params.id,
                    tier.bits()
                )));
            }
        }

        let vpp = self.primitive.verts_per_primitive();
        let model = params.matrix.unwrap_or_else(Matrix4::identity);
        let mut parts = Vec::with_capacity(buckets.len());

        for bucket in &buckets {
            let part_id = u16::try_from(self.num_mesh_parts()).map_err(|_| {
                Error::CapacityExceeded(format!("mesh '{}' runs out of part ids", params.id))
            })?;
            let t = bucket.tier.index();

            let vertex_offset =
                (self.num_indices[t] / vpp) as i64 - bucket.indices_base as i64;
            let edge_indices_offset =
                (self.num_edge_indices[t] / 2) as i64 - bucket.edge_indices_base as i64;

            self.attributes.push(initial.with_portion(
                bucket.vertex_base,
                vertex_offset as i32,
                edge_indices_offset as i32,
            ));

            self.matrices.extend(decompress.iter().map(|&v| v as f32));
            self.matrices.extend(model.iter().map(|&v| v as f32));
            self.offsets.extend_from_slice(&[0.0; 3]);

            let primitives = bucket.num_primitives as usize;
            if primitives > 0 {
                self.num_indices[t] += primitives * vpp;
                self.each_primitive_mesh[t]
                    .extend(std::iter::repeat(part_id).take(primitives / INDICES_ALIGNMENT));
            }
            let edges = bucket.num_edges as usize;
            if edges > 0 {
                self.num_edge_indices[t] += edges * 2;
                self.each_edge_mesh[t]
                    .extend(std::iter::repeat(part_id).take(edges / INDICES_ALIGNMENT));
            }

            parts.push(MeshPartHandle {
                mesh,
                vertex_base: bucket.vertex_base,
                num_vertices: bucket.num_vertices,
                num_primitives: bucket.num_primitives,
                num_edges: bucket.num_edges,
                tier: bucket.tier,
            });
        }

        Ok((parts, aabb))
    }

    /// Encode every buffer into its data texture
    pub fn encode(&self, width: usize) -> EncodedTables {
        let vpp = self.primitive.verts_per_primitive();
        EncodedTables {
            positions: DataTexture::from_components(
                "positions",
                TexelFormat::RGB16UI,
                width,
                &self.positions_compressed,
            ),
            indices: IndexTier::ALL.map(|tier| {
                DataTexture::from_components(
                    INDICES_LABELS[tier.index()],
                    TexelFormat::new(vpp, tier.component()),
                    width,
                    self.indices.as_bytes(tier),
                )
            }),
            edge_indices: IndexTier::ALL.map(|tier| {
                DataTexture::from_components(
                    EDGE_INDICES_LABELS[tier.index()],
                    TexelFormat::new(2, tier.component()),
                    width,
                    self.edge_indices.as_bytes(tier),
                )
            }),
            each_primitive_mesh: IndexTier::ALL.map(|tier| {
                DataTexture::from_components(
                    PRIMITIVE_MESH_LABELS[tier.index()],
                    TexelFormat::R16UI,
                    width,
                    &self.each_primitive_mesh[tier.index()],
                )
            }),
            each_edge_mesh: IndexTier::ALL.map(|tier| {
                DataTexture::from_components(
                    EDGE_MESH_LABELS[tier.index()],
                    TexelFormat::R16UI,
                    width,
                    &self.each_edge_mesh[tier.index()],
                )
            }),
            attributes: DataTexture::from_components(
                "each_mesh_attributes",
                TexelFormat::RGBA8UI,
                ATTRIBUTE_TEXELS,
                &self.attributes,
            ),
            matrices: DataTexture::from_components(
                "each_mesh_matrices",
                TexelFormat::RGBA32F,
                MATRIX_TEXELS,
                &self.matrices,
            ),
            offsets: DataTexture::from_components(
                "each_mesh_offsets",
                TexelFormat::RGB32F,
                1,
                &self.offsets,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtx_lite_core::GeometryBucketParams;

    fn triangle_geometry(id: &str, num_triangles: u32) -> GeometryCompressedParams {
        let num_positions = num_triangles + 2;
        GeometryCompressedParams {
            id: id.to_string(),
            primitive: Primitive::Triangles,
            positions_decompress_matrix: Matrix4::identity(),
            aabb: Aabb3::from_array([0.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
            geometry_buckets: vec![GeometryBucketParams {
                positions_compressed: vec![0; num_positions as usize * 3],
                indices: Some((0..num_triangles).flat_map(|i| [i, i + 1, i + 2]).collect()),
                edge_indices: Some(vec![0, 1]),
            }],
        }
    }

    #[test]
    fn test_indices_padded_to_alignment() {
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        let geometry = triangle_geometry("g", 3);
        builder.check_geometry(&geometry).unwrap();
        builder.add_geometry(&geometry);

        let handle = builder.geometry("g").unwrap();
        assert_eq!(handle.buckets.len(), 1);
        assert_eq!(handle.buckets[0].num_primitives, 8);
        assert_eq!(handle.buckets[0].num_edges, 8);
        assert_eq!(handle.buckets[0].tier, IndexTier::Bits8);
        assert_eq!(builder.indices.len(IndexTier::Bits8), 24);
        assert_eq!(builder.edge_indices.len(IndexTier::Bits8), 16);
        assert_eq!(builder.num_vertices(), 5);
    }

    #[test]
    fn test_shared_geometry_offsets() {
        let config = Config::default();
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        for id in ["a", "b"] {
            let geometry = triangle_geometry(id, 10);
            builder.check_geometry(&geometry).unwrap();
            builder.add_geometry(&geometry);
        }
        let initial = MeshAttributeRecord::default();

        // Instance "b" first: its indices sit after "a"'s 16 primitives
        let (parts, _) = builder
            .add_mesh(MeshId(0), &MeshParams::new("m0", "b"), &initial, &config)
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(builder.attributes[0].vertex_offset(), -16);
        assert_eq!(builder.attributes[0].vertex_base(), 12);

        builder
            .add_mesh(MeshId(1), &MeshParams::new("m1", "b"), &initial, &config)
            .unwrap();
        assert_eq!(builder.attributes[1].vertex_offset(), 0);
        assert_eq!(builder.num_indices()[0], 96);
        assert_eq!(builder.each_primitive_mesh[0], vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_rejects_mismatched_primitive() {
        let builder = LayerBuilder::new(Primitive::Lines);
        assert!(matches!(
            builder.check_geometry(&triangle_geometry("g", 1)),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_registered_geometry_costs_only_parts() {
        let config = Config {
            max_mesh_parts: 2,
            ..Config::default()
        };
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        let geometry = triangle_geometry("g", 4);
        assert!(builder.can_accept(&geometry, &config));
        builder.add_geometry(&geometry);

        let initial = MeshAttributeRecord::default();
        builder
            .add_mesh(MeshId(0), &MeshParams::new("m0", "g"), &initial, &config)
            .unwrap();
        assert!(builder.can_accept(&geometry, &config));
        builder
            .add_mesh(MeshId(1), &MeshParams::new("m1", "g"), &initial, &config)
            .unwrap();
        assert!(!builder.can_accept(&geometry, &config));
        assert!(matches!(
            builder.add_mesh(MeshId(2), &MeshParams::new("m2", "g"), &initial, &config),
            Err(Error::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_encode_shapes() {
        let config = Config::default();
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        let geometry = triangle_geometry("g", 10);
        builder.add_geometry(&geometry);
        builder
            .add_mesh(
                MeshId(0),
                &MeshParams::new("m", "g"),
                &MeshAttributeRecord::default(),
                &config,
            )
            .unwrap();

        let tables = builder.encode(config.data_texture_width);
        assert_eq!(tables.positions.width, 1024);
        assert_eq!(tables.indices[0].format.channels, 3);
        assert_eq!(tables.indices[0].format.bytes_per_texel(), 3);
        assert_eq!(tables.indices[1].height, 1);
        assert_eq!(tables.edge_indices[0].format.bytes_per_texel(), 2);
        assert_eq!(tables.attributes.width, 7);
        assert_eq!(tables.attributes.height, 1);
        assert_eq!(tables.matrices.data.len(), 8 * 16);
        assert_eq!(tables.offsets.data.len(), 12);
    }

    #[test]
    fn test_part_ids_stop_at_sixteen_bits() {
        let config = Config {
            max_mesh_parts: 70_000,
            ..Config::default()
        };
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        let geometry = triangle_geometry("g", 1);
        builder.add_geometry(&geometry);

        let initial = MeshAttributeRecord::default();
        let params = MeshParams::new("m", "g");
        for i in 0..MAX_PART_IDS {
            builder
                .add_mesh(MeshId(i as u32), &params, &initial, &config)
                .unwrap();
        }
        assert_eq!(builder.num_mesh_parts(), MAX_PART_IDS);
        assert_eq!(builder.each_primitive_mesh[0].last(), Some(&u16::MAX));

        assert!(!builder.can_accept(&geometry, &config));
        assert!(matches!(
            builder.add_mesh(MeshId(70_000), &params, &initial, &config),
            Err(Error::CapacityExceeded(_))
        ));
        assert_eq!(builder.num_mesh_parts(), MAX_PART_IDS);
    }

    #[test]
    fn test_encode_zero_width() {
        let mut builder = LayerBuilder::new(Primitive::Triangles);
        builder.add_geometry(&triangle_geometry("g", 2));
        let tables = builder.encode(0);
        assert_eq!(tables.positions.width, 1);
        assert_eq!(tables.positions.height, builder.num_vertices());
    }
}
