// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer behaviour through the public API: flag encoding, deferred
//! batching, capacity and end-to-end drawing through the lookup tables.

use approx::assert_relative_eq;
use dtx_lite_core::{
    Aabb3, Config, Error, GeometryBucketParams, GeometryCompressedParams, Matrix4, MeshParams,
    ObjectFlags, Primitive,
};
use dtx_lite_geometry::{build_geometry_params, CompressedMesh};
use dtx_lite_layer::{
    encode_render_flags, IndexTier, Layer, LayerSet, MeshAttributeRecord, MeshCounts, MeshId,
    RecordingBackend, ATTRIBUTE_TEXELS, INDICES_ALIGNMENT,
};
use std::collections::HashMap;
use std::rc::Rc;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }

    fn coin(&mut self) -> bool {
        self.below(2) == 1
    }
}

/// Two buckets, so every mesh spans two attribute rows
fn two_bucket_geometry(id: &str) -> GeometryCompressedParams {
    let bucket = GeometryBucketParams {
        positions_compressed: vec![0, 0, 0, 1, 0, 0, 0, 1, 0, 1, 1, 0],
        indices: Some(vec![0, 1, 2, 1, 3, 2]),
        edge_indices: Some(vec![0, 1, 1, 3]),
    };
    GeometryCompressedParams {
        id: id.to_string(),
        primitive: Primitive::Triangles,
        positions_decompress_matrix: Matrix4::identity(),
        aabb: Aabb3::from_array([0.0, 0.0, 0.0, 1.0, 1.0, 0.0]),
        geometry_buckets: vec![bucket.clone(), bucket],
    }
}

fn finalized_layer(num_meshes: usize, backend: &Rc<RecordingBackend>) -> (Layer, Vec<MeshId>) {
    let mut layer = Layer::new(
        Primitive::Triangles,
        [0.0; 3],
        0,
        Config::default(),
        backend.clone(),
    );
    layer
        .create_geometry_compressed(&two_bucket_geometry("g"))
        .unwrap();
    let meshes = (0..num_meshes)
        .map(|i| {
            let mut params = MeshParams::new(format!("m{i}"), "g");
            params.color = [i as u8, 100, 200];
            params.pick_color = [i as u8, 0, 0, 255];
            layer.create_mesh(&params).unwrap()
        })
        .collect();
    layer.finalize().unwrap();
    (layer, meshes)
}

fn pass_codes(flags: ObjectFlags, transparent: bool) -> [u8; 4] {
    let on = |f: ObjectFlags| flags.contains(f);
    if !on(ObjectFlags::VISIBLE) || on(ObjectFlags::CULLED) {
        return [0; 4];
    }
    let color = match (on(ObjectFlags::XRAYED), transparent) {
        (true, _) => 0,
        (false, true) => 2,
        (false, false) => 1,
    };
    // Emphasis precedence: selected, highlighted, xrayed
    let emphasis = [
        (ObjectFlags::SELECTED, 4, 9),
        (ObjectFlags::HIGHLIGHTED, 3, 8),
        (ObjectFlags::XRAYED, 5, 10),
    ]
    .into_iter()
    .find(|(f, _, _)| on(*f));
    let (silhouette, edges) = match emphasis {
        Some((_, s, e)) => (s, e),
        None if on(ObjectFlags::EDGES) => (0, if transparent { 7 } else { 6 }),
        None => (0, 0),
    };
    let pick = if on(ObjectFlags::PICKABLE) { 11 } else { 0 };
    [color, silhouette, edges, pick]
}

#[test]
fn test_flag_encoding_exhaustive() {
    for bits in 0..(1u32 << 9) {
        let flags = ObjectFlags::from_bits_truncate(bits);
        for transparent in [false, true] {
            let encoded = encode_render_flags(flags, transparent);
            assert_eq!(
                encoded.flags_texel(),
                pass_codes(flags, transparent),
                "flags {flags:?} transparent {transparent}"
            );
            let clip = if flags.contains(ObjectFlags::CLIPPABLE) { 255 } else { 0 };
            assert_eq!(encoded.clip_texel(), [clip, 0, 0, 0]);
        }
    }
}

enum Op {
    Visible(bool),
    Selected(bool),
    Highlighted(bool),
    Xrayed(bool),
    Edges(bool),
    Clippable(bool),
    Colorize(Option<[u8; 3]>),
    Opacity(u8),
}

fn apply(layer: &mut Layer, mesh: MeshId, op: &Op) {
    match *op {
        Op::Visible(v) => layer.set_mesh_visible(mesh, v),
        Op::Selected(v) => layer.set_mesh_selected(mesh, v),
        Op::Highlighted(v) => layer.set_mesh_highlighted(mesh, v),
        Op::Xrayed(v) => layer.set_mesh_xrayed(mesh, v),
        Op::Edges(v) => layer.set_mesh_edges(mesh, v),
        Op::Clippable(v) => layer.set_mesh_clippable(mesh, v),
        Op::Colorize(c) => layer.set_mesh_colorize(mesh, c),
        Op::Opacity(o) => layer.set_mesh_opacity(mesh, o),
    }
    .unwrap();
}

#[test]
fn test_deferred_matches_immediate() {
    let ops = [
        (0, Op::Selected(true)),
        (3, Op::Visible(false)),
        (1, Op::Colorize(Some([9, 8, 7]))),
        (2, Op::Xrayed(true)),
        (0, Op::Highlighted(true)),
        (4, Op::Opacity(80)),
        (3, Op::Edges(true)),
        (1, Op::Clippable(false)),
        (0, Op::Selected(false)),
        (1, Op::Colorize(None)),
    ];

    let immediate_backend = Rc::new(RecordingBackend::new());
    let (mut immediate, meshes) = finalized_layer(5, &immediate_backend);
    let deferred_backend = Rc::new(RecordingBackend::new());
    let (mut deferred, _) = finalized_layer(5, &deferred_backend);

    for (layer, backend) in [
        (&mut immediate, &immediate_backend),
        (&mut deferred, &deferred_backend),
    ] {
        for &mesh in &meshes {
            layer
                .init_mesh_flags(mesh, ObjectFlags::initial(), false)
                .unwrap();
        }
        layer.flush_init_flags().unwrap();
        backend.reset_uploads();
    }

    for (i, op) in &ops {
        apply(&mut immediate, meshes[*i], op);
    }
    // Emphasis changes hidden behind a stronger state upload nothing
    assert_eq!(immediate_backend.uploads(), 9);

    deferred.begin_deferred_flags().unwrap();
    for (i, op) in &ops {
        apply(&mut deferred, meshes[*i], op);
    }
    deferred.set_mesh_offset(meshes[2], [1.0, 2.0, 3.0]).unwrap();
    assert_eq!(deferred_backend.uploads(), 0);
    deferred.commit_deferred_flags().unwrap();

    let textures = deferred.render_state().unwrap().textures.unwrap();
    assert_eq!(deferred_backend.uploads_to(textures.each_mesh_attributes), 1);
    assert_eq!(deferred_backend.uploads_to(textures.each_mesh_offsets), 1);
    assert_eq!(deferred_backend.uploads_to(textures.each_mesh_matrices), 0);

    for &mesh in &meshes {
        assert_eq!(
            immediate.mesh_attributes(mesh).unwrap(),
            deferred.mesh_attributes(mesh).unwrap()
        );
        assert_eq!(
            immediate.mesh_flags(mesh).unwrap(),
            deferred.mesh_flags(mesh).unwrap()
        );
    }
    let immediate_handle = immediate.render_state().unwrap().textures.unwrap();
    assert_eq!(
        immediate_backend
            .texture(immediate_handle.each_mesh_attributes)
            .unwrap()
            .data,
        deferred_backend
            .texture(textures.each_mesh_attributes)
            .unwrap()
            .data
    );
    assert_eq!(immediate.mesh_counts(), deferred.mesh_counts());
}

#[test]
fn test_mutation_writes_every_part() {
    let backend = Rc::new(RecordingBackend::new());
    let (mut layer, meshes) = finalized_layer(3, &backend);
    layer.flush_init_flags().unwrap();

    layer
        .init_mesh_flags(meshes[1], ObjectFlags::initial(), true)
        .unwrap();
    layer.set_mesh_colorize(meshes[1], Some([1, 2, 3])).unwrap();

    let records = layer.mesh_attributes(meshes[1]).unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.flags, [2, 0, 0, 11]);
        assert_eq!(record.clip_flags, [255, 0, 0, 0]);
        assert_eq!(record.color, [1, 2, 3, 255]);
        assert_eq!(record.pick_color, [1, 0, 0, 255]);
    }
    // Neighbours untouched
    for mesh in [meshes[0], meshes[2]] {
        for record in layer.mesh_attributes(mesh).unwrap() {
            assert_eq!(record.flags, [0; 4]);
        }
    }

    // A no-op mutation uploads nothing
    backend.reset_uploads();
    layer.set_mesh_colorize(meshes[1], Some([1, 2, 3])).unwrap();
    layer.set_mesh_collidable(meshes[1], true).unwrap();
    assert_eq!(backend.uploads(), 0);
}

#[test]
fn test_capacity_rejection_at_max_parts() {
    let backend = Rc::new(RecordingBackend::new());
    let config = Config {
        max_mesh_parts: 3,
        ..Config::default()
    };
    let mut layer = Layer::new(Primitive::Triangles, [0.0; 3], 0, config, backend);
    let geometry = two_bucket_geometry("g");

    assert!(layer.can_accept_mesh(&geometry));
    layer.create_geometry_compressed(&geometry).unwrap();
    layer.create_mesh(&MeshParams::new("a", "g")).unwrap();
    assert_eq!(layer.num_mesh_parts(), 2);

    assert!(!layer.can_accept_mesh(&geometry));
    assert!(matches!(
        layer.create_mesh(&MeshParams::new("b", "g")),
        Err(Error::CapacityExceeded(_))
    ));
    assert_eq!(layer.num_meshes(), 1);
    assert_eq!(layer.mesh_counts().num_meshes, 1);
    assert_eq!(layer.num_mesh_parts(), 2);

    // A fresh geometry needs its own parts too
    assert!(matches!(
        layer.create_geometry_compressed(&two_bucket_geometry("h")),
        Err(Error::CapacityExceeded(_))
    ));
    assert!(!layer.has_geometry("h"));
}

fn scan_counts(layer: &Layer, meshes: &[MeshId]) -> MeshCounts {
    let mut counts = MeshCounts {
        num_meshes: meshes.len(),
        ..MeshCounts::default()
    };
    for &mesh in meshes {
        let flags = layer.mesh_flags(mesh).unwrap();
        let has = |f| usize::from(flags.contains(f));
        counts.num_visible += has(ObjectFlags::VISIBLE);
        counts.num_culled += has(ObjectFlags::CULLED);
        counts.num_pickable += has(ObjectFlags::PICKABLE);
        counts.num_clippable += has(ObjectFlags::CLIPPABLE);
        counts.num_xrayed += has(ObjectFlags::XRAYED);
        counts.num_selected += has(ObjectFlags::SELECTED);
        counts.num_highlighted += has(ObjectFlags::HIGHLIGHTED);
        counts.num_edges += has(ObjectFlags::EDGES);
        counts.num_transparent += usize::from(layer.is_mesh_transparent(mesh).unwrap());
    }
    counts
}

#[test]
fn test_counts_match_scan_after_random_mutations() {
    let backend = Rc::new(RecordingBackend::new());
    let (mut layer, meshes) = finalized_layer(12, &backend);
    for &mesh in &meshes {
        layer
            .init_mesh_flags(mesh, ObjectFlags::initial(), false)
            .unwrap();
    }
    layer.flush_init_flags().unwrap();
    assert_eq!(layer.mesh_counts(), &scan_counts(&layer, &meshes));

    let mut rng = Lcg(42);
    for step in 0..500 {
        let mesh = meshes[rng.below(meshes.len() as u32) as usize];
        let value = rng.coin();
        let result = match rng.below(10) {
            0 => layer.set_mesh_visible(mesh, value),
            1 => layer.set_mesh_culled(mesh, value),
            2 => layer.set_mesh_pickable(mesh, value),
            3 => layer.set_mesh_clippable(mesh, value),
            4 => layer.set_mesh_xrayed(mesh, value),
            5 => layer.set_mesh_selected(mesh, value),
            6 => layer.set_mesh_highlighted(mesh, value),
            7 => layer.set_mesh_edges(mesh, value),
            8 => layer.set_mesh_transparent(mesh, value),
            _ => layer.set_mesh_opacity(mesh, if value { 255 } else { 128 }),
        };
        result.unwrap();

        if step % 50 == 0 {
            layer.begin_deferred_flags().unwrap();
        } else if step % 50 == 25 {
            layer.commit_deferred_flags().unwrap();
        }
        assert_eq!(layer.mesh_counts(), &scan_counts(&layer, &meshes), "step {step}");
    }
}

fn grid(n: u16) -> CompressedMesh {
    let mut mesh = CompressedMesh::new();
    for y in 0..=n {
        for x in 0..=n {
            mesh.add_vertex([x * 10, y * 10, x + y]);
        }
    }
    let row = n as u32 + 1;
    for y in 0..n as u32 {
        for x in 0..n as u32 {
            let i = y * row + x;
            mesh.add_triangle(i, i + 1, i + row + 1);
            mesh.add_triangle(i, i + row + 1, i + row);
        }
    }
    mesh
}

fn triangle_positions(mesh: &CompressedMesh) -> HashMap<[[u16; 3]; 3], usize> {
    let mut out = HashMap::new();
    for tri in mesh.indices.chunks_exact(3) {
        let mut corners = [mesh.position(tri[0]), mesh.position(tri[1]), mesh.position(tri[2])];
        corners.sort();
        *out.entry(corners).or_insert(0) += 1;
    }
    out
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[test]
fn test_draw_through_lookup_tables() {
    let mesh = grid(24);
    let geometry = build_geometry_params("grid", Primitive::Triangles, &mesh, Matrix4::identity(), 8);
    assert!(geometry.geometry_buckets.len() > 1);

    let backend = Rc::new(RecordingBackend::new());
    let mut layers = LayerSet::new(Config::default(), backend.clone());
    let mut keys = Vec::new();
    for i in 0..2 {
        keys.push(
            layers
                .create_mesh([0.0; 3], &geometry, &MeshParams::new(format!("m{i}"), "grid"))
                .unwrap(),
        );
    }
    assert_eq!(keys[0].0, keys[1].0);
    layers.finalize_all().unwrap();

    let layer = layers.layer(keys[0].0).unwrap();
    let state = layer.render_state().unwrap();
    let textures = state.textures.unwrap();
    for part in layer.mesh_parts(keys[1].1).unwrap() {
        assert_eq!(part.tier, IndexTier::Bits8);
        assert_eq!(part.num_primitives as usize % INDICES_ALIGNMENT, 0);
    }

    let positions = backend.texture(textures.positions).unwrap();
    let indices = backend.texture(textures.indices(IndexTier::Bits8)).unwrap();
    let lookup = backend.texture(textures.each_primitive_mesh[0]).unwrap();
    let attributes = backend.texture(textures.each_mesh_attributes).unwrap();
    let width = indices.width;
    let first_mesh_parts = layer.mesh_parts(keys[0].1).unwrap().len();

    let num_primitives = state.num_indices[0] / 3;
    let mut drawn: Vec<HashMap<[[u16; 3]; 3], usize>> = vec![HashMap::new(); 2];
    for p in 0..num_primitives {
        let entry = p / INDICES_ALIGNMENT;
        let part = read_u16(lookup.texel(entry % lookup.width, entry / lookup.width)) as usize;
        let row = attributes.region_bytes(&dtx_lite_layer::TexelRegion::new(
            0,
            part,
            ATTRIBUTE_TEXELS,
            1,
        ));
        let record = MeshAttributeRecord::from_bytes(&row).unwrap();

        let stored = (p as i64 - record.vertex_offset() as i64) as usize;
        let local = indices.texel(stored % width, stored / width);
        if local[0] == local[1] && local[1] == local[2] {
            // alignment padding
            continue;
        }
        let mut corners = [[0u16; 3]; 3];
        for (corner, &i) in corners.iter_mut().zip(local) {
            let v = record.vertex_base() as usize + i as usize;
            let texel = positions.texel(v % positions.width, v / positions.width);
            *corner = [read_u16(&texel[0..2]), read_u16(&texel[2..4]), read_u16(&texel[4..6])];
        }
        corners.sort();

        let owner = usize::from(part >= first_mesh_parts);
        *drawn[owner].entry(corners).or_insert(0) += 1;
    }

    let expected = triangle_positions(&mesh);
    assert_eq!(drawn[0], expected);
    assert_eq!(drawn[1], expected);
}

fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[test]
fn test_matrix_and_offset_tables() {
    let backend = Rc::new(RecordingBackend::new());
    let (mut layer, meshes) = finalized_layer(2, &backend);
    layer.flush_init_flags().unwrap();

    let matrix = Matrix4::new_translation(&nalgebra::Vector3::new(1.5, -2.0, 0.25));
    layer.set_mesh_matrix(meshes[1], matrix).unwrap();
    layer.set_mesh_offset(meshes[1], [0.5, 0.0, -3.0]).unwrap();

    let textures = layer.render_state().unwrap().textures.unwrap();
    let matrices = backend.texture(textures.each_mesh_matrices).unwrap();
    let offsets = backend.texture(textures.each_mesh_offsets).unwrap();

    // Mesh 1 owns parts 2 and 3
    for part in 2..4 {
        let decompress = read_f32s(&matrices.region_bytes(&dtx_lite_layer::TexelRegion::new(
            0, part, 4, 1,
        )));
        let model = read_f32s(&matrices.region_bytes(&dtx_lite_layer::TexelRegion::new(
            4, part, 4, 1,
        )));
        assert_relative_eq!(decompress[0], 1.0);
        assert_relative_eq!(decompress[12], 0.0);
        // Column-major: translation in the last column
        assert_relative_eq!(model[12], 1.5);
        assert_relative_eq!(model[13], -2.0);
        assert_relative_eq!(model[14], 0.25);
        assert_relative_eq!(model[15], 1.0);

        let offset = read_f32s(offsets.texel(0, part));
        assert_relative_eq!(offset[0], 0.5);
        assert_relative_eq!(offset[2], -3.0);
    }
    let untouched = read_f32s(&matrices.region_bytes(&dtx_lite_layer::TexelRegion::new(
        4, 0, 4, 1,
    )));
    assert_relative_eq!(untouched[12], 0.0);

    let aabb = layer.mesh_aabb(meshes[1]).unwrap();
    assert_relative_eq!(aabb.min.x, 1.5);
    assert_relative_eq!(aabb.max.y, -1.0);
}

#[test]
fn test_unknown_mesh_and_wrong_state() {
    let backend = Rc::new(RecordingBackend::new());
    let (mut layer, meshes) = finalized_layer(1, &backend);
    assert_eq!(
        layer.set_mesh_xrayed(MeshId(5), true),
        Err(Error::MeshNotFound(5))
    );
    assert!(layer.mesh_attributes(meshes[0]).is_ok());

    layer.destroy();
    assert!(matches!(
        layer.set_mesh_xrayed(meshes[0], true),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        layer.begin_deferred_flags(),
        Err(Error::InvalidState(_))
    ));
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn test_rejected_upload_recovers_on_commit() {
    let backend = Rc::new(RecordingBackend::new());
    let (mut layer, meshes) = finalized_layer(2, &backend);
    for &mesh in &meshes {
        layer
            .init_mesh_flags(mesh, ObjectFlags::initial(), false)
            .unwrap();
    }
    layer.flush_init_flags().unwrap();

    // Opacity changes both the pass codes and the color texel
    backend.reject_next_writes(1);
    assert!(matches!(
        layer.set_mesh_opacity(meshes[0], 80),
        Err(Error::Backend(_))
    ));
    assert!(layer.is_mesh_transparent(meshes[0]).unwrap());
    // The state already holds the change, so a retry has nothing to do
    layer.set_mesh_opacity(meshes[0], 80).unwrap();

    let textures = layer.render_state().unwrap().textures.unwrap();
    let gpu_records = || {
        let attributes = backend.texture(textures.each_mesh_attributes).unwrap();
        (0..2)
            .map(|part| {
                let row = attributes.region_bytes(&dtx_lite_layer::TexelRegion::new(
                    0,
                    part,
                    ATTRIBUTE_TEXELS,
                    1,
                ));
                MeshAttributeRecord::from_bytes(&row).unwrap()
            })
            .collect::<Vec<_>>()
    };
    let mirrored = layer.mesh_attributes(meshes[0]).unwrap();
    assert_eq!(mirrored[0].flags, [2, 0, 0, 11]);
    assert_eq!(mirrored[0].color, [0, 100, 200, 80]);
    assert_ne!(gpu_records(), mirrored);

    layer.begin_deferred_flags().unwrap();
    layer.commit_deferred_flags().unwrap();
    assert_eq!(gpu_records(), mirrored);
}

fn segment_positions(positions: &[u16], indices: &[u32]) -> Vec<[[u16; 3]; 2]> {
    let corner = |i: u32| {
        let i = i as usize * 3;
        [positions[i], positions[i + 1], positions[i + 2]]
    };
    let mut segments: Vec<_> = indices
        .chunks_exact(2)
        .map(|pair| {
            let mut segment = [corner(pair[0]), corner(pair[1])];
            segment.sort();
            segment
        })
        .collect();
    segments.sort();
    segments
}

#[test]
fn test_lines_layer_draws_through_lookup_tables() {
    let positions = vec![0, 0, 0, 10, 0, 0, 10, 10, 0, 0, 10, 0];
    let line_indices = vec![0, 1, 1, 2, 2, 3];
    let geometry = GeometryCompressedParams {
        id: "polyline".to_string(),
        primitive: Primitive::Lines,
        positions_decompress_matrix: Matrix4::identity(),
        aabb: Aabb3::from_array([0.0, 0.0, 0.0, 10.0, 10.0, 0.0]),
        geometry_buckets: vec![GeometryBucketParams {
            positions_compressed: positions.clone(),
            indices: Some(line_indices.clone()),
            edge_indices: None,
        }],
    };

    let backend = Rc::new(RecordingBackend::new());
    let mut layer = Layer::new(Primitive::Lines, [0.0; 3], 0, Config::default(), backend.clone());
    layer.create_geometry_compressed(&geometry).unwrap();
    let meshes: Vec<_> = (0..2)
        .map(|i| {
            layer
                .create_mesh(&MeshParams::new(format!("m{i}"), "polyline"))
                .unwrap()
        })
        .collect();
    layer.finalize().unwrap();

    let state = layer.render_state().unwrap();
    // Three segments padded to a lookup group, per mesh
    assert_eq!(state.num_indices, [2 * INDICES_ALIGNMENT * 2, 0, 0]);
    assert_eq!(state.num_edge_indices, [0; 3]);
    for &mesh in &meshes {
        let parts = layer.mesh_parts(mesh).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].tier, IndexTier::Bits8);
    }

    let textures = state.textures.unwrap();
    let stored_positions = backend.texture(textures.positions).unwrap();
    let indices = backend.texture(textures.indices(IndexTier::Bits8)).unwrap();
    let lookup = backend.texture(textures.each_primitive_mesh[0]).unwrap();
    let attributes = backend.texture(textures.each_mesh_attributes).unwrap();
    assert_eq!(indices.format.channels, 2);
    assert_eq!(read_u16(lookup.texel(0, 0)), 0);
    assert_eq!(read_u16(lookup.texel(1, 0)), 1);

    let mut drawn = vec![Vec::new(); 2];
    for p in 0..state.num_indices[0] / 2 {
        let entry = p / INDICES_ALIGNMENT;
        let part = read_u16(lookup.texel(entry % lookup.width, entry / lookup.width)) as usize;
        let row = attributes.region_bytes(&dtx_lite_layer::TexelRegion::new(
            0,
            part,
            ATTRIBUTE_TEXELS,
            1,
        ));
        let record = MeshAttributeRecord::from_bytes(&row).unwrap();
        assert_eq!(record.vertex_offset(), (part * INDICES_ALIGNMENT) as i32);

        let stored = (p as i64 - record.vertex_offset() as i64) as usize;
        let local = indices.texel(stored % indices.width, stored / indices.width);
        if local[0] == local[1] {
            // alignment padding
            continue;
        }
        let mut segment = [[0u16; 3]; 2];
        for (corner, &i) in segment.iter_mut().zip(local) {
            let v = record.vertex_base() as usize + i as usize;
            let texel = stored_positions.texel(v % stored_positions.width, v / stored_positions.width);
            *corner = [read_u16(&texel[0..2]), read_u16(&texel[2..4]), read_u16(&texel[4..6])];
        }
        segment.sort();
        drawn[part].push(segment);
    }

    let expected = segment_positions(&positions, &line_indices);
    for mut segments in drawn {
        segments.sort();
        assert_eq!(segments, expected);
    }
}

#[test]
fn test_points_layer_tables() {
    let geometry = GeometryCompressedParams {
        id: "cloud".to_string(),
        primitive: Primitive::Points,
        positions_decompress_matrix: Matrix4::identity(),
        aabb: Aabb3::from_array([0.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
        geometry_buckets: vec![GeometryBucketParams {
            positions_compressed: vec![0, 0, 0, 1, 0, 0, 2, 0, 0],
            indices: Some(vec![0, 1, 2]),
            edge_indices: None,
        }],
    };

    let backend = Rc::new(RecordingBackend::new());
    let mut layer = Layer::new(Primitive::Points, [0.0; 3], 0, Config::default(), backend.clone());
    layer.create_geometry_compressed(&geometry).unwrap();
    for i in 0..2 {
        layer
            .create_mesh(&MeshParams::new(format!("p{i}"), "cloud"))
            .unwrap();
    }
    layer.finalize().unwrap();

    let state = layer.render_state().unwrap();
    assert_eq!(state.num_indices, [2 * INDICES_ALIGNMENT, 0, 0]);

    let textures = state.textures.unwrap();
    let indices = backend.texture(textures.indices(IndexTier::Bits8)).unwrap();
    let lookup = backend.texture(textures.each_primitive_mesh[0]).unwrap();
    assert_eq!(indices.format.channels, 1);
    let stored: Vec<u8> = (0..INDICES_ALIGNMENT).map(|i| indices.texel(i, 0)[0]).collect();
    assert_eq!(stored, [0, 1, 2, 0, 0, 0, 0, 0]);
    assert_eq!(read_u16(lookup.texel(0, 0)), 0);
    assert_eq!(read_u16(lookup.texel(1, 0)), 1);
}
