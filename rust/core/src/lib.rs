// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # DTX-Lite Core
//!
//! Shared data model for the DTX-Lite layer-packing engine.
//!
//! ## Overview
//!
//! - **Descriptors**: [`GeometryCompressedParams`] and [`MeshParams`] as handed
//!   over by the scene graph
//! - **Object state**: [`ObjectFlags`] visual-state bits
//! - **Bounds**: [`Aabb3`] in f64 precision
//! - **Configuration**: layer capacities and bucketing budget via [`Config`]
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for descriptors

pub mod aabb;
pub mod config;
pub mod error;
pub mod flags;
pub mod params;
pub mod primitive;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

pub use aabb::Aabb3;
pub use config::{
    Config, DATA_TEXTURE_WIDTH, MAX_DATA_TEXTURE_HEIGHT, MAX_MESH_PARTS, MAX_PART_IDS,
};
pub use error::{Error, Result};
pub use flags::ObjectFlags;
pub use params::{GeometryBucketParams, GeometryCompressedParams, MeshParams};
pub use primitive::Primitive;
