// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types shared by the DTX-Lite crates.

use thiserror::Error;

/// Result type for layer-packing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while packing geometry into layers or mutating
/// per-mesh state.
///
/// `InvalidState` marks a programming error in the caller (finalizing twice,
/// mutating a layer in the wrong phase). `CapacityExceeded` is the expected
/// outcome of a full layer and is normally caught earlier through
/// `can_accept_mesh`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid layer state: {0}")]
    InvalidState(String),

    #[error("Geometry not found: {0}")]
    GeometryNotFound(String),

    #[error("Duplicate geometry: {0}")]
    DuplicateGeometry(String),

    #[error("Mesh not found: {0}")]
    MeshNotFound(u32),

    #[error("Layer capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Data texture backend error: {0}")]
    Backend(String),
}

impl Error {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Error::InvalidGeometry(msg.into())
    }

    /// Whether this error signals caller misuse rather than a data problem.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidState(_) | Error::GeometryNotFound(_) | Error::MeshNotFound(_)
        )
    }
}
