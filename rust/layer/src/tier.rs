// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Index-width tiers
//!
//! A bucket's indices are stored in the narrowest integer width that can
//! address its vertices. Each tier has its own typed buffer so that values
//! are narrowed once, on insertion.

use crate::data_texture::Component;

/// Index width chosen from a bucket's vertex count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexTier {
    Bits8 = 0,
    Bits16 = 1,
    Bits32 = 2,
}

impl IndexTier {
    pub const ALL: [IndexTier; 3] = [IndexTier::Bits8, IndexTier::Bits16, IndexTier::Bits32];

    /// Narrowest tier addressing `num_vertices` vertices
    #[inline]
    pub fn for_vertex_count(num_vertices: usize) -> Self {
        if num_vertices <= 1 << 8 {
            IndexTier::Bits8
        } else if num_vertices <= 1 << 16 {
            IndexTier::Bits16
        } else {
            IndexTier::Bits32
        }
    }

    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            IndexTier::Bits8 => 8,
            IndexTier::Bits16 => 16,
            IndexTier::Bits32 => 32,
        }
    }

    /// Position in per-tier arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Texel component type of this tier's index textures
    #[inline]
    pub fn component(self) -> Component {
        match self {
            IndexTier::Bits8 => Component::U8,
            IndexTier::Bits16 => Component::U16,
            IndexTier::Bits32 => Component::U32,
        }
    }
}

/// One typed index buffer per tier
#[derive(Debug, Clone, Default)]
pub struct TierBuffers {
    pub bits8: Vec<u8>,
    pub bits16: Vec<u16>,
    pub bits32: Vec<u32>,
}

impl TierBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indices stored in a tier
    #[inline]
    pub fn len(&self, tier: IndexTier) -> usize {
        match tier {
            IndexTier::Bits8 => self.bits8.len(),
            IndexTier::Bits16 => self.bits16.len(),
            IndexTier::Bits32 => self.bits32.len(),
        }
    }

    /// Number of indices over all tiers
    #[inline]
    pub fn total_len(&self) -> usize {
        self.bits8.len() + self.bits16.len() + self.bits32.len()
    }

    /// Append indices to a tier, narrowing them to the tier's width.
    ///
    /// Callers pick the tier with [`IndexTier::for_vertex_count`], so every
    /// index fits the width.
    pub fn extend(&mut self, tier: IndexTier, indices: &[u32]) {
        match tier {
            IndexTier::Bits8 => self.bits8.extend(indices.iter().map(|&i| i as u8)),
            IndexTier::Bits16 => self.bits16.extend(indices.iter().map(|&i| i as u16)),
            IndexTier::Bits32 => self.bits32.extend_from_slice(indices),
        }
    }

    /// Append `count` zero indices to a tier
    pub fn pad(&mut self, tier: IndexTier, count: usize) {
        match tier {
            IndexTier::Bits8 => self.bits8.resize(self.bits8.len() + count, 0),
            IndexTier::Bits16 => self.bits16.resize(self.bits16.len() + count, 0),
            IndexTier::Bits32 => self.bits32.resize(self.bits32.len() + count, 0),
        }
    }

    /// Raw bytes of a tier's buffer
    pub fn as_bytes(&self, tier: IndexTier) -> &[u8] {
        match tier {
            IndexTier::Bits8 => &self.bits8,
            IndexTier::Bits16 => bytemuck::cast_slice(&self.bits16),
            IndexTier::Bits32 => bytemuck::cast_slice(&self.bits32),
        }
    }

    /// Index `i` of a tier, widened back to u32
    pub fn get(&self, tier: IndexTier, i: usize) -> Option<u32> {
        match tier {
            IndexTier::Bits8 => self.bits8.get(i).map(|&v| v as u32),
            IndexTier::Bits16 => self.bits16.get(i).map(|&v| v as u32),
            IndexTier::Bits32 => self.bits32.get(i).copied(),
        }
    }
}
