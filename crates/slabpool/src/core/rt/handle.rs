// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Opaque, address-independent object identity.
//!
//! A handle packs `(slab, chunk, tag)` into a single fixed-width integer.
//! `slab` and `chunk` together identify a live chunk; `tag` is reserved for
//! the client (e.g. to mark pointer flavour in a tagged-union graph) and is
//! preserved verbatim by every pool operation. `slab == 0` is the
//! null/invalid handle.
//!
//! Two concrete layouts are provided: [`Handle32`] (S=16, C=15, T=1, the
//! default) and [`Handle64`] (S=16, C=16, T=32) for larger universes.
//! Ordering is lexicographic on `(slab, chunk)`; `tag` never participates.

use std::fmt;
use std::hash::Hash;

/// A compact, trivially-copyable object identity independent of machine
/// address.
///
/// Implementations are plain bit-packed integers; there is no vtable and no
/// indirection. `Raw` is the type used for the "raw bitvector" view, a
/// plain integer of the same width as the handle, suitable for hashing,
/// comparison, or serialisation outside this crate.
pub trait Handle:
    Copy + Clone + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug + Send + Sync + 'static
{
    /// Bits dedicated to the slab (block) index.
    const SLAB_BITS: u32;
    /// Bits dedicated to the chunk (slot) index within a block.
    const CHUNK_BITS: u32;
    /// Bits reserved for the client-owned tag.
    const TAG_BITS: u32;

    /// Maximum number of blocks this layout can address (`2^SLAB_BITS`).
    const MAX_SLABS: u32 = 1u32 << Self::SLAB_BITS;
    /// Maximum chunks per block this layout can address (`2^CHUNK_BITS`).
    const MAX_CHUNKS_PER_SLAB: u32 = 1u32 << Self::CHUNK_BITS;

    /// The plain-integer view of this handle (`u32` or `u64` depending on
    /// layout width).
    type Raw: Copy + Eq + Hash + fmt::Debug + Send + Sync;

    /// Construct a handle from its three fields. Each field is masked to
    /// its layout width; callers must not rely on truncation behaviour.
    fn new(slab: u32, chunk: u32, tag: u32) -> Self;

    /// The null/invalid handle (`slab == 0`).
    fn null() -> Self {
        Self::new(0, 0, 0)
    }

    /// `true` iff this is the null handle.
    fn is_null(self) -> bool {
        self.slab() == 0
    }

    /// Block index.
    fn slab(self) -> u32;
    /// Slot index within the block.
    fn chunk(self) -> u32;
    /// Client-owned tag, opaque to the pool.
    fn tag(self) -> u32;

    /// Return a copy of this handle with `tag` replaced. `slab`/`chunk` are
    /// unaffected. Never called by the pool itself; this exists purely so
    /// clients can stash flavour bits (e.g. in a tagged-union graph).
    fn with_tag(self, tag: u32) -> Self {
        Self::new(self.slab(), self.chunk(), tag)
    }

    /// Reinterpret as the layout's native raw bitvector.
    fn to_raw(self) -> Self::Raw;
    /// Reinterpret a native raw bitvector as a handle.
    fn from_raw(raw: Self::Raw) -> Self;

    /// Widen to a representation-agnostic 64-bit form. Used internally for
    /// storage that must be generic over handle width (chunk linkage, the
    /// thread-local size-class cache) without monomorphizing per layout.
    fn to_bits(self) -> u64;
    /// Narrow back from the 64-bit form produced by [`Handle::to_bits`].
    fn from_bits(bits: u64) -> Self;
}

macro_rules! define_handle {
    ($name:ident, $raw:ty, $slab_bits:expr, $chunk_bits:expr, $tag_bits:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Eq, PartialEq, Hash)]
        #[repr(transparent)]
        pub struct $name($raw);

        impl $name {
            const SLAB_MASK: $raw = ((1 as $raw) << $slab_bits) - 1;
            const CHUNK_MASK: $raw = ((1 as $raw) << $chunk_bits) - 1;
            const CHUNK_SHIFT: u32 = $slab_bits;
            const TAG_SHIFT: u32 = $slab_bits + $chunk_bits;

            /// Build directly from the layout's raw bitvector with no
            /// masking, for callers that already hold a validly-encoded
            /// value (e.g. deserialisation).
            pub const fn from_raw_unchecked(raw: $raw) -> Self {
                Self(raw)
            }
        }

        impl Handle for $name {
            const SLAB_BITS: u32 = $slab_bits;
            const CHUNK_BITS: u32 = $chunk_bits;
            const TAG_BITS: u32 = $tag_bits;
            type Raw = $raw;

            fn new(slab: u32, chunk: u32, tag: u32) -> Self {
                debug_assert!(
                    chunk < Self::MAX_CHUNKS_PER_SLAB,
                    "chunk index exceeds this layout's chunk-bit budget"
                );
                let slab = (slab as $raw) & Self::SLAB_MASK;
                let chunk = (chunk as $raw) & Self::CHUNK_MASK;
                let tag_mask: $raw = if $tag_bits >= (std::mem::size_of::<$raw>() as u32) * 8 {
                    <$raw>::MAX
                } else {
                    ((1 as $raw) << $tag_bits) - 1
                };
                let tag = (tag as $raw) & tag_mask;
                Self(slab | (chunk << Self::CHUNK_SHIFT) | (tag << Self::TAG_SHIFT))
            }

            fn slab(self) -> u32 {
                (self.0 & Self::SLAB_MASK) as u32
            }

            fn chunk(self) -> u32 {
                ((self.0 >> Self::CHUNK_SHIFT) & Self::CHUNK_MASK) as u32
            }

            fn tag(self) -> u32 {
                (self.0 >> Self::TAG_SHIFT) as u32
            }

            fn to_raw(self) -> Self::Raw {
                self.0
            }

            fn from_raw(raw: Self::Raw) -> Self {
                Self(raw)
            }

            fn to_bits(self) -> u64 {
                self.0 as u64
            }

            fn from_bits(bits: u64) -> Self {
                Self(bits as $raw)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            // Lexicographic on (slab, chunk); tag never participates.
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                (self.slab(), self.chunk()).cmp(&(other.slab(), other.chunk()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("slab", &self.slab())
                    .field("chunk", &self.chunk())
                    .field("tag", &self.tag())
                    .finish()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }
    };
}

define_handle!(
    Handle32,
    u32,
    16,
    15,
    1,
    "Default 32-bit handle layout: 16-bit slab, 15-bit chunk, 1-bit tag."
);
define_handle!(
    Handle64,
    u64,
    16,
    16,
    32,
    "Wide 64-bit handle layout for larger universes: 16-bit slab, 16-bit chunk, 32-bit tag."
);
