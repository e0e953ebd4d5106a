// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tile-memory layout math for tiled GPU rendering.
//!
//! Given a [`LayoutKey`] describing a render target and the [`DeviceCaps`] of a
//! tiling GPU, [`TileGrid::new`] chooses a bin size that fits every attachment in
//! on-chip tile memory, assigns each buffer its offset, splits the bins between the
//! hardware pipes and orders the resulting tiles for rendering.
//!
//! Everything here is pure and deterministic: the same key and caps always give
//! the same grid.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::return_self_not_must_use,
    clippy::exhaustive_enums,
    reason = "Deferred"
)]

mod caps;
mod grid;
mod key;
pub mod math;
mod pipes;
mod solver;

use std::collections::TryReserveError;

use thiserror::Error;

pub use caps::{DeviceCaps, PageAlignPolicy, PartitionStrategy, MAX_PIPES};
pub use grid::TileGrid;
pub use key::{BufferSlot, LayoutKey, MAX_COLOR_BUFFERS};
pub use pipes::{Pipe, PipePartition, Tile, TileOrder};
pub use solver::{solve, try_layout, BinLayout};

/// Errors that can occur while laying out tile memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LayoutError {
    /// The key can't describe a render target.
    #[error("Invalid layout key: {0}")]
    InvalidKey(InvalidKeyReason),
    /// The device description can't be used to lay out tile memory.
    #[error("Invalid device caps: {0}")]
    InvalidCaps(InvalidCapsReason),
    /// No bin size fits the buffers in tile memory within the device's limits.
    #[error(
        "No tile layout for {width}x{height} at {bytes_per_pixel} bytes per pixel fits in {gmem_bytes} bytes of tile memory"
    )]
    InfeasibleLayout {
        width: u16,
        height: u16,
        bytes_per_pixel: u32,
        gmem_bytes: u32,
    },
    /// The tile list couldn't be allocated.
    #[error("Couldn't allocate the tile list")]
    Allocation(#[from] TryReserveError),
}

/// Why a [`LayoutKey`] was rejected.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidKeyReason {
    #[error("the render area is empty")]
    EmptyArea,
    #[error("no buffer occupies tile memory")]
    NoBuffers,
    #[error("color attachments are set past the color count")]
    ColorCountMismatch,
    #[error("page alignment is zero")]
    ZeroPageAlign,
}

/// Why a [`DeviceCaps`] was rejected.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidCapsReason {
    #[error("tile alignment is not a power of two")]
    TileAlignment,
    #[error("maximum tile size is zero")]
    ZeroTileSize,
    #[error("tile memory size is zero")]
    ZeroGmem,
    #[error("page unit is zero")]
    ZeroPageUnit,
}
