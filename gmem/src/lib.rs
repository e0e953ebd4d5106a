// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tile-memory layout caching and tiled render dispatch for tile-based GPUs.
//!
//! A [`LayoutCache`] is created once per device from its [`DeviceCaps`]. Each frame is
//! described by a [`FrameDesc`]; the [`Dispatcher`] decides whether the frame can be
//! rendered tile by tile, fetches the matching [`TileGrid`] from the cache, and walks
//! the tiles through the caller's [`TileCallbacks`]:
//!
//! ```ignore
//! let cache = Arc::new(LayoutCache::new(caps, CacheOptions::default()));
//! let dispatcher = Dispatcher::new(cache.clone());
//! let report = dispatcher.render(&frame, &mut encoder, &NeverBypass)?;
//! ```
//!
//! The layout math itself lives in [`gmem_layout`], which is re-exported.

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

mod cache;
mod debug;
mod dispatch;
mod frame;

use std::collections::TryReserveError;

use thiserror::Error;

pub use gmem_layout;
pub use gmem_layout::{
    BufferSlot, DeviceCaps, InvalidCapsReason, InvalidKeyReason, LayoutError, LayoutKey,
    PageAlignPolicy, PartitionStrategy, Pipe, Tile, TileGrid, TileOrder, MAX_COLOR_BUFFERS,
    MAX_PIPES,
};

pub use cache::{CacheOptions, CacheStats, LayoutCache, DEFAULT_CAPACITY};
pub use debug::DebugFlags;
pub use dispatch::{
    BypassAdvisor, BypassReason, Dispatcher, Mode, NeverBypass, RenderReport, TileCallbacks,
};
pub use frame::{
    BufferMask, ColorAttachment, DepthStencilAttachment, FrameDesc, Scissor, StencilLayout,
};

/// Errors that can occur in Gmem.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The layout for a key couldn't be built.
    #[error("Couldn't lay out tile memory: {0}")]
    Layout(#[from] LayoutError),
    /// The cache couldn't grow to hold a new layout.
    #[error("Couldn't allocate a layout cache entry")]
    CacheAllocation(#[source] TryReserveError),
}

impl Error {
    /// Whether no layout could be provided for the key, and the frame should be
    /// rendered without tiling.
    ///
    /// Allocation failures count as infeasible layouts.
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            Self::Layout(LayoutError::InfeasibleLayout { .. } | LayoutError::Allocation(_))
                | Self::CacheAllocation(_)
        )
    }
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
