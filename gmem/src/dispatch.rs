// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame choice between tiled and direct rendering, and the tile walk.

use std::fmt;
use std::sync::Arc;

use gmem_layout::{LayoutKey, Tile, TileGrid};

use crate::{BufferMask, DebugFlags, FrameDesc, LayoutCache, Result};

/// Hooks that emit the hardware commands for one frame.
///
/// On the tiled path the dispatcher calls `prepare_tiling`, then for every tile in
/// traversal order `prepare_tile`, `restore_tile` (only when some buffer needs
/// restoring), `render_prep_tile`, `emit_tile_commands` and `resolve_tile`, and
/// finally `finish_tiling`. On the bypass path it calls `prepare_sysmem`,
/// `emit_sysmem_commands` and `finish_sysmem`. Both paths end with `submit`.
pub trait TileCallbacks {
    /// Completion handle returned by [`TileCallbacks::submit`].
    type Fence;

    /// `binning` is true when a hardware binning pass should be run first.
    fn prepare_tiling(&mut self, grid: &TileGrid, binning: bool);
    fn prepare_tile(&mut self, grid: &TileGrid, tile: &Tile);
    /// Loads the buffers in `mask` from memory into the tile.
    fn restore_tile(&mut self, grid: &TileGrid, tile: &Tile, mask: BufferMask);
    fn render_prep_tile(&mut self, grid: &TileGrid, tile: &Tile);
    fn emit_tile_commands(&mut self, grid: &TileGrid, tile: &Tile);
    /// Stores the tile back to memory.
    fn resolve_tile(&mut self, grid: &TileGrid, tile: &Tile);
    fn finish_tiling(&mut self, grid: &TileGrid);

    fn prepare_sysmem(&mut self, frame: &FrameDesc);
    fn emit_sysmem_commands(&mut self, frame: &FrameDesc);
    fn finish_sysmem(&mut self, frame: &FrameDesc);

    fn submit(&mut self) -> Self::Fence;
}

/// Workload heuristics that may prefer direct rendering for a frame that could be tiled.
pub trait BypassAdvisor {
    fn prefer_bypass(&self, frame: &FrameDesc, key: &LayoutKey) -> bool;
}

/// Never recommends bypass.
#[derive(Copy, Clone, Debug, Default)]
pub struct NeverBypass;

impl BypassAdvisor for NeverBypass {
    fn prefer_bypass(&self, _: &FrameDesc, _: &LayoutKey) -> bool {
        false
    }
}

impl<F> BypassAdvisor for F
where
    F: Fn(&FrameDesc, &LayoutKey) -> bool,
{
    fn prefer_bypass(&self, frame: &FrameDesc, key: &LayoutKey) -> bool {
        self(frame, key)
    }
}

/// Why a frame was rendered without tiling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BypassReason {
    /// [`DebugFlags::FORCE_BYPASS`] is set.
    Forced,
    /// The frame neither clears nor draws.
    Flush,
    /// An attachment renders to several layers.
    Layered,
    /// The render area is empty.
    EmptyArea,
    /// A draw uses tessellation.
    Tessellation,
    /// No buffer would occupy tile memory.
    NoAttachments,
    /// The [`BypassAdvisor`] preferred it.
    Advisor,
    /// No tile layout fits the device.
    InfeasibleLayout,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forced => "forced by debug flags",
            Self::Flush => "nothing to render",
            Self::Layered => "layered rendering",
            Self::EmptyArea => "empty render area",
            Self::Tessellation => "tessellation",
            Self::NoAttachments => "no attachments",
            Self::Advisor => "advisor",
            Self::InfeasibleLayout => "no feasible tile layout",
        })
    }
}

/// How a frame was rendered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Bypass(BypassReason),
    Tiled {
        /// Number of tiles rendered.
        bins: u32,
        /// Number of pipes used.
        pipes: u32,
    },
}

/// Outcome of [`Dispatcher::render`].
#[derive(Debug)]
pub struct RenderReport<F> {
    pub mode: Mode,
    pub fence: F,
}

/// Drives the rendering of frames through a shared [`LayoutCache`].
///
/// Debug flags are taken from the cache's [`CacheOptions`](crate::CacheOptions), so every
/// dispatcher of a device sees the same overrides.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    cache: Arc<LayoutCache>,
}

impl Dispatcher {
    pub fn new(cache: Arc<LayoutCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<LayoutCache> {
        &self.cache
    }

    /// Renders `frame` and submits it.
    ///
    /// A frame whose layout doesn't fit the device falls back to the bypass path.
    /// Invalid layout keys are returned as errors.
    pub fn render<C: TileCallbacks>(
        &self,
        frame: &FrameDesc,
        callbacks: &mut C,
        advisor: &dyn BypassAdvisor,
    ) -> Result<RenderReport<C::Fence>> {
        let key = frame.layout_key(self.cache.caps());
        let mode = match self.bypass_reason(frame, &key, advisor) {
            Some(reason) => {
                log::debug!("gmem: bypass ({reason})");
                render_sysmem(frame, callbacks);
                Mode::Bypass(reason)
            }
            None => match self.cache.get_or_create(&key) {
                Ok(grid) => {
                    render_tiled(frame, &grid, callbacks);
                    let mode = Mode::Tiled {
                        bins: grid.num_bins(),
                        pipes: grid.used_pipes(),
                    };
                    self.cache.release(grid);
                    mode
                }
                Err(err) if err.is_infeasible() => {
                    log::warn!("gmem: {err}, rendering {}x{} directly", key.width, key.height);
                    render_sysmem(frame, callbacks);
                    Mode::Bypass(BypassReason::InfeasibleLayout)
                }
                Err(err) => return Err(err),
            },
        };
        let fence = callbacks.submit();
        Ok(RenderReport { mode, fence })
    }

    fn bypass_reason(
        &self,
        frame: &FrameDesc,
        key: &LayoutKey,
        advisor: &dyn BypassAdvisor,
    ) -> Option<BypassReason> {
        let debug = self.cache.debug();
        let reason = if debug.contains(DebugFlags::FORCE_BYPASS) {
            BypassReason::Forced
        } else if frame.is_flush() {
            BypassReason::Flush
        } else if frame.is_layered() {
            BypassReason::Layered
        } else if key.width == 0 || key.height == 0 {
            BypassReason::EmptyArea
        } else if frame.has_tessellation {
            BypassReason::Tessellation
        } else if !frame.has_attachments() || !key.has_buffers() {
            BypassReason::NoAttachments
        } else if !debug.contains(DebugFlags::FORCE_TILED)
            && advisor.prefer_bypass(frame, key)
        {
            BypassReason::Advisor
        } else {
            return None;
        };
        Some(reason)
    }
}

fn render_tiled<C: TileCallbacks>(frame: &FrameDesc, grid: &TileGrid, callbacks: &mut C) {
    let restore = frame.restore_mask();
    let binning = grid.hw_binning_possible() && frame.draw_count > 0;
    callbacks.prepare_tiling(grid, binning);
    for tile in grid.tiles() {
        callbacks.prepare_tile(grid, tile);
        if !restore.is_empty() {
            callbacks.restore_tile(grid, tile, restore);
        }
        callbacks.render_prep_tile(grid, tile);
        callbacks.emit_tile_commands(grid, tile);
        callbacks.resolve_tile(grid, tile);
    }
    callbacks.finish_tiling(grid);
}

fn render_sysmem<C: TileCallbacks>(frame: &FrameDesc, callbacks: &mut C) {
    callbacks.prepare_sysmem(frame);
    callbacks.emit_sysmem_commands(frame);
    callbacks.finish_sysmem(frame);
}
