// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{InvalidCapsReason, LayoutError};

/// Upper bound on the number of hardware pipes any supported device exposes.
///
/// Used as the inline capacity of pipe arrays; devices may report fewer.
pub const MAX_PIPES: usize = 32;

/// How the bin grid is split between hardware pipes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Grow the per-pipe extent from 1x1 until the grid fits in the available pipes.
    #[default]
    Adaptive,
    /// Start from a fixed per-pipe extent.
    ///
    /// Tiles on these devices are addressed by their (row, column) position within the
    /// pipe rather than by a running counter. The extent only grows if the fixed
    /// partition would need more pipes than the device has.
    FixedGrid {
        /// Bins per pipe along x.
        width: u32,
        /// Bins per pipe along y.
        height: u32,
    },
}

/// Selects the base-offset alignment (in page units) written into a layout key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PageAlignPolicy {
    /// The device aligns each plane itself, so one page unit is enough.
    Native,
    /// Always use the given number of page units.
    Fixed(u8),
    /// Use `cleared` page units for frames that clear any buffer, `base` otherwise.
    ///
    /// Some fast-clear modes need a larger alignment than regular rendering.
    LargerOnClear {
        /// Alignment for frames without clears.
        base: u8,
        /// Alignment for frames with at least one clear.
        cleared: u8,
    },
}

impl Default for PageAlignPolicy {
    fn default() -> Self {
        Self::Fixed(4)
    }
}

/// Hardware description supplied once per device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Largest bin width in pixels.
    pub max_tile_width: u32,
    /// Largest bin height in pixels.
    pub max_tile_height: u32,
    /// Size of the on-chip tile memory in bytes.
    pub gmem_bytes: u32,
    /// Bin widths are rounded up to this power of two.
    pub tile_align_w: u32,
    /// Bin heights are rounded up to this power of two.
    pub tile_align_h: u32,
    /// Number of hardware pipes, at most [`MAX_PIPES`].
    pub max_pipes: u32,
    /// Size of one page unit in bytes; buffer base offsets are aligned to a multiple of it.
    pub page_unit_bytes: u32,
    /// Step by which the per-pipe height grows during partitioning.
    pub pipe_height_step: u32,
    /// Granularity the render-area origin is rounded down to.
    pub bin_origin_align: u32,
    /// Pipe partitioning scheme.
    pub partition: PartitionStrategy,
    /// Whether the scissor union may shrink the binned area.
    pub precise_scissor: bool,
    /// Whether the device must always bin the whole render target.
    pub whole_buffer_binning: bool,
    /// How the per-frame page alignment is chosen.
    pub page_align: PageAlignPolicy,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_tile_width: 1024,
            max_tile_height: 1024,
            gmem_bytes: 1 << 20,
            tile_align_w: 32,
            tile_align_h: 16,
            max_pipes: MAX_PIPES as u32,
            page_unit_bytes: 0x1000,
            pipe_height_step: 2,
            bin_origin_align: 32,
            partition: PartitionStrategy::Adaptive,
            precise_scissor: true,
            whole_buffer_binning: false,
            page_align: PageAlignPolicy::default(),
        }
    }
}

impl DeviceCaps {
    /// Number of pipes actually usable, clamped to [`MAX_PIPES`].
    pub fn pipe_count(&self) -> u32 {
        self.max_pipes.clamp(1, MAX_PIPES as u32)
    }

    /// Checks that layouts can be computed for these caps.
    ///
    /// Fields that have a sensible clamp (pipe count, pipe height step, origin
    /// alignment) are clamped where they are used instead.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let reason = if !self.tile_align_w.is_power_of_two() || !self.tile_align_h.is_power_of_two()
        {
            InvalidCapsReason::TileAlignment
        } else if self.max_tile_width == 0 || self.max_tile_height == 0 {
            InvalidCapsReason::ZeroTileSize
        } else if self.gmem_bytes == 0 {
            InvalidCapsReason::ZeroGmem
        } else if self.page_unit_bytes == 0 {
            InvalidCapsReason::ZeroPageUnit
        } else {
            return Ok(());
        };
        Err(LayoutError::InvalidCaps(reason))
    }
}
