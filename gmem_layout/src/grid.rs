// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smallvec::SmallVec;

use crate::pipes::assign_tiles;
use crate::{
    solve, BinLayout, BufferSlot, DeviceCaps, LayoutError, LayoutKey, Pipe, PipePartition, Tile,
    TileOrder, MAX_PIPES,
};

/// The complete tile-memory layout for one [`LayoutKey`].
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGrid {
    key: LayoutKey,
    layout: BinLayout,
    partition: PipePartition,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Solves `key` and lays out its tiles in serpentine order.
    pub fn new(key: LayoutKey, caps: &DeviceCaps) -> Result<Self, LayoutError> {
        Self::with_order(key, caps, TileOrder::Serpentine)
    }

    pub fn with_order(
        key: LayoutKey,
        caps: &DeviceCaps,
        order: TileOrder,
    ) -> Result<Self, LayoutError> {
        let layout = solve(&key, caps)?;
        let partition = PipePartition::new(layout.bins_x, layout.bins_y, caps);

        let count = layout.bins_x as usize * layout.bins_y as usize;
        let mut tiles = Vec::new();
        tiles.try_reserve_exact(count)?;
        assign_tiles(&key, &layout, &partition, caps.partition, order, &mut tiles);

        Ok(Self {
            key,
            layout,
            partition,
            tiles,
        })
    }

    pub fn key(&self) -> &LayoutKey {
        &self.key
    }

    pub fn layout(&self) -> &BinLayout {
        &self.layout
    }

    pub fn bin_width(&self) -> u32 {
        self.layout.bin_width
    }

    pub fn bin_height(&self) -> u32 {
        self.layout.bin_height
    }

    pub fn bins_x(&self) -> u32 {
        self.layout.bins_x
    }

    pub fn bins_y(&self) -> u32 {
        self.layout.bins_y
    }

    pub fn num_bins(&self) -> u32 {
        self.layout.bins_x * self.layout.bins_y
    }

    /// Tile-memory offset of a present buffer.
    pub fn base(&self, slot: BufferSlot) -> Option<u32> {
        let (cpp, base) = match slot {
            BufferSlot::Color(i) => (
                *self.key.color_cpp.get(i as usize)?,
                self.layout.color_base[i as usize],
            ),
            BufferSlot::Depth => (self.key.depth_cpp[0], self.layout.depth_base[0]),
            BufferSlot::Stencil => (self.key.depth_cpp[1], self.layout.depth_base[1]),
        };
        (cpp != 0).then_some(base)
    }

    /// Tiles in traversal order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// One entry per device pipe; unused pipes have zero extent.
    pub fn pipes(&self) -> &[Pipe] {
        &self.partition.pipes
    }

    pub fn used_pipes(&self) -> u32 {
        self.partition.used
    }

    /// Bins per pipe as `(x, y)`, the bound callers use to pre-size per-pipe buffers.
    pub fn max_tiles_per_pipe(&self) -> (u32, u32) {
        (
            self.partition.tiles_per_pipe_x,
            self.partition.tiles_per_pipe_y,
        )
    }

    /// Bytes of tile memory the layout occupies.
    pub fn gmem_used(&self) -> u32 {
        self.layout.gmem_used
    }

    /// Packed configuration words for every pipe slot.
    pub fn pipe_config(&self) -> SmallVec<[u32; MAX_PIPES]> {
        self.pipes().iter().map(Pipe::config_word).collect()
    }

    /// Whether the grid can be rendered with a hardware binning pass.
    ///
    /// Binning pays off only with more than two bins, and every pipe has to fit
    /// the packed configuration format.
    pub fn hw_binning_possible(&self) -> bool {
        self.num_bins() > 2 && self.pipes().iter().all(Pipe::fits_config)
    }
}

impl fmt::Display for TileGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = &self.key;
        writeln!(
            f,
            "GMEM: {}x{}+{}+{}, page align {}",
            key.width, key.height, key.min_x, key.min_y, key.page_align
        )?;
        writeln!(f, "\tBuffer\tBase\t\tSize\t\tCPP")?;
        let bin_pixels = self.layout.bin_width * self.layout.bin_height;
        for (slot, cpp) in key.buffers() {
            let base = self.base(slot).unwrap_or_default();
            writeln!(
                f,
                "\t{slot}\t0x{base:08x}\t0x{:08x}\t{cpp}",
                u32::from(cpp) * bin_pixels
            )?;
        }
        writeln!(
            f,
            "\tBins:\t\t{}x{} of {}x{} pixels",
            self.layout.bins_x, self.layout.bins_y, self.layout.bin_width, self.layout.bin_height
        )?;
        writeln!(
            f,
            "\tPipes:\t\t{} used, {}x{} bins each",
            self.partition.used, self.partition.tiles_per_pipe_x, self.partition.tiles_per_pipe_y
        )?;
        for (i, pipe) in self.pipes().iter().enumerate().filter(|(_, p)| !p.is_empty()) {
            writeln!(
                f,
                "\t\tpipe[{i}]: {}x{} at {},{}",
                pipe.width, pipe.height, pipe.x, pipe.y
            )?;
        }
        write!(
            f,
            "\tTotal:\t\t{} bytes ({:.2} KB)",
            self.layout.gmem_used,
            self.layout.gmem_used as f32 / (1 << 10) as f32
        )
    }
}
