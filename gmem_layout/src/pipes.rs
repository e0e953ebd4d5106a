// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipe partitioning and tile assignment.
//!
//! Pipes are rectangles of bins; every bin belongs to exactly one pipe. Tiles are
//! numbered within their pipe, and the numbering is computed in row-major order
//! before any traversal reordering so that it stays stable.

use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;

use crate::{BinLayout, DeviceCaps, LayoutKey, PartitionStrategy, MAX_PIPES};

/// Bit widths of the fields of a packed pipe configuration word.
const PIPE_X_BITS: u32 = 10;
const PIPE_Y_BITS: u32 = 10;
const PIPE_W_BITS: u32 = 6;
const PIPE_H_BITS: u32 = 6;

/// A rectangle of bins assigned to one hardware pipe.
///
/// Pipes with zero extent are unused.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Pipe {
    /// First bin column.
    pub x: u32,
    /// First bin row.
    pub y: u32,
    /// Bins along x.
    pub width: u32,
    /// Bins along y.
    pub height: u32,
}

impl Pipe {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether every field fits in the packed configuration word.
    pub fn fits_config(&self) -> bool {
        self.x < 1 << PIPE_X_BITS
            && self.y < 1 << PIPE_Y_BITS
            && self.width < 1 << PIPE_W_BITS
            && self.height < 1 << PIPE_H_BITS
    }

    /// Packs the pipe as `x | y << 10 | w << 20 | h << 26`.
    ///
    /// Fields are truncated to their bit widths; check [`Pipe::fits_config`] first.
    pub fn config_word(&self) -> u32 {
        let field = |v: u32, bits: u32| v & ((1 << bits) - 1);
        field(self.x, PIPE_X_BITS)
            | field(self.y, PIPE_Y_BITS) << PIPE_X_BITS
            | field(self.width, PIPE_W_BITS) << (PIPE_X_BITS + PIPE_Y_BITS)
            | field(self.height, PIPE_H_BITS) << (PIPE_X_BITS + PIPE_Y_BITS + PIPE_W_BITS)
    }
}

/// The split of a bin grid between pipes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipePartition {
    /// Bins per pipe along x.
    pub tiles_per_pipe_x: u32,
    /// Bins per pipe along y.
    pub tiles_per_pipe_y: u32,
    /// One entry per device pipe; trailing entries may be empty.
    pub pipes: SmallVec<[Pipe; MAX_PIPES]>,
    /// Number of non-empty pipes, at least one.
    pub used: u32,
}

impl PipePartition {
    /// Computes the partition of a `bins_x` x `bins_y` grid for `caps`.
    pub fn new(bins_x: u32, bins_y: u32, caps: &DeviceCaps) -> Self {
        let npipes = caps.pipe_count();
        let (mut tpp_x, mut tpp_y) = match caps.partition {
            PartitionStrategy::Adaptive => (1, 1),
            PartitionStrategy::FixedGrid { width, height } => (width.max(1), height.max(1)),
        };
        let step = caps.pipe_height_step.max(1);
        while bins_y.div_ceil(tpp_y) > npipes {
            tpp_y += step;
        }
        while bins_y.div_ceil(tpp_y) * bins_x.div_ceil(tpp_x) > npipes {
            tpp_x += 1;
        }
        log::trace!("gmem: {bins_x}x{bins_y} bins, {tpp_x}x{tpp_y} bins per pipe");

        let mut pipes = SmallVec::new();
        let (mut xoff, mut yoff) = (0, 0);
        for _ in 0..npipes {
            if xoff >= bins_x {
                xoff = 0;
                yoff += tpp_y;
            }
            if yoff >= bins_y {
                break;
            }
            pipes.push(Pipe {
                x: xoff,
                y: yoff,
                width: tpp_x.min(bins_x - xoff),
                height: tpp_y.min(bins_y - yoff),
            });
            xoff += tpp_x;
        }
        let used = (pipes.len() as u32).max(1);
        pipes.resize(npipes as usize, Pipe::default());

        Self {
            tiles_per_pipe_x: tpp_x,
            tiles_per_pipe_y: tpp_y,
            pipes,
            used,
        }
    }

    /// Pipes needed along x.
    pub fn pipes_x(&self, bins_x: u32) -> u32 {
        bins_x.div_ceil(self.tiles_per_pipe_x)
    }

    /// Index of the pipe owning the bin at (`col`, `row`).
    pub fn pipe_of(&self, bins_x: u32, col: u32, row: u32) -> u32 {
        (row / self.tiles_per_pipe_y) * self.pipes_x(bins_x) + col / self.tiles_per_pipe_x
    }
}

/// One bin, as the renderer visits it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Tile {
    /// Owning pipe.
    pub pipe: u32,
    /// Hardware slot of the tile within its pipe.
    pub slot: u32,
    /// Width in pixels, clipped to the render area.
    pub width: u32,
    /// Height in pixels, clipped to the render area.
    pub height: u32,
    /// Left edge in render-target pixels.
    pub x: u32,
    /// Top edge in render-target pixels.
    pub y: u32,
    /// Bin column.
    pub col: u32,
    /// Bin row.
    pub row: u32,
}

/// Order in which tiles are handed to the renderer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TileOrder {
    /// Odd rows run right to left, so consecutive tiles stay adjacent.
    #[default]
    Serpentine,
    /// Every row runs left to right.
    RowMajor,
}

/// Builds the tile list for a solved layout.
///
/// `tiles` is cleared first. Bins that fall outside the key's area get no tile.
pub(crate) fn assign_tiles(
    key: &LayoutKey,
    layout: &BinLayout,
    partition: &PipePartition,
    strategy: PartitionStrategy,
    order: TileOrder,
    tiles: &mut Vec<Tile>,
) {
    tiles.clear();
    if layout.bin_width == 0 || layout.bin_height == 0 {
        return;
    }
    let cols = layout
        .bins_x
        .min(u32::from(key.width).div_ceil(layout.bin_width));
    let rows = layout
        .bins_y
        .min(u32::from(key.height).div_ceil(layout.bin_height));
    if cols == 0 || rows == 0 {
        return;
    }
    let mut next_slot = [0_u32; MAX_PIPES];
    let area_right = u32::from(key.min_x) + u32::from(key.width);
    let area_bottom = u32::from(key.min_y) + u32::from(key.height);

    let mut y = u32::from(key.min_y);
    for row in 0..rows {
        let height = layout.bin_height.min(area_bottom - y);
        let mut x = u32::from(key.min_x);
        for col in 0..cols {
            let width = layout.bin_width.min(area_right - x);
            let pipe = partition.pipe_of(layout.bins_x, col, row);
            let slot = match strategy {
                PartitionStrategy::Adaptive => {
                    let counter = &mut next_slot[pipe as usize];
                    let slot = *counter;
                    *counter += 1;
                    slot
                }
                PartitionStrategy::FixedGrid { .. } => {
                    (row % partition.tiles_per_pipe_y + 1) << 3
                        | (col % partition.tiles_per_pipe_x + 1)
                }
            };
            tiles.push(Tile {
                pipe,
                slot,
                width,
                height,
                x,
                y,
                col,
                row,
            });
            x += width;
        }
        y += height;
    }

    if order == TileOrder::Serpentine {
        for row in tiles
            .chunks_exact_mut(cols as usize)
            .skip(1)
            .step_by(2)
        {
            row.reverse();
        }
    }
}
