// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prints the tile-memory layout for one render-target configuration.

#![allow(clippy::print_stdout, reason = "The dump is the output")]

use anyhow::{bail, Context, Result};
use clap::Parser;
use gmem::{
    CacheOptions, DebugFlags, DeviceCaps, LayoutCache, LayoutKey, PartitionStrategy,
    MAX_COLOR_BUFFERS,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.cbuf.len() > MAX_COLOR_BUFFERS {
        bail!(
            "{} color buffers given, at most {MAX_COLOR_BUFFERS} are supported",
            args.cbuf.len()
        );
    }
    let mut key = LayoutKey::new(args.width, args.height)
        .with_origin(args.min_x, args.min_y)
        .with_page_align(args.page_align);
    for &cpp in &args.cbuf {
        key = key.with_color(cpp);
    }
    key = key.with_depth_stencil(args.zsbuf, args.stencil);

    let caps = args.caps();
    log::debug!("{caps:?}");
    let debug = if args.row_major {
        DebugFlags::NO_SERPENTINE
    } else {
        DebugFlags::none()
    };
    let cache = LayoutCache::new(
        caps,
        CacheOptions {
            capacity: 1,
            debug,
        },
    );
    let grid = cache
        .get_or_create(&key)
        .with_context(|| format!("Couldn't lay out {}x{}", args.width, args.height))?;

    println!("{grid}");
    if args.tiles {
        println!("\tTiles:");
        for (i, tile) in grid.tiles().iter().enumerate() {
            println!(
                "\t\ttile[{i}]: {}x{} at {},{} (bin {},{}), pipe {} slot {}",
                tile.width, tile.height, tile.x, tile.y, tile.col, tile.row, tile.pipe, tile.slot
            );
        }
    }
    if args.pipe_config {
        println!("\tPipe config:");
        for (i, word) in grid.pipe_config().iter().enumerate().take(grid.used_pipes() as usize) {
            println!("\t\tpipe[{i}]: 0x{word:08x}");
        }
        println!("\tHardware binning: {}", grid.hw_binning_possible());
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Render area width in pixels
    #[arg(long, default_value_t = 1920)]
    width: u16,
    /// Render area height in pixels
    #[arg(long, default_value_t = 1080)]
    height: u16,
    /// Left edge of the render area
    #[arg(long, default_value_t = 0)]
    min_x: u16,
    /// Top edge of the render area
    #[arg(long, default_value_t = 0)]
    min_y: u16,
    /// Bytes per pixel of each color buffer, multiplied by its sample count
    #[arg(long, value_delimiter = ',', default_value = "4")]
    cbuf: Vec<u8>,
    /// Bytes per pixel of the depth buffer
    #[arg(long, default_value_t = 0)]
    zsbuf: u8,
    /// Bytes per pixel of a separate stencil buffer
    #[arg(long, default_value_t = 0)]
    stencil: u8,
    /// Base-offset alignment in page units
    #[arg(long, default_value_t = 1)]
    page_align: u8,
    /// Tile memory size in bytes
    #[arg(long, default_value_t = 1 << 20)]
    gmem_bytes: u32,
    /// Largest bin width and height in pixels
    #[arg(long, default_value_t = 1024)]
    max_tile: u32,
    /// Bin width alignment in pixels
    #[arg(long, default_value_t = 32)]
    align_w: u32,
    /// Bin height alignment in pixels
    #[arg(long, default_value_t = 16)]
    align_h: u32,
    /// Number of hardware pipes
    #[arg(long, default_value_t = 32)]
    pipes: u32,
    /// Page unit in bytes
    #[arg(long, default_value_t = 0x1000)]
    page_unit: u32,
    /// Use a fixed per-pipe partition, given as WIDTHxHEIGHT bins
    #[arg(long, value_parser = parse_grid)]
    fixed_grid: Option<(u32, u32)>,
    /// Visit tiles in row-major order
    #[arg(long)]
    row_major: bool,
    /// List every tile
    #[arg(long)]
    tiles: bool,
    /// Print the packed pipe configuration words
    #[arg(long)]
    pipe_config: bool,
}

impl Args {
    fn caps(&self) -> DeviceCaps {
        DeviceCaps {
            max_tile_width: self.max_tile,
            max_tile_height: self.max_tile,
            gmem_bytes: self.gmem_bytes,
            tile_align_w: self.align_w,
            tile_align_h: self.align_h,
            max_pipes: self.pipes,
            page_unit_bytes: self.page_unit,
            partition: match self.fixed_grid {
                Some((width, height)) => PartitionStrategy::FixedGrid { width, height },
                None => PartitionStrategy::Adaptive,
            },
            ..DeviceCaps::default()
        }
    }
}

fn parse_grid(arg: &str) -> Result<(u32, u32)> {
    let (width, height) = arg
        .split_once('x')
        .context("Expected WIDTHxHEIGHT, e.g. 6x6")?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}
