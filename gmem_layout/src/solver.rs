// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bin-count search.
//!
//! The search finds the smallest bin grid whose bins fit both the device's tile
//! size limits and its tile memory. It first satisfies the size limits alone,
//! then grows the grid while keeping bins close to square until all buffers fit,
//! and finally tries trading one column for one row (or the reverse) if that
//! lowers the total bin count.

use crate::math::{align_npot, div_align};
use crate::{DeviceCaps, LayoutError, LayoutKey, MAX_COLOR_BUFFERS};

/// Bin size, grid size and tile-memory offsets for one bin count.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BinLayout {
    pub bin_width: u32,
    pub bin_height: u32,
    /// Columns actually needed to cover the area with bins of `bin_width`.
    pub bins_x: u32,
    /// Rows actually needed to cover the area with bins of `bin_height`.
    pub bins_y: u32,
    /// Tile-memory offset of each color attachment. Zero for absent ones.
    pub color_base: [u32; MAX_COLOR_BUFFERS],
    /// Tile-memory offset of the depth plane and separate stencil plane.
    pub depth_base: [u32; 2],
    /// End offset of the last buffer.
    pub gmem_used: u32,
}

/// Lays out `key` with the requested bin counts.
///
/// Returns `None` when the counts are zero, the caps are invalid, a bin would exceed
/// the maximum tile size, or the buffers don't fit in tile memory. Because bin sizes are aligned,
/// the returned grid may use fewer bins than requested.
pub fn try_layout(
    key: &LayoutKey,
    caps: &DeviceCaps,
    nbins_x: u32,
    nbins_y: u32,
) -> Option<BinLayout> {
    if nbins_x == 0 || nbins_y == 0 {
        return None;
    }
    caps.validate().ok()?;
    let width = u32::from(key.width);
    let height = u32::from(key.height);
    let bin_width = div_align(width, nbins_x, caps.tile_align_w);
    let bin_height = div_align(height, nbins_y, caps.tile_align_h);
    if bin_width > caps.max_tile_width || bin_height > caps.max_tile_height {
        return None;
    }

    // A page past `u32::MAX` can't hold a second buffer.
    let page = u32::from(key.page_align)
        .checked_mul(caps.page_unit_bytes)
        .unwrap_or(u32::MAX);
    let bin_pixels = u64::from(bin_width) * u64::from(bin_height);
    let mut layout = BinLayout {
        bin_width,
        bin_height,
        bins_x: width.div_ceil(bin_width),
        bins_y: height.div_ceil(bin_height),
        ..BinLayout::default()
    };
    let mut total: u64 = 0;
    for (i, &cpp) in key.color_cpp.iter().enumerate() {
        if cpp != 0 {
            let base = place(total, page)?;
            layout.color_base[i] = base;
            total = u64::from(base) + u64::from(cpp) * bin_pixels;
        }
    }
    for (i, &cpp) in key.depth_cpp.iter().enumerate() {
        if cpp != 0 {
            let base = place(total, page)?;
            layout.depth_base[i] = base;
            total = u64::from(base) + u64::from(cpp) * bin_pixels;
        }
    }

    if total > u64::from(caps.gmem_bytes) {
        return None;
    }
    layout.gmem_used = total as u32;
    Some(layout)
}

/// Aligns a running offset; offsets past `u32::MAX` can never fit.
fn place(total: u64, page: u32) -> Option<u32> {
    let total = u32::try_from(total).ok()?;
    if page <= 1 {
        return Some(total);
    }
    total.checked_add(page - 1).map(|_| align_npot(total, page))
}

/// Finds the bin counts for `key` and lays it out.
pub fn solve(key: &LayoutKey, caps: &DeviceCaps) -> Result<BinLayout, LayoutError> {
    caps.validate()?;
    key.validate()?;
    let width = u32::from(key.width);
    let height = u32::from(key.height);
    let infeasible = || LayoutError::InfeasibleLayout {
        width: key.width,
        height: key.height,
        bytes_per_pixel: key.bytes_per_pixel(),
        gmem_bytes: caps.gmem_bytes,
    };

    // Past these counts every bin already has the minimum aligned size.
    let max_x = width.div_ceil(caps.tile_align_w);
    let max_y = height.div_ceil(caps.tile_align_h);

    let mut nbins_x = 1;
    let mut nbins_y = 1;
    while div_align(width, nbins_x, caps.tile_align_w) > caps.max_tile_width {
        if nbins_x >= max_x {
            return Err(infeasible());
        }
        nbins_x += 1;
    }
    while div_align(height, nbins_y, caps.tile_align_h) > caps.max_tile_height {
        if nbins_y >= max_y {
            return Err(infeasible());
        }
        nbins_y += 1;
    }

    while try_layout(key, caps, nbins_x, nbins_y).is_none() {
        let x_open = nbins_x < max_x;
        let y_open = nbins_y < max_y;
        if (nbins_y > nbins_x || !y_open) && x_open {
            nbins_x += 1;
        } else if y_open {
            nbins_y += 1;
        } else {
            return Err(infeasible());
        }
        log::trace!("gmem: retrying with {nbins_x}x{nbins_y} bins");
    }

    let count = u64::from(nbins_x) * u64::from(nbins_y);
    let fewer = |x: u32, y: u32| u64::from(x) * u64::from(y) < count;
    if fewer(nbins_x - 1, nbins_y + 1) && try_layout(key, caps, nbins_x - 1, nbins_y + 1).is_some()
    {
        nbins_x -= 1;
        nbins_y += 1;
    } else if nbins_y > 1
        && fewer(nbins_x + 1, nbins_y - 1)
        && try_layout(key, caps, nbins_x + 1, nbins_y - 1).is_some()
    {
        nbins_x += 1;
        nbins_y -= 1;
    }

    try_layout(key, caps, nbins_x, nbins_y).ok_or_else(infeasible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InvalidKeyReason;

    fn caps_128k() -> DeviceCaps {
        DeviceCaps {
            max_tile_width: 512,
            max_tile_height: 512,
            gmem_bytes: 128 * 1024,
            tile_align_w: 32,
            tile_align_h: 32,
            page_unit_bytes: 4096,
            ..DeviceCaps::default()
        }
    }

    #[test]
    fn full_hd_single_color() {
        let key = LayoutKey::new(1920, 1080).with_color(4);
        let layout = solve(&key, &caps_128k()).unwrap();
        assert_eq!((layout.bin_width, layout.bin_height), (256, 128));
        assert_eq!((layout.bins_x, layout.bins_y), (8, 9));
        assert_eq!(layout.color_base[0], 0);
        assert_eq!(layout.gmem_used, 128 * 1024);
    }

    #[test]
    fn small_target_uses_one_bin() {
        let caps = DeviceCaps {
            gmem_bytes: 1 << 20,
            ..caps_128k()
        };
        let key = LayoutKey::new(256, 256).with_color(4);
        let layout = solve(&key, &caps).unwrap();
        assert_eq!((layout.bins_x, layout.bins_y), (1, 1));
        assert_eq!((layout.bin_width, layout.bin_height), (256, 256));
    }

    #[test]
    fn offsets_are_page_aligned() {
        let caps = DeviceCaps {
            max_tile_width: 1024,
            max_tile_height: 1024,
            gmem_bytes: 1 << 20,
            tile_align_w: 32,
            tile_align_h: 32,
            ..DeviceCaps::default()
        };
        let key = LayoutKey::new(1920, 1080)
            .with_color(4)
            .with_color(4)
            .with_page_align(4);
        let layout = solve(&key, &caps).unwrap();
        assert_eq!((layout.bin_width, layout.bin_height), (640, 192));
        assert_eq!((layout.bins_x, layout.bins_y), (3, 6));
        assert_eq!(layout.color_base[1], 491_520);
        assert_eq!(layout.color_base[1] % (4 * 4096), 0);
        assert_eq!(layout.gmem_used, 983_040);
    }

    #[test]
    fn odd_page_alignment() {
        let caps = DeviceCaps {
            gmem_bytes: 1 << 20,
            ..caps_128k()
        };
        let key = LayoutKey::new(40, 40)
            .with_color(1)
            .with_depth_stencil(4, 1)
            .with_page_align(3);
        let layout = solve(&key, &caps).unwrap();
        let page = 3 * 4096;
        // 64x64 bins: color ends at 4096, depth at page + 16384.
        assert_eq!(layout.depth_base[0], page);
        assert_eq!(layout.depth_base[1], 3 * page);
        assert_eq!(layout.gmem_used, 3 * page + 4096);
    }

    #[test]
    fn neighbour_step_reduces_bin_count() {
        // The square-ish growth stops at 2x2; trading a column for a row gives 1x3.
        let caps = DeviceCaps {
            max_tile_width: 1024,
            max_tile_height: 1024,
            gmem_bytes: 64 * 32 * 4,
            tile_align_w: 16,
            tile_align_h: 16,
            ..DeviceCaps::default()
        };
        let key = LayoutKey::new(64, 96).with_color(4);
        let layout = solve(&key, &caps).unwrap();
        assert_eq!((layout.bins_x, layout.bins_y), (1, 3));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let key = LayoutKey::new(64, 64).with_color(4);
        assert!(try_layout(&key, &caps_128k(), 0, 1).is_none());
        assert!(try_layout(&key, &caps_128k(), 1, 0).is_none());
    }

    #[test]
    fn infeasible_budget() {
        let caps = DeviceCaps {
            gmem_bytes: 1024,
            ..caps_128k()
        };
        let key = LayoutKey::new(1920, 1080).with_color(4);
        assert!(matches!(
            solve(&key, &caps),
            Err(LayoutError::InfeasibleLayout {
                width: 1920,
                height: 1080,
                ..
            })
        ));
    }

    #[test]
    fn invalid_caps_are_reported() {
        let key = LayoutKey::new(64, 64).with_color(4);
        for caps in [
            DeviceCaps {
                tile_align_w: 0,
                ..caps_128k()
            },
            DeviceCaps {
                tile_align_w: 24,
                ..caps_128k()
            },
        ] {
            assert_eq!(
                solve(&key, &caps),
                Err(LayoutError::InvalidCaps(
                    crate::InvalidCapsReason::TileAlignment
                ))
            );
            assert!(try_layout(&key, &caps, 1, 1).is_none());
        }
    }

    #[test]
    fn huge_page_unit_does_not_overflow() {
        let caps = DeviceCaps {
            page_unit_bytes: 1 << 30,
            ..caps_128k()
        };
        let single = LayoutKey::new(64, 64).with_color(4).with_page_align(8);
        assert_eq!(solve(&single, &caps).unwrap().color_base[0], 0);

        let two = single.with_color(4);
        assert!(matches!(
            solve(&two, &caps),
            Err(LayoutError::InfeasibleLayout { .. })
        ));
    }

    #[test]
    fn invalid_key_is_reported() {
        let key = LayoutKey::new(1920, 1080);
        assert!(matches!(
            solve(&key, &caps_128k()),
            Err(LayoutError::InvalidKey(InvalidKeyReason::NoBuffers))
        ));
    }
}
