// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::{InvalidKeyReason, LayoutError};

/// Maximum number of color attachments a key can describe.
pub const MAX_COLOR_BUFFERS: usize = 8;

/// Identifies one render-target configuration.
///
/// Keys are plain bytes: two keys are equal exactly when their byte
/// representations are, and hashing feeds those bytes to the hasher.
#[derive(Copy, Clone, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct LayoutKey {
    /// Left edge of the binned area, already aligned to the device's bin origin granularity.
    pub min_x: u16,
    /// Top edge of the binned area.
    pub min_y: u16,
    pub width: u16,
    pub height: u16,
    /// Base-offset alignment of every buffer, in page units.
    pub page_align: u8,
    pub color_count: u8,
    /// Bytes per pixel of each color attachment, multiplied by the sample count. Zero when unused.
    pub color_cpp: [u8; MAX_COLOR_BUFFERS],
    /// Bytes per pixel of the depth plane and of a separate stencil plane. Zero when absent.
    pub depth_cpp: [u8; 2],
}

// Hashing and equality go through the raw bytes, so there must be no padding.
const_assert_eq!(size_of::<LayoutKey>(), 20);

impl PartialEq for LayoutKey {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for LayoutKey {}

impl Hash for LayoutKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(bytemuck::bytes_of(self));
    }
}

impl LayoutKey {
    /// A key covering `width` x `height` pixels from the origin, with no buffers.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            page_align: 1,
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, min_x: u16, min_y: u16) -> Self {
        self.min_x = min_x;
        self.min_y = min_y;
        self
    }

    pub fn with_page_align(mut self, page_align: u8) -> Self {
        self.page_align = page_align;
        self
    }

    /// Appends a color attachment in the next free slot.
    ///
    /// Attachments past [`MAX_COLOR_BUFFERS`] are ignored; a key can't describe them.
    pub fn with_color(mut self, cpp: u8) -> Self {
        let slot = self.color_count as usize;
        if slot < MAX_COLOR_BUFFERS {
            self.color_cpp[slot] = cpp;
            self.color_count += 1;
        }
        self
    }

    pub fn with_depth_stencil(mut self, depth_cpp: u8, separate_stencil_cpp: u8) -> Self {
        self.depth_cpp = [depth_cpp, separate_stencil_cpp];
        self
    }

    /// Checks that a layout can be built from this key.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let reason = if self.width == 0 || self.height == 0 {
            InvalidKeyReason::EmptyArea
        } else if self.color_count as usize > MAX_COLOR_BUFFERS
            || self.color_cpp[self.color_count as usize..]
                .iter()
                .any(|&cpp| cpp != 0)
        {
            InvalidKeyReason::ColorCountMismatch
        } else if !self.has_buffers() {
            InvalidKeyReason::NoBuffers
        } else if self.page_align == 0 {
            InvalidKeyReason::ZeroPageAlign
        } else {
            return Ok(());
        };
        Err(LayoutError::InvalidKey(reason))
    }

    /// Whether any buffer occupies tile memory.
    pub fn has_buffers(&self) -> bool {
        self.buffers().next().is_some()
    }

    /// Present buffers with their bytes per pixel, in tile-memory order:
    /// color attachments first, then depth, then separate stencil.
    pub fn buffers(&self) -> impl Iterator<Item = (BufferSlot, u8)> + '_ {
        let colors = self
            .color_cpp
            .iter()
            .enumerate()
            .map(|(i, &cpp)| (BufferSlot::Color(i as u8), cpp));
        let depth = [
            (BufferSlot::Depth, self.depth_cpp[0]),
            (BufferSlot::Stencil, self.depth_cpp[1]),
        ];
        colors.chain(depth).filter(|&(_, cpp)| cpp != 0)
    }

    /// Sum of the bytes per pixel of all present buffers.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.buffers().map(|(_, cpp)| u32::from(cpp)).sum()
    }
}

/// A buffer position inside tile memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    Color(u8),
    /// Depth plane, or the combined depth/stencil buffer.
    Depth,
    /// Separate stencil plane.
    Stencil,
}

impl fmt::Display for BufferSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color(i) => write!(f, "CBUF{i}"),
            Self::Depth => f.write_str("ZSBUF0"),
            Self::Stencil => f.write_str("ZSBUF1"),
        }
    }
}
