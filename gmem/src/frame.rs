// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame render-target state and the layout key derived from it.

use std::fmt;

use gmem_layout::math::align_down;
use gmem_layout::{DeviceCaps, LayoutKey, PageAlignPolicy, MAX_COLOR_BUFFERS};
use smallvec::SmallVec;

/// A set of render-target buffers: up to eight colors plus depth and stencil.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct BufferMask(u16);

impl fmt::Debug for BufferMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for i in 0..MAX_COLOR_BUFFERS as u8 {
            if self.contains(Self::color(i)) {
                set.entry(&format_args!("COLOR{i}"));
            }
        }
        if self.contains(Self::DEPTH) {
            set.entry(&format_args!("DEPTH"));
        }
        if self.contains(Self::STENCIL) {
            set.entry(&format_args!("STENCIL"));
        }
        set.finish()
    }
}

impl BufferMask {
    pub const DEPTH: Self = Self(1 << MAX_COLOR_BUFFERS);
    pub const STENCIL: Self = Self(1 << (MAX_COLOR_BUFFERS + 1));
    /// Depth and stencil together.
    pub const DEPTH_STENCIL: Self = Self(Self::DEPTH.0 | Self::STENCIL.0);

    /// The color attachment at `index`; empty for indices past the last slot.
    pub const fn color(index: u8) -> Self {
        if (index as usize) < MAX_COLOR_BUFFERS {
            Self(1 << index)
        } else {
            Self(0)
        }
    }

    pub const fn none() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Determine whether `self` is a superset of `mask`.
    pub const fn contains(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Whether `self` and `mask` share any buffer.
    pub const fn intersects(self, mask: Self) -> bool {
        self.0 & mask.0 != 0
    }

    pub fn insert(&mut self, mask: Self) {
        self.0 |= mask.0;
    }
}

impl std::ops::BitOr for BufferMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BufferMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Inclusive bounds of the union of all scissors used by a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Scissor {
    pub min_x: u16,
    pub min_y: u16,
    pub max_x: u16,
    pub max_y: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorAttachment {
    pub bytes_per_pixel: u8,
    pub samples: u8,
    /// Active array layers.
    pub layers: u16,
}

impl ColorAttachment {
    /// A single-sampled, single-layer attachment.
    pub fn new(bytes_per_pixel: u8) -> Self {
        Self {
            bytes_per_pixel,
            samples: 1,
            layers: 1,
        }
    }
}

/// Where the stencil values of a depth/stencil attachment live.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum StencilLayout {
    /// The format has no stencil.
    #[default]
    Absent,
    /// Stencil is interleaved with depth; both planes are one buffer.
    Combined,
    /// Stencil is a separate plane with the given bytes per pixel.
    Separate(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DepthStencilAttachment {
    /// Bytes per pixel of the depth plane, including combined stencil.
    pub depth_bytes: u8,
    pub stencil: StencilLayout,
    pub samples: u8,
    pub layers: u16,
}

impl DepthStencilAttachment {
    pub fn new(depth_bytes: u8, stencil: StencilLayout) -> Self {
        Self {
            depth_bytes,
            stencil,
            samples: 1,
            layers: 1,
        }
    }

    fn has_stencil(&self) -> bool {
        self.stencil != StencilLayout::Absent
    }
}

/// What a frame renders to and how.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameDesc {
    /// Render-target width in pixels.
    pub width: u16,
    /// Render-target height in pixels.
    pub height: u16,
    /// Union of the frame's scissors, if tracked.
    pub scissor: Option<Scissor>,
    /// Bound color attachments by slot. Only the first eight slots are used.
    pub colors: SmallVec<[Option<ColorAttachment>; MAX_COLOR_BUFFERS]>,
    pub depth_stencil: Option<DepthStencilAttachment>,
    pub depth_enabled: bool,
    pub stencil_enabled: bool,
    /// Buffers cleared at the start of the frame.
    pub cleared: BufferMask,
    pub draw_count: u32,
    /// Whether any draw runs a tessellation stage.
    pub has_tessellation: bool,
}

impl FrameDesc {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, attachment: ColorAttachment) -> Self {
        self.colors.push(Some(attachment));
        self
    }

    pub fn with_depth_stencil(mut self, attachment: DepthStencilAttachment) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    /// Whether the frame neither clears nor draws anything.
    pub fn is_flush(&self) -> bool {
        self.cleared.is_empty() && self.draw_count == 0
    }

    /// Whether any attachment renders to more than one layer.
    pub fn is_layered(&self) -> bool {
        self.colors.iter().flatten().any(|c| c.layers > 1)
            || self.depth_stencil.is_some_and(|ds| ds.layers > 1)
    }

    pub fn has_attachments(&self) -> bool {
        self.colors.iter().any(Option::is_some) || self.depth_stencil.is_some()
    }

    /// Depth/stencil takes part in the layout only when the frame uses or clears it.
    fn depth_stencil_used(&self) -> Option<&DepthStencilAttachment> {
        let ds = self.depth_stencil.as_ref()?;
        let used = self.depth_enabled
            || (self.stencil_enabled && ds.has_stencil())
            || self.cleared.intersects(BufferMask::DEPTH_STENCIL);
        used.then_some(ds)
    }

    /// Builds the layout key for this frame.
    ///
    /// The key covers the scissor union when the device supports it, with the origin
    /// rounded down to the bin origin granularity. A frame whose scissor misses the
    /// render target gives a key with an empty area.
    pub fn layout_key(&self, caps: &DeviceCaps) -> LayoutKey {
        let (min_x, min_y, width, height) = self.render_area(caps);

        let page_align = match caps.page_align {
            PageAlignPolicy::Native => 1,
            PageAlignPolicy::Fixed(units) => units,
            PageAlignPolicy::LargerOnClear { base, cleared } => {
                if self.cleared.is_empty() {
                    base
                } else {
                    cleared
                }
            }
        };

        let mut key = LayoutKey::new(width, height)
            .with_origin(min_x, min_y)
            .with_page_align(page_align);
        for color in self.colors.iter().take(MAX_COLOR_BUFFERS) {
            let cpp = color.map_or(0, |c| c.bytes_per_pixel.saturating_mul(c.samples.max(1)));
            key = key.with_color(cpp);
        }
        if let Some(ds) = self.depth_stencil_used() {
            let samples = ds.samples.max(1);
            let stencil = match ds.stencil {
                StencilLayout::Separate(cpp) => cpp.saturating_mul(samples),
                StencilLayout::Absent | StencilLayout::Combined => 0,
            };
            key = key.with_depth_stencil(ds.depth_bytes.saturating_mul(samples), stencil);
        }
        key
    }

    fn render_area(&self, caps: &DeviceCaps) -> (u16, u16, u16, u16) {
        let full = (0, 0, self.width, self.height);
        let scissor = match self.scissor {
            Some(scissor) if caps.precise_scissor && !caps.whole_buffer_binning => scissor,
            _ => return full,
        };
        if self.width == 0 || self.height == 0 {
            return full;
        }
        let align = caps.bin_origin_align.max(1);
        let clamp = |min: u16, max: u16, size: u16| {
            let max = u32::from(max).min(u32::from(size) - 1);
            if u32::from(min) > max {
                return (0, 0);
            }
            let start = align_down(u32::from(min), align);
            (start as u16, (max + 1 - start) as u16)
        };
        let (min_x, width) = clamp(scissor.min_x, scissor.max_x, self.width);
        let (min_y, height) = clamp(scissor.min_y, scissor.max_y, self.height);
        (min_x, min_y, width, height)
    }

    /// Buffers whose previous contents must be loaded into each tile.
    ///
    /// Every bound buffer that isn't cleared is restored. Clearing only one plane of a
    /// combined depth/stencil buffer still restores the whole buffer, since the other
    /// plane's contents must survive.
    pub fn restore_mask(&self) -> BufferMask {
        let mut mask = BufferMask::none();
        for (i, color) in self.colors.iter().take(MAX_COLOR_BUFFERS).enumerate() {
            let bit = BufferMask::color(i as u8);
            if color.is_some() && !self.cleared.contains(bit) {
                mask |= bit;
            }
        }

        let Some(ds) = self.depth_stencil_used() else {
            return mask;
        };
        let depth_cleared = self.cleared.contains(BufferMask::DEPTH);
        let stencil_cleared = self.cleared.contains(BufferMask::STENCIL);
        match ds.stencil {
            StencilLayout::Absent => {
                if !depth_cleared {
                    mask |= BufferMask::DEPTH;
                }
            }
            StencilLayout::Combined => {
                if depth_cleared != stencil_cleared {
                    log::warn!(
                        "gmem: partial clear of a combined depth/stencil buffer, restoring both planes"
                    );
                    mask |= BufferMask::DEPTH_STENCIL;
                } else if !depth_cleared {
                    mask |= BufferMask::DEPTH_STENCIL;
                }
            }
            StencilLayout::Separate(_) => {
                if !depth_cleared {
                    mask |= BufferMask::DEPTH;
                }
                if !stencil_cleared {
                    mask |= BufferMask::STENCIL;
                }
            }
        }
        mask
    }
}
