// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt::Debug;

/// Bitflags for debug overrides of the render path.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct DebugFlags(u8);

impl Debug for DebugFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tuple = f.debug_tuple("DebugFlags");
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                tuple.field(&name);
            }
        }
        tuple.finish()
    }
}

impl DebugFlags {
    /// Render every frame without tiling.
    pub const FORCE_BYPASS: Self = Self(1 << 0);

    /// Ignore the bypass advisor.
    ///
    /// Frames that can't be tiled at all still take the bypass path.
    pub const FORCE_TILED: Self = Self(1 << 1);

    /// Visit tiles in row-major order instead of serpentine order.
    pub const NO_SERPENTINE: Self = Self(1 << 2);

    /// Log every newly created layout at info level.
    pub const DUMP_LAYOUTS: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::FORCE_BYPASS, "FORCE_BYPASS"),
        (Self::FORCE_TILED, "FORCE_TILED"),
        (Self::NO_SERPENTINE, "NO_SERPENTINE"),
        (Self::DUMP_LAYOUTS, "DUMP_LAYOUTS"),
    ];

    pub const fn none() -> Self {
        Self(0)
    }

    /// Whether every flag of `mask` is set.
    pub const fn contains(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }
}

impl std::ops::BitOr for DebugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
