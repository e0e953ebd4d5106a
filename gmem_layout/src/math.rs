// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer helpers shared by the solver and the partitioner.

/// Rounds `len` up to a multiple of `alignment`, which must be a power of two.
pub const fn align_up(len: u32, alignment: u32) -> u32 {
    len + (len.wrapping_neg() & (alignment - 1))
}

/// Rounds `len` up to a multiple of `alignment`, which may be any non-zero value.
pub const fn align_npot(len: u32, alignment: u32) -> u32 {
    len.div_ceil(alignment) * alignment
}

/// Rounds `len` down to a multiple of `alignment`, which may be any non-zero value.
pub const fn align_down(len: u32, alignment: u32) -> u32 {
    len - len % alignment
}

/// Splits `len` into `count` parts and aligns the size of one part up to `alignment`.
pub(crate) const fn div_align(len: u32, count: u32, alignment: u32) -> u32 {
    align_up(len.div_ceil(count), alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_alignment() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 32), 64);
    }

    #[test]
    fn arbitrary_alignment() {
        assert_eq!(align_npot(0, 3 * 4096), 0);
        assert_eq!(align_npot(1, 3 * 4096), 3 * 4096);
        assert_eq!(align_npot(3 * 4096 + 1, 3 * 4096), 6 * 4096);
        assert_eq!(align_down(95, 32), 64);
    }

    #[test]
    fn split_then_align() {
        // 1920 / 7 = 274.3, aligned to 32
        assert_eq!(div_align(1920, 7, 32), 288);
        assert_eq!(div_align(1080, 9, 32), 128);
        assert_eq!(div_align(100, 1000, 16), 16);
    }
}
