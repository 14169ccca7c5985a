// SPDX-License-Identifier: MIT
//! # Geometry and Fixed-Point Helpers
//!
//! Plain value types shared by every planning stage, plus the integer helpers the
//! scaler hardware expects: alignment rounding and fixed-point ratios.
//!
//! ## Fixed-Point Ratios
//!
//! The scaler programs every stage with a ratio `(src << P) / dst`, where `P` is the
//! fractional precision from the capability table. A ratio of exactly `1 << P` is a
//! 1:1 pass, larger values downscale and smaller values upscale.
//!
//! All arithmetic is done in `u64` so `P` up to 24 never overflows for any
//! realistic image width.

use serde::{Deserialize, Serialize};

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// True when either side is zero.
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Rectangle in pixel coordinates (crop windows, output crops).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Exclusive right edge, saturating at `u32::MAX`.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn size(&self) -> Size {
        Size {
            w: self.w,
            h: self.h,
        }
    }
}

/// Round `v` down to a multiple of `align`. An alignment of 0 or 1 is a no-op.
#[inline]
pub fn align_down(v: u32, align: u32) -> u32 {
    if align <= 1 {
        v
    } else {
        v - v % align
    }
}

/// Round `v` up to a multiple of `align`. An alignment of 0 or 1 is a no-op.
#[inline]
pub fn align_up(v: u32, align: u32) -> u32 {
    if align <= 1 {
        v
    } else {
        v.div_ceil(align) * align
    }
}

#[inline]
pub fn is_aligned(v: u32, align: u32) -> bool {
    align <= 1 || v % align == 0
}

/// Fixed-point ratio `(src << precision) / dst`.
///
/// A zero `dst` yields 0, which the hardware treats as "stage unused"; callers
/// never program an enabled stage with a zero-sized destination. Ratios too large
/// for the register saturate at `u32::MAX`.
#[inline]
pub fn fixed_ratio(src: u32, dst: u32, precision: u32) -> u32 {
    if dst == 0 {
        return 0;
    }
    ((u64::from(src) << precision) / u64::from(dst)).min(u64::from(u32::MAX)) as u32
}

/// `len * num / den`, rounded down.
#[inline]
pub fn scale_len_floor(len: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 0;
    }
    (u64::from(len) * u64::from(num) / u64::from(den)) as u32
}

/// `len * num / den`, rounded up.
#[inline]
pub fn scale_len_ceil(len: u32, num: u32, den: u32) -> u32 {
    if den == 0 {
        return 0;
    }
    (u64::from(len) * u64::from(num)).div_ceil(u64::from(den)) as u32
}

/// Greatest common divisor, used to reduce an aspect fraction.
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_down(1343, 2), 1342);
        assert_eq!(align_up(1343, 2), 1344);
        assert_eq!(align_up(1344, 32), 1344);
        assert_eq!(align_down(17, 0), 17);
        assert!(is_aligned(4032, 16));
        assert!(!is_aligned(4033, 2));
    }

    #[test]
    fn test_rect_right_saturates() {
        assert_eq!(Rect::new(100, 0, 200, 10).right(), 300);
        assert_eq!(Rect::new(u32::MAX - 10, 0, 100, 10).right(), u32::MAX);
    }

    #[test]
    fn test_fixed_ratio() {
        // 1:1 at 20 bit precision
        assert_eq!(fixed_ratio(1920, 1920, 20), 1 << 20);
        // 2x downscale
        assert_eq!(fixed_ratio(4032, 2016, 20), 2 << 20);
        // 2x upscale
        assert_eq!(fixed_ratio(960, 1920, 20), 1 << 19);
        assert_eq!(fixed_ratio(960, 0, 20), 0);
    }

    #[test]
    fn test_scale_len_rounding() {
        assert_eq!(scale_len_floor(1343, 2016, 4032), 671);
        assert_eq!(scale_len_ceil(1343, 2016, 4032), 672);
        assert_eq!(scale_len_ceil(1344, 2016, 4032), 672);
        assert_eq!(gcd(4032, 3024), 1008);
    }
}
