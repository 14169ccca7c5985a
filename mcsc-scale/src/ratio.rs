// SPDX-License-Identifier: MIT
//! # Two-Stage Ratio Planner
//!
//! Decides, for one output channel, how the end-to-end scale from the crop window to the
//! requested size is split between the poly stage (wide range, coarser quality) and the
//! post stage (narrow range, higher quality, limited input width).
//!
//! ## Band Selection
//!
//! Each axis is classified independently:
//!
//! 1. **Poly only**: `src <= dst * ratio_up` and `dst <= src * ratio_up`.
//! 2. **Quality down**: `src <= dst * quality_ratio_down * post_ratio_down`; poly targets
//!    `round_up(src / quality_ratio_down, Aw)` and post finishes.
//! 3. **Coarse down**: `src <= dst * max_ratio_down * post_ratio_down`; poly targets
//!    `dst * post_ratio_down` and post finishes.
//! 4. **Unsupported**: poly targets `round_up(src / max_ratio_down, Aw)`, post is still
//!    engaged and the result is flagged. Output quality is not guaranteed.
//!
//! The post stage is engaged when either axis needs it. It is then dropped again when the
//! poly destination is wider than the channel's post stage accepts (the poly stage then
//! targets the final size directly), or when the poly stage already reaches the final size.
//!
//! The planner is a pure function: identical inputs always produce an identical plan.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::caps::{CapabilityTable, ChannelCaps};
use crate::geometry::{align_up, fixed_ratio, gcd, is_aligned, Rect, Size};

/// Programming of one scaler stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    pub enabled: bool,
    pub src: Size,
    pub dst: Size,
    /// Horizontal fixed-point ratio `(src.w << P) / dst.w`.
    pub hratio: u32,
    /// Vertical fixed-point ratio `(src.h << P) / dst.h`.
    pub vratio: u32,
}

impl StagePlan {
    /// Stage programmed with the given sizes.
    pub fn scaling(src: Size, dst: Size, precision: u32) -> Self {
        Self {
            enabled: true,
            src,
            dst,
            hratio: fixed_ratio(src.w, dst.w, precision),
            vratio: fixed_ratio(src.h, dst.h, precision),
        }
    }

    /// Disabled stage that passes `size` through at unity ratio.
    pub fn bypass(size: Size, precision: u32) -> Self {
        Self {
            enabled: false,
            src: size,
            dst: size,
            hratio: 1 << precision,
            vratio: 1 << precision,
        }
    }
}

/// Which band an axis fell into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioBand {
    PolyOnly,
    QualityDown,
    CoarseDown,
    Unsupported,
}

impl RatioBand {
    fn needs_post(self) -> bool {
        !matches!(self, RatioBand::PolyOnly)
    }
}

/// Non-fatal findings of one planning call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioFlags {
    /// Crop `x` or width is not aligned to the hardware granularity.
    pub misaligned_crop: bool,
    /// The requested ratio lies outside every supported band.
    pub unsupported_ratio: bool,
    /// Post was dropped because the poly destination exceeds the post input width.
    pub post_width_clamped: bool,
    /// The post quality rounding changed the poly destination.
    pub quality_rounded: bool,
}

/// Opt-in behaviour of the planner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RatioPolicy {
    /// Round the poly destination to the reduced aspect fraction of the final size when
    /// the post ratio is not a multiple of 1/256.
    pub post_quality_workaround: bool,
}

/// Result of planning one output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioPlan {
    pub poly: StagePlan,
    pub post: StagePlan,
    pub hband: RatioBand,
    pub vband: RatioBand,
    pub flags: RatioFlags,
}

impl RatioPlan {
    /// Size the last enabled stage produces.
    pub fn final_size(&self) -> Size {
        if self.post.enabled {
            self.post.dst
        } else {
            self.poly.dst
        }
    }
}

/// Plan the poly and post stages for `crop` scaled to `dst` on `channel`.
///
/// Misaligned crops are reported through [`RatioFlags::misaligned_crop`] and planned as
/// given. A zero-sized `crop` or `dst` produces a bypass plan flagged as unsupported.
pub fn plan_ratio(
    caps: &CapabilityTable,
    channel: &ChannelCaps,
    crop: Rect,
    dst: Size,
    policy: RatioPolicy,
) -> RatioPlan {
    let p = caps.precision;
    let src = crop.size();
    let mut flags = RatioFlags::default();

    if !is_aligned(crop.x, caps.offset_align) || !is_aligned(crop.w, caps.width_align) {
        warn!(
            "crop {}x{}+{}+{} not aligned (offset align {}, width align {})",
            crop.w, crop.h, crop.x, crop.y, caps.offset_align, caps.width_align
        );
        flags.misaligned_crop = true;
    }

    if src.is_empty() || dst.is_empty() {
        warn!("degenerate scale request {src:?} -> {dst:?}");
        flags.unsupported_ratio = true;
        return RatioPlan {
            poly: StagePlan::bypass(src, p),
            post: StagePlan::bypass(src, p),
            hband: RatioBand::Unsupported,
            vband: RatioBand::Unsupported,
            flags,
        };
    }

    if !channel.poly {
        return plan_post_only(caps, channel, src, dst, flags);
    }

    let (tw, hband) = axis_target(caps, channel, src.w, dst.w, caps.width_align);
    let (th, vband) = axis_target(caps, channel, src.h, dst.h, 1);
    if hband == RatioBand::Unsupported || vband == RatioBand::Unsupported {
        warn!(
            "ratio unsupported: {}x{} -> {}x{}, using widest poly ratio",
            src.w, src.h, dst.w, dst.h
        );
        flags.unsupported_ratio = true;
    }

    let post_wanted = channel.post && (hband.needs_post() || vband.needs_post());
    let mut poly_dst = if post_wanted {
        Size::new(
            if hband.needs_post() { tw } else { dst.w },
            if vband.needs_post() { th } else { dst.h },
        )
    } else {
        dst
    };

    if post_wanted && policy.post_quality_workaround {
        if let Some(rounded) = round_to_aspect(caps, src, poly_dst, dst) {
            debug!("post quality rounding {poly_dst:?} -> {rounded:?}");
            poly_dst = rounded;
            flags.quality_rounded = true;
        }
    }

    let mut post_enabled = post_wanted;
    if post_enabled && poly_dst.w > channel.post_max_width {
        debug!(
            "poly destination width {} exceeds post input limit {}, dropping post",
            poly_dst.w, channel.post_max_width
        );
        post_enabled = false;
        poly_dst = dst;
        flags.post_width_clamped = true;
    }
    if post_enabled && poly_dst == dst {
        post_enabled = false;
    }

    let poly = StagePlan::scaling(src, poly_dst, p);
    let post = if post_enabled {
        StagePlan::scaling(poly_dst, dst, p)
    } else {
        StagePlan::bypass(poly_dst, p)
    };
    debug!(
        "ratio plan {}x{} -> poly {}x{} -> post {} {}x{}",
        src.w,
        src.h,
        poly_dst.w,
        poly_dst.h,
        if post.enabled { "on" } else { "off" },
        post.dst.w,
        post.dst.h
    );

    RatioPlan {
        poly,
        post,
        hband,
        vband,
        flags,
    }
}

/// Poly stage destination along one axis, and the band the ratio falls into.
fn axis_target(
    caps: &CapabilityTable,
    channel: &ChannelCaps,
    src: u32,
    dst: u32,
    align: u32,
) -> (u32, RatioBand) {
    let (s, d) = (u64::from(src), u64::from(dst));
    let up = u64::from(caps.ratio_up);

    if s <= d * up && d <= s * up {
        return (dst, RatioBand::PolyOnly);
    }
    if d > s * up {
        // post never upscales
        return (dst, RatioBand::Unsupported);
    }

    if !channel.post {
        // poly alone, coarse quality up to the hardware maximum
        let band = if s <= d * u64::from(caps.max_ratio_down) {
            RatioBand::CoarseDown
        } else {
            RatioBand::Unsupported
        };
        return (dst, band);
    }

    let q = u64::from(caps.quality_ratio_down);
    let m = u64::from(caps.max_ratio_down);
    let pd = u64::from(caps.post_ratio_down);
    if s <= d * q * pd {
        let target = align_up(src.div_ceil(caps.quality_ratio_down), align).max(dst);
        (target, RatioBand::QualityDown)
    } else if s <= d * m * pd {
        (dst.saturating_mul(caps.post_ratio_down), RatioBand::CoarseDown)
    } else {
        let target = align_up(src.div_ceil(caps.max_ratio_down), align);
        (target, RatioBand::Unsupported)
    }
}

/// Channel without a poly stage: only post can scale, and only downwards.
fn plan_post_only(
    caps: &CapabilityTable,
    channel: &ChannelCaps,
    src: Size,
    dst: Size,
    mut flags: RatioFlags,
) -> RatioPlan {
    let p = caps.precision;
    let pd = u64::from(caps.post_ratio_down);
    let fits = |s: u32, d: u32| d <= s && u64::from(s) <= u64::from(d) * pd;
    let band = if src == dst {
        RatioBand::PolyOnly
    } else if channel.post && fits(src.w, dst.w) && fits(src.h, dst.h) && src.w <= channel.post_max_width {
        RatioBand::QualityDown
    } else {
        RatioBand::Unsupported
    };

    if band == RatioBand::Unsupported {
        warn!(
            "ratio unsupported on a channel without poly stage: {}x{} -> {}x{}",
            src.w, src.h, dst.w, dst.h
        );
        flags.unsupported_ratio = true;
    }

    let post = if src != dst && channel.post {
        StagePlan::scaling(src, dst, p)
    } else {
        StagePlan::bypass(src, p)
    };
    RatioPlan {
        poly: StagePlan::bypass(src, p),
        post,
        hband: band,
        vband: band,
        flags,
    }
}

/// Round `poly_dst` up to a multiple of the reduced fraction of `dst`, so both post
/// ratios become identical. Returns `None` when no rounding is needed or possible.
fn round_to_aspect(caps: &CapabilityTable, src: Size, poly_dst: Size, dst: Size) -> Option<Size> {
    let p = caps.precision;
    if p <= 8 {
        return None;
    }
    let low_mask = (1u32 << (p - 8)) - 1;
    let hratio = fixed_ratio(poly_dst.w, dst.w, p);
    let vratio = fixed_ratio(poly_dst.h, dst.h, p);
    if hratio & low_mask == 0 && vratio & low_mask == 0 {
        return None;
    }

    let g = gcd(dst.w, dst.h);
    let (a, b) = (dst.w / g, dst.h / g);
    let mut k = poly_dst.w.div_ceil(a).max(poly_dst.h.div_ceil(b));
    for _ in 0..caps.width_align {
        if is_aligned(k.saturating_mul(a), caps.width_align) {
            break;
        }
        k += 1;
    }

    let rounded = Size::new(k.saturating_mul(a), k.saturating_mul(b));
    let pd = u64::from(caps.post_ratio_down);
    let within_post = u64::from(rounded.w) <= u64::from(dst.w) * pd
        && u64::from(rounded.h) <= u64::from(dst.h) * pd;
    let within_src = rounded.w <= src.w && rounded.h <= src.h;
    if rounded == poly_dst
        || !within_post
        || !within_src
        || !is_aligned(rounded.w, caps.width_align)
    {
        return None;
    }
    Some(rounded)
}
