//! # Stripe Partition Coordinator
//!
//! When a frame is wider than one hardware pass can process, the caller feeds it through
//! the scaler as a sequence of horizontal stripes. For every output and every stripe this
//! module narrows the output's full-frame crop down to the part the stripe can see, and
//! decides which output columns the stripe owns.
//!
//! ## Stripe State Machine
//!
//! | State | Condition | Output columns |
//! |-------|-----------|----------------|
//! | Disabled | `total_count == 0` | crop passes through unchanged |
//! | Left | `index == 0` | `0 .. boundary` |
//! | Middle | `0 < index < total_count - 1` | `previous end .. boundary` |
//! | Right | `index == total_count - 1` | `previous end .. full width` |
//!
//! Boundaries are the stripe's right edge mapped into output columns with the full-frame
//! ratio, then aligned with [`stripe_align`](super::request::stripe_align) to a column both
//! neighbouring stripes can still produce from their margins. Each stripe starts exactly
//! where the previous one ended, so the pieces tile the output with no gap and no overlap.
//!
//! The per-output boundaries are carried in a [`StripeContext`] that the caller keeps
//! between stripe invocations and resets at the start of every frame.

use log::{debug, error, warn};
use mcsc_scale::geometry::{align_down, align_up, scale_len_ceil, scale_len_floor, Rect, Size};
use mcsc_scale::ratio::{RatioPlan, StagePlan};
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

/// Position of the current stripe within the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeRegion {
    #[default]
    None,
    Left,
    Middle,
    Right,
}

/// Full-frame positions of one output, established at stripe 0 and refined per stripe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StripeSpan {
    /// Full-frame input column where the output's crop starts.
    pub in_start: u32,
    /// Full-frame input column where the output's crop ends (exclusive).
    pub in_end: u32,
    /// First output column owned by stripe `index`.
    pub roi_start: u32,
    /// End of the output columns owned by stripe `index` (exclusive).
    pub roi_end: u32,
    /// Stripe these ROI values belong to.
    pub index: u32,
}

/// Input columns of one stripe in full-frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StripeBounds {
    /// Nominal start (without margin).
    pub start: u32,
    /// Nominal end (without margin, exclusive).
    pub end: u32,
    /// Start of the margin-extended input the hardware actually reads.
    pub margin_start: u32,
    /// End of the margin-extended input (exclusive).
    pub margin_end: u32,
}

impl StripeBounds {
    pub fn margin_width(&self) -> u32 {
        self.margin_end - self.margin_start
    }
}

/// Horizontal tiling state of one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StripeContext {
    /// Number of stripes; 0 means the frame is not striped.
    pub total_count: u32,
    /// Stripe being planned, 0-based.
    pub index: u32,
    /// Full input frame width.
    pub full_width: u32,
    /// Nominal stripe width; the last stripe takes the remainder.
    pub stripe_width: u32,
    /// Overlap read on each interior side of a stripe.
    pub margin: u32,
    spans: Vec<Option<StripeSpan>>,
}

impl StripeContext {
    /// Context of a frame processed in a single pass.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(total_count: u32, full_width: u32, stripe_width: u32, margin: u32) -> Self {
        Self {
            total_count,
            index: 0,
            full_width,
            stripe_width,
            margin,
            spans: Vec::new(),
        }
    }

    pub fn is_striped(&self) -> bool {
        self.total_count > 0
    }

    pub fn region(&self) -> StripeRegion {
        if !self.is_striped() {
            StripeRegion::None
        } else if self.index == 0 {
            StripeRegion::Left
        } else if self.index + 1 >= self.total_count {
            StripeRegion::Right
        } else {
            StripeRegion::Middle
        }
    }

    pub fn stripe_bounds(&self, index: u32) -> StripeBounds {
        let start = (index * self.stripe_width).min(self.full_width);
        let end = if index + 1 >= self.total_count {
            self.full_width
        } else {
            ((index + 1) * self.stripe_width).min(self.full_width)
        };
        let margin_start = if index > 0 {
            start.saturating_sub(self.margin)
        } else {
            start
        };
        let margin_end = if index + 1 < self.total_count {
            end.saturating_add(self.margin).min(self.full_width)
        } else {
            end
        };
        StripeBounds {
            start,
            end,
            margin_start,
            margin_end,
        }
    }

    /// Move to the next stripe. Returns false once the last stripe has been reached.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.total_count {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn span(&self, logical: usize) -> Option<&StripeSpan> {
        self.spans.get(logical).and_then(Option::as_ref)
    }

    fn span_mut(&mut self, logical: usize) -> Option<&mut StripeSpan> {
        self.spans.get_mut(logical).and_then(Option::as_mut)
    }

    fn store_span(&mut self, logical: usize, span: StripeSpan) {
        if self.spans.len() <= logical {
            self.spans.resize(logical + 1, None);
        }
        self.spans[logical] = Some(span);
    }

    /// Forget all per-output state and return to stripe 0.
    pub fn reset(&mut self) {
        self.index = 0;
        self.spans.clear();
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if !self.is_striped() {
            return Ok(());
        }
        if self.full_width == 0 || self.stripe_width == 0 {
            return Err(PlannerError::validation(
                "stripe",
                "full_width and stripe_width must be greater than 0",
                format!("{}/{}", self.full_width, self.stripe_width),
            ));
        }
        if self.index >= self.total_count {
            return Err(PlannerError::stripe_sequence(
                self.index,
                self.total_count,
                "index past the last stripe",
            ));
        }
        if u64::from(self.total_count - 1) * u64::from(self.stripe_width)
            >= u64::from(self.full_width)
        {
            return Err(PlannerError::validation(
                "stripe.total_count",
                "every stripe must cover at least one input column",
                format!(
                    "{} stripes of {} over {}",
                    self.total_count, self.stripe_width, self.full_width
                ),
            ));
        }
        Ok(())
    }
}

/// Called once at the start of every frame, before stripe 0 or a non-striped pass.
pub fn reset_stripe_context(ctx: &mut StripeContext) {
    ctx.reset();
}

/// The part of one output a stripe handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripeWindow {
    pub region: StripeRegion,
    pub bounds: StripeBounds,
    /// Full-frame crop of the output as established at stripe 0.
    pub frame_crop: Rect,
    /// Crop relative to the margin-extended stripe input.
    pub crop: Rect,
    /// Full-frame input column where `crop` starts.
    pub in_start: u32,
    /// Full-frame input column where `crop` ends (exclusive).
    pub in_end: u32,
    /// Output columns owned by this stripe.
    pub roi_start: u32,
    pub roi_end: u32,
    /// `roi_end` honours the output's stripe alignment.
    pub aligned_end: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StripeDecision {
    /// Frame is not striped; plan the crop as requested.
    Pass,
    /// The stripe does not see any of the output's crop; disable the output for it.
    Skip,
    Window(StripeWindow),
}

/// Narrow `crop` to the current stripe of `ctx` and record the stripe's output columns.
///
/// `align` is the output's stripe alignment, `width_align` the crop width granularity of
/// the capability table. The crop start is passed through unaligned; the ratio planner
/// reports misaligned crops.
pub fn coordinate_stripe(
    ctx: &mut StripeContext,
    logical: usize,
    crop: Rect,
    dst: Size,
    align: u32,
    width_align: u32,
) -> PlannerResult<StripeDecision> {
    if !ctx.is_striped() {
        return Ok(StripeDecision::Pass);
    }

    let (k, t) = (ctx.index, ctx.total_count);
    let (in_start, in_end, roi_start) = if k == 0 {
        (crop.x, crop.right(), 0)
    } else {
        match ctx.span(logical) {
            Some(s) if s.index == k => (s.in_start, s.in_end, s.roi_start),
            Some(s) if s.index + 1 == k => (s.in_start, s.in_end, s.roi_end),
            Some(s) => {
                return Err(PlannerError::stripe_sequence(
                    k,
                    t,
                    format!("output {logical} was last planned for stripe {}", s.index),
                ))
            }
            None => {
                return Err(PlannerError::stripe_sequence(
                    k,
                    t,
                    format!("output {logical} has no state from stripe 0"),
                ))
            }
        }
    };
    let in_w = in_end - in_start;
    let bounds = ctx.stripe_bounds(k);
    let region = ctx.region();

    let (roi_end, aligned_end) = if k + 1 >= t || bounds.end >= in_end {
        (dst.w, true)
    } else if bounds.end <= in_start {
        (0, true)
    } else {
        stripe_boundary(ctx, in_start, in_end, dst.w, align, width_align)
    };
    let roi_end = roi_end.max(roi_start);

    ctx.store_span(
        logical,
        StripeSpan {
            in_start,
            in_end,
            roi_start,
            roi_end,
            index: k,
        },
    );

    if in_end <= bounds.start || in_start >= bounds.end {
        debug!(
            "output {logical}: crop {in_start}..{in_end} outside stripe {k} ({}..{})",
            bounds.start, bounds.end
        );
        return Ok(StripeDecision::Skip);
    }

    let (c_start, c_w) = stripe_columns(in_start, in_end, &bounds, width_align);
    debug!(
        "output {logical} stripe {k}/{t} {region:?}: input {c_start}..{} -> columns {roi_start}..{roi_end}",
        c_start + c_w
    );

    Ok(StripeDecision::Window(StripeWindow {
        region,
        bounds,
        frame_crop: Rect::new(in_start, crop.y, in_w, crop.h),
        crop: Rect::new(c_start - bounds.margin_start, crop.y, c_w, crop.h),
        in_start: c_start,
        in_end: c_start + c_w,
        roi_start,
        roi_end,
        aligned_end,
    }))
}

/// Input columns `[start, start + width)` a stripe reads for the crop `in_start..in_end`.
fn stripe_columns(in_start: u32, in_end: u32, bounds: &StripeBounds, width_align: u32) -> (u32, u32) {
    let c_start = in_start.max(bounds.margin_start);
    let c_w = in_end.min(bounds.margin_end).saturating_sub(c_start);
    let widened = align_up(c_w, width_align);
    let c_w = if c_start + widened <= bounds.margin_end {
        widened
    } else {
        align_down(c_w, width_align)
    };
    (c_start, c_w)
}

/// Output column where the current stripe hands over to the next one.
///
/// The boundary must lie between the first column the next stripe can produce from its
/// margin and the last column this stripe can produce. Within that range the nominal
/// boundary is aligned down, else up; when no aligned column fits it is kept unaligned
/// and the second value is false.
fn stripe_boundary(
    ctx: &StripeContext,
    in_start: u32,
    in_end: u32,
    dst_w: u32,
    align: u32,
    width_align: u32,
) -> (u32, bool) {
    let k = ctx.index;
    let in_w = in_end - in_start;
    let bounds = ctx.stripe_bounds(k);
    let next = ctx.stripe_bounds(k + 1);

    let nominal = scale_len_floor(bounds.end - in_start, dst_w, in_w);
    let lo = scale_len_floor(next.margin_start.max(in_start) - in_start, dst_w, in_w);
    let (c_start, c_w) = stripe_columns(in_start, in_end, &bounds, width_align);
    let hi = scale_len_floor(c_start + c_w - in_start, dst_w, in_w).min(dst_w);

    let down = align_down(nominal, align);
    let up = align_up(nominal, align);
    if down >= lo {
        (down, true)
    } else if up <= hi {
        debug!("stripe {k}: boundary {nominal} aligned up to {up}, {down} is out of reach of the next stripe");
        (up, true)
    } else {
        warn!(
            "stripe {k}: no multiple of {align} between output columns {lo} and {hi}, ending at {nominal}"
        );
        (nominal, false)
    }
}

/// Stage programming for one stripe of one output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripeStages {
    pub poly: StagePlan,
    pub post: StagePlan,
    pub out_crop: Option<Rect>,
    /// Output column where the (cropped) stage result lands.
    pub dst_x: u32,
}

/// Correction applied to a computed output crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropAdjustment {
    /// Crop did not fit the stage destination and was reset to the whole destination.
    Fallback { x: i64, width: i64, dest_width: u32 },
    /// Crop was narrower than the DMA minimum and was widened.
    Widened { shortfall: u32, region: StripeRegion },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refined {
    Configured {
        stages: StripeStages,
        adjustment: Option<CropAdjustment>,
    },
    /// No usable output columns remain in this stripe.
    Empty,
}

/// Derive the stripe's stage sizes from the full-frame plan and apply the output crop.
///
/// The full-frame ratios are reused unchanged, so every stripe scales with exactly the
/// same factors and the pieces line up.
pub fn refine_stripe(
    ctx: &mut StripeContext,
    logical: usize,
    window: &StripeWindow,
    full: &RatioPlan,
    dst: Size,
    use_out_crop: bool,
    dma_min_width: u32,
) -> Refined {
    let frame = window.frame_crop;
    let (x0, in_w) = (frame.x, frame.w);
    let rel_start = window.in_start - x0;
    let rel_end = window.in_end.min(frame.right()) - x0;

    let final_size = full.final_size();
    let scaled_start = scale_len_floor(rel_start, dst.w, in_w);
    let scaled_end = scale_len_ceil(rel_end, dst.w, in_w).min(dst.w);
    let dest_w = scaled_end.saturating_sub(scaled_start);
    if dest_w == 0 {
        warn!("output {logical}: stripe {:?} scales to zero columns", window.region);
        return Refined::Empty;
    }

    let src = window.crop.size();
    let poly_dst = if !full.post.enabled {
        Size::new(dest_w, full.poly.dst.h)
    } else if full.poly.enabled {
        let pw = full.poly.dst.w;
        let ps = scale_len_floor(rel_start, pw, in_w);
        let pe = scale_len_ceil(rel_end, pw, in_w).min(pw);
        Size::new(pe.saturating_sub(ps), full.poly.dst.h)
    } else {
        src
    };
    let poly = StagePlan {
        enabled: full.poly.enabled,
        src,
        dst: if full.poly.enabled { poly_dst } else { src },
        hratio: full.poly.hratio,
        vratio: full.poly.vratio,
    };
    let post = if full.post.enabled {
        StagePlan {
            enabled: true,
            src: poly.dst,
            dst: Size::new(dest_w, final_size.h),
            hratio: full.post.hratio,
            vratio: full.post.vratio,
        }
    } else {
        StagePlan {
            enabled: false,
            src: poly.dst,
            dst: poly.dst,
            hratio: full.post.hratio,
            vratio: full.post.vratio,
        }
    };

    if !use_out_crop {
        return Refined::Configured {
            stages: StripeStages {
                poly,
                post,
                out_crop: None,
                dst_x: scaled_start,
            },
            adjustment: None,
        };
    }

    let x = i64::from(window.roi_start) - i64::from(scaled_start);
    let width = i64::from(window.roi_end) - i64::from(window.roi_start);
    let mut adjustment = None;
    let (crop_x, crop_w) = if width < 0 || x < 0 || x + width > i64::from(dest_w) {
        error!(
            "output {logical}: output crop x={x} w={width} outside {dest_w} columns, using whole stripe"
        );
        adjustment = Some(CropAdjustment::Fallback {
            x,
            width,
            dest_width: dest_w,
        });
        (0, dest_w)
    } else if width == 0 {
        warn!(
            "output {logical}: stripe {:?} owns no output columns, disabling",
            window.region
        );
        return Refined::Empty;
    } else {
        (x as u32, width as u32)
    };

    let (crop_x, crop_w) = if crop_w < dma_min_width {
        let shortfall = dma_min_width - crop_w;
        adjustment = Some(CropAdjustment::Widened {
            shortfall,
            region: window.region,
        });
        match window.region {
            StripeRegion::Right => {
                let take = shortfall.min(crop_x);
                if let Some(span) = ctx.span_mut(logical) {
                    span.roi_start -= take;
                }
                (crop_x - take, crop_w + take)
            }
            // MIDDLE shares the LEFT handling
            _ => {
                let widened = (crop_w + shortfall).min(dest_w - crop_x);
                if let Some(span) = ctx.span_mut(logical) {
                    span.roi_end = span.roi_start + widened;
                }
                (crop_x, widened)
            }
        }
    } else {
        (crop_x, crop_w)
    };

    Refined::Configured {
        stages: StripeStages {
            poly,
            post,
            out_crop: Some(Rect::new(crop_x, 0, crop_w, final_size.h)),
            dst_x: scaled_start + crop_x,
        },
        adjustment,
    }
}
