//! # Pipeline Orchestrator
//!
//! Builds the complete scaler configuration of one frame (or one stripe of a frame):
//!
//! 1. validate the capability table, the planner flags and the stripe layout
//! 2. run the [flip reallocator](super::flip) once
//! 3. for every logical output, in channel order: narrow it to the stripe, plan the
//!    poly/post ratios, refine the output crop, and split it across two ports when a
//!    wide flip borrowed one
//! 4. evaluate the calibration tables unless tuning is skipped
//!
//! Conditions that do not prevent a plan (misaligned crops, unsupported ratios, skipped
//! outputs) end up as [`Diagnostic`]s; an unsupported ratio also marks the frame plan as
//! degraded. Only the conditions documented on [`PlannerError`] abort planning.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use mcsc_scale::caps::CapabilityTable;
use mcsc_scale::geometry::{Rect, Size};
use mcsc_scale::ratio::{plan_ratio, RatioBand, RatioFlags, RatioPlan, RatioPolicy, StagePlan};
use serde::Serialize;

use super::flip::{reallocate_flip_ports, ChannelMap, FlipHalf};
use super::request::{stripe_align, Flip, OutputRequest};
use super::stripe::{
    coordinate_stripe, refine_stripe, reset_stripe_context, CropAdjustment, Refined,
    StripeContext, StripeDecision, StripeRegion, StripeWindow,
};
use super::tuning::Tuning;
use crate::config::PlannerConfig;
use crate::error::{ErrorSeverity, PlannerError, PlannerResult};

/// Kind of a non-fatal finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MisalignedCrop,
    UnsupportedRatio,
    PostWidthClamped,
    QualityRounded,
    /// Output's crop does not reach into the current stripe.
    StripeSkip,
    /// Output crop shrank to nothing for the current stripe.
    ZeroWidthCrop,
    /// Output crop did not fit and was replaced by the whole stage output.
    OutCropFallback,
    /// Output crop was widened to the DMA minimum width.
    DmaMinWidth,
    /// Stripe hands over to the next one at a column off the output's stripe alignment.
    UnalignedStripeBoundary,
    /// Borrowed port has weaker stages than the output it serves.
    FlipPortMismatch,
    /// Scaling bypassed by configuration.
    Bypass,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub port: Option<usize>,
    pub logical: Option<usize>,
    pub kind: DiagnosticKind,
    pub severity: ErrorSeverity,
    pub message: String,
}

/// Programming of one physical port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScalePlan {
    pub port: usize,
    pub logical: usize,
    pub half: FlipHalf,
    /// Crop in the coordinates of the image this pass reads: the margin-extended stripe
    /// when striping, the full frame otherwise.
    pub input_crop: Rect,
    pub poly: StagePlan,
    pub post: StagePlan,
    /// Part of the stage output written to memory, in stage output coordinates.
    pub out_crop: Option<Rect>,
    /// Column of the logical output where the written pixels land.
    pub dst_x: u32,
    pub stripe_region: StripeRegion,
    pub flip: Flip,
    pub otf_out: bool,
    pub dma_out: bool,
    pub hband: RatioBand,
    pub vband: RatioBand,
}

impl ScalePlan {
    /// Size of the last enabled stage's output.
    pub fn stage_output(&self) -> Size {
        if self.post.enabled {
            self.post.dst
        } else {
            self.poly.dst
        }
    }

    /// Pixels actually written by this port.
    pub fn written(&self) -> Rect {
        let out = self.stage_output();
        self.out_crop.unwrap_or(Rect::new(0, 0, out.w, out.h))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    NotRequested,
    OutsideStripe,
    ZeroWidth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortPlan {
    Configured(ScalePlan),
    Disabled {
        port: usize,
        logical: Option<usize>,
        reason: DisableReason,
    },
}

impl PortPlan {
    pub fn scale_plan(&self) -> Option<&ScalePlan> {
        match self {
            PortPlan::Configured(plan) => Some(plan),
            PortPlan::Disabled { .. } => None,
        }
    }
}

/// Configuration of every port for one stripe of a frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FramePlan {
    pub stripe_index: u32,
    pub total_count: u32,
    /// One entry per physical port, in port order.
    pub ports: Vec<PortPlan>,
    pub channel_map: ChannelMap,
    /// Some output was planned with an unsupported ratio.
    pub degraded: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Calibration values by table name; empty when tuning was skipped.
    pub tuning: BTreeMap<String, i32>,
}

impl FramePlan {
    /// Ports that carry a configuration, in port order.
    pub fn configured(&self) -> impl Iterator<Item = &ScalePlan> {
        self.ports.iter().filter_map(PortPlan::scale_plan)
    }

    /// Configured ports serving `logical`.
    pub fn for_logical(&self, logical: usize) -> impl Iterator<Item = &ScalePlan> {
        self.configured().filter(move |p| p.logical == logical)
    }

    pub fn has_diagnostic(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

struct FrameBuilder {
    ports: Vec<PortPlan>,
    diagnostics: Vec<Diagnostic>,
    degraded: bool,
}

impl FrameBuilder {
    fn note(
        &mut self,
        port: usize,
        logical: usize,
        kind: DiagnosticKind,
        severity: ErrorSeverity,
        message: String,
    ) {
        self.diagnostics.push(Diagnostic {
            port: Some(port),
            logical: Some(logical),
            kind,
            severity,
            message,
        });
    }

    fn disable(&mut self, port: usize, logical: usize, reason: DisableReason) {
        if let Some(slot) = self.ports.get_mut(port) {
            *slot = PortPlan::Disabled {
                port,
                logical: Some(logical),
                reason,
            };
        }
    }

    fn configure(&mut self, plan: ScalePlan) {
        if let Some(slot) = self.ports.get_mut(plan.port) {
            *slot = PortPlan::Configured(plan);
        }
    }

    fn ratio_flags(&mut self, port: usize, logical: usize, flags: RatioFlags, crop: Rect, dst: Size) {
        if flags.misaligned_crop {
            self.note(
                port,
                logical,
                DiagnosticKind::MisalignedCrop,
                ErrorSeverity::Warning,
                format!("crop {}x{}+{}+{} not aligned", crop.w, crop.h, crop.x, crop.y),
            );
        }
        if flags.unsupported_ratio {
            self.degraded = true;
            self.note(
                port,
                logical,
                DiagnosticKind::UnsupportedRatio,
                ErrorSeverity::Error,
                format!("{}x{} -> {}x{} outside every ratio band", crop.w, crop.h, dst.w, dst.h),
            );
        }
        if flags.post_width_clamped {
            self.note(
                port,
                logical,
                DiagnosticKind::PostWidthClamped,
                ErrorSeverity::Info,
                "post stage dropped, poly destination too wide".to_string(),
            );
        }
        if flags.quality_rounded {
            self.note(
                port,
                logical,
                DiagnosticKind::QualityRounded,
                ErrorSeverity::Debug,
                "poly destination rounded to the output aspect".to_string(),
            );
        }
    }
}

/// Plan one frame, or the current stripe of a striped frame.
pub fn plan_frame(
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &mut StripeContext,
    config: &PlannerConfig,
) -> PlannerResult<FramePlan> {
    plan_frame_tuned(caps, outputs, stripe, config, None)
}

/// [`plan_frame`] with calibration tables evaluated into [`FramePlan::tuning`].
pub fn plan_frame_tuned(
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &mut StripeContext,
    config: &PlannerConfig,
    tuning: Option<Tuning<'_>>,
) -> PlannerResult<FramePlan> {
    validate_inputs(caps, outputs, stripe, config)?;

    let allocation = reallocate_flip_ports(caps, outputs, stripe)
        .map_err(|e| e.with_context(format!("stripe {} of {}", stripe.index, stripe.total_count)))?;
    let policy = RatioPolicy {
        post_quality_workaround: config.post_quality_workaround,
    };

    let mut frame = FrameBuilder {
        ports: (0..caps.channel_count())
            .map(|port| PortPlan::Disabled {
                port,
                logical: None,
                reason: DisableReason::NotRequested,
            })
            .collect(),
        diagnostics: Vec::new(),
        degraded: false,
    };
    for m in &allocation.mismatches {
        frame.note(
            m.port,
            m.logical,
            DiagnosticKind::FlipPortMismatch,
            ErrorSeverity::Warning,
            format!("port {} stands in for output {} with fewer stages", m.port, m.logical),
        );
    }

    for (logical, req) in outputs.iter().enumerate() {
        if !req.is_enabled() {
            continue;
        }
        let Some(route) = allocation.map.route(logical).copied() else {
            continue;
        };
        let port = route.primary_port;
        let channel = caps.channel(port).ok_or_else(|| {
            PlannerError::validation("outputs", "one request per channel", logical.to_string())
        })?;

        let align = stripe_align(&req.format, caps);
        let decision = coordinate_stripe(
            stripe,
            logical,
            req.crop,
            req.dst,
            align,
            caps.width_align,
        )?;
        let window = match decision {
            StripeDecision::Skip => {
                frame.disable(port, logical, DisableReason::OutsideStripe);
                frame.note(
                    port,
                    logical,
                    DiagnosticKind::StripeSkip,
                    ErrorSeverity::Info,
                    format!("crop outside stripe {}", stripe.index),
                );
                continue;
            }
            StripeDecision::Pass => None,
            StripeDecision::Window(w) => {
                if !w.aligned_end {
                    frame.note(
                        port,
                        logical,
                        DiagnosticKind::UnalignedStripeBoundary,
                        ErrorSeverity::Warning,
                        format!(
                            "stripe {} ends at output column {}, not a multiple of {align}",
                            stripe.index, w.roi_end
                        ),
                    );
                }
                Some(w)
            }
        };

        let base = ScalePlan {
            port,
            logical,
            half: FlipHalf::Whole,
            input_crop: req.crop,
            poly: StagePlan::bypass(req.crop.size(), caps.precision),
            post: StagePlan::bypass(req.crop.size(), caps.precision),
            out_crop: None,
            dst_x: 0,
            stripe_region: stripe.region(),
            flip: req.flip,
            otf_out: req.otf_out,
            dma_out: req.dma_out,
            hband: RatioBand::PolyOnly,
            vband: RatioBand::PolyOnly,
        };

        let plan = if config.bypass {
            let Some(plan) = bypass_plan(base, window.as_ref(), caps.precision) else {
                frame.disable(port, logical, DisableReason::ZeroWidth);
                frame.note(
                    port,
                    logical,
                    DiagnosticKind::ZeroWidthCrop,
                    ErrorSeverity::Warning,
                    format!("no input columns owned in stripe {}", stripe.index),
                );
                continue;
            };
            if req.dst != req.crop.size() {
                frame.note(
                    port,
                    logical,
                    DiagnosticKind::Bypass,
                    ErrorSeverity::Info,
                    format!(
                        "scaling bypassed, {}x{} written instead of {}x{}",
                        req.crop.w, req.crop.h, req.dst.w, req.dst.h
                    ),
                );
            }
            plan
        } else {
            let full_crop = window.map(|w| w.frame_crop).unwrap_or(req.crop);
            let full = plan_ratio(caps, channel, full_crop, req.dst, policy);
            frame.ratio_flags(port, logical, full.flags, full_crop, req.dst);

            match window {
                None => whole_plan(base, &full),
                Some(w) => {
                    match refine_stripe(stripe, logical, &w, &full, req.dst, req.use_out_crop, caps.dma_min_width) {
                        Refined::Empty => {
                            frame.disable(port, logical, DisableReason::ZeroWidth);
                            frame.note(
                                port,
                                logical,
                                DiagnosticKind::ZeroWidthCrop,
                                ErrorSeverity::Warning,
                                format!("no output columns in stripe {}", stripe.index),
                            );
                            continue;
                        }
                        Refined::Configured { stages, adjustment } => {
                            if let Some(adj) = adjustment {
                                note_adjustment(&mut frame, port, logical, adj);
                            }
                            ScalePlan {
                                input_crop: w.crop,
                                poly: stages.poly,
                                post: stages.post,
                                out_crop: stages.out_crop,
                                dst_x: stages.dst_x,
                                hband: full.hband,
                                vband: full.vband,
                                ..base
                            }
                        }
                    }
                }
            }
        };

        match route.secondary_port {
            None => frame.configure(plan),
            Some(secondary) => {
                let out = plan.stage_output();
                for (half, half_port) in [(FlipHalf::Primary, port), (FlipHalf::Secondary, secondary)] {
                    let Some((crop, dst_x)) = half.window(out, caps.line_buffer_width) else {
                        continue;
                    };
                    debug!("output {logical}: {half:?} half on port {half_port}, columns {dst_x}..{}", dst_x + crop.w);
                    frame.configure(ScalePlan {
                        port: half_port,
                        half,
                        out_crop: Some(crop),
                        dst_x,
                        otf_out: plan.otf_out && half == FlipHalf::Primary,
                        ..plan
                    });
                }
            }
        }
    }

    let tuning = match tuning {
        Some(t) if !config.skip_setfile => t.calibration.interpolate_all(t.noise_index),
        Some(_) => {
            debug!("calibration skipped by configuration");
            BTreeMap::new()
        }
        None => BTreeMap::new(),
    };

    let plan = FramePlan {
        stripe_index: stripe.index,
        total_count: stripe.total_count,
        ports: frame.ports,
        channel_map: allocation.map,
        degraded: frame.degraded,
        diagnostics: frame.diagnostics,
        tuning,
    };
    if plan.degraded {
        warn!("frame plan for stripe {} is degraded", plan.stripe_index);
    }
    if config.dump_once {
        match serde_json::to_string_pretty(&plan) {
            Ok(json) => info!("frame plan:\n{json}"),
            Err(e) => warn!("could not dump frame plan: {e}"),
        }
    }
    Ok(plan)
}

/// Plan every stripe of a frame, starting from a freshly reset context.
///
/// `dump_once` applies to the first stripe only.
pub fn plan_stripes(
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &mut StripeContext,
    config: &PlannerConfig,
    tuning: Option<Tuning<'_>>,
) -> PlannerResult<Vec<FramePlan>> {
    reset_stripe_context(stripe);
    let mut config = *config;
    let mut plans = vec![plan_frame_tuned(caps, outputs, stripe, &config, tuning)?];
    config.take_dump_once();
    while stripe.advance() {
        plans.push(plan_frame_tuned(caps, outputs, stripe, &config, tuning)?);
    }
    Ok(plans)
}

fn validate_inputs(
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &StripeContext,
    config: &PlannerConfig,
) -> PlannerResult<()> {
    caps.validate()
        .map_err(|e| PlannerError::config("capability_table", "", e.to_string()))?;
    config.validate()?;
    stripe.validate()?;
    if outputs.len() != caps.channel_count() {
        return Err(PlannerError::validation(
            "outputs",
            format!("one request per channel ({})", caps.channel_count()),
            outputs.len().to_string(),
        ));
    }
    if stripe.is_striped() {
        if let Some((i, o)) = outputs
            .iter()
            .enumerate()
            .find(|(_, o)| o.is_enabled() && o.crop.right() > stripe.full_width)
        {
            return Err(PlannerError::validation(
                format!("outputs[{i}].crop"),
                format!("must lie within the {} px frame", stripe.full_width),
                format!("{}..{}", o.crop.x, o.crop.right()),
            ));
        }
    }
    Ok(())
}

fn whole_plan(base: ScalePlan, full: &RatioPlan) -> ScalePlan {
    ScalePlan {
        poly: full.poly,
        post: full.post,
        hband: full.hband,
        vband: full.vband,
        ..base
    }
}

/// Unscaled plan. A stripe writes only the input columns it owns, so the margins read
/// on either side do not overlap the neighbouring stripes.
fn bypass_plan(base: ScalePlan, window: Option<&StripeWindow>, precision: u32) -> Option<ScalePlan> {
    let Some(w) = window else {
        return Some(base);
    };
    let frame = w.frame_crop;
    let own_start = w.bounds.start.max(frame.x);
    let own_end = w.bounds.end.min(frame.right()).min(w.in_end);
    if own_end <= own_start {
        return None;
    }
    Some(ScalePlan {
        input_crop: w.crop,
        poly: StagePlan::bypass(w.crop.size(), precision),
        post: StagePlan::bypass(w.crop.size(), precision),
        out_crop: Some(Rect::new(own_start - w.in_start, 0, own_end - own_start, w.crop.h)),
        dst_x: own_start - frame.x,
        ..base
    })
}

fn note_adjustment(frame: &mut FrameBuilder, port: usize, logical: usize, adjustment: CropAdjustment) {
    match adjustment {
        CropAdjustment::Fallback { x, width, dest_width } => frame.note(
            port,
            logical,
            DiagnosticKind::OutCropFallback,
            ErrorSeverity::Error,
            format!("output crop x={x} w={width} outside {dest_width} columns"),
        ),
        CropAdjustment::Widened { shortfall, region } => frame.note(
            port,
            logical,
            DiagnosticKind::DmaMinWidth,
            ErrorSeverity::Warning,
            format!("{region:?} stripe crop widened by {shortfall}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::tuning::Calibration;
    use mcsc_scale::caps::HwVariant;

    fn requests(caps: &CapabilityTable) -> Vec<OutputRequest> {
        vec![OutputRequest::default(); caps.channel_count()]
    }

    #[test]
    fn test_single_output_frame() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = requests(&caps);
        outputs[0] = OutputRequest::dma(Rect::new(0, 0, 4032, 3024), Size::new(3024, 2268));
        let plan = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default()).unwrap();
        let p = plan.ports[0].scale_plan().unwrap();
        assert_eq!(p.poly.dst, Size::new(3024, 2268));
        assert!(!p.post.enabled);
        assert!(!plan.degraded);
        assert_eq!(plan.configured().count(), 1);
        assert!(matches!(
            plan.ports[1],
            PortPlan::Disabled { reason: DisableReason::NotRequested, .. }
        ));
    }

    #[test]
    fn test_unsupported_ratio_degrades_frame() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = requests(&caps);
        outputs[2] = OutputRequest::dma(Rect::new(0, 0, 4032, 3024), Size::new(64, 48));
        let plan = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default()).unwrap();
        assert!(plan.degraded);
        assert!(plan.has_diagnostic(DiagnosticKind::UnsupportedRatio));
        assert!(plan.ports[2].scale_plan().is_some());
    }

    #[test]
    fn test_bypass_passes_crop_through() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = requests(&caps);
        outputs[0] = OutputRequest::dma(Rect::new(0, 0, 1920, 1080), Size::new(640, 360));
        let config = PlannerConfig {
            bypass: true,
            ..PlannerConfig::default()
        };
        let plan = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &config).unwrap();
        let p = plan.ports[0].scale_plan().unwrap();
        assert!(!p.poly.enabled && !p.post.enabled);
        assert_eq!(p.stage_output(), Size::new(1920, 1080));
        assert!(plan.has_diagnostic(DiagnosticKind::Bypass));
    }

    #[test]
    fn test_wrong_output_count_is_rejected() {
        let caps = HwVariant::Mcsc5.table();
        let err = plan_frame(&caps, &[OutputRequest::default()], &mut StripeContext::disabled(), &PlannerConfig::default())
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_wide_flip_splits_across_ports() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = requests(&caps);
        outputs[0] = OutputRequest {
            flip: Flip {
                horizontal: true,
                vertical: false,
            },
            ..OutputRequest::dma(Rect::new(0, 0, 4608, 2592), Size::new(4608, 2592))
        };
        let plan = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default()).unwrap();
        let halves: Vec<_> = plan.for_logical(0).collect();
        assert_eq!(halves.len(), 2);
        assert_eq!(halves[0].port, 0);
        assert_eq!(halves[0].out_crop, Some(Rect::new(0, 0, 3840, 2592)));
        assert_eq!(halves[1].port, 1);
        assert_eq!(halves[1].out_crop, Some(Rect::new(3840, 0, 768, 2592)));
        assert_eq!(halves[1].dst_x, 3840);
        assert_eq!(halves[0].poly, halves[1].poly);
    }

    #[test]
    fn test_tuning_respects_skip_setfile() {
        let caps = HwVariant::Mcsc3.table();
        let outputs = requests(&caps);
        let cal = Calibration::new().with_table("gain", &[(0, 0), (10, 100)]).unwrap();
        let tuning = Tuning {
            calibration: &cal,
            noise_index: 50,
        };
        let plan = plan_frame_tuned(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default(), Some(tuning))
            .unwrap();
        assert_eq!(plan.tuning.get("gain"), Some(&50));

        let skip = PlannerConfig {
            skip_setfile: true,
            ..PlannerConfig::default()
        };
        let plan = plan_frame_tuned(&caps, &outputs, &mut StripeContext::disabled(), &skip, Some(tuning)).unwrap();
        assert!(plan.tuning.is_empty());
    }

    #[test]
    fn test_plan_stripes_covers_every_stripe() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = requests(&caps);
        outputs[0] = OutputRequest {
            use_out_crop: true,
            ..OutputRequest::dma(Rect::new(0, 0, 4032, 3024), Size::new(2016, 1512))
        };
        outputs[2] = OutputRequest::dma(Rect::new(3000, 0, 1000, 1000), Size::new(500, 500));
        let mut stripe = StripeContext::new(3, 4032, 1344, 64);
        let plans = plan_stripes(&caps, &outputs, &mut stripe, &PlannerConfig::default(), None).unwrap();
        assert_eq!(plans.len(), 3);
        // output 2 only reaches into the last stripe
        assert!(matches!(
            plans[0].ports[2],
            PortPlan::Disabled { reason: DisableReason::OutsideStripe, .. }
        ));
        assert!(plans[2].ports[2].scale_plan().is_some());
        let regions: Vec<_> = plans
            .iter()
            .map(|p| p.ports[0].scale_plan().unwrap().stripe_region)
            .collect();
        assert_eq!(regions, vec![StripeRegion::Left, StripeRegion::Middle, StripeRegion::Right]);
    }
}
