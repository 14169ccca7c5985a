//! Whole-frame planning through the public entry points.

mod common;

use common::{caps, gradient, hflipped, idle_outputs, pixel, striped_dma};
use mcsc_planner::config::PlannerConfig;
use mcsc_planner::error::{classify, ErrorSeverity, HasSeverity};
use mcsc_planner::planning::{
    plan_frame, plan_frame_tuned, Calibration, DiagnosticKind, DisableReason, OutputRequest,
    PortPlan, StripeContext, Tuning,
};
use mcsc_planner::render::render_frame;
use mcsc_scale::geometry::{align_up, Rect, Size};
use mcsc_scale::ratio::RatioBand;

fn plan_one(output: usize, req: OutputRequest) -> mcsc_planner::FramePlan {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[output] = req;
    plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default()).unwrap()
}

#[test]
fn test_poly_only_scenario() {
    let plan = plan_one(0, OutputRequest::dma(Rect::new(0, 0, 4032, 3024), Size::new(3024, 2268)));
    let port = plan.ports[0].scale_plan().unwrap();
    assert!(port.poly.enabled);
    assert!(!port.post.enabled);
    assert_eq!(port.poly.dst, Size::new(3024, 2268));
    assert_eq!(port.hband, RatioBand::PolyOnly);
    assert!(plan.diagnostics.is_empty());
}

#[test]
fn test_two_stage_downscale() {
    let plan = plan_one(1, OutputRequest::dma(Rect::new(0, 0, 3840, 2160), Size::new(640, 360)));
    let port = plan.ports[1].scale_plan().unwrap();
    assert_eq!(port.poly.dst, Size::new(960, 540));
    assert!(port.post.enabled);
    assert_eq!(port.post.dst, Size::new(640, 360));
    assert_eq!(port.stage_output(), Size::new(640, 360));
}

#[test]
fn test_unsupported_ratio_is_best_effort() {
    let caps = caps();
    let crop = Rect::new(0, 0, 4032, 3024);
    let plan = plan_one(0, OutputRequest::dma(crop, Size::new(96, 72)));
    assert!(plan.degraded);
    let diag = plan
        .diagnostics
        .iter()
        .find(|d| d.kind == DiagnosticKind::UnsupportedRatio)
        .unwrap();
    assert_eq!(diag.severity, ErrorSeverity::Error);
    assert_eq!(diag.port, Some(0));

    let port = plan.ports[0].scale_plan().unwrap();
    let floor = align_up(crop.w.div_ceil(caps.max_ratio_down), caps.width_align);
    assert!(port.poly.dst.w >= floor);
    assert_eq!(port.hband, RatioBand::Unsupported);
}

#[test]
fn test_misaligned_crop_is_planned_anyway() {
    let plan = plan_one(2, OutputRequest::dma(Rect::new(3, 0, 1001, 600), Size::new(500, 300)));
    assert!(plan.has_diagnostic(DiagnosticKind::MisalignedCrop));
    assert!(!plan.degraded);
    assert_eq!(plan.ports[2].scale_plan().unwrap().input_crop, Rect::new(3, 0, 1001, 600));
}

#[test]
fn test_planning_is_idempotent() {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[0] = OutputRequest::dma(Rect::new(0, 0, 3840, 2160), Size::new(1280, 720));
    outputs[3] = OutputRequest::dma(Rect::new(960, 540, 1920, 1080), Size::new(640, 360));
    let config = PlannerConfig::default();
    let a = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &config).unwrap();
    let b = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &config).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_outputs_disjoint_from_stripe_are_skipped() {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[0] = striped_dma(Rect::new(0, 0, 4032, 3024), Size::new(2016, 1512));
    outputs[4] = striped_dma(Rect::new(0, 0, 1000, 1000), Size::new(500, 500));
    let mut stripe = StripeContext::new(3, 4032, 1344, 64);
    let config = PlannerConfig::default();

    plan_frame(&caps, &outputs, &mut stripe, &config).unwrap();
    stripe.advance();
    let middle = plan_frame(&caps, &outputs, &mut stripe, &config).unwrap();
    assert!(middle.ports[0].scale_plan().is_some());
    assert!(matches!(
        middle.ports[4],
        PortPlan::Disabled {
            logical: Some(4),
            reason: DisableReason::OutsideStripe,
            ..
        }
    ));
    assert!(middle.has_diagnostic(DiagnosticKind::StripeSkip));
    assert!(!middle.degraded);
}

#[test]
fn test_calibration_is_bound_to_the_plan() {
    let caps = caps();
    let outputs = idle_outputs(&caps);
    let cal = Calibration::new()
        .with_table("sharpness", &[(0, 10), (10, 20), (30, 60)])
        .unwrap();
    let tuning = Tuning {
        calibration: &cal,
        noise_index: 200,
    };
    let plan = plan_frame_tuned(
        &caps,
        &outputs,
        &mut StripeContext::disabled(),
        &PlannerConfig::default(),
        Some(tuning),
    )
    .unwrap();
    assert_eq!(plan.tuning.get("sharpness"), Some(&40));
}

#[test]
fn test_invalid_inputs_are_fatal() {
    let caps = caps();
    let outputs = idle_outputs(&caps);
    let config = PlannerConfig {
        bypass: true,
        post_quality_workaround: true,
        ..PlannerConfig::default()
    };
    let err = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &config).unwrap_err();
    assert_eq!(err.category(), "config");
    assert!(classify::is_input_error(&err));
    assert_eq!(err.severity(), ErrorSeverity::Fatal);

    let mut outputs = idle_outputs(&caps);
    outputs[0] = OutputRequest::dma(Rect::new(2000, 0, 3000, 1000), Size::new(1500, 500));
    let mut stripe = StripeContext::new(2, 4000, 2000, 64);
    let err = plan_frame(&caps, &outputs, &mut stripe, &PlannerConfig::default()).unwrap_err();
    assert_eq!(err.category(), "validation");
}

#[test]
fn test_dump_once_does_not_change_the_plan() {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[0] = OutputRequest::dma(Rect::new(0, 0, 1920, 1080), Size::new(960, 540));
    let dump = PlannerConfig {
        dump_once: true,
        ..PlannerConfig::default()
    };
    let a = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &dump).unwrap();
    let b = plan_frame(&caps, &outputs, &mut StripeContext::disabled(), &PlannerConfig::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_striped_flip_render_mirrors_whole_output() {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[0] = OutputRequest {
        use_out_crop: true,
        ..hflipped(Rect::new(0, 0, 128, 16), Size::new(128, 16))
    };
    let input = gradient(Size::new(128, 16));
    let mut stripe = StripeContext::new(2, 128, 64, 16);
    let frame = render_frame(&input, &caps, &outputs, &mut stripe, &PlannerConfig::default(), None)
        .unwrap();
    assert_eq!(frame.plans.len(), 2);
    let image = &frame.outputs[0].image;
    assert_eq!(image.size, Size::new(128, 16));
    for x in [0, 1, 63, 64, 127] {
        assert_eq!(pixel(image, x, 3), [(127 - x) as u8, 3, 0, 255], "column {x}");
    }
}

#[test]
fn test_crop_past_u32_range_is_rejected() {
    let caps = caps();
    let mut outputs = idle_outputs(&caps);
    outputs[0] = OutputRequest::dma(Rect::new(u32::MAX - 10, 0, 100, 100), Size::new(50, 50));
    let mut stripe = StripeContext::new(2, 4000, 2000, 64);
    let err = plan_frame(&caps, &outputs, &mut stripe, &PlannerConfig::default()).unwrap_err();
    assert_eq!(err.category(), "validation");
}
