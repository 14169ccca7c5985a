//! # Reference Renderer
//!
//! Executes the frame plans of every stripe on a real image with the CPU stage model of
//! `mcsc_scale::cpu`, then composes the pieces each port writes into one image per
//! logical output. This is how a plan is previewed: if stripes or flip halves do not
//! line up, the seams are visible in the composed image.
//!
//! Horizontal flips are applied per port for unstriped frames, exactly like the
//! hardware. Striped frames are composed unflipped and the whole output is mirrored at
//! the end, since a single stripe only ever sees part of the line.

use std::collections::BTreeMap;
use std::path::Path;

use fast_image_resize::Resizer;
use log::{debug, info};
use mcsc_scale::caps::CapabilityTable;
use mcsc_scale::cpu::{run_stages, RgbaImage, Staging};
use mcsc_scale::geometry::{Rect, Size};

use crate::config::PlannerConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::planning::{plan_stripes, FramePlan, OutputRequest, StripeContext, Tuning};

/// Composed image of one logical output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedOutput {
    pub logical: usize,
    pub image: RgbaImage,
}

/// Plans returned alongside the images they produced.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    pub plans: Vec<FramePlan>,
    pub outputs: Vec<RenderedOutput>,
}

/// Plan every stripe of the frame and render all enabled outputs from `input`.
pub fn render_frame(
    input: &RgbaImage,
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &mut StripeContext,
    config: &PlannerConfig,
    tuning: Option<Tuning<'_>>,
) -> PlannerResult<RenderedFrame> {
    if stripe.is_striped() && stripe.full_width != input.size.w {
        return Err(PlannerError::validation(
            "input.width",
            format!("must match the stripe layout width {}", stripe.full_width),
            input.size.w.to_string(),
        ));
    }

    let plans = plan_stripes(caps, outputs, stripe, config, tuning)?;
    let striped = stripe.is_striped();

    let mut canvases: BTreeMap<usize, RgbaImage> = BTreeMap::new();
    for (logical, size) in canvas_sizes(&plans) {
        canvases.insert(logical, RgbaImage::new(size));
    }

    let mut resizer = Resizer::new();
    let mut staging = Staging::with_capacity(0);
    for plan in &plans {
        let stripe_input = if striped {
            let b = stripe.stripe_bounds(plan.stripe_index);
            let mut sub = RgbaImage::new(Size::new(b.margin_width(), input.size.h));
            input.blit(
                Rect::new(b.margin_start, 0, b.margin_width(), input.size.h),
                &mut sub,
                0,
                0,
            )?;
            Some(sub)
        } else {
            None
        };
        let source = stripe_input.as_ref().unwrap_or(input);

        for port in plan.configured() {
            let out = run_stages(
                &mut resizer,
                source,
                port.input_crop,
                &port.poly,
                &port.post,
                port.flip.horizontal && !striped,
                port.flip.vertical,
                &mut staging,
            )
            .map_err(|e| PlannerError::render(Some(port.port), e.to_string()))?;

            let Some(canvas) = canvases.get_mut(&port.logical) else {
                continue;
            };
            let written = port.written();
            let w = written
                .w
                .min(canvas.size.w.saturating_sub(port.dst_x))
                .min(out.size.w.saturating_sub(written.x));
            let h = written.h.min(canvas.size.h).min(out.size.h);
            if w == 0 || h == 0 {
                continue;
            }
            debug!(
                "stripe {} port {}: {}x{} at column {} of output {}",
                plan.stripe_index, port.port, w, h, port.dst_x, port.logical
            );
            out.blit(Rect::new(written.x, written.y, w, h), canvas, port.dst_x, 0)
                .map_err(|e| PlannerError::render(Some(port.port), e.to_string()))?;
        }
    }

    let outputs = canvases
        .into_iter()
        .map(|(logical, mut image)| {
            let flip = outputs.get(logical).map(|o| o.flip.horizontal).unwrap_or(false);
            if striped && flip {
                image.flip_horizontal();
            }
            RenderedOutput { logical, image }
        })
        .collect();
    Ok(RenderedFrame { plans, outputs })
}

/// Size of each logical output's composed image: the union of everything its ports write.
fn canvas_sizes(plans: &[FramePlan]) -> BTreeMap<usize, Size> {
    let mut sizes: BTreeMap<usize, Size> = BTreeMap::new();
    for port in plans.iter().flat_map(FramePlan::configured) {
        let written = port.written();
        let entry = sizes.entry(port.logical).or_insert(Size::new(0, 0));
        entry.w = entry.w.max(port.dst_x + written.w);
        entry.h = entry.h.max(written.h);
    }
    sizes.retain(|_, s| !s.is_empty());
    sizes
}

pub fn load_rgba(path: &Path) -> PlannerResult<RgbaImage> {
    let img = image::open(path)
        .map_err(|e| PlannerError::external("image", e).with_context(path.display().to_string()))?
        .into_rgba8();
    let size = Size::new(img.width(), img.height());
    Ok(RgbaImage::from_raw(size, img.into_raw())?)
}

pub fn save_png(image: &RgbaImage, path: &Path) -> PlannerResult<()> {
    let buffer = image::RgbaImage::from_raw(image.size.w, image.size.h, image.data.clone())
        .ok_or_else(|| PlannerError::render(None, "image buffer does not match its size"))?;
    buffer
        .save(path)
        .map_err(|e| PlannerError::external("image", e).with_context(path.display().to_string()))?;
    info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcsc_scale::caps::HwVariant;

    fn solid(size: Size, rgba: [u8; 4]) -> RgbaImage {
        let mut img = RgbaImage::new(size);
        for px in img.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
        img
    }

    #[test]
    fn test_unstriped_render_has_requested_size() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = vec![OutputRequest::default(); caps.channel_count()];
        outputs[1] = OutputRequest::dma(Rect::new(0, 0, 256, 128), Size::new(128, 64));
        let input = solid(Size::new(256, 128), [10, 20, 30, 255]);
        let frame = render_frame(
            &input,
            &caps,
            &outputs,
            &mut StripeContext::disabled(),
            &PlannerConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(frame.outputs.len(), 1);
        assert_eq!(frame.outputs[0].logical, 1);
        assert_eq!(frame.outputs[0].image.size, Size::new(128, 64));
        let px = &frame.outputs[0].image.data[0..4];
        assert!(px[0].abs_diff(10) <= 1 && px[1].abs_diff(20) <= 1 && px[2].abs_diff(30) <= 1);
    }

    #[test]
    fn test_striped_render_fills_every_column() {
        let caps = HwVariant::Mcsc5.table();
        let mut outputs = vec![OutputRequest::default(); caps.channel_count()];
        outputs[0] = OutputRequest {
            use_out_crop: true,
            ..OutputRequest::dma(Rect::new(0, 0, 384, 64), Size::new(192, 32))
        };
        let input = solid(Size::new(384, 64), [200, 100, 50, 255]);
        let mut stripe = StripeContext::new(3, 384, 128, 16);
        let frame = render_frame(&input, &caps, &outputs, &mut stripe, &PlannerConfig::default(), None)
            .unwrap();
        assert_eq!(frame.plans.len(), 3);
        let image = &frame.outputs[0].image;
        assert_eq!(image.size, Size::new(192, 32));
        // every column was written by some stripe
        assert!(image.data.chunks_exact(4).all(|px| px[3] > 0 && px[0] > 150));
    }

    #[test]
    fn test_stripe_width_mismatch_is_rejected() {
        let caps = HwVariant::Mcsc5.table();
        let outputs = vec![OutputRequest::default(); caps.channel_count()];
        let input = solid(Size::new(100, 10), [0, 0, 0, 255]);
        let mut stripe = StripeContext::new(2, 200, 100, 0);
        let err = render_frame(&input, &caps, &outputs, &mut stripe, &PlannerConfig::default(), None)
            .unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
