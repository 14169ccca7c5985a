//! # Flip Port Reallocator
//!
//! The flip unit of a scaler port cannot mirror a line wider than the line buffer. An
//! output that asks for a horizontal flip wider than that borrows a second, unused port:
//! both ports scale the same crop with the same ratios, the owning port writes the
//! left `line_buffer_width` columns of the flipped image and the borrowed port writes the
//! rest.
//!
//! The result is a [`ChannelMap`] from logical output to physical ports. It is computed
//! once per frame, before anything else, and every later step reads port assignments
//! from it.

use std::collections::VecDeque;

use log::{debug, warn};
use mcsc_scale::caps::{CapabilityTable, ChannelCaps};
use mcsc_scale::geometry::{Rect, Size};
use serde::Serialize;

use super::request::OutputRequest;
use super::stripe::StripeContext;
use crate::error::{PlannerError, PlannerResult};

/// Physical ports that service one logical output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelRoute {
    pub primary_port: usize,
    /// Port borrowed for the right half of a wide flip.
    pub secondary_port: Option<usize>,
}

/// Logical output to physical port mapping for one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChannelMap {
    routes: Vec<ChannelRoute>,
}

impl ChannelMap {
    /// Every logical output on its own port.
    pub fn identity(count: usize) -> Self {
        Self {
            routes: (0..count)
                .map(|port| ChannelRoute {
                    primary_port: port,
                    secondary_port: None,
                })
                .collect(),
        }
    }

    pub fn route(&self, logical: usize) -> Option<&ChannelRoute> {
        self.routes.get(logical)
    }

    pub fn routes(&self) -> &[ChannelRoute] {
        &self.routes
    }

    /// Logical output whose second half runs on `port`, if the port was borrowed.
    pub fn borrowed_by(&self, port: usize) -> Option<usize> {
        self.routes
            .iter()
            .position(|r| r.secondary_port == Some(port))
    }

    fn borrow(&mut self, logical: usize, port: usize) {
        if let Some(route) = self.routes.get_mut(logical) {
            route.secondary_port = Some(port);
        }
    }
}

/// Which part of a flipped output a port produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipHalf {
    #[default]
    Whole,
    /// Flipped columns `[0, line_buffer_width)`, on the owning port.
    Primary,
    /// Flipped columns `[line_buffer_width, width)`, on the borrowed port.
    Secondary,
}

impl FlipHalf {
    /// Output crop and placement column of this half for an output of size `dst`.
    pub fn window(self, dst: Size, line_buffer_width: u32) -> Option<(Rect, u32)> {
        match self {
            FlipHalf::Whole => None,
            FlipHalf::Primary => Some((Rect::new(0, 0, line_buffer_width.min(dst.w), dst.h), 0)),
            FlipHalf::Secondary => {
                let x = line_buffer_width.min(dst.w);
                Some((Rect::new(x, 0, dst.w - x, dst.h), x))
            }
        }
    }
}

/// Borrowed port whose stages are weaker than those of the output it serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PortMismatch {
    pub logical: usize,
    pub port: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FlipAllocation {
    pub map: ChannelMap,
    pub mismatches: Vec<PortMismatch>,
}

/// True when `output` needs a second port to complete its flip.
pub fn needs_split(caps: &CapabilityTable, output: &OutputRequest) -> bool {
    output.flip.horizontal && output.dma_out && output.dst.w > caps.line_buffer_width
}

fn can_stand_in(have: &ChannelCaps, need: &ChannelCaps) -> bool {
    (have.poly || !need.poly)
        && (!need.post || (have.post && have.post_max_width >= need.post_max_width))
}

/// Assign a borrowed port to every wide flipped output.
///
/// Ports are borrowed in ascending order, preferring one whose stages can do everything
/// the owning port can. A port is free when its own output is fully disabled and it
/// has a memory output path.
pub fn reallocate_flip_ports(
    caps: &CapabilityTable,
    outputs: &[OutputRequest],
    stripe: &StripeContext,
) -> PlannerResult<FlipAllocation> {
    let mut allocation = FlipAllocation {
        map: ChannelMap::identity(outputs.len()),
        mismatches: Vec::new(),
    };

    let wide: Vec<usize> = outputs
        .iter()
        .enumerate()
        .filter(|(_, o)| needs_split(caps, o))
        .map(|(i, _)| i)
        .collect();
    if wide.is_empty() {
        return Ok(allocation);
    }

    let mut free: VecDeque<usize> = outputs
        .iter()
        .enumerate()
        .filter(|(port, o)| {
            !o.is_enabled() && caps.channel(*port).is_some_and(|c| c.dma_out)
        })
        .map(|(port, _)| port)
        .collect();

    for logical in wide {
        let width = outputs[logical].dst.w;
        if stripe.is_striped() {
            return Err(PlannerError::flip_reallocation(
                logical,
                "cannot combine a split flip with striped processing",
            )
            .with_operation("reallocate_flip_ports")
            .with_metadata("total_count", stripe.total_count.to_string())
            .with_metadata("width", width.to_string()));
        }
        if u64::from(width) > 2 * u64::from(caps.line_buffer_width) {
            return Err(PlannerError::flip_reallocation(
                logical,
                format!(
                    "width {width} exceeds two line buffers of {}",
                    caps.line_buffer_width
                ),
            )
            .with_operation("reallocate_flip_ports"));
        }

        let need = caps
            .channel(logical)
            .ok_or_else(|| {
                PlannerError::validation("outputs", "one request per channel", logical.to_string())
            })?;
        let pick = free
            .iter()
            .position(|&p| caps.channel(p).is_some_and(|have| can_stand_in(have, need)))
            .or((!free.is_empty()).then_some(0));
        let Some(slot) = pick else {
            return Err(PlannerError::flip_reallocation(
                logical,
                "no output port with its outputs disabled",
            )
            .with_operation("reallocate_flip_ports")
            .with_metadata("width", width.to_string()));
        };
        let Some(port) = free.remove(slot) else {
            continue;
        };

        if !caps.channel(port).is_some_and(|have| can_stand_in(have, need)) {
            warn!("output {logical}: borrowed port {port} has weaker stages than port {logical}");
            allocation.mismatches.push(PortMismatch { logical, port });
        }
        debug!("output {logical}: flip width {width} split onto port {port}");
        allocation.map.borrow(logical, port);
    }

    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::request::Flip;
    use mcsc_scale::caps::HwVariant;

    fn flipped(w: u32) -> OutputRequest {
        OutputRequest {
            flip: Flip {
                horizontal: true,
                vertical: false,
            },
            ..OutputRequest::dma(Rect::new(0, 0, w, 2160), Size::new(w, 2160))
        }
    }

    fn outputs(count: usize) -> Vec<OutputRequest> {
        vec![OutputRequest::default(); count]
    }

    #[test]
    fn test_narrow_flip_needs_no_port() {
        let caps = HwVariant::Mcsc5.table();
        let mut o = outputs(5);
        o[0] = flipped(1920);
        let alloc = reallocate_flip_ports(&caps, &o, &StripeContext::disabled()).unwrap();
        assert_eq!(alloc.map, ChannelMap::identity(5));
    }

    #[test]
    fn test_wide_flip_borrows_lowest_compatible_port() {
        let caps = HwVariant::Mcsc5.table();
        let mut o = outputs(5);
        o[2] = flipped(4608);
        let alloc = reallocate_flip_ports(&caps, &o, &StripeContext::disabled()).unwrap();
        // port 0 is the first free port and has both stages
        assert_eq!(alloc.map.route(2).unwrap().secondary_port, Some(0));
        assert_eq!(alloc.map.borrowed_by(0), Some(2));
        assert!(alloc.mismatches.is_empty());
    }

    #[test]
    fn test_falls_back_to_weaker_port() {
        let caps = HwVariant::Mcsc5.table();
        let mut o = outputs(5);
        o[0] = flipped(4608);
        o[1] = OutputRequest::dma(Rect::new(0, 0, 1920, 1080), Size::new(1920, 1080));
        let alloc = reallocate_flip_ports(&caps, &o, &StripeContext::disabled()).unwrap();
        // ports 2..4 lack post; still borrowed, but reported
        assert_eq!(alloc.map.route(0).unwrap().secondary_port, Some(2));
        assert_eq!(alloc.mismatches, vec![PortMismatch { logical: 0, port: 2 }]);
    }

    #[test]
    fn test_no_free_port_is_fatal() {
        let caps = HwVariant::Mcsc3.table();
        let o = vec![
            flipped(3000),
            OutputRequest::dma(Rect::new(0, 0, 640, 480), Size::new(640, 480)),
            OutputRequest {
                otf_out: true,
                ..OutputRequest::default()
            },
        ];
        let err = reallocate_flip_ports(&caps, &o, &StripeContext::disabled()).unwrap_err();
        assert_eq!(err.category(), "flip_reallocation");
    }

    #[test]
    fn test_striped_frame_is_fatal() {
        let caps = HwVariant::Mcsc5.table();
        let mut o = outputs(5);
        o[0] = flipped(4608);
        let stripe = StripeContext::new(2, 8000, 4000, 64);
        assert!(reallocate_flip_ports(&caps, &o, &stripe).is_err());
    }

    #[test]
    fn test_half_windows_tile_the_output() {
        let dst = Size::new(4608, 2592);
        let (a, ax) = FlipHalf::Primary.window(dst, 3840).unwrap();
        let (b, bx) = FlipHalf::Secondary.window(dst, 3840).unwrap();
        assert_eq!((a.x, a.w, ax), (0, 3840, 0));
        assert_eq!((b.x, b.w, bx), (3840, 768, 3840));
        assert_eq!(a.w + b.w, dst.w);
        assert!(FlipHalf::Whole.window(dst, 3840).is_none());
    }
}
