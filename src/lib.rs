//! # Multi-Channel Scaler Planner
//!
//! Plans the per-frame configuration of a multi-channel scaler block: one input frame is
//! cropped and scaled into several outputs at once, each through a poly stage and an
//! optional post stage, possibly split into horizontal stripes and possibly spread over
//! two ports when a flipped output is wider than the line buffer.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `planning`: frame-level planning (stripes, port borrowing, orchestration)
//! - `config`: planner flags and the JSON frame description
//! - `render`: CPU preview of a frame plan on a real image
//! - `error`: error type with context and severity
//!
//! Per-output arithmetic (ratio bands, calibration interpolation, the CPU stage model)
//! lives in the `mcsc_scale` crate.
//!
//! ## Example
//!
//! ```rust
//! use mcsc_planner::config::PlannerConfig;
//! use mcsc_planner::planning::{plan_frame, reset_stripe_context, OutputRequest, StripeContext};
//! use mcsc_scale::caps::HwVariant;
//! use mcsc_scale::geometry::{Rect, Size};
//!
//! # fn main() -> Result<(), mcsc_planner::PlannerError> {
//! let caps = HwVariant::Mcsc5.table();
//! let mut outputs = vec![OutputRequest::default(); caps.channel_count()];
//! outputs[0] = OutputRequest::dma(Rect::new(0, 0, 3840, 2160), Size::new(640, 360));
//!
//! let mut stripe = StripeContext::disabled();
//! reset_stripe_context(&mut stripe);
//! let plan = plan_frame(&caps, &outputs, &mut stripe, &PlannerConfig::default())?;
//!
//! let port = plan.ports[0].scale_plan().expect("output 0 is enabled");
//! assert_eq!(port.poly.dst, Size::new(960, 540));
//! assert!(port.post.enabled);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod planning;
pub mod render;

/// Re-export error types for convenience
pub use error::{ErrorSeverity, HasSeverity, PlannerError, PlannerResult};

/// Re-export the entry points
pub use planning::{plan_frame, reset_stripe_context, FramePlan, StripeContext};
