//! # Frame Planning
//!
//! Frame-level planning on top of the per-output ratio planner of `mcsc_scale`:
//!
//! - [`request`]: what each output should produce
//! - [`stripe`]: splitting outputs across horizontal stripes
//! - [`flip`]: borrowing a second port for wide flipped outputs
//! - [`tuning`]: calibration tables evaluated at the frame's noise index
//! - [`orchestrator`]: [`plan_frame`] tying the above together

pub mod flip;
pub mod orchestrator;
pub mod request;
pub mod stripe;
pub mod tuning;

pub use flip::{reallocate_flip_ports, ChannelMap, ChannelRoute, FlipAllocation, FlipHalf};
pub use orchestrator::{
    plan_frame, plan_frame_tuned, plan_stripes, Diagnostic, DiagnosticKind, DisableReason,
    FramePlan, PortPlan, ScalePlan,
};
pub use request::{stripe_align, Compression, Flip, OutputFormat, OutputRequest, PixelLayout};
pub use stripe::{reset_stripe_context, StripeContext, StripeRegion, StripeSpan};
pub use tuning::{Calibration, Tuning};
