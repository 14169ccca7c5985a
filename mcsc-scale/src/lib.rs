// SPDX-License-Identifier: MIT
//! # mcsc-scale: Stage-Level Planning for Multi-Channel Scaler Blocks
//!
//! This crate holds the stateless pieces of the multi-channel scaler planner: the
//! arithmetic that decides how one output is scaled, and the lookup that turns a noise
//! index into tuning values. Frame-level concerns (stripes, port borrowing, ordering of
//! outputs) live in `mcsc-planner`, which builds on this crate.
//!
//! ## Key Components
//!
//! - [`geometry`]: `Size`/`Rect`, alignment rounding and fixed-point ratio helpers
//! - [`caps`]: capability table of a scaler instance and reference hardware variants
//! - [`ratio`]: two-stage (poly + post) ratio planner for one output
//! - [`interp`]: piecewise-linear calibration interpolation over a noise index
//! - [`cpu`]: CPU reference model of the stage chain using fast_image_resize
//!
//! ## Usage Example
//!
//! ```rust
//! use mcsc_scale::caps::HwVariant;
//! use mcsc_scale::geometry::{Rect, Size};
//! use mcsc_scale::ratio::{plan_ratio, RatioPolicy};
//!
//! let caps = HwVariant::Mcsc5.table();
//! let plan = plan_ratio(
//!     &caps,
//!     &caps.channels[0],
//!     Rect::new(0, 0, 4032, 3024),
//!     Size::new(3024, 2268),
//!     RatioPolicy::default(),
//! );
//! assert!(plan.poly.enabled);
//! assert!(!plan.post.enabled);
//! ```

pub mod caps;
pub mod cpu;
pub mod geometry;
pub mod interp;
pub mod ratio;
