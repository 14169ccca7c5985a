//! # Configuration Module
//!
//! This module provides the planner flags and the JSON frame description consumed by the
//! command-line tool.

pub mod frame;
pub mod planner;

pub use frame::{FrameDescription, StripeLayout};
pub use planner::PlannerConfig;
