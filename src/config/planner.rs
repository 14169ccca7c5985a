//! # Planner Flags
//!
//! Per-device switches that change how a frame is planned. They are passed explicitly to
//! every [`plan_frame`](crate::planning::plan_frame) call.
//!
//! | Flag | Effect |
//! |------|--------|
//! | `skip_setfile` | calibration tables are not evaluated |
//! | `bypass` | outputs pass their crop through without scaling |
//! | `dump_once` | the finished plan is logged once as JSON |
//! | `post_quality_workaround` | poly destination is rounded to the output aspect |
//!
//! ## Examples
//!
//! ```rust
//! use mcsc_planner::config::PlannerConfig;
//!
//! let mut config = PlannerConfig {
//!     dump_once: true,
//!     ..PlannerConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! assert!(config.take_dump_once());
//! assert!(!config.dump_once);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

/// Flags controlling frame planning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Do not compute calibration tuning values.
    pub skip_setfile: bool,

    /// Skip the ratio planner: every enabled output writes its crop unscaled.
    pub bypass: bool,

    /// Log the next frame plan as JSON at info level.
    ///
    /// The planner never clears the flag itself; callers that want a single dump use
    /// [`PlannerConfig::take_dump_once`] after planning.
    pub dump_once: bool,

    /// Round the poly destination so both post ratios match the output aspect.
    pub post_quality_workaround: bool,
}

impl PlannerConfig {
    /// Validates the flag combination.
    pub fn validate(&self) -> PlannerResult<()> {
        if self.bypass && self.post_quality_workaround {
            return Err(PlannerError::config(
                "post_quality_workaround",
                "true",
                "has no effect while bypass is set",
            ));
        }
        Ok(())
    }

    /// Returns the current `dump_once` value and clears it.
    pub fn take_dump_once(&mut self) -> bool {
        std::mem::take(&mut self.dump_once)
    }
}
