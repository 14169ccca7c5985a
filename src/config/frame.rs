//! # Frame Description
//!
//! JSON document describing one frame to plan: the scaler instance, what every output
//! should produce, the stripe layout and the tuning inputs.
//!
//! ```json
//! {
//!   "variant": "mcsc5",
//!   "outputs": [
//!     { "crop": { "x": 0, "y": 0, "w": 4032, "h": 3024 },
//!       "dst": { "w": 2016, "h": 1512 }, "dma_out": true, "use_out_crop": true }
//!   ],
//!   "stripe": { "total_count": 3, "full_width": 4032, "margin": 64 },
//!   "noise_index": 250,
//!   "calibration": { "sharpness": [{ "index": 0, "value": 10 }, { "index": 40, "value": 30 }] },
//!   "config": { "dump_once": false }
//! }
//! ```
//!
//! `variant` and `capabilities` are mutually exclusive; with neither, the default table
//! is used. Outputs not listed are disabled.

use std::fs;
use std::path::Path;

use mcsc_scale::caps::{CapabilityTable, HwVariant};
use serde::{Deserialize, Serialize};

use super::PlannerConfig;
use crate::error::{PlannerError, PlannerResult};
use crate::planning::{Calibration, OutputRequest, StripeContext, Tuning};

/// How the frame is split into stripes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeLayout {
    pub total_count: u32,
    pub full_width: u32,
    /// Defaults to the frame width divided evenly, rounded up.
    #[serde(default)]
    pub stripe_width: Option<u32>,
    #[serde(default)]
    pub margin: u32,
}

impl StripeLayout {
    pub fn context(&self) -> StripeContext {
        let stripe_width = self
            .stripe_width
            .unwrap_or_else(|| self.full_width.div_ceil(self.total_count.max(1)));
        StripeContext::new(self.total_count, self.full_width, stripe_width, self.margin)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDescription {
    #[serde(default)]
    pub variant: Option<HwVariant>,
    #[serde(default)]
    pub capabilities: Option<CapabilityTable>,
    pub outputs: Vec<OutputRequest>,
    #[serde(default)]
    pub stripe: Option<StripeLayout>,
    /// Noise index, pre-scaled by ten.
    #[serde(default)]
    pub noise_index: Option<u32>,
    #[serde(default)]
    pub calibration: Calibration,
    #[serde(default)]
    pub config: PlannerConfig,
}

impl FrameDescription {
    pub fn load(path: impl AsRef<Path>) -> PlannerResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            PlannerError::io("read frame description", e).with_path(path.display().to_string())
        })?;
        Self::from_json(&data).map_err(|e| e.with_context(path.display().to_string()))
    }

    pub fn from_json(data: &str) -> PlannerResult<Self> {
        let frame: Self = serde_json::from_str(data)?;
        frame.validate()?;
        Ok(frame)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.variant.is_some() && self.capabilities.is_some() {
            return Err(PlannerError::config(
                "variant",
                format!("{:?}", self.variant),
                "cannot be combined with an explicit capabilities table",
            ));
        }
        let caps = self.capability_table();
        caps.validate()
            .map_err(|e| PlannerError::config("capabilities", "", e.to_string()))?;
        if self.outputs.len() > caps.channel_count() {
            return Err(PlannerError::validation(
                "outputs",
                format!("at most {} outputs", caps.channel_count()),
                self.outputs.len().to_string(),
            ));
        }
        if let Some(layout) = &self.stripe {
            if layout.total_count == 0 {
                return Err(PlannerError::config(
                    "stripe.total_count",
                    "0",
                    "omit the stripe section for unstriped frames",
                ));
            }
            layout.context().validate()?;
        }
        self.config.validate()
    }

    pub fn capability_table(&self) -> CapabilityTable {
        match (&self.capabilities, self.variant) {
            (Some(caps), _) => caps.clone(),
            (None, Some(variant)) => variant.table(),
            (None, None) => CapabilityTable::default(),
        }
    }

    /// One request per channel of `caps`, unlisted channels disabled.
    pub fn requests(&self, caps: &CapabilityTable) -> Vec<OutputRequest> {
        let mut requests = self.outputs.clone();
        requests.resize(caps.channel_count().max(requests.len()), OutputRequest::default());
        requests
    }

    pub fn stripe_context(&self) -> StripeContext {
        self.stripe
            .map(|layout| layout.context())
            .unwrap_or_else(StripeContext::disabled)
    }

    /// Calibration inputs, when the frame has both tables and a noise index.
    pub fn tuning(&self) -> Option<Tuning<'_>> {
        match self.noise_index {
            Some(noise_index) if !self.calibration.is_empty() => Some(Tuning {
                calibration: &self.calibration,
                noise_index,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &str = r#"{
        "variant": "mcsc3",
        "outputs": [
            {"crop": {"x": 0, "y": 0, "w": 4032, "h": 3024}, "dst": {"w": 2016, "h": 1512}, "dma_out": true}
        ],
        "stripe": {"total_count": 3, "full_width": 4032, "margin": 64},
        "noise_index": 20,
        "calibration": {"gain": [{"index": 0, "value": 0}, {"index": 4, "value": 8}]}
    }"#;

    #[test]
    fn test_parse_frame() {
        let frame = FrameDescription::from_json(FRAME).unwrap();
        let caps = frame.capability_table();
        assert_eq!(caps.channel_count(), 3);
        assert_eq!(frame.requests(&caps).len(), 3);
        let ctx = frame.stripe_context();
        assert_eq!((ctx.total_count, ctx.stripe_width), (3, 1344));
        let tuning = frame.tuning().unwrap();
        assert_eq!(tuning.calibration.interpolate_all(tuning.noise_index).get("gain"), Some(&4));
    }

    #[test]
    fn test_variant_and_capabilities_conflict() {
        let mut frame = FrameDescription::from_json(FRAME).unwrap();
        frame.capabilities = Some(HwVariant::Mcsc5.table());
        assert_eq!(frame.validate().unwrap_err().category(), "config");
    }

    #[test]
    fn test_too_many_outputs() {
        let mut frame = FrameDescription::from_json(FRAME).unwrap();
        frame.outputs = vec![OutputRequest::default(); 4];
        assert_eq!(frame.validate().unwrap_err().category(), "validation");
    }

    #[test]
    fn test_zero_stripes_rejected() {
        let mut frame = FrameDescription::from_json(FRAME).unwrap();
        frame.stripe = Some(StripeLayout {
            total_count: 0,
            full_width: 4032,
            stripe_width: None,
            margin: 0,
        });
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_no_tuning_without_noise_index() {
        let mut frame = FrameDescription::from_json(FRAME).unwrap();
        frame.noise_index = None;
        assert!(frame.tuning().is_none());
    }
}
