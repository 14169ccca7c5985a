//! Calibration binding: named tables evaluated at the frame's noise index.

use std::collections::BTreeMap;

use log::debug;
use mcsc_scale::interp::CalibrationTable;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, PlannerResult};

/// Tuning tables of the active scenario, keyed by parameter name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Calibration {
    pub tables: BTreeMap<String, CalibrationTable>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table built from `(index, value)` pairs.
    pub fn with_table(mut self, name: impl Into<String>, pairs: &[(u32, i32)]) -> PlannerResult<Self> {
        let name = name.into();
        let table = CalibrationTable::from_pairs(pairs)
            .map_err(|e| PlannerError::calibration(name.clone(), e.to_string()))?;
        self.tables.insert(name, table);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every table evaluated at `noise_index` (pre-scaled by ten).
    pub fn interpolate_all(&self, noise_index: u32) -> BTreeMap<String, i32> {
        self.tables
            .iter()
            .map(|(name, table)| {
                let value = table.interpolate(noise_index);
                debug!("tuning {name} at noise index {noise_index}: {value}");
                (name.clone(), value)
            })
            .collect()
    }
}

/// Calibration plus the noise index it is evaluated at.
#[derive(Clone, Copy, Debug)]
pub struct Tuning<'a> {
    pub calibration: &'a Calibration,
    pub noise_index: u32,
}
