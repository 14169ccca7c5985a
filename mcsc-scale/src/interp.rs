// SPDX-License-Identifier: MIT
//! # Calibration Interpolator
//!
//! Maps a continuous noise index to a tuning value with a piecewise-linear lookup over a
//! calibration table. Table indices are stored unscaled; the noise index the caller passes
//! is pre-scaled by 10, so every comparison is against `index * 10`.
//!
//! Interpolation runs in a fixed-point domain with [`INTERP_SHIFT`] fractional bits and is
//! shifted back at the end, so small value deltas over wide index spans do not collapse
//! to zero.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of entries in one calibration table.
pub const NI_MAX: usize = 16;

/// Fractional bits used while interpolating.
pub const INTERP_SHIFT: u32 = 12;

/// Scale applied to table indices before comparing with a noise index.
pub const NI_SCALE: u32 = 10;

/// One calibration point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub index: u32,
    pub value: i32,
}

/// Read-only table with strictly increasing indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CalibrationTable {
    entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    pub fn new(entries: Vec<CalibrationEntry>) -> Result<Self> {
        if entries.is_empty() {
            bail!("calibration table is empty");
        }
        if entries.len() > NI_MAX {
            bail!(
                "calibration table has {} entries, at most {NI_MAX} are supported",
                entries.len()
            );
        }
        if let Some(w) = entries.windows(2).find(|w| w[0].index >= w[1].index) {
            bail!(
                "calibration indices must be strictly increasing ({} then {})",
                w[0].index,
                w[1].index
            );
        }
        Ok(Self { entries })
    }

    /// Build from `(index, value)` pairs.
    pub fn from_pairs(pairs: &[(u32, i32)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(index, value)| CalibrationEntry { index, value })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[CalibrationEntry] {
        &self.entries
    }

    /// Tuning value for noise index `v` (pre-scaled by [`NI_SCALE`]).
    pub fn interpolate(&self, v: u32) -> i32 {
        let v = u64::from(v);
        let at = |k: usize| u64::from(self.entries[k].index) * u64::from(NI_SCALE);
        let first = &self.entries[0];
        let last = &self.entries[self.entries.len() - 1];

        if v <= at(0) {
            return first.value;
        }
        if v >= at(self.entries.len() - 1) {
            return last.value;
        }

        // v lies strictly between the first and last entry, so a bracket exists
        let k = self
            .entries
            .windows(2)
            .position(|w| {
                let hi = u64::from(w[1].index) * u64::from(NI_SCALE);
                v <= hi
            })
            .unwrap_or(self.entries.len() - 2);

        let (lo, hi) = (at(k), at(k + 1));
        if v == lo {
            return self.entries[k].value;
        }
        if v == hi {
            return self.entries[k + 1].value;
        }

        // i128: a full i32 value delta times a u32-wide index span does not fit in i64
        let v0 = i128::from(self.entries[k].value);
        let v1 = i128::from(self.entries[k + 1].value);
        let num = i128::from(v - lo);
        let den = i128::from(hi - lo);
        let shifted = (v0 << INTERP_SHIFT) + (((v1 - v0) << INTERP_SHIFT) * num) / den;
        (shifted >> INTERP_SHIFT) as i32
    }
}

impl<'de> Deserialize<'de> for CalibrationTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<CalibrationEntry>::deserialize(deserializer)?;
        CalibrationTable::new(entries).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CalibrationTable {
        CalibrationTable::from_pairs(&[(0, 10), (10, 20), (30, 60), (80, 60), (100, 200)]).unwrap()
    }

    #[test]
    fn test_clamps_outside_table() {
        let t = CalibrationTable::from_pairs(&[(5, 7), (9, 11)]).unwrap();
        assert_eq!(t.interpolate(0), 7);
        assert_eq!(t.interpolate(50), 7);
        assert_eq!(t.interpolate(90), 11);
        assert_eq!(t.interpolate(10_000), 11);
    }

    #[test]
    fn test_exact_entries_return_table_values() {
        let t = table();
        for e in t.entries() {
            assert_eq!(t.interpolate(e.index * NI_SCALE), e.value);
        }
    }

    #[test]
    fn test_linear_midpoint() {
        let t = table();
        // halfway between index 10 (20) and 30 (60)
        assert_eq!(t.interpolate(200), 40);
        // a quarter of the way between 80 (60) and 100 (200)
        assert_eq!(t.interpolate(850), 95);
        // flat segment
        assert_eq!(t.interpolate(555), 60);
    }

    #[test]
    fn test_monotonic_over_non_decreasing_table() {
        let t = table();
        let mut prev = t.interpolate(0);
        for v in 1..=1100 {
            let cur = t.interpolate(v);
            assert!(cur >= prev, "interp({v}) = {cur} < {prev}");
            prev = cur;
        }
    }

    #[test]
    fn test_decreasing_values() {
        let t = CalibrationTable::from_pairs(&[(0, 100), (10, 0)]).unwrap();
        assert_eq!(t.interpolate(50), 50);
        assert_eq!(t.interpolate(25), 75);
    }

    #[test]
    fn test_extreme_values_over_wide_span() {
        let t = CalibrationTable::from_pairs(&[(0, -2_000_000_000), (400_000_000, 2_000_000_000)])
            .unwrap();
        assert_eq!(t.interpolate(3_000_000_000), 1_000_000_000);
        assert_eq!(t.interpolate(2_000_000_000), 0);
        assert_eq!(t.interpolate(u32::MAX), 2_000_000_000);
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(CalibrationTable::new(Vec::new()).is_err());
        assert!(CalibrationTable::from_pairs(&[(10, 1), (10, 2)]).is_err());
        assert!(CalibrationTable::from_pairs(&[(10, 1), (5, 2)]).is_err());
        let too_many: Vec<(u32, i32)> = (0..=NI_MAX as u32).map(|i| (i, 0)).collect();
        assert!(CalibrationTable::from_pairs(&too_many).is_err());
    }
}
