//! Regime segmentation of featured history

use crate::models::{FeaturedSample, Regime, TrainingSet};
use tracing::debug;

/// Charging and discharging training sets for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedHistory {
    pub charging: TrainingSet,
    pub discharging: TrainingSet,
}

impl SegmentedHistory {
    pub fn get(&self, regime: Regime) -> &TrainingSet {
        match regime {
            Regime::Charging => &self.charging,
            Regime::Discharging => &self.discharging,
        }
    }
}

/// Split featured rows into per-regime training sets
///
/// Non-finite targets are treated as missing. Rows while idle, or without a
/// target, land in neither set. Either set may come back empty.
pub fn segment(rows: &[FeaturedSample]) -> SegmentedHistory {
    let mut charging = Vec::new();
    let mut discharging = Vec::new();

    for row in rows {
        let mut row = row.clone();
        row.time_to_full = row.time_to_full.filter(|t| t.is_finite());
        row.time_to_zero = row.time_to_zero.filter(|t| t.is_finite());

        let current = row.sample.current;
        if Regime::Charging.matches_current(current) && row.time_to_full.is_some() {
            charging.push(row);
        } else if Regime::Discharging.matches_current(current) && row.time_to_zero.is_some() {
            discharging.push(row);
        }
    }

    debug!(
        total = rows.len(),
        charging = charging.len(),
        discharging = discharging.len(),
        "Segmented history"
    );

    SegmentedHistory {
        charging: TrainingSet::new(Regime::Charging, charging),
        discharging: TrainingSet::new(Regime::Discharging, discharging),
    }
}
