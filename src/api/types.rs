//! Types handed to estimate consumers

use crate::core::{AnchorId, AnchorPosition, PositionEstimate};
use serde::{Deserialize, Serialize};

/// One configured anchor as seen by a single estimation tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorState {
    pub id: AnchorId,
    pub position: AnchorPosition,
    /// Calibrated range in meters, absent when no valid range is held
    pub distance: Option<f64>,
}

impl AnchorState {
    pub fn has_range(&self) -> bool {
        self.distance.is_some()
    }
}

/// Geometry quality of a fresh fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixQuality {
    /// Anchors that contributed to the solve
    pub anchors_used: usize,
    /// RMS residual of the linear system
    pub residual_rms: f64,
    /// Condition number of the coefficient matrix
    pub condition_number: f64,
}

/// Where the reported tag position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    /// Solved this tick
    Fresh,
    /// Previous fix repeated because this tick's geometry was degenerate
    Held,
    /// No position this tick
    None,
}

/// Everything the consumer receives for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateFrame {
    /// Tick counter, starting at 1
    pub sequence: u64,
    /// Every configured anchor, in layout order
    pub per_anchor: Vec<AnchorState>,
    pub tag_position: PositionEstimate,
    pub source: EstimateSource,
    /// Present only when `source` is `Fresh`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quality: Option<FixQuality>,
}

impl EstimateFrame {
    pub fn valid_anchor_count(&self) -> usize {
        self.per_anchor.iter().filter(|a| a.has_range()).count()
    }

    pub fn anchor(&self, id: &AnchorId) -> Option<&AnchorState> {
        self.per_anchor.iter().find(|a| &a.id == id)
    }
}
