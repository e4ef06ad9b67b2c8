//! Core data types for the positioning system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label identifying a fixed anchor, unique within a deployment.
///
/// Anchors report their identifier either as a JSON string (`"1786"`) or a
/// number (`1786`); both forms resolve to the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        AnchorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        AnchorId::new(id)
    }
}

impl From<String> for AnchorId {
    fn from(id: String) -> Self {
        AnchorId(id)
    }
}

impl From<u32> for AnchorId {
    fn from(id: u32) -> Self {
        AnchorId(id.to_string())
    }
}

/// 2D anchor coordinate in meters, in the shared reference frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPosition {
    pub x: f64,
    pub y: f64,
}

impl AnchorPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &AnchorPosition) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A single range report for one anchor.
///
/// Only the latest reading per anchor is ever kept; arrival time is not stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReading {
    pub anchor_id: AnchorId,
    pub distance_m: f64,
}

impl RangeReading {
    pub fn new(anchor_id: impl Into<AnchorId>, distance_m: f64) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            distance_m,
        }
    }

    /// Negative, zero and non-finite distances count as "no reading"
    pub fn is_valid(&self) -> bool {
        is_valid_range(self.distance_m)
    }
}

/// Whether a distance is usable by the solver
pub fn is_valid_range(distance_m: f64) -> bool {
    distance_m.is_finite() && distance_m > 0.0
}

/// Tag position produced by one estimation cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PositionEstimate {
    Available { x: f64, y: f64 },
    Unavailable,
}

impl PositionEstimate {
    pub fn at(x: f64, y: f64) -> Self {
        PositionEstimate::Available { x, y }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PositionEstimate::Available { .. })
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match *self {
            PositionEstimate::Available { x, y } => Some((x, y)),
            PositionEstimate::Unavailable => None,
        }
    }
}
