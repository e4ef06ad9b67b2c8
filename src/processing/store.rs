//! Latest-range store shared between ingestion and estimation
//!
//! Holds at most one distance per anchor (last write wins). Readers always get
//! a point-in-time copy, never a live view.

use crate::core::{AnchorId, RangeReading};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time copy of the store contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeSnapshot {
    ranges: HashMap<AnchorId, f64>,
}

impl RangeSnapshot {
    pub fn get(&self, anchor_id: &AnchorId) -> Option<f64> {
        self.ranges.get(anchor_id).copied()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnchorId, f64)> {
        self.ranges.iter().map(|(id, d)| (id, *d))
    }
}

/// Shared, lock-guarded map of anchor id to most recent distance.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct RangeStore {
    inner: Arc<Mutex<HashMap<AnchorId, f64>>>,
}

impl RangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the latest distance for one anchor
    pub fn update(&self, anchor_id: AnchorId, distance_m: f64) {
        self.inner.lock().insert(anchor_id, distance_m);
    }

    /// Upsert several readings under one lock acquisition
    pub fn merge<I>(&self, readings: I)
    where
        I: IntoIterator<Item = RangeReading>,
    {
        let mut ranges = self.inner.lock();
        for reading in readings {
            ranges.insert(reading.anchor_id, reading.distance_m);
        }
    }

    /// Atomically replace the whole set with the given readings
    pub fn replace_all<I>(&self, readings: I)
    where
        I: IntoIterator<Item = RangeReading>,
    {
        let fresh: HashMap<AnchorId, f64> = readings
            .into_iter()
            .map(|r| (r.anchor_id, r.distance_m))
            .collect();
        *self.inner.lock() = fresh;
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn snapshot(&self) -> RangeSnapshot {
        RangeSnapshot {
            ranges: self.inner.lock().clone(),
        }
    }
}
