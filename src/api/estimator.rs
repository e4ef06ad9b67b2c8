//! Periodic estimation driver
//!
//! Each tick snapshots the range store, applies calibration offsets, keeps
//! the anchors holding a valid range and, with at least three of them, runs
//! the multilateration engine. Degenerate geometry is an expected transient
//! condition and never stops the loop.

use crate::algorithms::geometry::AnchorLayout;
use crate::algorithms::multilateration::{MultilaterationEngine, MultilaterationError};
use crate::api::formatting::EstimateSink;
use crate::api::types::{AnchorState, EstimateFrame, EstimateSource, FixQuality};
use crate::core::{is_valid_range, AnchorId, AnchorPosition, PositionEstimate, MIN_ANCHORS};
use crate::processing::store::RangeStore;
use crate::utils::config::{Config, DegeneratePolicy};
use crate::utils::shutdown::Shutdown;
use crate::utils::ticker::Ticker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Tick counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstimatorStats {
    pub ticks: u64,
    pub fixes: u64,
    pub held: u64,
    pub insufficient: u64,
    pub degenerate: u64,
    pub publish_failures: u64,
}

#[derive(Debug)]
pub struct Estimator {
    layout: Arc<AnchorLayout>,
    store: RangeStore,
    engine: MultilaterationEngine,
    offsets: HashMap<AnchorId, f64>,
    policy: DegeneratePolicy,
    last_fix: Option<PositionEstimate>,
    stats: EstimatorStats,
}

impl Estimator {
    pub fn new(layout: Arc<AnchorLayout>, store: RangeStore) -> Self {
        Self {
            layout,
            store,
            engine: MultilaterationEngine::default(),
            offsets: HashMap::new(),
            policy: DegeneratePolicy::Hold,
            last_fix: None,
            stats: EstimatorStats::default(),
        }
    }

    /// Estimator with the offsets and degenerate policy from `config`
    pub fn from_config(config: &Config, layout: Arc<AnchorLayout>, store: RangeStore) -> Self {
        Self::new(layout, store)
            .with_offsets(config.range_offsets.clone())
            .with_policy(config.on_degenerate)
    }

    /// Additive per-anchor range corrections, in meters
    pub fn with_offsets(mut self, offsets: HashMap<AnchorId, f64>) -> Self {
        self.offsets = offsets;
        self
    }

    pub fn with_policy(mut self, policy: DegeneratePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> &EstimatorStats {
        &self.stats
    }

    /// Run one estimation cycle against the current store contents
    pub fn tick(&mut self) -> EstimateFrame {
        self.stats.ticks += 1;
        let snapshot = self.store.snapshot();

        let mut per_anchor = Vec::with_capacity(self.layout.len());
        let mut measurements: Vec<(AnchorPosition, f64)> = Vec::with_capacity(self.layout.len());

        for (id, position) in self.layout.iter() {
            let offset = self.offsets.get(id).copied().unwrap_or(0.0);
            let distance = snapshot
                .get(id)
                .map(|raw| raw + offset)
                .filter(|d| is_valid_range(*d));

            if let Some(d) = distance {
                measurements.push((*position, d));
            }
            per_anchor.push(AnchorState {
                id: id.clone(),
                position: *position,
                distance,
            });
        }

        let (tag_position, source, quality) = match self.engine.solve(&measurements) {
            Ok(solution) => {
                self.stats.fixes += 1;
                let position = PositionEstimate::at(solution.x, solution.y);
                self.last_fix = Some(position);
                let quality = FixQuality {
                    anchors_used: measurements.len(),
                    residual_rms: solution.residual_rms,
                    condition_number: solution.condition_number,
                };
                (position, EstimateSource::Fresh, Some(quality))
            }
            Err(MultilaterationError::InsufficientAnchors { available, .. }) => {
                self.stats.insufficient += 1;
                trace!(available, required = MIN_ANCHORS, "not enough ranged anchors");
                (PositionEstimate::Unavailable, EstimateSource::None, None)
            }
            Err(error) => {
                self.stats.degenerate += 1;
                debug!(%error, "suppressing estimate");
                match (self.policy, self.last_fix) {
                    (DegeneratePolicy::Hold, Some(previous)) => {
                        self.stats.held += 1;
                        (previous, EstimateSource::Held, None)
                    }
                    _ => (PositionEstimate::Unavailable, EstimateSource::None, None),
                }
            }
        };

        EstimateFrame {
            sequence: self.stats.ticks,
            per_anchor,
            tag_position,
            source,
            quality,
        }
    }

    /// Tick at `cadence` and publish every frame until shutdown is requested
    pub fn run<S>(&mut self, sink: &mut S, cadence: Duration, shutdown: &Shutdown) -> EstimatorStats
    where
        S: EstimateSink + ?Sized,
    {
        let mut ticker = Ticker::new(cadence);
        info!(
            cadence_ms = ticker.period().as_millis() as u64,
            anchors = self.layout.len(),
            "estimator started"
        );

        while ticker.wait(shutdown) {
            let frame = self.tick();
            if let Err(error) = sink.publish(&frame) {
                self.stats.publish_failures += 1;
                warn!(%error, sequence = frame.sequence, "failed to publish estimate");
            }
        }

        info!(
            ticks = self.stats.ticks,
            fixes = self.stats.fixes,
            missed = ticker.missed(),
            "estimator stopped"
        );
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::geometry::LayoutMode;
    use crate::network::worker::{SessionProcessor, WorkerSettings};
    use approx::assert_abs_diff_eq;
    use std::io::{self, Cursor};
    use std::thread;

    fn triangle_layout() -> Arc<AnchorLayout> {
        let ids: Vec<AnchorId> = vec!["50".into(), "51".into(), "52".into()];
        let mode = LayoutMode::TriangleFromDistances { d_ab: 10.0, d_ac: 8.0, d_bc: 6.0 };
        Arc::new(AnchorLayout::from_mode(&ids, &mode).unwrap())
    }

    fn collinear_layout() -> Arc<AnchorLayout> {
        Arc::new(
            AnchorLayout::literal(vec![
                (AnchorId::from("1"), AnchorPosition::new(0.0, 0.0)),
                (AnchorId::from("2"), AnchorPosition::new(5.0, 0.0)),
                (AnchorId::from("3"), AnchorPosition::new(10.0, 0.0)),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_end_to_end_triangle_scenario() {
        let layout = triangle_layout();
        let store = RangeStore::new();
        let processor = SessionProcessor::new(layout.clone(), store.clone(), WorkerSettings::default());

        let stream = Cursor::new(
            b"{\"links\":[{\"A\":\"50\",\"R\":\"6\"},{\"A\":\"51\",\"R\":\"6\"},{\"A\":\"52\",\"R\":\"5\"}]}\n".to_vec(),
        );
        let outcome = processor.run_session(stream, "test", &Shutdown::new());
        assert_eq!(outcome.stats.frames_applied, 1);

        let mut estimator = Estimator::new(layout.clone(), store);
        let frame = estimator.tick();

        // Expected fix from the linearized equations against anchor 50 at the origin
        let a = layout.position(&"50".into()).unwrap();
        let b = layout.position(&"51".into()).unwrap();
        let c = layout.position(&"52".into()).unwrap();
        assert_eq!((a.x, a.y), (0.0, 0.0));
        assert_eq!(b.y, 0.0);
        let (r0, r1, r2) = (6.0_f64, 6.0_f64, 5.0_f64);
        let x = (r0 * r0 - r1 * r1 + b.x * b.x) / (2.0 * b.x);
        let y = (r0 * r0 - r2 * r2 + c.x * c.x + c.y * c.y - 2.0 * c.x * x) / (2.0 * c.y);

        let (ex, ey) = frame.tag_position.coordinates().unwrap();
        assert_abs_diff_eq!(ex, x, epsilon = 0.01);
        assert_abs_diff_eq!(ey, y, epsilon = 0.01);
        assert_eq!(frame.source, EstimateSource::Fresh);
        assert_eq!(frame.valid_anchor_count(), 3);
        assert_eq!(frame.quality.map(|q| q.anchors_used), Some(3));
    }

    #[test]
    fn test_fewer_than_three_ranges_is_unavailable() {
        let store = RangeStore::new();
        store.update("50".into(), 6.0);
        store.update("51".into(), 6.0);
        store.update("52".into(), 0.0);

        let mut estimator = Estimator::new(triangle_layout(), store);
        let frame = estimator.tick();

        assert_eq!(frame.tag_position, PositionEstimate::Unavailable);
        assert_eq!(frame.valid_anchor_count(), 2);
        assert_eq!(frame.anchor(&"52".into()).and_then(|a| a.distance), None);
        assert_eq!(estimator.stats().insufficient, 1);
    }

    #[test]
    fn test_offsets_applied_before_validity_check() {
        let store = RangeStore::new();
        store.update("50".into(), 6.5);
        store.update("51".into(), 6.0);
        store.update("52".into(), 0.2);

        let mut offsets = HashMap::new();
        offsets.insert(AnchorId::from("50"), -0.5);
        offsets.insert(AnchorId::from("52"), -0.3);

        let mut estimator = Estimator::new(triangle_layout(), store).with_offsets(offsets);
        let frame = estimator.tick();

        assert_eq!(frame.anchor(&"50".into()).and_then(|a| a.distance), Some(6.0));
        // 0.2 - 0.3 is no longer a usable range
        assert_eq!(frame.anchor(&"52".into()).and_then(|a| a.distance), None);
        assert!(!frame.tag_position.is_available());
    }

    #[test]
    fn test_degenerate_without_prior_fix_is_unavailable() {
        // Collinear anchors: every tick is degenerate, nothing to hold yet
        let store = RangeStore::new();
        store.update("1".into(), 3.0);
        store.update("2".into(), 3.0);
        store.update("3".into(), 7.0);

        let mut estimator = Estimator::new(collinear_layout(), store).with_policy(DegeneratePolicy::Hold);
        let frame = estimator.tick();
        assert_eq!(frame.tag_position, PositionEstimate::Unavailable);
        assert_eq!(estimator.stats().degenerate, 1);
    }

    #[test]
    fn test_hold_repeats_last_fix() {
        let layout = Arc::new(
            AnchorLayout::literal(vec![
                (AnchorId::from("1"), AnchorPosition::new(0.0, 0.0)),
                (AnchorId::from("2"), AnchorPosition::new(0.0, 0.0)),
                (AnchorId::from("3"), AnchorPosition::new(10.0, 0.0)),
                (AnchorId::from("4"), AnchorPosition::new(0.0, 10.0)),
            ])
            .unwrap(),
        );
        let store = RangeStore::new();
        store.update("1".into(), 5.0);
        store.update("3".into(), 5.0);
        store.update("4".into(), 5.0);

        let mut hold = Estimator::new(layout.clone(), store.clone()).with_policy(DegeneratePolicy::Hold);
        let mut unavailable =
            Estimator::new(layout, store.clone()).with_policy(DegeneratePolicy::Unavailable);

        let first = hold.tick();
        assert_eq!(first.source, EstimateSource::Fresh);
        assert!(unavailable.tick().tag_position.is_available());

        // Only the two coincident anchors and one more remain ranged: rank deficient
        store.update("2".into(), 5.0);
        store.update("4".into(), 0.0);

        let held = hold.tick();
        assert_eq!(held.source, EstimateSource::Held);
        assert_eq!(held.tag_position, first.tag_position);
        assert!(held.quality.is_none());

        let dropped = unavailable.tick();
        assert_eq!(dropped.source, EstimateSource::None);
        assert_eq!(dropped.tag_position, PositionEstimate::Unavailable);
    }

    struct FailingSink;

    impl EstimateSink for FailingSink {
        fn publish(&mut self, _frame: &EstimateFrame) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_run_publishes_until_shutdown() {
        let store = RangeStore::new();
        store.update("50".into(), 6.0);
        store.update("51".into(), 6.0);
        store.update("52".into(), 5.0);

        let shutdown = Shutdown::new();
        let stopper = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(120));
                shutdown.trigger();
            })
        };

        let mut frames = Vec::new();
        let mut sink = |frame: &EstimateFrame| frames.push(frame.clone());
        let mut estimator = Estimator::new(triangle_layout(), store);
        let stats = estimator.run(&mut sink, Duration::from_millis(10), &shutdown);
        stopper.join().unwrap();

        assert!(stats.ticks >= 2);
        assert_eq!(stats.ticks as usize, frames.len());
        assert!(frames.iter().all(|f| f.tag_position.is_available()));
        assert!(frames.windows(2).all(|w| w[1].sequence == w[0].sequence + 1));
    }

    #[test]
    fn test_publish_failure_does_not_stop_run() {
        let shutdown = Shutdown::new();
        let stopper = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                shutdown.trigger();
            })
        };

        let mut estimator = Estimator::new(triangle_layout(), RangeStore::new());
        let stats = estimator.run(&mut FailingSink, Duration::from_millis(10), &shutdown);
        stopper.join().unwrap();

        assert!(stats.ticks >= 2);
        assert_eq!(stats.publish_failures, stats.ticks);
    }
}
