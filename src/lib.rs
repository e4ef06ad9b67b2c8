//! UWB Tag Positioning
//!
//! Receives streamed UWB range reports over TCP, keeps the latest range per
//! anchor and estimates the tag's 2D position on a fixed cadence by
//! least-squares multilateration.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod network;
pub mod api;
pub mod utils;

use thiserror::Error;

// Re-export commonly used types
pub use core::{AnchorId, AnchorPosition, PositionEstimate, RangeReading};
pub use algorithms::{
    AnchorLayout, GeometryError, GeometrySolver, LayoutMode, MultilaterationEngine,
    MultilaterationError, Solution,
};
pub use processing::{parse_frame, LineFramer, LinkReport, ParseError, RangeStore};
pub use network::{ConnectionError, IngestionWorker, SessionProcessor, WorkerSettings};
pub use api::{EstimateFrame, EstimateSink, Estimator, JsonLinesSink, LogSink};
pub use utils::{Config, ConfigError, DegeneratePolicy, IngestMode, Shutdown};

/// Errors that abort startup. Everything after startup is absorbed and logged.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot establish anchor coordinates: {0}")]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("failed to spawn ingestion thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ingestion thread panicked")]
    IngestionPanicked,
}
