//! Estimation loop and the consumer-facing output
//!
//! The [`Estimator`] turns the shared range store into one [`EstimateFrame`]
//! per tick and hands it to an [`EstimateSink`].

pub mod estimator;
pub mod formatting;
pub mod types;

pub use estimator::{Estimator, EstimatorStats};
pub use formatting::{describe, EstimateSink, JsonLinesSink, LogSink};
pub use types::{AnchorState, EstimateFrame, EstimateSource, FixQuality};
