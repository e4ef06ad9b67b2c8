//! Estimate output: the sink trait and the stock sinks
//!
//! A sink receives one [`EstimateFrame`] per estimation tick. It is purely a
//! consumer and has no way to influence the estimator.

use crate::api::types::{EstimateFrame, EstimateSource};
use crate::core::PositionEstimate;
use std::io::{self, Write};
use tracing::{debug, info};

/// Receiver of per-tick estimates
pub trait EstimateSink {
    fn publish(&mut self, frame: &EstimateFrame) -> io::Result<()>;
}

impl<F> EstimateSink for F
where
    F: FnMut(&EstimateFrame),
{
    fn publish(&mut self, frame: &EstimateFrame) -> io::Result<()> {
        self(frame);
        Ok(())
    }
}

/// Human-readable one-liner for a tick
pub fn describe(frame: &EstimateFrame) -> String {
    match frame.tag_position {
        PositionEstimate::Available { x, y } => {
            let mut text = format!("Tag position: x={:.2}, y={:.2}", x, y);
            if frame.source == EstimateSource::Held {
                text.push_str(" (held)");
            }
            text
        }
        PositionEstimate::Unavailable => format!(
            "Tag position: unavailable ({} of {} anchors ranged)",
            frame.valid_anchor_count(),
            frame.per_anchor.len()
        ),
    }
}

/// Logs each tick through `tracing`. Fresh fixes go out at info level,
/// everything else at debug so an idle tag does not flood the log.
#[derive(Debug, Default)]
pub struct LogSink {
    last: Option<PositionEstimate>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EstimateSink for LogSink {
    fn publish(&mut self, frame: &EstimateFrame) -> io::Result<()> {
        let changed = self.last != Some(frame.tag_position);
        if frame.source == EstimateSource::Fresh && changed {
            info!(sequence = frame.sequence, "{}", describe(frame));
        } else {
            debug!(sequence = frame.sequence, "{}", describe(frame));
        }
        self.last = Some(frame.tag_position);
        Ok(())
    }
}

/// Writes each tick as one JSON document per line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EstimateSink for JsonLinesSink<W> {
    fn publish(&mut self, frame: &EstimateFrame) -> io::Result<()> {
        let encoded = serde_json::to_string(frame).map_err(io::Error::from)?;

        self.writer.write_all(encoded.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
