use crate::algorithms::geometry::{AnchorLayout, GeometryError, LayoutMode};
use crate::core::{
    AnchorId, DEFAULT_BIND_ADDRESS, DEFAULT_CADENCE_MS, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT,
    DEFAULT_READ_TIMEOUT_MS, MIN_ANCHORS,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How a parsed frame is folded into the range store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Upsert each reported anchor, keep the others
    Merge,
    /// Each frame replaces the whole set
    Replace,
}

/// What the estimator emits when a tick's geometry is degenerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Re-emit the last good position
    Hold,
    /// Emit an unavailable marker
    Unavailable,
}

/// Runtime configuration, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the ingestion listener binds to
    pub bind_address: String,
    /// Ingestion port
    pub port: u16,
    /// Configured anchors, in solver order
    pub anchors: Vec<AnchorId>,
    /// How anchor coordinates are established
    pub layout: LayoutMode,
    /// Estimation period (milliseconds)
    pub cadence_ms: u64,
    /// Additive calibration offset per anchor (meters)
    pub range_offsets: HashMap<AnchorId, f64>,
    pub ingest_mode: IngestMode,
    /// Drop all ranges when the producer disconnects
    pub clear_on_disconnect: bool,
    /// Serve one connection and stop, instead of accepting again
    pub single_session: bool,
    pub on_degenerate: DegeneratePolicy,
    /// Socket read timeout used to poll for shutdown (milliseconds)
    pub read_timeout_ms: u64,
    /// Largest frame accepted before the delimiter (bytes)
    pub max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            anchors: vec!["50".into(), "51".into(), "52".into()],
            layout: LayoutMode::TriangleFromDistances {
                d_ab: 10.0,
                d_ac: 8.0,
                d_bc: 6.0,
            },
            cadence_ms: DEFAULT_CADENCE_MS,
            range_offsets: HashMap::new(),
            ingest_mode: IngestMode::Merge,
            clear_on_disconnect: true,
            single_session: false,
            on_degenerate: DegeneratePolicy::Hold,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_str,
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(&path, content).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source,
        })
    }

    /// Check parameters for consistency. Layout geometry is checked separately
    /// by [`Config::build_layout`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anchors.len() < MIN_ANCHORS {
            return Err(ConfigError::invalid(
                "anchors",
                self.anchors.len(),
                "at least 3 anchors are required for a 2D fix",
            ));
        }

        let mut seen = HashSet::new();
        for id in &self.anchors {
            if id.as_str().is_empty() {
                return Err(ConfigError::invalid("anchors", "\"\"", "anchor id must not be empty"));
            }
            if !seen.insert(id) {
                return Err(ConfigError::invalid("anchors", id, "duplicate anchor id"));
            }
        }

        if let LayoutMode::TriangleFromDistances { .. } = self.layout {
            if self.anchors.len() != 3 {
                return Err(ConfigError::invalid(
                    "layout",
                    "triangle_from_distances",
                    "triangle layout requires exactly 3 anchors",
                ));
            }
        }

        if self.port == 0 {
            return Err(ConfigError::invalid("port", 0, "port must be non-zero"));
        }

        if self.cadence_ms == 0 {
            return Err(ConfigError::invalid("cadence_ms", 0, "cadence must be positive"));
        }

        if self.read_timeout_ms == 0 {
            return Err(ConfigError::invalid("read_timeout_ms", 0, "read timeout must be positive"));
        }

        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid("max_frame_bytes", 0, "frame limit must be positive"));
        }

        for (id, offset) in &self.range_offsets {
            if !seen.contains(id) {
                return Err(ConfigError::invalid("range_offsets", id, "offset for unconfigured anchor"));
            }
            if !offset.is_finite() {
                return Err(ConfigError::invalid("range_offsets", offset, "offset must be finite"));
            }
        }

        Ok(())
    }

    /// Derive anchor coordinates from the configured layout
    pub fn build_layout(&self) -> Result<AnchorLayout, GeometryError> {
        AnchorLayout::from_mode(&self.anchors, &self.layout)
    }

    /// `host:port` for the ingestion listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
