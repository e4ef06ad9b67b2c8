//! System defaults and fixed parameters

/// Default TCP port the ingestion worker listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address for the ingestion listener
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default estimation cadence (milliseconds)
pub const DEFAULT_CADENCE_MS: u64 = 100;

/// Minimum number of valid ranges needed for a 2D fix
pub const MIN_ANCHORS: usize = 3;

/// Decimal places reported positions are rounded to
pub const OUTPUT_DECIMALS: i32 = 2;

/// Default socket read timeout used to poll for shutdown (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 200;

/// Default upper bound for a single undelimited frame (bytes)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Size of the socket read buffer (bytes)
pub const READ_CHUNK_BYTES: usize = 1024;
