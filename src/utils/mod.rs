//! Configuration, scheduling and shutdown utilities

pub mod config;
pub mod shutdown;
pub mod ticker;

pub use config::{Config, ConfigError, DegeneratePolicy, IngestMode};
pub use shutdown::Shutdown;
pub use ticker::Ticker;
