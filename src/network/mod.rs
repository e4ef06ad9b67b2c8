//! TCP ingestion of range reports

pub mod error;
pub mod worker;

pub use error::{ConnectionError, ConnectionResult, RecoveryStrategy};
pub use worker::{
    FrameSummary, IngestionWorker, SessionEnd, SessionOutcome, SessionProcessor, SessionStats,
    WorkerSettings,
};
