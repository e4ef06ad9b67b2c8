//! Stream framing, message parsing and the shared range store

pub mod framing;
pub mod parser;
pub mod store;

pub use framing::{FrameEvent, LineFramer};
pub use parser::{parse_frame, LinkReport, ParseError, RangeLink};
pub use store::{RangeSnapshot, RangeStore};
