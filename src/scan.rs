//! QR scan pipeline: per-session debounce, student lookup and attendance write.

pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use error::ScanError;
pub use pipeline::{ScanPipeline, ScanReport};
pub use service::ScanService;
pub use session::{CameraStatus, ScanOutcome, ScanSession, SessionView};
pub use store::{AttendanceStore, MySqlStore};
