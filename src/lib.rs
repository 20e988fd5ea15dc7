//! Background screen activity tracker: periodic capture, perceptual change
//! detection, remote analysis, append-only CSV activity log.

pub mod activity_log;
pub mod api;
pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use activity_log::{ActivityLog, ActivityRecord};
pub use api::AnalysisClient;
pub use capture::{capture_displays, DisplaySnapshot};
pub use config::{load_config, save_config, TrackerConfig};
pub use diff::{changed_displays, CHANGE_THRESHOLD};
pub use error::{TrackerError, TrackerResult};
pub use tracker::{PowerEvent, Tracker, TrackerStatus};
