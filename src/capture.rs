//! Screen capture: one PNG file per active display.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};

/// Timestamp format used in screenshot filenames.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
/// Timestamp format used in log rows and analysis requests.
pub const ROW_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One capture cycle's worth of per-display screenshots, in display order.
///
/// A display whose capture failed is simply absent, so the list can be
/// shorter than the number of attached displays.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub taken_at: DateTime<Local>,
    pub screens: Vec<PathBuf>,
}

impl DisplaySnapshot {
    /// Capture timestamp rendered for log rows and analysis requests.
    pub fn row_timestamp(&self) -> String {
        self.taken_at.format(ROW_TIMESTAMP_FORMAT).to_string()
    }
}

/// Filename for one display's screenshot. `index` is 1-based. Names have
/// one-second resolution, so captures within the same second land on the
/// same files.
pub fn screenshot_filename(taken_at: DateTime<Local>, index: usize) -> String {
    format!(
        "{}_screen_{}.png",
        taken_at.format(FILE_TIMESTAMP_FORMAT),
        index
    )
}

/// Capture every active display into `output_dir`.
///
/// The display list is read fresh from the OS on every call, never cached.
/// A display that fails to capture or encode is skipped with a warning;
/// monitor enumeration failure fails the whole call.
pub fn capture_displays(
    output_dir: &Path,
    taken_at: DateTime<Local>,
) -> TrackerResult<DisplaySnapshot> {
    std::fs::create_dir_all(output_dir)?;

    let monitors = xcap::Monitor::all()
        .map_err(|e| TrackerError::Capture(format!("failed to enumerate monitors: {}", e)))?;

    let mut screens = Vec::with_capacity(monitors.len());
    for (idx, monitor) in monitors.into_iter().enumerate() {
        let path = output_dir.join(screenshot_filename(taken_at, idx + 1));
        match capture_monitor(&monitor, &path) {
            Ok(()) => {
                debug!("Captured display {} to {}", idx + 1, path.display());
                screens.push(path);
            }
            Err(e) => warn!("Skipping display {}: {}", idx + 1, e),
        }
    }
    Ok(DisplaySnapshot { taken_at, screens })
}

fn capture_monitor(monitor: &xcap::Monitor, path: &Path) -> TrackerResult<()> {
    let img = monitor
        .capture_image()
        .map_err(|e| TrackerError::Capture(format!("screen capture failed: {}", e)))?;
    img.save(path)?;
    Ok(())
}
