use chrono::{Local, TimeZone};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::activity_log::ActivityRecord;
use crate::capture::DisplaySnapshot;
use crate::config::TrackerConfig;
use crate::tracker::Tracker;

// ── Image fixtures ──────────────────────────────────────────

/// Write a 64x64 solid-gray PNG and return its path.
pub fn solid_png(dir: &Path, name: &str, gray: u8) -> PathBuf {
    let img = image::RgbImage::from_pixel(64, 64, image::Rgb([gray, gray, gray]));
    let path = dir.join(name);
    img.save(&path).expect("failed to write fixture png");
    path
}

/// Build a snapshot with one solid display per gray value, stamped at
/// `second` past a fixed reference minute.
pub fn snapshot(dir: &Path, label: &str, grays: &[u8], second: u32) -> DisplaySnapshot {
    let screens = grays
        .iter()
        .enumerate()
        .map(|(idx, &gray)| solid_png(dir, &format!("{}_screen_{}.png", label, idx + 1), gray))
        .collect();
    DisplaySnapshot {
        taken_at: Local.with_ymd_and_hms(2024, 6, 1, 10, 0, second).unwrap(),
        screens,
    }
}

// ── Tracker setup ───────────────────────────────────────────

/// Config pointing analysis at a mock endpoint, with a test key.
pub fn mock_config(base_url: &str) -> TrackerConfig {
    TrackerConfig {
        api_key: "sk-test".to_string(),
        api_base_url: Some(base_url.to_string()),
        ..TrackerConfig::default()
    }
}

/// Create a tracker writing into an isolated temp directory. Does NOT
/// start the sampling loop.
pub fn setup_tracker(config: TrackerConfig) -> (Tracker, TempDir) {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let tracker = Tracker::new(config, tmp.path().join("out")).expect("failed to build tracker");
    (tracker, tmp)
}

/// Read the activity log back as lines; empty when the file was never
/// created.
pub fn log_lines(tracker: &Tracker) -> Vec<String> {
    std::fs::read_to_string(tracker.activity_log_path())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Mock analysis endpoint ──────────────────────────────────

/// A record for the mock endpoint to hand back.
pub fn sample_record(timestamp: &str) -> ActivityRecord {
    ActivityRecord {
        timestamp: timestamp.to_string(),
        client: "Acme Corp".to_string(),
        tool: "VS Code".to_string(),
        activity: "Editing the quarterly report".to_string(),
    }
}

/// Chat-completions response body whose message content decodes to
/// `record`.
pub fn analysis_body(record: &ActivityRecord) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {
                "content": serde_json::to_string(record).expect("record serializes")
            }
        }]
    })
}

/// Mount a 200 handler on the analysis route, expecting exactly `hits`
/// calls over the server's lifetime.
pub async fn mount_analysis(server: &MockServer, body: serde_json::Value, hits: u64) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(hits)
        .mount(server)
        .await;
}
