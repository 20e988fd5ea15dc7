//! Tracking lifecycle and the sampling loop.
//!
//! `Tracker` owns the Stopped/Running/SuspendedBySystem state machine,
//! schedules capture cycles on the configured interval, and runs the
//! capture -> diff -> analyze -> record pipeline for each cycle. Cycles
//! are serialized: a tick that lands while one is still in flight waits
//! its turn instead of running concurrently.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity_log::{ActivityLog, ActivityRecord};
use crate::api::AnalysisClient;
use crate::capture::{self, DisplaySnapshot};
use crate::config::TrackerConfig;
use crate::diff;
use crate::error::TrackerResult;

/// Log file name inside the output directory.
pub const ACTIVITY_LOG_FILE: &str = "activity_log.csv";

/// Lifecycle states of the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Stopped,
    Running,
    /// Paused by a system suspend or session lock, not by the user.
    SuspendedBySystem,
}

/// Host power and session signals delivered by the embedding process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend,
    Resume,
    SessionLock,
    SessionUnlock,
}

/// Prior-cycle snapshot. Lives behind the async cycle mutex, which is
/// also what serializes cycles.
#[derive(Default)]
struct CycleState {
    prior: Option<DisplaySnapshot>,
}

/// Shared handle to control the tracking loop.
#[derive(Clone)]
pub struct Tracker {
    config: Arc<RwLock<TrackerConfig>>,
    status: Arc<Mutex<TrackerStatus>>,
    is_tracking: Arc<AtomicBool>,
    was_tracking_before_suspend: Arc<AtomicBool>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    cycle: Arc<AsyncMutex<CycleState>>,
    output_dir: PathBuf,
    log: ActivityLog,
}

impl Tracker {
    /// Build a tracker writing screenshots and the activity log under
    /// `output_dir`. The directory is created up front; the config must
    /// already be in range.
    pub fn new(config: TrackerConfig, output_dir: PathBuf) -> TrackerResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&output_dir)?;
        let log = ActivityLog::new(output_dir.join(ACTIVITY_LOG_FILE));
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            status: Arc::new(Mutex::new(TrackerStatus::Stopped)),
            is_tracking: Arc::new(AtomicBool::new(false)),
            was_tracking_before_suspend: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(Mutex::new(None)),
            cycle: Arc::new(AsyncMutex::new(CycleState::default())),
            output_dir,
            log,
        })
    }

    /// Start the sampling loop. No-op when already running. The first
    /// cycle runs immediately, then every configured interval.
    pub fn start(&self) {
        let mut status = self.lock_status();
        if *status == TrackerStatus::Running {
            debug!("Tracker already running");
            return;
        }
        *status = TrackerStatus::Running;
        self.is_tracking.store(true, Ordering::SeqCst);

        let token = CancellationToken::new();
        if let Some(old) = self.lock_cancel().replace(token.clone()) {
            old.cancel();
        }

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.sampling_loop(token).await;
        });
        info!("Tracking started");
    }

    /// Stop the sampling loop. Only future ticks are disarmed; a cycle
    /// already in flight (including its analysis call) runs to completion.
    /// No-op when already stopped.
    pub fn stop(&self) {
        let mut status = self.lock_status();
        if *status == TrackerStatus::Stopped {
            debug!("Tracker already stopped");
            return;
        }
        *status = TrackerStatus::Stopped;
        self.is_tracking.store(false, Ordering::SeqCst);
        self.was_tracking_before_suspend.store(false, Ordering::SeqCst);
        self.cancel_loop();
        info!("Tracking stopped");
    }

    /// Flip between started and stopped, for the menu-style toggle.
    pub fn toggle(&self) {
        if self.is_tracking() {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Whether the loop is currently armed. Lock-free.
    pub fn is_tracking(&self) -> bool {
        self.is_tracking.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> TrackerStatus {
        *self.lock_status()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn activity_log_path(&self) -> &Path {
        self.log.path()
    }

    /// Replace the configuration. Out-of-range values are rejected here,
    /// before they can reach the scheduler. A changed interval takes
    /// effect the next time the loop is started.
    pub async fn set_config(&self, config: TrackerConfig) -> TrackerResult<()> {
        config.validate()?;
        *self.config.write().await = config;
        Ok(())
    }

    pub async fn config(&self) -> TrackerConfig {
        self.config.read().await.clone()
    }

    /// React to a host power or session signal.
    ///
    /// Suspend and lock pause a running tracker and remember that it was
    /// running; resume and unlock restart it only if that memory is set.
    /// These arrive on the caller's thread and never wait on an in-flight
    /// cycle.
    pub fn handle_power_event(&self, event: PowerEvent) {
        match event {
            PowerEvent::Suspend | PowerEvent::SessionLock => {
                let mut status = self.lock_status();
                let was_running = *status == TrackerStatus::Running;
                self.was_tracking_before_suspend
                    .store(was_running, Ordering::SeqCst);
                if was_running {
                    *status = TrackerStatus::SuspendedBySystem;
                    self.is_tracking.store(false, Ordering::SeqCst);
                    self.cancel_loop();
                    info!("Tracking paused by {:?}", event);
                }
            }
            PowerEvent::Resume | PowerEvent::SessionUnlock => {
                if self
                    .was_tracking_before_suspend
                    .swap(false, Ordering::SeqCst)
                {
                    info!("Restarting tracking after {:?}", event);
                    self.start();
                }
            }
        }
    }

    /// Run one cycle outside the schedule, serialized with scheduled ones.
    pub async fn run_once(&self) -> TrackerResult<()> {
        self.run_cycle().await
    }

    /// Every lifecycle transition runs entirely under this lock: status,
    /// the tracking flags, and the cancel token change as one step, so a
    /// concurrent transition never sees a half-updated tracker.
    fn lock_status(&self) -> std::sync::MutexGuard<'_, TrackerStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_loop(&self) {
        if let Some(token) = self.lock_cancel().take() {
            token.cancel();
        }
    }

    async fn sampling_loop(self, token: CancellationToken) {
        let interval_secs = self.config.read().await.interval_secs;
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Sampling every {}s", interval_secs);

        loop {
            // Cancellation is polled first so a stop that lands while a
            // tick is already due never runs one more cycle.
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Sampling loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Capture cycle failed: {}", e);
                    }
                }
            }
        }
    }

    async fn run_cycle(&self) -> TrackerResult<()> {
        let mut cycle = self.cycle.lock().await;
        let config = self.config.read().await.clone();
        let current = capture::capture_displays(&self.output_dir, Local::now())?;
        self.run_pipeline(&config, &mut cycle, current).await;
        Ok(())
    }

    /// Test seam: run the pipeline on an externally built snapshot,
    /// still serialized behind the cycle mutex.
    #[cfg(test)]
    pub(crate) async fn process_snapshot(&self, current: DisplaySnapshot) {
        let mut cycle = self.cycle.lock().await;
        let config = self.config.read().await.clone();
        self.run_pipeline(&config, &mut cycle, current).await;
    }

    /// One cycle after capture: compare against the prior snapshot,
    /// record the outcome, apply retention, store the new prior.
    async fn run_pipeline(
        &self,
        config: &TrackerConfig,
        cycle: &mut CycleState,
        current: DisplaySnapshot,
    ) {
        let timestamp = current.row_timestamp();
        debug!(
            "Cycle at {}: {} display(s) captured",
            timestamp,
            current.screens.len()
        );

        if let Some(prior) = cycle.prior.as_ref() {
            let changed = diff::changed_displays(prior, &current);
            if changed.is_empty() {
                info!("No displays changed since last cycle");
                self.append_record(&ActivityRecord::unchanged(&timestamp));
            } else {
                info!("{} display(s) changed, requesting analysis", changed.len());
                let before = read_images(&prior.screens, &changed);
                let after = read_images(&current.screens, &changed);
                let client = AnalysisClient::new(
                    config.resolved_api_key(),
                    config.api_base_url.clone(),
                );
                match client.analyze(&before, &after, &timestamp).await {
                    Ok(Some(record)) => self.append_record(&record),
                    Ok(None) => warn!("Analysis produced no result for this cycle"),
                    Err(e) => warn!("Analysis skipped: {}", e),
                }
            }
        } else {
            info!("No previous screenshots to compare with");
        }

        if !config.keep_screenshots {
            if let Some(prior) = cycle.prior.as_ref() {
                // Same-second recaptures reuse filenames; never delete a
                // path the current snapshot still references.
                remove_snapshot_files(prior, &current.screens);
            }
        }
        cycle.prior = Some(current);
    }

    fn append_record(&self, record: &ActivityRecord) {
        if let Err(e) = self.log.append(record) {
            warn!("Failed to append activity record: {}", e);
        }
    }
}

/// Read the image files at the given indices, in index order. Unreadable
/// files and indices the snapshot does not cover are skipped.
fn read_images(screens: &[PathBuf], indices: &[usize]) -> Vec<Vec<u8>> {
    let mut images = Vec::with_capacity(indices.len());
    for &idx in indices {
        let Some(path) = screens.get(idx) else {
            continue;
        };
        match std::fs::read(path) {
            Ok(bytes) => images.push(bytes),
            Err(e) => warn!("Failed to read screenshot {}: {}", path.display(), e),
        }
    }
    images
}

/// Delete a snapshot's image files, skipping any path listed in `keep`.
/// Failures are logged and ignored.
fn remove_snapshot_files(snapshot: &DisplaySnapshot, keep: &[PathBuf]) {
    for path in &snapshot.screens {
        if keep.contains(path) {
            continue;
        }
        if let Err(e) = std::fs::remove_file(path) {
            debug!("Could not remove old screenshot {}: {}", path.display(), e);
        }
    }
}
