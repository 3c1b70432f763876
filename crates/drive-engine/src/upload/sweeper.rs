//! Background sweep of expired and idle upload sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use drive_core::config::upload::UploadConfig;
use drive_core::error::ErrorKind;
use drive_core::result::AppResult;
use drive_database::stores::UploadStore;

use super::manager::UploadSessionManager;

/// What one sweep pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Sessions aborted for expiry or idleness.
    pub aborted: u64,
    /// Terminal session records garbage-collected.
    pub removed: u64,
}

/// Periodically aborts upload sessions with no activity inside the idle
/// window or past their hard expiry, and garbage-collects terminal
/// session records.
///
/// An abort racing a client completion goes through the same per-session
/// claim as everything else: whichever side wins, the other observes a
/// terminal-state error, which the sweeper treats as a skip.
pub struct UploadSweeper {
    /// The manager whose abort path is reused.
    manager: Arc<UploadSessionManager>,
    /// Session store for the sweep scan.
    sessions: Arc<dyn UploadStore>,
    /// Upload configuration (idle window, sweep interval).
    config: UploadConfig,
}

impl std::fmt::Debug for UploadSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSweeper").finish()
    }
}

impl UploadSweeper {
    /// Creates a new sweeper.
    pub fn new(
        manager: Arc<UploadSessionManager>,
        sessions: Arc<dyn UploadStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            manager,
            sessions,
            config,
        }
    }

    /// Run until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.sweep_interval_seconds);
        info!(
            interval_seconds = self.config.sweep_interval_seconds,
            idle_window_seconds = self.config.idle_window_seconds,
            "Upload sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Upload sweeper shutting down");
                        break;
                    }
                }
                _ = time::sleep(interval) => {
                    match self.sweep_once().await {
                        Ok(outcome) if outcome.aborted + outcome.removed > 0 => {
                            info!(
                                aborted = outcome.aborted,
                                removed = outcome.removed,
                                "Sweep pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Sweep pass failed"),
                    }
                }
            }
        }
    }

    /// One sweep pass.
    pub async fn sweep_once(&self) -> AppResult<SweepOutcome> {
        let now = Utc::now();
        let idle_window = chrono::Duration::seconds(self.config.idle_window_seconds as i64);
        let sweepable = self.sessions.find_sweepable(now, idle_window).await?;

        let mut outcome = SweepOutcome::default();
        for session in sweepable {
            if session.status.is_terminal() {
                match self.manager.cleanup_terminal(&session).await {
                    Ok(()) => outcome.removed += 1,
                    Err(e) => warn!(upload_id = %session.id, error = %e, "Terminal cleanup failed"),
                }
                continue;
            }

            match self.manager.abort(session.id).await {
                Ok(()) => {
                    debug!(upload_id = %session.id, "Idle/expired session aborted");
                    outcome.aborted += 1;
                }
                // Lost the race to a client completing or aborting right
                // now; the session is in good hands.
                Err(e) if matches!(e.kind, ErrorKind::Conflict | ErrorKind::InvalidState) => {
                    debug!(upload_id = %session.id, "Skipped session mid-completion");
                }
                Err(e) => warn!(upload_id = %session.id, error = %e, "Sweep abort failed"),
            }
        }
        Ok(outcome)
    }
}
