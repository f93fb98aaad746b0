use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use client_core::RunControl;
use shared::domain::RunId;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a failed position check stays on screen before the run restarts.
pub const RUN_RESTART_GRACE: Duration = Duration::from_secs(5);

/// Restarts a run once, after a grace delay. Later schedule calls are ignored.
pub struct DelayedRunRestart {
    control: Arc<dyn RunControl>,
    grace: Duration,
    scheduled: AtomicBool,
}

impl DelayedRunRestart {
    pub fn new(control: Arc<dyn RunControl>) -> Self {
        Self::with_grace(control, RUN_RESTART_GRACE)
    }

    pub fn with_grace(control: Arc<dyn RunControl>, grace: Duration) -> Self {
        Self {
            control,
            grace,
            scheduled: AtomicBool::new(false),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }

    /// Returns the restart task, or `None` if a restart was already scheduled.
    pub fn schedule(&self, run_id: RunId) -> Option<JoinHandle<Result<RunId>>> {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            debug!(%run_id, "run restart already scheduled");
            return None;
        }

        let control = Arc::clone(&self.control);
        let grace = self.grace;
        info!(%run_id, grace_ms = grace.as_millis() as u64, "scheduling run restart");
        Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match control.restart_run(&run_id).await {
                Ok(new_run) => {
                    info!(previous_run = %run_id, %new_run, "run restarted");
                    Ok(new_run)
                }
                Err(err) => {
                    warn!(%run_id, error = %format!("{err:#}"), "run restart failed");
                    Err(err)
                }
            }
        }))
    }
}
