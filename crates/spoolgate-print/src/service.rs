// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service wrapper around the engine loop: owns the loop task and its stop
// signal, and reports lifecycle status to the host process.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::EngineStatus;

use crate::engine::Engine;

/// Start/stop handle for one engine instance.
pub struct EngineService {
    engine: Engine,
    /// Sender half of the stop signal; `true` asks the loop to exit.
    stop_tx: Option<watch::Sender<bool>>,
    /// Handle to the Tokio task running the loop.
    task_handle: Option<JoinHandle<Result<()>>>,
    /// Set when the loop ended with an error.
    failed: bool,
}

impl EngineService {
    /// Create a service in `Stopped` state.  Call [`start`](Self::start) to
    /// begin watching.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            stop_tx: None,
            task_handle: None,
            failed: false,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Start the engine loop.
    ///
    /// # Errors
    ///
    /// Returns the fatal startup error if the watch directory is unusable;
    /// the service is then `Failed`.
    pub fn start(&mut self) -> Result<()> {
        if self.status() == EngineStatus::Running {
            debug!("engine service already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        match self.engine.start(stop_rx) {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.task_handle = Some(handle);
                self.failed = false;
                info!(watch_dir = %self.engine.watch_dir().display(), "engine service started");
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };

        info!("stopping engine service");
        if let Some(stop_tx) = self.stop_tx.take() {
            // The loop may already have exited and dropped its receiver.
            let _ = stop_tx.send(true);
        }

        let result = handle
            .await
            .map_err(|e| SpoolgateError::Engine(format!("task join: {e}")))?;
        if let Err(e) = &result {
            warn!(error = %e, "engine loop ended with an error");
            self.failed = true;
        }
        info!("engine service stopped");
        result
    }

    pub fn status(&self) -> EngineStatus {
        match &self.task_handle {
            Some(handle) if !handle.is_finished() => EngineStatus::Running,
            // A loop only finishes on its own when it failed.
            Some(_) => EngineStatus::Failed,
            None if self.failed => EngineStatus::Failed,
            None => EngineStatus::Stopped,
        }
    }
}
