// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Write-completion detection for spool files.
//
// Spoolers write asynchronously and give no completion signal.  A file whose
// size is identical across two consecutive samples is considered finished.
// A file that was already complete before the first sample therefore passes
// on the second sample.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default spacing between size samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a file's size until it stops changing.
#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    sample_interval: Duration,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl StabilityDetector {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// True once two consecutive samples report the same size.  False if the
    /// file disappears or `timeout_secs` passes first.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn is_complete(&self, path: &Path, timeout_secs: u64) -> bool {
        self.wait_until_stable(path, Duration::from_secs(timeout_secs))
            .await
    }

    /// [`is_complete`](Self::is_complete) with a sub-second timeout.
    ///
    /// The deadline is inclusive: a sample is always taken once it has
    /// passed, so a timeout of one sample interval still compares two
    /// samples.
    pub async fn wait_until_stable(&self, path: &Path, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut previous: Option<u64> = None;

        loop {
            let size = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!(error = %e, "file vanished while sampling");
                    return false;
                }
            };

            if previous == Some(size) {
                debug!(size, "file size settled");
                return true;
            }
            previous = Some(size);

            if Instant::now() >= deadline {
                debug!(size, "file still growing at timeout");
                return false;
            }
            tokio::time::sleep(self.sample_interval).await;
        }
    }
}
