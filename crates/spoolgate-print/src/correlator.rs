// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spool file → queue job correlation.
//
// The print subsystem offers no direct mapping from a spooled file to the job
// that produced it.  The spool port embeds a job-sequence token in the file
// name, so correlation scans the queue for a job whose document name matches
// the file name.  A miss is normal and means the file is skipped.

use std::sync::Arc;

use tracing::{debug, warn};

use spoolgate_core::types::{JobId, PrintJob};

use crate::queue::PrintQueue;

/// Rule deciding whether a queue job belongs to a spool file.
pub trait MatchStrategy: Send + Sync {
    fn matches(&self, document_name: &str, file_name: &str) -> bool;
}

/// Case-insensitive "document name contains file name" rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatch;

impl MatchStrategy for SubstringMatch {
    fn matches(&self, document_name: &str, file_name: &str) -> bool {
        document_name
            .to_lowercase()
            .contains(&file_name.to_lowercase())
    }
}

/// Why no job was found for a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationMiss {
    QueueUnavailable(String),
    EmptyQueue,
    NoMatch,
}

impl std::fmt::Display for CorrelationMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueUnavailable(detail) => write!(f, "queue unavailable: {detail}"),
            Self::EmptyQueue => f.write_str("queue is empty"),
            Self::NoMatch => f.write_str("no job matches"),
        }
    }
}

/// Looks up queue jobs for spool files.
#[derive(Clone)]
pub struct QueueCorrelator {
    queue: Arc<dyn PrintQueue>,
    strategy: Arc<dyn MatchStrategy>,
}

impl QueueCorrelator {
    pub fn new(queue: Arc<dyn PrintQueue>) -> Self {
        Self::with_strategy(queue, Arc::new(SubstringMatch))
    }

    pub fn with_strategy(queue: Arc<dyn PrintQueue>, strategy: Arc<dyn MatchStrategy>) -> Self {
        Self { queue, strategy }
    }

    /// The first queued job matching `file_name`, or `None`.
    pub fn find_job(&self, file_name: &str) -> Option<PrintJob> {
        match self.lookup(file_name) {
            Ok(job) => Some(job),
            Err(miss) => {
                debug!(file = file_name, reason = %miss, "no queue job for spool file");
                None
            }
        }
    }

    /// Like [`find_job`](Self::find_job) but says why nothing was found.
    pub fn lookup(&self, file_name: &str) -> Result<PrintJob, CorrelationMiss> {
        let jobs = self
            .queue
            .enumerate_jobs()
            .map_err(|e| CorrelationMiss::QueueUnavailable(e.to_string()))?;
        if jobs.is_empty() {
            return Err(CorrelationMiss::EmptyQueue);
        }
        jobs.into_iter()
            .find(|job| self.strategy.matches(&job.document_name, file_name))
            .ok_or(CorrelationMiss::NoMatch)
    }

    /// Current details of a job, or `None` on any lookup failure.
    pub fn job_info(&self, job_id: JobId) -> Option<PrintJob> {
        match self.queue.get_job(job_id) {
            Ok(Some(job)) => Some(job),
            Ok(None) => {
                debug!(%job_id, "job already dequeued");
                None
            }
            Err(e) => {
                warn!(%job_id, error = %e, "job lookup failed");
                None
            }
        }
    }

    pub fn queue(&self) -> &Arc<dyn PrintQueue> {
        &self.queue
    }
}
