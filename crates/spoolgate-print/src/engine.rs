// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The folder-watching engine.
//
// A single loop samples the watch directory once per polling interval.  Every
// new or resized job container is claimed and driven through
//
//   Stabilizing -> Correlating -> Inspecting -> AwaitingDecision
//     -> Forwarding | Discarding -> Done
//
// in its own task, so an operator who takes an hour to decide never holds up
// discovery of other files.  Each name is processed at most once per run;
// the record of handled names lives only in memory, so a restart sees any
// leftover files again.
//
// Stopping cancels per-file tasks that have not yet been decided on; such a
// job stays in the queue with its file.  Once a decision is in, forwarding
// or discarding and the cleanup that follows always run to the end, so a
// job that reached the device is never left behind to be presented again.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use spoolgate_core::EngineConfig;
use spoolgate_core::error::{ErrorKind, Result, SpoolgateError};
use spoolgate_core::human_errors::dispatch_failure_notice;
use spoolgate_core::types::{
    Decision, FileState, JobId, JobMetadata, SpoolFile, is_job_container, job_label,
};
use spoolgate_document::DocumentInspector;
use spoolgate_security::{AuditLog, hash_file};

use crate::correlator::QueueCorrelator;
use crate::forwarder::DispatchForwarder;
use crate::gateway::{DecisionGateway, await_decision};
use crate::queue::PrintQueue;
use crate::stability::StabilityDetector;

// ---------------------------------------------------------------------------
// Watch state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WatchInner {
    /// Last sampled size of every container not yet handled.
    tracked: HashMap<String, SpoolFile>,
    /// Names currently owned by a per-file task.
    in_flight: HashSet<String>,
    /// Names that reached `Done` during this run.
    handled: HashSet<String>,
    /// Names without a container extension.
    ignored: HashSet<String>,
}

/// Per-run bookkeeping of which spool files have been seen and handled.
///
/// Shared between the loop and the per-file tasks.
#[derive(Debug, Default)]
pub struct WatchState {
    inner: Mutex<WatchInner>,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WatchInner> {
        self.inner.lock().expect("watch state lock poisoned")
    }

    /// Record a size sample.  True when the name is new or its size differs
    /// from the previous sample.  Handled and ignored names are never new.
    pub fn observe(&self, name: &str, size_bytes: u64) -> bool {
        let mut inner = self.lock();
        if inner.handled.contains(name) || inner.ignored.contains(name) {
            return false;
        }
        match inner.tracked.get_mut(name) {
            Some(file) if file.size_bytes == size_bytes => false,
            Some(file) => {
                file.size_bytes = size_bytes;
                true
            }
            None => {
                inner
                    .tracked
                    .insert(name.to_string(), SpoolFile::new(name, size_bytes));
                true
            }
        }
    }

    /// Take ownership of a name for processing.  False if it is already
    /// being processed, was handled this run, or is ignored.
    pub fn try_claim(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if inner.handled.contains(name) || inner.ignored.contains(name) {
            return false;
        }
        inner.in_flight.insert(name.to_string())
    }

    /// Give a claimed name back without handling it.  The next sample treats
    /// it as new.
    pub fn release(&self, name: &str) {
        let mut inner = self.lock();
        inner.in_flight.remove(name);
        inner.tracked.remove(name);
    }

    pub fn mark_done(&self, name: &str) {
        let mut inner = self.lock();
        inner.in_flight.remove(name);
        inner.tracked.remove(name);
        inner.handled.insert(name.to_string());
    }

    pub fn mark_ignored(&self, name: &str) {
        let mut inner = self.lock();
        inner.tracked.remove(name);
        inner.ignored.insert(name.to_string());
    }

    /// Forget size samples for files that are no longer in the directory.
    pub fn retain_present(&self, present: &HashSet<String>) {
        self.lock().tracked.retain(|name, _| present.contains(name));
    }

    pub fn is_handled(&self, name: &str) -> bool {
        self.lock().handled.contains(name)
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.lock().ignored.contains(name)
    }

    pub fn handled_count(&self) -> usize {
        self.lock().handled.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a file was finished without asking the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No queue job matched the file name.
    NoQueueJob,
    /// The matched job left the queue before it could be read.
    JobVanished,
}

/// How processing of one spool file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Approved and delivered; job and file removed.
    Forwarded { job_id: JobId },
    /// Approved but delivery failed; job and file kept, operator notified.
    ForwardFailed { job_id: JobId },
    /// Rejected or abandoned; job and file removed.
    Discarded { job_id: JobId, decision: Decision },
    Skipped(SkipReason),
    /// Still being written when the stability timeout ran out.
    Unstable,
}

/// A job the operator has answered for.  Everything after this point runs
/// to completion even when the engine is stopping.
struct Decided {
    job_id: JobId,
    path: PathBuf,
    metadata: JobMetadata,
    decision: Decision,
    document_hash: String,
}

enum Held {
    Finished(ProcessOutcome),
    Decided(Decided),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The job monitoring and dispatch engine.
///
/// Cheap to clone; clones share the watch state.
#[derive(Clone)]
pub struct Engine {
    watch_dir: PathBuf,
    poll_interval: Duration,
    stability_timeout: Duration,
    correlator: QueueCorrelator,
    inspector: DocumentInspector,
    stability: StabilityDetector,
    forwarder: DispatchForwarder,
    gateway: Arc<dyn DecisionGateway>,
    audit: Option<Arc<Mutex<AuditLog>>>,
    state: Arc<WatchState>,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        queue: Arc<dyn PrintQueue>,
        forwarder: DispatchForwarder,
        gateway: Arc<dyn DecisionGateway>,
    ) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            poll_interval: config.poll_interval(),
            stability_timeout: Duration::from_secs(config.stability_timeout_secs),
            correlator: QueueCorrelator::new(queue),
            inspector: DocumentInspector::new(config.paper_fallback),
            stability: StabilityDetector::default(),
            forwarder,
            gateway,
            audit: None,
            state: Arc::new(WatchState::new()),
        }
    }

    /// Record decisions and dispatch outcomes in `audit`.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    pub fn with_stability(mut self, stability: StabilityDetector) -> Self {
        self.stability = stability;
        self
    }

    /// Replace the correlator, e.g. to use a different match strategy.
    pub fn with_correlator(mut self, correlator: QueueCorrelator) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn state(&self) -> &Arc<WatchState> {
        &self.state
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Check the watch directory and spawn the loop.
    ///
    /// # Errors
    ///
    /// Fails without spawning anything if the watch directory cannot be
    /// created or listed.
    pub fn start(&self, stop: watch::Receiver<bool>) -> Result<JoinHandle<Result<()>>> {
        self.prepare_watch_dir()?;
        let engine = self.clone();
        Ok(tokio::spawn(async move { engine.run(stop).await }))
    }

    /// Run the loop until `stop` turns true or its sender is dropped.
    #[instrument(skip_all, fields(watch_dir = %self.watch_dir.display()))]
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> Result<()> {
        self.prepare_watch_dir()?;
        info!(interval_ms = self.poll_interval.as_millis() as u64, "engine started");

        let mut tasks = JoinSet::new();
        'watch: loop {
            if *stop.borrow_and_update() {
                break;
            }
            if let Err(e) = self.tick(&mut tasks, &stop).await {
                warn!(error = %e, "directory scan failed, retrying next tick");
            }

            let next_tick = Instant::now() + self.poll_interval;
            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break 'watch;
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                    _ = tokio::time::sleep_until(next_tick) => break,
                }
            }
        }

        // Undecided tasks see the stop signal and return; decided ones settle.
        let in_flight = self.state.in_flight_count();
        if in_flight > 0 {
            info!(in_flight, "waiting for per-file tasks");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        info!(handled = self.state.handled_count(), "engine stopped");
        Ok(())
    }

    fn prepare_watch_dir(&self) -> Result<()> {
        let fatal = |source| SpoolgateError::WatchDirectory {
            path: self.watch_dir.clone(),
            source,
        };
        std::fs::create_dir_all(&self.watch_dir).map_err(fatal)?;
        std::fs::read_dir(&self.watch_dir).map_err(fatal)?;
        Ok(())
    }

    /// One directory sample: claim every new or resized container.
    async fn tick(&self, tasks: &mut JoinSet<()>, stop: &watch::Receiver<bool>) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.watch_dir).await?;
        let mut present = HashSet::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = %name, error = %e, "entry vanished during scan");
                    continue;
                }
            };
            present.insert(name.clone());

            if self.state.is_ignored(&name) {
                continue;
            }
            if !is_job_container(&name) {
                debug!(file = %name, "not a job container, ignoring");
                self.state.mark_ignored(&name);
                continue;
            }
            if !self.state.observe(&name, meta.len()) || !self.state.try_claim(&name) {
                continue;
            }

            debug!(file = %name, size = meta.len(), state = ?FileState::Discovered, "spool file claimed");
            let engine = self.clone();
            let stop = stop.clone();
            tasks.spawn(async move { engine.drive(name, stop).await });
        }

        self.state.retain_present(&present);
        Ok(())
    }

    /// Per-file task body: process, then settle the claim.
    async fn drive(self, name: String, mut stop: watch::Receiver<bool>) {
        let held = tokio::select! {
            biased;
            () = stopped(&mut stop) => {
                debug!(file = %name, "engine stopping, spool file left undecided");
                self.state.release(&name);
                return;
            }
            held = self.hold(&name) => held,
        };
        let processed = match held {
            Ok(Held::Finished(outcome)) => Ok(outcome),
            Ok(Held::Decided(decided)) => Ok(self.settle(decided).await),
            Err(e) => Err(e),
        };

        match processed {
            Ok(ProcessOutcome::Unstable) => self.state.release(&name),
            Ok(outcome) => {
                debug!(file = %name, ?outcome, state = ?FileState::Done, "spool file done");
                self.state.mark_done(&name);
            }
            Err(e) if e.kind() == ErrorKind::TransientIo => {
                warn!(file = %name, error = %e, "processing interrupted, will retry");
                self.state.release(&name);
            }
            Err(e) => {
                warn!(file = %name, error = %e, "processing failed, skipping file");
                self.state.mark_done(&name);
            }
        }
    }

    /// Drive one spool file from stability check to cleanup.
    ///
    /// Does not touch the watch state; [`run`](Self::run) does that.
    pub async fn process_file(&self, name: &str) -> Result<ProcessOutcome> {
        match self.hold(name).await? {
            Held::Finished(outcome) => Ok(outcome),
            Held::Decided(decided) => Ok(self.settle(decided).await),
        }
    }

    /// Everything up to and including the operator's decision.  Safe to
    /// cancel: nothing has been changed yet.
    #[instrument(skip(self), fields(watch_dir = %self.watch_dir.display()))]
    async fn hold(&self, name: &str) -> Result<Held> {
        let path = self.watch_dir.join(name);

        debug!(state = ?FileState::Stabilizing);
        if !self
            .stability
            .wait_until_stable(&path, self.stability_timeout)
            .await
        {
            debug!("file not stable yet");
            return Ok(Held::Finished(ProcessOutcome::Unstable));
        }

        debug!(state = ?FileState::Correlating);
        let correlator = self.correlator.clone();
        let file_name = name.to_string();
        let job = match blocking(move || correlator.lookup(&file_name)).await? {
            Ok(job) => job,
            Err(miss) => {
                info!(reason = %miss, "no queue job for spool file, skipping");
                return Ok(Held::Finished(ProcessOutcome::Skipped(
                    SkipReason::NoQueueJob,
                )));
            }
        };

        let correlator = self.correlator.clone();
        let Some(job) = blocking(move || correlator.job_info(job.id)).await? else {
            info!(job_id = %job.id, "queue job vanished, skipping");
            return Ok(Held::Finished(ProcessOutcome::Skipped(
                SkipReason::JobVanished,
            )));
        };

        debug!(job_id = %job.id, state = ?FileState::Inspecting);
        let inspector = self.inspector;
        let inspect_path = path.clone();
        let inspection = blocking(move || inspector.inspect(&inspect_path)).await?;
        let metadata = JobMetadata::resolve(job_label(name), &job, &inspection);

        let document_hash = self.fingerprint(&path).await;

        info!(
            job_id = %metadata.job_id,
            pages = metadata.page_count,
            paper = %metadata.paper_size,
            state = ?FileState::AwaitingDecision,
            "awaiting operator decision"
        );
        let decision = await_decision(self.gateway.present(metadata.clone())).await;
        info!(job_id = %metadata.job_id, %decision, "operator decided");

        Ok(Held::Decided(Decided {
            job_id: job.id,
            path,
            metadata,
            decision,
            document_hash,
        }))
    }

    /// Act on a decision: forward or discard, then clean up.  Never
    /// cancelled once started.
    #[instrument(skip_all, fields(job_id = %decided.job_id))]
    async fn settle(&self, decided: Decided) -> ProcessOutcome {
        let Decided {
            job_id,
            path,
            metadata,
            decision,
            document_hash,
        } = decided;
        self.record_audit(decision.as_str(), job_id, &document_hash, true, None)
            .await;

        if !decision.is_approve() {
            debug!(state = ?FileState::Discarding);
            self.cleanup(job_id, &path).await;
            return ProcessOutcome::Discarded { job_id, decision };
        }

        debug!(state = ?FileState::Forwarding);
        match self.forward(&path, &metadata.label).await {
            Ok(()) => {
                self.record_audit("forward", job_id, &document_hash, true, None)
                    .await;
                self.cleanup(job_id, &path).await;
                ProcessOutcome::Forwarded { job_id }
            }
            Err(e) => {
                warn!(error = %e, "dispatch failed, job kept");
                self.record_audit("forward", job_id, &document_hash, false, Some(e.to_string()))
                    .await;
                self.gateway.notify(dispatch_failure_notice(
                    &metadata,
                    self.forwarder.device_name(),
                    &e,
                ));
                ProcessOutcome::ForwardFailed { job_id }
            }
        }
    }

    async fn forward(&self, path: &Path, label: &str) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let forwarder = self.forwarder.clone();
        let label = label.to_string();
        blocking(move || forwarder.try_forward(&bytes, &label)).await?
    }

    /// Remove the queue job and the spool file.  Failures are logged only.
    async fn cleanup(&self, job_id: JobId, path: &Path) {
        let queue = Arc::clone(self.correlator.queue());
        match blocking(move || queue.delete_job(job_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => warn!(%job_id, error = %e, "queue job not deleted"),
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "spool file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "spool file not removed"),
        }
    }

    /// SHA-256 of the spool file for the audit trail, when auditing.
    async fn fingerprint(&self, path: &Path) -> String {
        if self.audit.is_none() {
            return String::new();
        }
        let path = path.to_path_buf();
        match blocking(move || hash_file(path)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) | Err(e) => {
                warn!(error = %e, "could not fingerprint spool file");
                "unavailable".to_string()
            }
        }
    }

    async fn record_audit(
        &self,
        action: &'static str,
        job_id: JobId,
        document_hash: &str,
        success: bool,
        details: Option<String>,
    ) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let hash = document_hash.to_string();
        let recorded = blocking(move || {
            let log = audit.lock().expect("audit log lock poisoned");
            log.record(action, job_id, &hash, success, details.as_deref())
        })
        .await;
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => warn!(%job_id, error = %e, "audit entry not written"),
        }
    }
}

/// Run blocking queue, device, or file work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SpoolgateError::Engine(format!("blocking task: {e}")))
}

/// Resolves once the engine is asked to stop or the stop sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopping| *stopping).await;
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            warn!(error = %e, "spool file task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_names_are_observed_once_per_size() {
        let state = WatchState::new();
        assert!(state.observe("job_1.xps", 10));
        assert!(!state.observe("job_1.xps", 10));
        assert!(state.observe("job_1.xps", 20));
    }

    #[test]
    fn claims_are_exclusive() {
        let state = WatchState::new();
        assert!(state.try_claim("job_1.xps"));
        assert!(!state.try_claim("job_1.xps"));
        assert_eq!(state.in_flight_count(), 1);
    }

    #[test]
    fn handled_names_stay_handled() {
        let state = WatchState::new();
        state.observe("job_1.xps", 10);
        assert!(state.try_claim("job_1.xps"));
        state.mark_done("job_1.xps");

        assert!(state.is_handled("job_1.xps"));
        assert!(!state.observe("job_1.xps", 99));
        assert!(!state.try_claim("job_1.xps"));
        assert_eq!(state.handled_count(), 1);
        assert_eq!(state.in_flight_count(), 0);
    }

    #[test]
    fn released_names_are_new_again() {
        let state = WatchState::new();
        state.observe("job_1.xps", 10);
        assert!(state.try_claim("job_1.xps"));
        state.release("job_1.xps");

        assert!(state.observe("job_1.xps", 10));
        assert!(state.try_claim("job_1.xps"));
    }

    #[test]
    fn ignored_names_are_never_claimed() {
        let state = WatchState::new();
        state.mark_ignored("notes.txt");
        assert!(state.is_ignored("notes.txt"));
        assert!(!state.observe("notes.txt", 1));
        assert!(!state.try_claim("notes.txt"));
    }

    #[test]
    fn vanished_files_are_forgotten() {
        let state = WatchState::new();
        state.observe("job_1.xps", 10);
        state.observe("job_2.xps", 10);
        state.retain_present(&HashSet::from(["job_2.xps".to_string()]));

        assert!(state.observe("job_1.xps", 10));
        assert!(!state.observe("job_2.xps", 10));
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let state = Arc::new(WatchState::new());
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = Arc::clone(&state);
                    scope.spawn(move || state.try_claim("job_1.xps") as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
