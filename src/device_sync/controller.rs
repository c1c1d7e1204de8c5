use super::error::{ServiceError, SyncError};
use super::failure::FailureDetector;
use super::model::{
    BatchDetail, BatchSummary, CommandOutcome, FailedRecord, LogEntry, LogKind, ProgressSnapshot,
    RetryRequest, StartBatchRequest, Strategy, SyncAttempt, SyncOptions, SyncStatus,
};
use super::notify::{Notifier, Tone};
use super::persist::{epoch_seconds, PersistenceManager, Restored};
use super::progress::Applied;
use super::retry::{retry_request, retry_seed_log, RetryMode};
use super::service::SyncService;
use super::SyncPolicy;

/// Identifies the attempt a poll request was issued for. Responses carrying
/// an outdated ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Progress,
    Completed { failed: u64 },
    Redundant,
    Failed { consecutive: u32 },
    /// The failure threshold was reached and the attempt is now `Error`.
    GaveUp,
    Stale,
    /// Another invocation sharing the session file cancelled, finished or
    /// replaced this attempt; watching stops without writing.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Nothing,
    /// An in-flight attempt was restored; the caller should start polling.
    Resumed,
    /// A recently completed attempt was restored for display and retry.
    Restored,
    Stale,
    Discarded,
}

enum StartCommand {
    Batch(StartBatchRequest),
    Retry(RetryRequest),
}

/// Owns the current attempt and serializes every transition into it.
pub struct Controller<S, N> {
    service: S,
    notifier: N,
    persistence: PersistenceManager,
    policy: SyncPolicy,
    attempt: SyncAttempt,
    failures: FailureDetector,
    generation: u64,
    /// The session file was last written (or read) by this controller for
    /// the current attempt.
    slot_held: bool,
}

impl<S: SyncService, N: Notifier> Controller<S, N> {
    pub fn new(
        service: S,
        notifier: N,
        persistence: PersistenceManager,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            service,
            notifier,
            persistence,
            failures: FailureDetector::new(policy.failure_threshold),
            policy,
            attempt: SyncAttempt::default(),
            generation: 0,
            slot_held: false,
        }
    }

    pub fn attempt(&self) -> &SyncAttempt {
        &self.attempt
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Failed records offered for retry once the attempt has finished.
    pub fn retryable_records(&self) -> Option<&[FailedRecord]> {
        if self.attempt.status.is_terminal() && !self.attempt.failed_records.is_empty() {
            Some(&self.attempt.failed_records)
        } else {
            None
        }
    }

    pub fn resume_from_persistence(&mut self) -> ResumeOutcome {
        match self.persistence.load(self.policy.staleness_window) {
            Restored::InFlight(attempt) => {
                tracing::info!(
                    attempt_id = attempt.attempt_id.as_deref().unwrap_or("-"),
                    sent = attempt.counters.sent,
                    total = attempt.counters.total,
                    "resuming in-flight device sync"
                );
                self.notifier.notify(
                    Tone::Info,
                    &format!(
                        "Resumed device sync in progress ({} of {} sent)",
                        attempt.counters.sent, attempt.counters.total
                    ),
                );
                self.attempt = attempt;
                self.slot_held = true;
                self.failures.reset();
                self.next_generation();
                ResumeOutcome::Resumed
            }
            Restored::Finished(attempt) => {
                self.attempt = attempt;
                self.next_generation();
                ResumeOutcome::Restored
            }
            Restored::Nothing => ResumeOutcome::Nothing,
            Restored::Stale => {
                self.attempt = SyncAttempt::default();
                ResumeOutcome::Stale
            }
            Restored::Discarded => {
                self.attempt = SyncAttempt::default();
                ResumeOutcome::Discarded
            }
        }
    }

    pub async fn start_full_sync(
        &mut self,
        strategy: Strategy,
        options: SyncOptions,
    ) -> Result<(), SyncError> {
        let seed = LogEntry::now(
            LogKind::Info,
            format!("Starting device sync (strategy: {})", strategy.as_str()),
        );
        self.launch(seed, StartCommand::Batch(StartBatchRequest { strategy, options }))
            .await
    }

    pub async fn retry_failed(
        &mut self,
        records: &[FailedRecord],
        mode: RetryMode,
    ) -> Result<(), SyncError> {
        if self.attempt.is_syncing() {
            return Err(SyncError::AttemptActive);
        }
        if records.is_empty() {
            return Err(SyncError::NoFailedRecords);
        }
        let seed = retry_seed_log(records, mode);
        self.launch(seed, StartCommand::Retry(retry_request(records, mode)))
            .await
    }

    /// Pushes one record on its own. The batch attempt is left untouched.
    pub async fn start_single_record_sync(
        &self,
        record_id: &str,
    ) -> Result<CommandOutcome, SyncError> {
        match self.service.sync_record(record_id).await {
            Ok(outcome) => {
                let tone = if outcome.success {
                    Tone::Success
                } else {
                    Tone::Error
                };
                let message = if outcome.message.is_empty() {
                    format!("Record {record_id}: {}", if outcome.success { "sent" } else { "failed" })
                } else {
                    outcome.message.clone()
                };
                self.notifier.notify(tone, &message);
                Ok(outcome)
            }
            Err(err) => {
                self.notifier
                    .notify(Tone::Error, &format!("Could not push record {record_id}: {err}"));
                Err(err.into())
            }
        }
    }

    /// Stops watching the running attempt. The server-side job is not undone.
    pub fn cancel(&mut self) -> Result<(), SyncError> {
        if !self.attempt.is_syncing() {
            return Err(SyncError::InvalidTransition {
                action: "cancel",
                status: self.attempt.status,
            });
        }
        self.attempt.mark_cancelled();
        self.failures.reset();
        self.next_generation();
        self.clear_storage();
        tracing::info!("device sync cancelled locally");
        Ok(())
    }

    pub fn dismiss(&mut self, retain_logs: bool) -> Result<(), SyncError> {
        if !self.attempt.status.is_terminal() {
            return Err(SyncError::InvalidTransition {
                action: "dismiss",
                status: self.attempt.status,
            });
        }
        let logs = if retain_logs {
            std::mem::take(&mut self.attempt.logs)
        } else {
            Vec::new()
        };
        self.attempt = SyncAttempt {
            local_log_len: logs.len(),
            logs,
            ..SyncAttempt::default()
        };
        self.next_generation();
        self.clear_storage();
        Ok(())
    }

    /// Asks the service to halt the running job. Best effort: the service may
    /// keep running it regardless.
    pub async fn request_abort(&self) -> Result<(), SyncError> {
        self.service.abort_batch().await?;
        Ok(())
    }

    /// A batch is running here or in another invocation of the same
    /// session. Reads the session file without resuming it.
    pub fn sync_running(&self) -> bool {
        self.attempt.is_syncing() || self.session_has_running_attempt()
    }

    pub async fn clear_device_records(&self) -> Result<CommandOutcome, SyncError> {
        if self.sync_running() {
            return Err(SyncError::AttemptActive);
        }
        let outcome = self.service.clear_device_records().await?;
        let tone = if outcome.success {
            Tone::Success
        } else {
            Tone::Error
        };
        self.notifier.notify(tone, &outcome.message);
        Ok(outcome)
    }

    pub async fn list_batches(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BatchSummary>, SyncError> {
        Ok(self.service.list_batches(page, page_size).await?)
    }

    pub async fn batch_detail(&self, batch_id: &str) -> Result<BatchDetail, SyncError> {
        Ok(self.service.batch_detail(batch_id).await?)
    }

    pub fn poll_ticket(&self) -> Option<PollTicket> {
        self.attempt.is_syncing().then_some(PollTicket {
            generation: self.generation,
        })
    }

    pub fn apply_poll_result(
        &mut self,
        ticket: PollTicket,
        result: Result<ProgressSnapshot, ServiceError>,
    ) -> PollEvent {
        if ticket.generation != self.generation || !self.attempt.is_syncing() {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping poll response for an attempt no longer being watched"
            );
            return PollEvent::Stale;
        }
        if !self.confirm_slot_ownership() {
            return PollEvent::Released;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => return self.record_poll_failure(&err.to_string()),
        };

        let counters = snapshot.merged_counters(&self.attempt.counters);
        if !counters.is_consistent() {
            return self.record_poll_failure(&format!(
                "snapshot counters out of bounds: {} settled, {} sent, {} total",
                counters.settled(),
                counters.sent,
                counters.total
            ));
        }
        if counters.confirmed + counters.failed > counters.sent {
            tracing::debug!(?counters, "server reports more results than records sent");
        }

        self.failures.record_success();
        match self.attempt.apply_snapshot(snapshot) {
            Applied::Progress => {
                self.persist();
                PollEvent::Progress
            }
            Applied::JustCompleted => {
                self.persist();
                self.announce_completion();
                PollEvent::Completed {
                    failed: self.attempt.counters.failed,
                }
            }
            Applied::Redundant => PollEvent::Redundant,
        }
    }

    async fn launch(&mut self, seed: LogEntry, command: StartCommand) -> Result<(), SyncError> {
        if self.attempt.is_syncing() {
            return Err(SyncError::AttemptActive);
        }

        let previous = std::mem::replace(&mut self.attempt, SyncAttempt::starting(seed));
        self.failures.reset();
        self.next_generation();
        self.persist();

        let ack = match &command {
            StartCommand::Batch(request) => self.service.start_batch(request).await,
            StartCommand::Retry(request) => self.service.retry_failed(request).await,
        };

        match ack {
            Ok(ack) => {
                if let Some(batch_id) = ack.batch_id.filter(|id| !id.is_empty()) {
                    self.attempt.attempt_id = Some(batch_id);
                }
                if let Some(message) = ack.message.filter(|m| !m.is_empty()) {
                    tracing::debug!(%message, "sync service accepted start command");
                }
                self.persist();
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "sync service rejected start command");
                self.attempt = previous;
                self.next_generation();
                self.clear_storage();
                self.notifier
                    .notify(Tone::Error, &format!("Could not start device sync: {err}"));
                Err(err.into())
            }
        }
    }

    fn record_poll_failure(&mut self, reason: &str) -> PollEvent {
        if self.failures.record_failure() {
            tracing::warn!(
                reason,
                threshold = self.failures.threshold(),
                "progress polling failed repeatedly; marking sync as errored"
            );
            self.attempt.mark_unreachable();
            self.next_generation();
            self.clear_storage();
            self.notifier.notify(
                Tone::Error,
                "Lost contact with the sync service; the job may still be running on the server",
            );
            return PollEvent::GaveUp;
        }

        let consecutive = self.failures.consecutive();
        tracing::warn!(reason, consecutive, "progress poll failed");
        PollEvent::Failed { consecutive }
    }

    /// Re-reads the session file before this attempt writes to it again.
    /// Returns false, after adopting what the other invocation left behind,
    /// when the file no longer holds this attempt as running.
    fn confirm_slot_ownership(&mut self) -> bool {
        if !self.slot_held {
            return true;
        }
        let held = match self.persistence.peek() {
            Ok(held) => held.map(|snapshot| snapshot.attempt),
            Err(err) => {
                tracing::warn!(error = %err, "could not re-read persisted sync attempt");
                return true;
            }
        };

        match held {
            Some(other) if other.token == self.attempt.token => {
                if other.is_syncing() {
                    return true;
                }
                // Finished by a concurrent watcher, which already announced it.
                tracing::info!(status = %other.status, "sync attempt settled in another invocation");
                self.attempt = other;
            }
            Some(_) => {
                tracing::warn!("another sync attempt took over this session");
                self.attempt
                    .mark_released("Another sync took over this session; stopped watching");
                self.notifier.notify(
                    Tone::Warning,
                    "Another device sync took over this session; stopped watching",
                );
            }
            None => {
                tracing::warn!("persisted sync attempt removed by another invocation");
                self.attempt
                    .mark_released("Sync cancelled from another session; stopped watching");
                self.notifier.notify(
                    Tone::Warning,
                    "The device sync was cancelled from another session; stopped watching",
                );
            }
        }
        self.slot_held = false;
        self.failures.reset();
        self.next_generation();
        false
    }

    fn session_has_running_attempt(&self) -> bool {
        match self.persistence.peek() {
            Ok(Some(snapshot)) => {
                snapshot.attempt.is_syncing()
                    && epoch_seconds().saturating_sub(snapshot.saved_at)
                        <= self.policy.staleness_window.as_secs()
            }
            Ok(None) => false,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring unreadable persisted sync attempt");
                false
            }
        }
    }

    fn announce_completion(&self) {
        let tone = if self.attempt.counters.failed > 0 {
            Tone::Warning
        } else {
            Tone::Success
        };
        self.notifier.notify(tone, &self.attempt.summary_line());
    }

    fn next_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn persist(&mut self) {
        match self.persistence.save(&self.attempt) {
            Ok(()) => self.slot_held = true,
            Err(err) => {
                // Without a written slot there is nothing to compare against.
                self.slot_held = false;
                tracing::warn!(error = %err, "failed to persist sync attempt");
            }
        }
    }

    fn clear_storage(&mut self) {
        self.slot_held = false;
        if let Err(err) = self.persistence.clear() {
            tracing::warn!(error = %err, "failed to clear persisted sync attempt");
        }
    }
}

#[cfg(test)]
impl<S: SyncService, N: Notifier> Controller<S, N> {
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive()
    }

    /// One poll without the scheduler.
    pub async fn poll_once(&mut self) -> PollEvent {
        let Some(ticket) = self.poll_ticket() else {
            return PollEvent::Stale;
        };
        let result = self.service.progress().await;
        self.apply_poll_result(ticket, result)
    }
}
