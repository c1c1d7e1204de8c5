//! Scripted collaborators for exercising the orchestrator without a server.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::Result;

use super::error::ServiceError;
use super::model::{
    BatchDetail, BatchSummary, CommandOutcome, ProgressSnapshot, RetryRequest, SnapshotStatus,
    StartAck, StartBatchRequest,
};
use super::notify::{Notifier, Tone};
use super::persist::SnapshotStore;
use super::service::SyncService;

#[derive(Default)]
pub struct FakeService {
    progress: RefCell<VecDeque<Result<ProgressSnapshot, ServiceError>>>,
    start_results: RefCell<VecDeque<Result<StartAck, ServiceError>>>,
    pub started: RefCell<Vec<StartBatchRequest>>,
    pub retried: RefCell<Vec<RetryRequest>>,
    pub synced_records: RefCell<Vec<String>>,
    pub progress_calls: RefCell<usize>,
}

impl FakeService {
    pub fn push_progress(&self, result: Result<ProgressSnapshot, ServiceError>) {
        self.progress.borrow_mut().push_back(result);
    }

    pub fn push_start(&self, result: Result<StartAck, ServiceError>) {
        self.start_results.borrow_mut().push_back(result);
    }

    fn next_start(&self) -> Result<StartAck, ServiceError> {
        self.start_results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(StartAck {
                    success: Some(true),
                    message: None,
                    batch_id: Some("batch-1".to_string()),
                })
            })
    }
}

impl SyncService for FakeService {
    async fn start_batch(&self, request: &StartBatchRequest) -> Result<StartAck, ServiceError> {
        self.started.borrow_mut().push(request.clone());
        self.next_start()
    }

    async fn sync_record(&self, record_id: &str) -> Result<CommandOutcome, ServiceError> {
        self.synced_records.borrow_mut().push(record_id.to_string());
        Ok(CommandOutcome {
            success: true,
            message: format!("{record_id} pushed to 2 terminals"),
        })
    }

    async fn progress(&self) -> Result<ProgressSnapshot, ServiceError> {
        *self.progress_calls.borrow_mut() += 1;
        self.progress
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }

    async fn retry_failed(&self, request: &RetryRequest) -> Result<StartAck, ServiceError> {
        self.retried.borrow_mut().push(request.clone());
        self.next_start()
    }

    async fn clear_device_records(&self) -> Result<CommandOutcome, ServiceError> {
        Ok(CommandOutcome {
            success: true,
            message: "cleared".to_string(),
        })
    }

    async fn list_batches(
        &self,
        _page: u32,
        _page_size: u32,
    ) -> Result<Vec<BatchSummary>, ServiceError> {
        Ok(Vec::new())
    }

    async fn batch_detail(&self, batch_id: &str) -> Result<BatchDetail, ServiceError> {
        Ok(BatchDetail {
            summary: BatchSummary {
                batch_id: batch_id.to_string(),
                ..BatchSummary::default()
            },
            logs: Vec::new(),
        })
    }

    async fn abort_batch(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Rc<RefCell<Vec<(Tone, String)>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(Tone, String)> {
        self.events.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, tone: Tone, message: &str) {
        self.events.borrow_mut().push((tone, message.to_string()));
    }
}

/// One shared slot; clones see the same contents, like two page loads in one tab.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemorySnapshotStore {
    pub fn contents(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    pub fn set(&self, contents: &str) {
        *self.slot.borrow_mut() = Some(contents.to_string());
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<()> {
        self.set(contents);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.slot.borrow_mut().take();
        Ok(())
    }
}

pub fn unavailable() -> ServiceError {
    ServiceError::Status {
        url: "http://sync.test/api/device-sync/progress".to_string(),
        status: 503,
        body: "service unavailable".to_string(),
    }
}

pub fn syncing_snapshot(
    total: u64,
    sent: u64,
    confirmed: u64,
    failed: u64,
    skipped: u64,
) -> ProgressSnapshot {
    ProgressSnapshot {
        status: SnapshotStatus::Syncing,
        total: Some(total),
        sent: Some(sent),
        confirmed: Some(confirmed),
        failed: Some(failed),
        skipped: Some(skipped),
        logs: Vec::new(),
        failed_records: Vec::new(),
        start_time: None,
        estimated_time_remaining: None,
        average_time_per_record: None,
        batch_id: None,
    }
}

pub fn completed_snapshot(
    total: u64,
    confirmed: u64,
    failed: u64,
    skipped: u64,
) -> ProgressSnapshot {
    ProgressSnapshot {
        status: SnapshotStatus::Completed,
        ..syncing_snapshot(total, confirmed + failed, confirmed, failed, skipped)
    }
}
