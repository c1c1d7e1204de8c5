use std::future::Future;
use std::time::Duration;

use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use serde::Deserialize;
use urlencoding::encode;

use super::error::ServiceError;
use super::model::{
    BatchDetail, BatchSummary, CommandOutcome, ProgressSnapshot, RetryRequest, StartAck,
    StartBatchRequest,
};
use crate::http::ApiClient;

const SYNC_API: &str = "/api/device-sync";
const PROGRESS_TIMEOUT: Duration = Duration::from_secs(10);
const READ_MAX_ATTEMPTS: usize = 4;
const READ_RETRY_BASE_DELAY_MS: u64 = 300;
const READ_MAX_BACKOFF_SECS: u64 = 4;

/// The server-side executor that talks to the check-in terminals.
#[allow(async_fn_in_trait)]
pub trait SyncService {
    async fn start_batch(&self, request: &StartBatchRequest) -> Result<StartAck, ServiceError>;
    async fn sync_record(&self, record_id: &str) -> Result<CommandOutcome, ServiceError>;
    async fn progress(&self) -> Result<ProgressSnapshot, ServiceError>;
    async fn retry_failed(&self, request: &RetryRequest) -> Result<StartAck, ServiceError>;
    async fn clear_device_records(&self) -> Result<CommandOutcome, ServiceError>;
    async fn list_batches(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BatchSummary>, ServiceError>;
    async fn batch_detail(&self, batch_id: &str) -> Result<BatchDetail, ServiceError>;
    /// Best-effort request to halt the running job. The service may ignore it.
    async fn abort_batch(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Deserialize)]
struct BatchListResponse {
    #[serde(default)]
    records: Vec<BatchSummary>,
}

#[derive(Debug, Clone)]
pub struct HttpSyncService {
    client: ApiClient,
}

impl HttpSyncService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn start(&self, path: &str, body: &impl serde::Serialize) -> Result<StartAck, ServiceError> {
        let ack: Option<StartAck> = self.client.post(path, body).await?;
        let ack = ack.unwrap_or_default();
        if ack.success == Some(false) {
            return Err(ServiceError::Rejected(
                ack.message
                    .unwrap_or_else(|| "start command was not accepted".to_string()),
            ));
        }
        Ok(ack)
    }
}

impl SyncService for HttpSyncService {
    async fn start_batch(&self, request: &StartBatchRequest) -> Result<StartAck, ServiceError> {
        self.start(&format!("{SYNC_API}/batches/start"), request)
            .await
    }

    async fn sync_record(&self, record_id: &str) -> Result<CommandOutcome, ServiceError> {
        let path = format!("{SYNC_API}/records/{}/sync", encode(record_id));
        self.client.post(&path, &serde_json::json!({})).await
    }

    async fn progress(&self) -> Result<ProgressSnapshot, ServiceError> {
        self.client
            .get_within(&format!("{SYNC_API}/progress"), PROGRESS_TIMEOUT)
            .await
    }

    async fn retry_failed(&self, request: &RetryRequest) -> Result<StartAck, ServiceError> {
        self.start(&format!("{SYNC_API}/batches/retry"), request)
            .await
    }

    async fn clear_device_records(&self) -> Result<CommandOutcome, ServiceError> {
        self.client.delete(&format!("{SYNC_API}/records")).await
    }

    async fn list_batches(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<BatchSummary>, ServiceError> {
        let path = format!("{SYNC_API}/batches?page={page}&pageSize={page_size}");
        let list: BatchListResponse =
            with_read_retry("list batches", || self.client.get(&path)).await?;
        Ok(list.records)
    }

    async fn batch_detail(&self, batch_id: &str) -> Result<BatchDetail, ServiceError> {
        let path = format!("{SYNC_API}/batches/{}", encode(batch_id));
        with_read_retry("batch detail", || self.client.get(&path)).await
    }

    async fn abort_batch(&self) -> Result<(), ServiceError> {
        let _: Option<serde_json::Value> = self
            .client
            .post(&format!("{SYNC_API}/batches/abort"), &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

/// Repeats an idempotent read on transport errors and 5xx responses.
async fn with_read_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(READ_RETRY_BASE_DELAY_MS))
        .with_multiplier(2.0)
        .with_randomization_factor(0.2)
        .with_max_interval(Duration::from_secs(READ_MAX_BACKOFF_SECS))
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0usize;
    retry_notify(
        backoff,
        || {
            attempt += 1;
            let current = attempt;
            let request = op();
            async move {
                match request.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_transient() && current < READ_MAX_ATTEMPTS => {
                        Err(BackoffError::transient(err))
                    }
                    Err(err) => Err(BackoffError::permanent(err)),
                }
            }
        },
        |err: ServiceError, delay: Duration| {
            tracing::debug!(error = %err, ?delay, "retrying {what}");
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_sync::model::{SnapshotStatus, Strategy, SyncOptions};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpSyncService {
        HttpSyncService::new(ApiClient::new(&server.uri(), Some("secret")).unwrap())
    }

    #[tokio::test]
    async fn start_batch_forwards_strategy_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/device-sync/batches/start"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "strategy": "unsynced",
                "options": { "validateFirst": true, "photoEncoding": "standard" },
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "success": true, "batchId": "b-42" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = StartBatchRequest {
            strategy: Strategy::Unsynced,
            options: SyncOptions {
                photo_encoding: Some(crate::device_sync::model::PayloadEncoding::Standard),
                validate_first: true,
                ..SyncOptions::default()
            },
        };
        let ack = service(&server).start_batch(&request).await.unwrap();
        assert_eq!(ack.batch_id.as_deref(), Some("b-42"));
    }

    #[tokio::test]
    async fn unsuccessful_ack_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/device-sync/batches/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "no terminals online",
            })))
            .mount(&server)
            .await;

        let request = StartBatchRequest {
            strategy: Strategy::All,
            options: SyncOptions::default(),
        };
        let err = service(&server).start_batch(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(ref msg) if msg == "no terminals online"));
    }

    #[tokio::test]
    async fn progress_decodes_camel_case_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/device-sync/progress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "total": 10,
                "sent": 10,
                "confirmed": 8,
                "failed": 2,
                "skipped": 0,
                "failedRecords": [
                    { "recordId": "LHZ0007", "displayName": "某义工", "reason": "timeout" }
                ],
            })))
            .mount(&server)
            .await;

        let snapshot = service(&server).progress().await.unwrap();
        assert_eq!(snapshot.status, SnapshotStatus::Completed);
        assert_eq!(snapshot.failed_records[0].display_name, "某义工");
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/device-sync/progress"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no job"))
            .mount(&server)
            .await;

        let err = service(&server).progress().await.unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 404, ref body, .. } if body == "no job"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn batch_history_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/device-sync/batches"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/device-sync/batches"))
            .and(query_param("page", "2"))
            .and(query_param("pageSize", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{ "batchId": "b-1", "total": 3, "confirmed": 3 }],
            })))
            .mount(&server)
            .await;

        let batches = service(&server).list_batches(2, 20).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].batch_id, "b-1");
        assert_eq!(batches[0].failed, 0);
    }

    #[tokio::test]
    async fn empty_abort_response_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/device-sync/batches/abort"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        service(&server).abort_batch().await.unwrap();
    }
}
