//! Job status notifications.
//!
//! A job reports `STARTED` when it begins, then exactly one of `FINISHED`
//! (after the manifest is written) or `FAILED`. Messages are JSON:
//!
//! ```json
//! {"jobId": "job-1", "stage": "chunk", "status": "FAILED", "error": "RenderError: ..."}
//! ```

use std::fmt;

use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::{ChunkError, ChunkResult};
use crate::storage::block_on;

/// Pipeline stage name carried by every message.
pub const STAGE: &str = "chunk";

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Started,
    Finished,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Started => "STARTED",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Body of a status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub job_id: String,
    pub stage: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl StatusMessage {
    pub fn started(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Started, None)
    }

    pub fn finished(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Finished, None)
    }

    pub fn failed(job_id: &str, error: impl Into<String>) -> Self {
        Self::new(job_id, JobStatus::Failed, Some(error.into()))
    }

    fn new(job_id: &str, status: JobStatus, error: Option<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: STAGE.to_string(),
            status,
            error,
        }
    }

    pub fn to_json(&self) -> ChunkResult<String> {
        serde_json::to_string(self).map_err(|e| ChunkError::Notification(e.to_string()))
    }
}

/// Destination for job status messages.
pub trait StatusNotifier: Send + Sync {
    /// Delivers `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::Notification`] if the queue rejects it.
    fn notify(&self, message: &StatusMessage) -> ChunkResult<()>;
}

/// Used when no status queue is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl StatusNotifier for NoopNotifier {
    fn notify(&self, message: &StatusMessage) -> ChunkResult<()> {
        debug!(status = %message.status, "No status queue configured");
        Ok(())
    }
}

/// Sends status messages to an SQS queue.
pub struct SqsNotifier {
    client: Client,
    queue_url: String,
    handle: Handle,
}

impl SqsNotifier {
    pub fn new(client: Client, queue_url: impl Into<String>, handle: Handle) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            handle,
        }
    }

    /// Connects to `queue_url` in `region` using the default credential
    /// chain.
    pub fn connect(queue_url: impl Into<String>, region: &str, handle: Handle) -> Self {
        let config = block_on(
            &handle,
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load(),
        );
        Self::new(Client::new(&config), queue_url, handle)
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

impl StatusNotifier for SqsNotifier {
    fn notify(&self, message: &StatusMessage) -> ChunkResult<()> {
        let body = message.to_json()?;
        let request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        let output = block_on(&self.handle, request.send())
            .map_err(|e| ChunkError::Notification(format!("{}: {}", self.queue_url, e)))?;

        debug!(
            queue = %self.queue_url,
            status = %message.status,
            message_id = output.message_id().unwrap_or_default(),
            "Sent status message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<StatusMessage>>,
    }

    impl StatusNotifier for Recording {
        fn notify(&self, message: &StatusMessage) -> ChunkResult<()> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn test_started_json() {
        let json = StatusMessage::started("job-1").to_json().unwrap();
        assert_eq!(json, r#"{"jobId":"job-1","stage":"chunk","status":"STARTED"}"#);
    }

    #[test]
    fn test_failed_json_carries_error() {
        let json = StatusMessage::failed("job-1", "RenderError: disk full").to_json().unwrap();
        assert_eq!(
            json,
            r#"{"jobId":"job-1","stage":"chunk","status":"FAILED","error":"RenderError: disk full"}"#
        );
    }

    #[test]
    fn test_message_roundtrip() {
        let message = StatusMessage::finished("job-2");
        let parsed: StatusMessage = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.status.to_string(), "FINISHED");
    }

    #[test]
    fn test_noop_accepts_everything() {
        assert!(NoopNotifier.notify(&StatusMessage::started("job")).is_ok());
    }

    #[test]
    fn test_notifier_as_trait_object() {
        let recording = Recording::default();
        let notifier: &dyn StatusNotifier = &recording;
        notifier.notify(&StatusMessage::started("a")).unwrap();
        notifier.notify(&StatusMessage::finished("a")).unwrap();

        let statuses: Vec<JobStatus> = recording.sent.lock().iter().map(|m| m.status).collect();
        assert_eq!(statuses, vec![JobStatus::Started, JobStatus::Finished]);
    }
}
