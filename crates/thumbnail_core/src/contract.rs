use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage_keys::decode_object_key;

pub const QUEUE_EVENT_SOURCE: &str = "aws:sqs";
pub const STORAGE_TEST_EVENT: &str = "s3:TestEvent";
pub const OBJECT_CREATED_PREFIX: &str = "ObjectCreated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Closed set of reasons a notification can fail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeError,
    NotFound,
    TransientIo,
    QuotaExceeded,
    EncodeError,
    DeadlineExceeded,
    MalformedRecord,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DecodeError => "decode_error",
            Self::NotFound => "not_found",
            Self::TransientIo => "transient_io",
            Self::QuotaExceeded => "quota_exceeded",
            Self::EncodeError => "encode_error",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::MalformedRecord => "malformed_record",
        }
    }

    /// Whether redelivering the same notification can succeed.
    pub fn retryable(self) -> bool {
        matches!(self, Self::TransientIo | Self::DeadlineExceeded)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeError {
    pub error_code: ErrorKind,
    pub error_message: String,
}

impl OutcomeError {
    pub fn new(error_code: ErrorKind, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: error_message.into(),
        }
    }
}

/// One upload event, in the order it arrived within the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sequence: usize,
    pub container: String,
    pub encoded_key: String,
    pub event_name: Option<String>,
    pub size: Option<u64>,
    pub source_message_id: Option<String>,
}

impl Notification {
    pub fn key(&self) -> Result<String, ValidationError> {
        decode_object_key(&self.encoded_key)
    }

    pub fn is_object_created(&self) -> bool {
        self.event_name
            .as_deref()
            .map(|name| name.starts_with(OBJECT_CREATED_PREFIX))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRecord {
    Notification(Notification),
    Malformed {
        sequence: usize,
        source_message_id: Option<String>,
        message: String,
    },
}

impl InboundRecord {
    pub fn sequence(&self) -> usize {
        match self {
            Self::Notification(notification) => notification.sequence,
            Self::Malformed { sequence, .. } => *sequence,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StorageEvent {
    #[serde(rename = "Records")]
    records: Vec<StorageEventRecord>,
}

#[derive(Debug, Deserialize)]
struct StorageEventRecord {
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
    s3: StorageEntity,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: StorageBucket,
    object: StorageObject,
}

#[derive(Debug, Deserialize)]
struct StorageBucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StorageObject {
    key: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct QueueRecord {
    #[serde(rename = "messageId")]
    message_id: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct SimplifiedBatch {
    records: Vec<SimplifiedRecord>,
}

#[derive(Debug, Deserialize)]
struct SimplifiedRecord {
    container: String,
    key: String,
}

pub fn is_queue_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == QUEUE_EVENT_SOURCE)
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

/// Flattens any supported invocation payload into notifications numbered in
/// arrival order.
pub fn decode_invocation_event(event: &Value) -> Result<Vec<InboundRecord>, ValidationError> {
    if is_queue_event(event) {
        return decode_queue_event(event);
    }

    if event.get("Records").is_some() {
        let storage_event: StorageEvent = serde_json::from_value(event.clone())
            .map_err(|error| ValidationError::new(format!("invalid storage event: {error}")))?;
        let mut records = Vec::with_capacity(storage_event.records.len());
        append_storage_records(&mut records, storage_event, None);
        return Ok(records);
    }

    if event.get("records").is_some() {
        let batch: SimplifiedBatch = serde_json::from_value(event.clone())
            .map_err(|error| ValidationError::new(format!("invalid records batch: {error}")))?;
        return Ok(batch
            .records
            .into_iter()
            .enumerate()
            .map(|(sequence, record)| {
                InboundRecord::Notification(Notification {
                    sequence,
                    container: record.container,
                    encoded_key: record.key,
                    event_name: None,
                    size: None,
                    source_message_id: None,
                })
            })
            .collect());
    }

    Err(ValidationError::new(
        "invocation payload must carry a Records or records array",
    ))
}

fn decode_queue_event(event: &Value) -> Result<Vec<InboundRecord>, ValidationError> {
    let raw_records = event
        .get("Records")
        .cloned()
        .ok_or_else(|| ValidationError::new("queue event must include Records array"))?;
    let queue_records: Vec<QueueRecord> = serde_json::from_value(raw_records)
        .map_err(|error| ValidationError::new(format!("invalid queue record: {error}")))?;

    let mut records = Vec::new();
    for queue_record in queue_records {
        match decode_queue_body(&queue_record.body) {
            Ok(Some(storage_event)) => {
                append_storage_records(&mut records, storage_event, Some(&queue_record.message_id));
            }
            Ok(None) => {}
            Err(message) => records.push(InboundRecord::Malformed {
                sequence: records.len(),
                source_message_id: Some(queue_record.message_id),
                message,
            }),
        }
    }

    Ok(records)
}

fn decode_queue_body(body: &str) -> Result<Option<StorageEvent>, String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|error| format!("queue message body is not JSON: {error}"))?;

    if value.get("Event").and_then(Value::as_str) == Some(STORAGE_TEST_EVENT) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|error| format!("queue message body is not a storage event: {error}"))
}

fn append_storage_records(
    records: &mut Vec<InboundRecord>,
    storage_event: StorageEvent,
    source_message_id: Option<&str>,
) {
    for record in storage_event.records {
        records.push(InboundRecord::Notification(Notification {
            sequence: records.len(),
            container: record.s3.bucket.name,
            encoded_key: record.s3.object.key,
            event_name: record.event_name,
            size: record.s3.object.size,
            source_message_id: source_message_id.map(str::to_string),
        }));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantRecord {
    pub profile: String,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Succeeded {
        variants: Vec<VariantRecord>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: OutcomeError,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        stored_variants: Vec<VariantRecord>,
    },
}

impl NotificationOutcome {
    pub fn failed(error_code: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            error: OutcomeError::new(error_code, message),
            stored_variants: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationReport {
    pub sequence: usize,
    pub container: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    #[serde(flatten)]
    pub outcome: NotificationOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub received: usize,
    pub reports: Vec<NotificationReport>,
}

impl BatchResult {
    pub fn processed(&self) -> usize {
        self.count(|outcome| matches!(outcome, NotificationOutcome::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, NotificationOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, NotificationOutcome::Failed { .. }))
    }

    /// A batch only fails as a whole when nothing it attempted succeeded.
    pub fn is_hard_failure(&self) -> bool {
        self.failed() > 0 && self.processed() == 0
    }

    /// Queue message ids carrying at least one retryable failure, in arrival
    /// order. Messages whose failures cannot succeed on redelivery are left
    /// out so the queue acknowledges them.
    pub fn retryable_message_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for report in &self.reports {
            let retryable = match &report.outcome {
                NotificationOutcome::Failed { error, .. } => error.error_code.retryable(),
                _ => false,
            };
            if !retryable {
                continue;
            }
            if let Some(id) = &report.source_message_id {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    pub fn into_response(self) -> InvocationResponse {
        let processed_files = self.processed();
        let skipped_files = self.skipped();
        let failed_files = self.failed();
        let batch_item_failures = self
            .retryable_message_ids()
            .into_iter()
            .map(|item_identifier| BatchItemFailure { item_identifier })
            .collect();

        let message = if failed_files == 0 {
            "Images resized successfully".to_string()
        } else {
            format!("Images resized with {failed_files} failed notification(s)")
        };

        InvocationResponse {
            status_code: 200,
            body: BatchSummary {
                message,
                processed_files,
                skipped_files,
                failed_files,
                outcomes: self.reports,
            },
            batch_item_failures,
        }
    }

    fn count(&self, predicate: impl Fn(&NotificationOutcome) -> bool) -> usize {
        self.reports
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub message: String,
    #[serde(rename = "processedFiles")]
    pub processed_files: usize,
    #[serde(rename = "skippedFiles")]
    pub skipped_files: usize,
    #[serde(rename = "failedFiles")]
    pub failed_files: usize,
    pub outcomes: Vec<NotificationReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: BatchSummary,
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn storage_event(keys: &[&str]) -> Value {
        json!({
            "Records": keys.iter().map(|key| json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "photos"},
                    "object": {"key": key, "size": 1024}
                }
            })).collect::<Vec<_>>()
        })
    }

    fn notification_of(record: &InboundRecord) -> &Notification {
        match record {
            InboundRecord::Notification(notification) => notification,
            other => panic!("expected notification, got {other:?}"),
        }
    }

    fn report(sequence: usize, message_id: Option<&str>, outcome: NotificationOutcome) -> NotificationReport {
        NotificationReport {
            sequence,
            container: "photos".to_string(),
            key: format!("original/{sequence}.jpg"),
            source_message_id: message_id.map(str::to_string),
            outcome,
        }
    }

    fn succeeded() -> NotificationOutcome {
        NotificationOutcome::Succeeded {
            variants: Vec::new(),
        }
    }

    #[test]
    fn decodes_storage_event_records_in_order() {
        let records = decode_invocation_event(&storage_event(&["original/a.jpg", "original/b+c.jpg"]))
            .expect("event should decode");

        assert_eq!(records.len(), 2);
        let second = notification_of(&records[1]);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.container, "photos");
        assert_eq!(second.encoded_key, "original/b+c.jpg");
        assert_eq!(second.key().expect("key should decode"), "original/b c.jpg");
        assert_eq!(second.size, Some(1024));
        assert!(second.is_object_created());
        assert_eq!(second.source_message_id, None);
    }

    #[test]
    fn flags_non_creation_events() {
        let event = json!({
            "Records": [{
                "eventName": "ObjectRemoved:Delete",
                "s3": {"bucket": {"name": "photos"}, "object": {"key": "original/a.jpg"}}
            }]
        });
        let records = decode_invocation_event(&event).expect("event should decode");
        assert!(!notification_of(&records[0]).is_object_created());
    }

    #[test]
    fn decodes_simplified_records_batch() {
        let event = json!({
            "records": [
                {"container": "photos", "key": "original/photo.jpg"},
                {"container": "photos", "key": "thumbnails/foo.jpg"}
            ]
        });
        let records = decode_invocation_event(&event).expect("event should decode");

        assert_eq!(records.len(), 2);
        let first = notification_of(&records[0]);
        assert_eq!(first.encoded_key, "original/photo.jpg");
        assert_eq!(first.event_name, None);
        assert!(first.is_object_created());
    }

    #[test]
    fn unwraps_queue_messages_and_keeps_message_ids() {
        let body = storage_event(&["original/a.jpg", "original/b.jpg"]).to_string();
        let test_event = json!({"Service": "Amazon S3", "Event": "s3:TestEvent"}).to_string();
        let event = json!({
            "Records": [
                {"eventSource": "aws:sqs", "messageId": "m-1", "body": body},
                {"eventSource": "aws:sqs", "messageId": "m-2", "body": test_event},
                {"eventSource": "aws:sqs", "messageId": "m-3", "body": "not json"}
            ]
        });

        let records = decode_invocation_event(&event).expect("event should decode");
        assert_eq!(records.len(), 3);
        assert_eq!(notification_of(&records[0]).source_message_id.as_deref(), Some("m-1"));
        assert_eq!(notification_of(&records[1]).sequence, 1);
        match &records[2] {
            InboundRecord::Malformed {
                sequence,
                source_message_id,
                message,
            } => {
                assert_eq!(*sequence, 2);
                assert_eq!(source_message_id.as_deref(), Some("m-3"));
                assert!(message.contains("queue message body is not JSON"));
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_payloads() {
        let error = decode_invocation_event(&json!({"hello": "world"})).expect_err("should fail");
        assert_eq!(
            error.message(),
            "invocation payload must carry a Records or records array"
        );

        let error = decode_invocation_event(&json!({"Records": [{"s3": {}}]}))
            .expect_err("should fail");
        assert!(error.message().starts_with("invalid storage event"));
    }

    #[test]
    fn only_retryable_kinds_are_transient() {
        assert!(ErrorKind::TransientIo.retryable());
        assert!(ErrorKind::DeadlineExceeded.retryable());
        assert!(!ErrorKind::DecodeError.retryable());
        assert!(!ErrorKind::NotFound.retryable());
        assert!(!ErrorKind::QuotaExceeded.retryable());
    }

    #[test]
    fn hard_failure_only_when_nothing_succeeded() {
        let mixed = BatchResult {
            received: 2,
            reports: vec![
                report(0, None, succeeded()),
                report(1, None, NotificationOutcome::failed(ErrorKind::DecodeError, "corrupt")),
            ],
        };
        assert!(!mixed.is_hard_failure());

        let all_failed = BatchResult {
            received: 2,
            reports: vec![
                report(0, None, NotificationOutcome::skipped("outside_inbox_prefix")),
                report(1, None, NotificationOutcome::failed(ErrorKind::NotFound, "gone")),
            ],
        };
        assert!(all_failed.is_hard_failure());

        let all_skipped = BatchResult {
            received: 1,
            reports: vec![report(0, None, NotificationOutcome::skipped("outside_inbox_prefix"))],
        };
        assert!(!all_skipped.is_hard_failure());
    }

    #[test]
    fn response_counts_and_deduplicates_failed_messages() {
        let result = BatchResult {
            received: 5,
            reports: vec![
                report(0, Some("m-1"), succeeded()),
                report(1, Some("m-2"), NotificationOutcome::failed(ErrorKind::TransientIo, "timeout")),
                report(2, Some("m-2"), NotificationOutcome::failed(ErrorKind::DecodeError, "corrupt")),
                report(3, Some("m-3"), NotificationOutcome::skipped("outside_inbox_prefix")),
                report(4, Some("m-4"), NotificationOutcome::failed(ErrorKind::NotFound, "gone")),
            ],
        };

        let response = result.into_response();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.processed_files, 1);
        assert_eq!(response.body.skipped_files, 1);
        assert_eq!(response.body.failed_files, 3);
        assert_eq!(
            response.batch_item_failures,
            vec![BatchItemFailure {
                item_identifier: "m-2".to_string()
            }]
        );

        let json = serde_json::to_value(&response).expect("response should serialize");
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"]["processedFiles"], 1);
        assert_eq!(json["body"]["outcomes"][1]["status"], "failed");
        assert_eq!(json["body"]["outcomes"][1]["error"]["error_code"], "transient_io");
        assert_eq!(json["body"]["outcomes"][3]["reason"], "outside_inbox_prefix");
    }

    #[test]
    fn only_retryable_failures_are_redelivered() {
        let result = BatchResult {
            received: 4,
            reports: vec![
                report(0, Some("m-corrupt"), NotificationOutcome::failed(ErrorKind::DecodeError, "corrupt")),
                report(1, Some("m-gone"), NotificationOutcome::failed(ErrorKind::NotFound, "gone")),
                report(2, Some("m-late"), NotificationOutcome::failed(ErrorKind::DeadlineExceeded, "late")),
                report(3, Some("m-bad"), NotificationOutcome::failed(ErrorKind::MalformedRecord, "not json")),
            ],
        };

        assert_eq!(result.retryable_message_ids(), vec!["m-late".to_string()]);
    }
}
