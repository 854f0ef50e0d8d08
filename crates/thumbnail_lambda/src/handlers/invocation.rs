use serde_json::Value;
use thiserror::Error;
use thumbnail_core::contract::{
    decode_invocation_event, is_queue_event, InvocationResponse, ValidationError,
};
use tracing::{error, info};

use crate::adapters::budget::InvocationBudget;
use crate::adapters::object_store::StorageGateway;
use crate::config::PipelineConfig;
use crate::handlers::dispatcher::handle_batch;

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("unreadable invocation event: {}", .0.message())]
    InvalidEvent(ValidationError),
    #[error("every attempted notification failed ({failed} of {received})")]
    BatchFailed {
        received: usize,
        failed: usize,
        response: Box<InvocationResponse>,
    },
}

/// Entry point shared by the Lambda runtime and the local runner.
///
/// The invocation fails as a whole only when the envelope cannot be read, or
/// when a direct storage event had failures and no successes. Queue batches
/// always answer with `batchItemFailures` so only retryable messages return
/// to the queue.
pub fn handle_invocation(
    event: Value,
    config: &PipelineConfig,
    gateway: &impl StorageGateway,
    budget: &impl InvocationBudget,
) -> Result<InvocationResponse, InvocationError> {
    let from_queue = is_queue_event(&event);
    let records = decode_invocation_event(&event).map_err(|error| {
        error!(event = "invocation_rejected", details = %error.message());
        InvocationError::InvalidEvent(error)
    })?;
    info!(event = "invocation_received", records = records.len(), from_queue);

    let result = handle_batch(records, config, gateway, budget);
    let received = result.received;
    let failed = result.failed();
    let hard_failure = !from_queue && result.is_hard_failure();
    let response = result.into_response();

    if hard_failure {
        error!(event = "invocation_failed", received, failed);
        return Err(InvocationError::BatchFailed {
            received,
            failed,
            response: Box::new(response),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use serde_json::json;

    use super::*;
    use crate::adapters::budget::NoDeadline;
    use crate::adapters::object_store::StorageError;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        fn with_object(container: &str, key: &str, body: Vec<u8>) -> Self {
            let store = Self::default();
            store
                .objects
                .lock()
                .expect("poisoned mutex")
                .insert(format!("{container}/{key}"), body);
            store
        }

        fn contains(&self, container: &str, key: &str) -> bool {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .contains_key(&format!("{container}/{key}"))
        }
    }

    impl StorageGateway for MemoryStore {
        fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .get(&format!("{container}/{key}"))
                .cloned()
                .ok_or_else(|| StorageError::NotFound {
                    container: container.to_string(),
                    key: key.to_string(),
                })
        }

        fn put_object(
            &self,
            container: &str,
            key: &str,
            body: &[u8],
            _content_type: &str,
        ) -> Result<(), StorageError> {
            self.objects
                .lock()
                .expect("poisoned mutex")
                .insert(format!("{container}/{key}"), body.to_vec());
            Ok(())
        }
    }

    fn png_image(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .expect("png encoding should succeed");
        cursor.into_inner()
    }

    fn storage_event(bucket: &str, keys: &[&str]) -> Value {
        json!({
            "Records": keys.iter().map(|key| json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": bucket},
                    "object": {"key": key, "size": 1024}
                }
            })).collect::<Vec<_>>()
        })
    }

    #[test]
    fn storage_event_produces_summary_response() {
        let store = MemoryStore::with_object("photos", "original/cat.png", png_image(600, 400));

        let response = handle_invocation(
            storage_event("photos", &["original/cat.png", "small/cat.png"]),
            &PipelineConfig::default(),
            &store,
            &NoDeadline,
        )
        .expect("invocation should succeed");

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.message, "Images resized successfully");
        assert_eq!(response.body.processed_files, 1);
        assert_eq!(response.body.skipped_files, 1);
        assert!(response.batch_item_failures.is_empty());
        assert!(store.contains("photos", "small/cat.png"));
        assert!(store.contains("photos", "medium/cat.png"));
    }

    fn queue_record(message_id: &str, body: String) -> Value {
        json!({"eventSource": "aws:sqs", "messageId": message_id, "body": body})
    }

    #[test]
    fn queue_event_acknowledges_non_retryable_failures() {
        let store = MemoryStore::with_object("photos", "original/ok.png", png_image(40, 40));
        let event = json!({
            "Records": [
                queue_record("m-ok", storage_event("photos", &["original/ok.png"]).to_string()),
                queue_record("m-missing", storage_event("photos", &["original/missing.png"]).to_string()),
                queue_record("m-test", json!({"Event": "s3:TestEvent"}).to_string()),
            ]
        });

        let response = handle_invocation(event, &PipelineConfig::default(), &store, &NoDeadline)
            .expect("partial failure should not fail the invocation");

        assert_eq!(response.body.processed_files, 1);
        assert_eq!(response.body.failed_files, 1);
        assert_eq!(
            response.body.message,
            "Images resized with 1 failed notification(s)"
        );
        assert!(response.batch_item_failures.is_empty());
    }

    #[test]
    fn queue_event_redelivers_messages_cut_off_by_the_deadline() {
        struct Exhausted;
        impl InvocationBudget for Exhausted {
            fn remaining(&self) -> Option<std::time::Duration> {
                Some(std::time::Duration::ZERO)
            }
        }

        let store = MemoryStore::with_object("photos", "original/a.png", png_image(40, 40));
        let event = json!({
            "Records": [
                queue_record("m-a", storage_event("photos", &["original/a.png"]).to_string()),
                queue_record("m-b", storage_event("photos", &["original/missing.png"]).to_string()),
            ]
        });

        let response = handle_invocation(event, &PipelineConfig::default(), &store, &Exhausted)
            .expect("queue batches answer with item failures");

        assert_eq!(response.body.failed_files, 2);
        let ids: Vec<&str> = response
            .batch_item_failures
            .iter()
            .map(|failure| failure.item_identifier.as_str())
            .collect();
        assert_eq!(ids, vec!["m-a", "m-b"]);
    }

    #[test]
    fn unreadable_envelope_fails_the_invocation() {
        let error = handle_invocation(
            json!({"detail": "not a storage event"}),
            &PipelineConfig::default(),
            &MemoryStore::default(),
            &NoDeadline,
        )
        .expect_err("invocation should fail");

        assert!(matches!(error, InvocationError::InvalidEvent(_)));
        assert!(error.to_string().starts_with("unreadable invocation event"));
    }

    #[test]
    fn all_failed_batch_is_a_hard_failure() {
        let error = handle_invocation(
            storage_event("photos", &["original/a.png", "original/b.png"]),
            &PipelineConfig::default(),
            &MemoryStore::default(),
            &NoDeadline,
        )
        .expect_err("invocation should fail");

        match error {
            InvocationError::BatchFailed {
                received,
                failed,
                response,
            } => {
                assert_eq!((received, failed), (2, 2));
                assert_eq!(response.body.failed_files, 2);
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
    }

    #[test]
    fn simplified_records_batch_is_accepted() {
        let store = MemoryStore::with_object("local", "original/dog.png", png_image(1000, 10));

        let response = handle_invocation(
            json!({"records": [{"container": "local", "key": "original/dog.png"}]}),
            &PipelineConfig::default(),
            &store,
            &NoDeadline,
        )
        .expect("invocation should succeed");

        assert_eq!(response.body.processed_files, 1);
        let outcome = serde_json::to_value(&response.body.outcomes[0]).expect("serializes");
        assert_eq!(outcome["status"], "succeeded");
        assert_eq!(outcome["variants"][0]["width"], 300);
        assert_eq!(outcome["variants"][0]["height"], 3);
    }

    #[test]
    fn empty_batch_succeeds() {
        let response = handle_invocation(
            json!({"Records": []}),
            &PipelineConfig::default(),
            &MemoryStore::default(),
            &NoDeadline,
        )
        .expect("empty batch should succeed");
        assert_eq!(response.body.processed_files, 0);
        assert!(response.body.outcomes.is_empty());
    }
}
