use std::time::Instant;

use thumbnail_core::contract::{
    BatchResult, ErrorKind, InboundRecord, Notification, NotificationOutcome, NotificationReport,
    OutcomeError, VariantRecord,
};
use thumbnail_core::render::{render_profiles, SourceImage, OUTPUT_CONTENT_TYPE};
use thumbnail_core::storage_keys::{classify_key, derived_variant_key};
use tracing::{error, info, warn};

use crate::adapters::budget::InvocationBudget;
use crate::adapters::object_store::StorageGateway;
use crate::config::PipelineConfig;

/// Processes every record of one invocation in arrival order.
///
/// Each notification ends as succeeded, skipped or failed on its own; a
/// failure never stops later notifications. Once the remaining budget drops
/// below `min_remaining`, no further notification is started.
pub fn handle_batch(
    records: Vec<InboundRecord>,
    config: &PipelineConfig,
    gateway: &impl StorageGateway,
    budget: &impl InvocationBudget,
) -> BatchResult {
    let started_at = Instant::now();
    let received = records.len();
    let mut deadline_reached = false;
    let mut reports = Vec::with_capacity(received);

    for record in records {
        let report = match record {
            InboundRecord::Malformed {
                sequence,
                source_message_id,
                message,
            } => {
                warn!(
                    event = "record_malformed",
                    sequence,
                    message_id = source_message_id.as_deref().unwrap_or_default(),
                    details = %message,
                );
                NotificationReport {
                    sequence,
                    container: String::new(),
                    key: String::new(),
                    source_message_id,
                    outcome: NotificationOutcome::failed(ErrorKind::MalformedRecord, message),
                }
            }
            InboundRecord::Notification(notification) => {
                process_notification(&notification, config, gateway, budget, &mut deadline_reached)
            }
        };
        reports.push(report);
    }

    let result = BatchResult { received, reports };
    info!(
        event = "batch_completed",
        received,
        processed = result.processed(),
        skipped = result.skipped(),
        failed = result.failed(),
        duration_ms = started_at.elapsed().as_millis() as u64,
    );
    result
}

fn process_notification(
    notification: &Notification,
    config: &PipelineConfig,
    gateway: &impl StorageGateway,
    budget: &impl InvocationBudget,
    deadline_reached: &mut bool,
) -> NotificationReport {
    let sequence = notification.sequence;

    let key = match notification.key() {
        Ok(key) => key,
        Err(error) => {
            warn!(
                event = "key_undecodable",
                sequence,
                key = %notification.encoded_key,
                details = %error,
            );
            return report(
                notification,
                notification.encoded_key.clone(),
                NotificationOutcome::failed(ErrorKind::DecodeError, error.message()),
            );
        }
    };

    if !notification.is_object_created() {
        info!(
            event = "notification_skipped",
            sequence,
            key = %key,
            reason = "not_object_created",
            event_name = notification.event_name.as_deref().unwrap_or_default(),
        );
        return report(notification, key, NotificationOutcome::skipped("not_object_created"));
    }

    if let Some(reason) = classify_key(&key, &config.inbox_prefix).skip_reason() {
        info!(event = "notification_skipped", sequence, key = %key, reason);
        return report(notification, key, NotificationOutcome::skipped(reason));
    }

    if !*deadline_reached {
        if let Some(remaining) = budget.remaining() {
            *deadline_reached = remaining < config.min_remaining;
        }
    }
    if *deadline_reached {
        warn!(event = "deadline_guard_tripped", sequence, key = %key);
        return report(
            notification,
            key,
            NotificationOutcome::failed(
                ErrorKind::DeadlineExceeded,
                "not enough invocation time left to start this notification",
            ),
        );
    }

    let outcome = render_and_store(&notification.container, &key, notification.size, config, gateway);
    report(notification, key, outcome)
}

fn render_and_store(
    container: &str,
    key: &str,
    declared_size: Option<u64>,
    config: &PipelineConfig,
    gateway: &impl StorageGateway,
) -> NotificationOutcome {
    let started_at = Instant::now();
    info!(event = "notification_started", container, key, declared_size);

    let bytes = match gateway.get_object(container, key) {
        Ok(bytes) => bytes,
        Err(error) => {
            error!(
                event = "fetch_failed",
                container,
                key,
                error_code = %error.kind(),
                details = %error,
            );
            return NotificationOutcome::failed(error.kind(), error.to_string());
        }
    };

    let source = match SourceImage::decode(&bytes) {
        Ok(source) => source,
        Err(error) => {
            error!(
                event = "decode_failed",
                container,
                key,
                source_bytes = bytes.len(),
                declared_size,
                details = %error,
            );
            return NotificationOutcome::failed(error.kind(), error.to_string());
        }
    };
    drop(bytes);

    info!(
        event = "source_decoded",
        key,
        width = source.width(),
        height = source.height(),
        color = ?source.original_color(),
    );

    let destination = config.output_container.as_deref().unwrap_or(container);
    let mut variants = Vec::with_capacity(config.profiles.len());
    let mut first_error: Option<OutcomeError> = None;

    for (profile, rendered) in render_profiles(&source, &config.profiles, config.jpeg_quality) {
        let variant = match rendered {
            Ok(variant) => variant,
            Err(error) => {
                error!(event = "render_failed", key, profile = %profile.name, details = %error);
                if first_error.is_none() {
                    first_error = Some(OutcomeError::new(
                        error.kind(),
                        format!("profile '{}': {error}", profile.name),
                    ));
                }
                continue;
            }
        };

        let destination_key = derived_variant_key(&profile.name, key);
        match gateway.put_object(destination, &destination_key, &variant.bytes, OUTPUT_CONTENT_TYPE) {
            Ok(()) => {
                info!(
                    event = "variant_stored",
                    key,
                    profile = %profile.name,
                    destination,
                    destination_key = %destination_key,
                    width = variant.width,
                    height = variant.height,
                    bytes = variant.bytes.len(),
                );
                variants.push(VariantRecord {
                    profile: profile.name.clone(),
                    key: destination_key,
                    width: variant.width,
                    height: variant.height,
                    bytes: variant.bytes.len(),
                });
            }
            Err(error) => {
                error!(
                    event = "store_failed",
                    key,
                    profile = %profile.name,
                    destination,
                    destination_key = %destination_key,
                    error_code = %error.kind(),
                    details = %error,
                );
                if first_error.is_none() {
                    first_error = Some(OutcomeError::new(
                        error.kind(),
                        format!("profile '{}': {error}", profile.name),
                    ));
                }
            }
        }
    }

    let duration_ms = started_at.elapsed().as_millis() as u64;
    match first_error {
        None => {
            info!(
                event = "notification_completed",
                key,
                variants = variants.len(),
                duration_ms,
            );
            NotificationOutcome::Succeeded { variants }
        }
        Some(error) => {
            error!(
                event = "notification_failed",
                key,
                stored_variants = variants.len(),
                error_code = %error.error_code,
                duration_ms,
            );
            NotificationOutcome::Failed {
                error,
                stored_variants: variants,
            }
        }
    }
}

fn report(notification: &Notification, key: String, outcome: NotificationOutcome) -> NotificationReport {
    NotificationReport {
        sequence: notification.sequence,
        container: notification.container.clone(),
        key,
        source_message_id: notification.source_message_id.clone(),
        outcome,
    }
}
