use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use thumbnail_core::contract::InvocationResponse;
use thumbnail_lambda::adapters::budget::EpochDeadline;
use thumbnail_lambda::adapters::s3_store::S3StorageGateway;
use thumbnail_lambda::config::PipelineConfig;
use thumbnail_lambda::handlers::invocation::handle_invocation;
use thumbnail_lambda::logging::init_tracing;
use tracing::info;

async fn handle_request(
    event: LambdaEvent<Value>,
    config: &PipelineConfig,
    gateway: &S3StorageGateway,
) -> Result<InvocationResponse, Error> {
    info!(
        event = "invocation_started",
        request_id = %event.context.request_id,
        deadline_ms = event.context.deadline,
    );
    let budget = EpochDeadline::new(event.context.deadline);
    let response = handle_invocation(event.payload, config, gateway, &budget)?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = PipelineConfig::from_env()?;
    info!(
        event = "cold_start",
        inbox_prefix = %config.inbox_prefix,
        profiles = config.profiles.len(),
        jpeg_quality = config.jpeg_quality,
        output_bucket = config.output_container.as_deref().unwrap_or_default(),
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let gateway = S3StorageGateway::new(aws_sdk_s3::Client::new(&aws_config));

    let config = &config;
    let gateway = &gateway;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        handle_request(event, config, gateway).await
    }))
    .await
}
