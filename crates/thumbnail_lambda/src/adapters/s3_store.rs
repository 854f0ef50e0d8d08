use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;

use crate::adapters::object_store::{StorageError, StorageGateway};

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];
const QUOTA_CODES: &[&str] = &["QuotaExceeded", "ServiceQuotaExceededException", "EntityTooLarge"];

/// S3-backed gateway. The client is built once per process and reused across
/// invocations for connection pooling.
#[derive(Clone)]
pub struct S3StorageGateway {
    s3_client: aws_sdk_s3::Client,
}

impl S3StorageGateway {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl StorageGateway for S3StorageGateway {
    fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let bucket = container.to_string();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_object()
                    .bucket(&bucket)
                    .key(&object_key)
                    .send()
                    .await
                    .map_err(|error| {
                        classify_get_error(
                            &bucket,
                            &object_key,
                            error.code(),
                            &DisplayErrorContext(&error).to_string(),
                        )
                    })?;

                let body = output.body.collect().await.map_err(|error| {
                    StorageError::TransientIo(format!("failed to read object body from s3: {error}"))
                })?;
                Ok::<_, StorageError>(body.into_bytes().to_vec())
            })
        })
    }

    fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bucket = container.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let content_type = content_type.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .content_type(content_type)
                    .body(ByteStream::from(body_bytes))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        classify_put_error(error.code(), &DisplayErrorContext(&error).to_string())
                    })
            })
        })
    }
}

fn classify_get_error(bucket: &str, key: &str, code: Option<&str>, details: &str) -> StorageError {
    match code {
        // S3 answers 403 instead of 404 for missing keys when the role lacks s3:ListBucket.
        Some(code) if NOT_FOUND_CODES.contains(&code) || code == "AccessDenied" => {
            StorageError::NotFound {
                container: bucket.to_string(),
                key: key.to_string(),
            }
        }
        _ => StorageError::TransientIo(format!("failed to read object from s3: {details}")),
    }
}

fn classify_put_error(code: Option<&str>, details: &str) -> StorageError {
    match code {
        Some(code) if QUOTA_CODES.contains(&code) => {
            StorageError::QuotaExceeded(format!("failed to write object to s3: {details}"))
        }
        _ => StorageError::TransientIo(format!("failed to write object to s3: {details}")),
    }
}
