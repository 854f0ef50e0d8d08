use thiserror::Error;
use thumbnail_core::contract::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("object '{key}' not found in '{container}'")]
    NotFound { container: String, key: String },
    #[error("transient storage failure: {0}")]
    TransientIo(String),
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::TransientIo(_) => ErrorKind::TransientIo,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
        }
    }
}

/// Fetch and store object bytes by container and key.
///
/// Both calls are synchronous and unary. Implementations backed by async
/// clients bridge with `tokio::task::block_in_place`.
pub trait StorageGateway {
    fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    fn put_object(
        &self,
        container: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
}
