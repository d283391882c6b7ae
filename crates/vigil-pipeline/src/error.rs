use std::future::Future;
use std::time::Duration;

use vigil_cache::CacheError;
use vigil_queue::QueueError;
use vigil_storage::StorageError;

/// Why a stage could not process a message.
///
/// The variant alone decides what happens to the delivery; see
/// [`StageError::disposition`].
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The payload could not be decoded or lacks a required part.
    #[error("Pipeline: malformed message: {0}")]
    Malformed(String),

    /// The message names a device, rule or alarm that does not exist.
    #[error("Pipeline: unknown reference: {0}")]
    UnknownReference(String),

    /// The message decoded fine but failed validation (disabled device,
    /// token mismatch, tenant mismatch).
    #[error("Pipeline: rejected: {0}")]
    Rejected(String),

    /// The tenant is not (yet) readable. May be replica lag.
    #[error("Pipeline: org {0} not visible")]
    TenantNotVisible(String),

    /// Storage, cache or broker failure, or an operation timeout.
    #[error("Pipeline: infrastructure failure: {0}")]
    Infrastructure(String),
}

/// What the worker does with a delivery that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Ack and forget; retrying cannot help.
    Drop,
    /// Redeliver, up to the configured transient limit, then dead-letter.
    RetryBounded,
    /// Redeliver until it succeeds.
    Retry,
}

impl StageError {
    pub fn disposition(&self) -> Disposition {
        match self {
            StageError::Malformed(_) | StageError::UnknownReference(_) | StageError::Rejected(_) => {
                Disposition::Drop
            }
            StageError::TenantNotVisible(_) => Disposition::RetryBounded,
            StageError::Infrastructure(_) => Disposition::Retry,
        }
    }
}

impl From<StorageError> for StageError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => {
                StageError::UnknownReference(format!("{entity} {id}"))
            }
            e if e.is_infrastructure() => StageError::Infrastructure(e.to_string()),
            e => StageError::Rejected(e.to_string()),
        }
    }
}

impl From<CacheError> for StageError {
    fn from(err: CacheError) -> Self {
        StageError::Infrastructure(err.to_string())
    }
}

impl From<QueueError> for StageError {
    fn from(err: QueueError) -> Self {
        StageError::Infrastructure(err.to_string())
    }
}

impl From<prost::DecodeError> for StageError {
    fn from(err: prost::DecodeError) -> Self {
        StageError::Malformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StageError>;

/// Runs `fut` under `limit`. The outer result is the timeout; the inner one
/// is left to the caller so it can classify the operation's own error.
pub(crate) async fn timed<T, E>(
    limit: Duration,
    op: &'static str,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<std::result::Result<T, E>> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        StageError::Infrastructure(format!("{op} timed out after {}ms", limit.as_millis()))
    })
}
