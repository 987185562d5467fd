use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("arg {0}")]
    ArgInvalid(&'static str),
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("conflict {0}")]
    Conflict(String),
    #[error("cache {0}")]
    CacheUnavailable(String),
    #[error("store {0}")]
    StoreUnavailable(String),
    #[error("upstream {0}")]
    UpstreamRpc(String),
    #[error("hook rejected {0}")]
    HookRejected(String),
    #[error("transient {0}")]
    Transient(String),
    #[error("internal {0}")]
    Internal(String),
}

impl CoreError {
    // Transient failures are skipped by the consumer; the producer side retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::CacheUnavailable(_)
                | CoreError::StoreUnavailable(_)
                | CoreError::UpstreamRpc(_)
                | CoreError::Transient(_)
        )
    }
}
