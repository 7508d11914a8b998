//! Error taxonomy shared by the monitor components.
//!
//! Store and network failures inside a poll tick are transient and get
//! absorbed by the next tick; only `InvalidArgument` indicates a caller bug.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// No session has been recorded yet. Expected on a fresh store.
    #[error("no session found")]
    NotFound,

    #[error("session store unavailable: {0}")]
    ResolverUnavailable(String),

    #[error("sample fetch failed: {0}")]
    FetchFailed(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("advisory unavailable: {0}")]
    AdvisoryUnavailable(String),

    #[error("notification failed: {0}")]
    NotifyFailed(String),
}

impl MonitorError {
    /// True for failures the poller should retry on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::NotFound
                | MonitorError::ResolverUnavailable(_)
                | MonitorError::FetchFailed(_)
        )
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
