use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::db::Database;
use crate::error::{MonitorError, MonitorResult};

use super::sample::RawSample;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Read side of the sample table. Newest-first is preferred but callers do
/// not depend on it.
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn query_samples(&self, session_id: &str, limit: usize) -> anyhow::Result<Vec<RawSample>>;
}

#[async_trait]
impl SampleStore for Database {
    async fn query_samples(&self, session_id: &str, limit: usize) -> anyhow::Result<Vec<RawSample>> {
        Database::query_samples(self, session_id, limit).await
    }
}

pub struct SampleFetcher {
    store: Arc<dyn SampleStore>,
    request_timeout: Duration,
}

impl SampleFetcher {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn fetch_samples(&self, session_id: &str, limit: usize) -> MonitorResult<Vec<RawSample>> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(MonitorError::InvalidArgument("session id is empty".into()));
        }
        if limit == 0 {
            return Err(MonitorError::InvalidArgument("sample limit must be positive".into()));
        }

        let mut samples =
            tokio::time::timeout(self.request_timeout, self.store.query_samples(session_id, limit))
                .await
                .map_err(|_| {
                    MonitorError::FetchFailed(format!(
                        "sample query for {session_id} timed out after {:?}",
                        self.request_timeout
                    ))
                })?
                .map_err(|err| MonitorError::FetchFailed(format!("{err:#}")))?;

        samples.truncate(limit);
        Ok(samples)
    }
}
