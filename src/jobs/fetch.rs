//! The job status fetcher contract.

use async_trait::async_trait;
use serde_json::Value;

use super::{JobStateDocument, StateLocator};
use crate::error::TransportError;

/// Performs exactly one read of a job resource.
///
/// Implementations must not retry: the polling loop's budget is the only
/// bound on time spent waiting for a job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusFetcher: Send + Sync {
    /// GET the job resource and return its JSON body.
    async fn fetch(&self, tracking_uri: &str) -> Result<Value, TransportError>;
}

/// Fetch a job resource and interpret it as a [`JobStateDocument`].
///
/// A body that is not a JSON object is a [`TransportError::Malformed`].
pub async fn fetch_document<F>(
    fetcher: &F,
    tracking_uri: &str,
    locator: &StateLocator,
) -> Result<JobStateDocument, TransportError>
where
    F: JobStatusFetcher + ?Sized,
{
    let body = fetcher.fetch(tracking_uri).await?;
    JobStateDocument::from_value(body, locator).ok_or_else(|| TransportError::Malformed {
        url: tracking_uri.to_string(),
        message: "job resource is not a JSON object".to_string(),
    })
}
