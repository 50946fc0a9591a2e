use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::forms::{OptionItem, SubmissionPayload};

/// Routing identifiers selecting which form schema the backend serves.
/// Echoed back alongside the answers on submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSchemaRequest {
    pub request_type_id: i64,
    pub subject_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_subject_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_id: Option<i64>,
}

/// Server handle for an uploaded attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub mime_type: Option<String>,
}

/// Terminal acknowledgement for a submitted complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub request_number: String,
}

/// Complete submission: routing identifiers plus the form projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionEnvelope {
    #[serde(flatten)]
    pub routing: FormSchemaRequest,
    #[serde(flatten)]
    pub form: SubmissionPayload,
}

/// Failures from the remote complaint API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("unexpected payload: {0}")]
    Payload(String),
}

impl ApiError {
    /// Timeouts, connection failures, and 5xx responses are worth
    /// retrying; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Connection(_) => true,
            ApiError::Status(status) => (500..=599).contains(status),
            ApiError::Payload(_) => false,
        }
    }
}

/// Remote operations the form engine consumes. Implemented over the real
/// HTTP client in production and in memory for tests and walkthroughs.
#[async_trait]
pub trait ComplaintApi: Send + Sync {
    async fn fetch_form_schema(&self, request: &FormSchemaRequest) -> Result<Value, ApiError>;

    async fn fetch_autocomplete_options(
        &self,
        resource: &str,
    ) -> Result<Vec<OptionItem>, ApiError>;

    async fn upload_file(&self, bytes: &[u8], file_name: &str) -> Result<UploadedFile, ApiError>;

    async fn submit_form(
        &self,
        submission: &SubmissionEnvelope,
    ) -> Result<SubmissionReceipt, ApiError>;
}

/// Bounded exponential backoff for retryable API failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    /// Run `operation` up to `attempts` times, sleeping
    /// `base_delay * 2^(attempt-1)` between retryable failures.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if !error.is_retryable() || attempt >= self.attempts {
                        return Err(error);
                    }
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        %error,
                        attempt,
                        max_attempts = self.attempts,
                        "{label} failed, retrying after {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test_op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::Timeout)
                    } else {
                        Ok(41 + 1)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_bounded_attempts() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test_op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Status(503)) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Status(503))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test_op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::Status(422)) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Status(422))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
