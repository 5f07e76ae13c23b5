use std::sync::Arc;

use crate::backoff::{BackoffSource, ExponentialBackoff};
use crate::retry::{RetryClassifier, StatusRetryClassifier};

pub const DEFAULT_RETRIES: usize = 2;

/// Immutable retry settings for one client or one call.
///
/// Every call works on its own clone; nothing written here is ever patched
/// back by the orchestrator.
#[derive(Clone)]
pub struct RetryConfig {
    retries: usize,
    classifier: Arc<dyn RetryClassifier>,
    backoff: Arc<dyn BackoffSource>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryConfig")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            classifier: Arc::new(StatusRetryClassifier),
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }

    /// No retries at all: one attempt, whatever it returns.
    pub fn disabled() -> Self {
        Self::new().with_retries(0)
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_should_retry(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn with_backoff(mut self, backoff: impl BackoffSource + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub(crate) fn classifier(&self) -> &dyn RetryClassifier {
        self.classifier.as_ref()
    }

    pub(crate) fn backoff(&self) -> &dyn BackoffSource {
        self.backoff.as_ref()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}
