use http::StatusCode;

use crate::response::ResponseHead;

/// Decides whether a well-formed response should be retried.
///
/// A classifier fully replaces the default status rule; transport errors never
/// reach it.
pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, response: &ResponseHead) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&ResponseHead) -> bool + Send + Sync,
{
    fn should_retry(&self, response: &ResponseHead) -> bool {
        self(response)
    }
}

/// Retries anything that is neither a success nor a redirect.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusRetryClassifier;

impl RetryClassifier for StatusRetryClassifier {
    fn should_retry(&self, response: &ResponseHead) -> bool {
        is_retryable_status(response.status())
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    !(200..400).contains(&code)
}

#[derive(Clone, Debug)]
pub struct RetryDecision {
    pub attempt: usize,
    pub retries: usize,
    pub status: StatusCode,
}

impl RetryDecision {
    pub fn remaining_retries(&self) -> usize {
        (self.retries + 1).saturating_sub(self.attempt)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptState {
    /// Before the first attempt. Logged when an invocation starts; observers
    /// are only told about attempts and the final state, so never see it.
    Idle,
    Attempting,
    Backoff,
    Replaying,
    Completed,
    Failed,
    Aborted,
}

impl AttemptState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Backoff => "backoff",
            Self::Replaying => "replaying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Whether attempt number `attempt` (1-based) may still be followed by another one.
pub(crate) fn within_budget(attempt: usize, retries: usize) -> bool {
    attempt <= retries
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, StatusCode};

    use super::{RetryClassifier, RetryDecision, StatusRetryClassifier, within_budget};
    use crate::response::ResponseHead;

    fn head(status: u16) -> ResponseHead {
        ResponseHead::new(
            StatusCode::from_u16(status).expect("valid status"),
            HeaderMap::new(),
        )
    }

    #[test]
    fn default_classifier_retries_errors_and_informational_statuses() {
        let classifier = StatusRetryClassifier;
        assert!(classifier.should_retry(&head(100)));
        assert!(classifier.should_retry(&head(404)));
        assert!(classifier.should_retry(&head(503)));
        assert!(!classifier.should_retry(&head(200)));
        assert!(!classifier.should_retry(&head(204)));
        assert!(!classifier.should_retry(&head(302)));
        assert!(!classifier.should_retry(&head(399)));
    }

    #[test]
    fn closures_act_as_classifiers() {
        let only_429 =
            |response: &ResponseHead| response.status() == StatusCode::TOO_MANY_REQUESTS;
        assert!(only_429.should_retry(&head(429)));
        assert!(!only_429.should_retry(&head(503)));
    }

    #[test]
    fn budget_allows_retries_plus_one_attempts() {
        assert!(within_budget(1, 2));
        assert!(within_budget(2, 2));
        assert!(!within_budget(3, 2));
        assert!(!within_budget(1, 0));
    }

    #[test]
    fn remaining_retries_counts_down() {
        let decision = RetryDecision {
            attempt: 1,
            retries: 2,
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        assert_eq!(decision.remaining_retries(), 2);
    }
}
