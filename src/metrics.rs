use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::retry::AttemptState;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryMetricsSnapshot {
    pub requests_started: u64,
    pub attempts: u64,
    pub retries: u64,
    pub transport_errors: u64,
    pub completed: u64,
    pub aborted: u64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RetryMetrics {
    inner: Option<Arc<RetryMetricsInner>>,
}

#[derive(Debug, Default)]
struct RetryMetricsInner {
    requests_started: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    transport_errors: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
}

impl RetryMetrics {
    pub(crate) fn enabled() -> Self {
        Self {
            inner: Some(Arc::new(RetryMetricsInner::default())),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    pub(crate) fn record_request_started(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finalized(&self, state: AttemptState) {
        let Some(inner) = &self.inner else {
            return;
        };
        let counter = match state {
            AttemptState::Completed => &inner.completed,
            AttemptState::Failed => &inner.transport_errors,
            AttemptState::Aborted => &inner.aborted,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RetryMetricsSnapshot {
        let Some(inner) = &self.inner else {
            return RetryMetricsSnapshot::default();
        };
        RetryMetricsSnapshot {
            requests_started: inner.requests_started.load(Ordering::Relaxed),
            attempts: inner.attempts.load(Ordering::Relaxed),
            retries: inner.retries.load(Ordering::Relaxed),
            transport_errors: inner.transport_errors.load(Ordering::Relaxed),
            completed: inner.completed.load(Ordering::Relaxed),
            aborted: inner.aborted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RetryMetrics;
    use crate::retry::AttemptState;

    #[test]
    fn disabled_metrics_report_zeroes() {
        let metrics = RetryMetrics::disabled();
        metrics.record_request_started();
        metrics.record_attempt();
        metrics.record_finalized(AttemptState::Completed);
        assert_eq!(metrics.snapshot().attempts, 0);
        assert_eq!(metrics.snapshot().completed, 0);
    }

    #[test]
    fn finalized_states_land_in_their_own_counters() {
        let metrics = RetryMetrics::enabled();
        metrics.record_finalized(AttemptState::Completed);
        metrics.record_finalized(AttemptState::Failed);
        metrics.record_finalized(AttemptState::Aborted);
        metrics.record_finalized(AttemptState::Backoff);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.transport_errors, 1);
        assert_eq!(snapshot.aborted, 1);
    }
}
