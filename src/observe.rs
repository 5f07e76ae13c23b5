use std::time::Duration;

use crate::retry::{AttemptState, RetryDecision};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMode {
    Buffered,
    Streaming,
}

impl RequestMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buffered => "buffered",
            Self::Streaming => "streaming",
        }
    }
}

pub trait Observer: Send + Sync {
    fn on_attempt_start(&self, _mode: RequestMode, _attempt: usize) {}

    fn on_retry_scheduled(&self, _mode: RequestMode, _decision: &RetryDecision, _delay: Duration) {
    }

    fn on_finalized(&self, _mode: RequestMode, _attempts: usize, _state: AttemptState) {}
}
