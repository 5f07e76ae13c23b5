use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    Transport,
    ReadBody,
    Deserialize,
    Aborted,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::ReadBody => "read_body",
            Self::Deserialize => "deserialize",
            Self::Aborted => "aborted",
        }
    }
}

/// Errors surfaced by a retried request.
///
/// Only transport-level failures reach an output channel. A response that keeps
/// failing the retry predicate until the budget runs out is delivered as a
/// normal response, never as an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport error ({kind}) on attempt {attempt}: {source}")]
    Transport {
        kind: TransportErrorKind,
        attempt: usize,
        #[source]
        source: BoxError,
    },
    #[error("failed to read response body on attempt {attempt}: {source}")]
    ReadBody {
        attempt: usize,
        #[source]
        source: BoxError,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("request was aborted before a result was delivered")]
    Aborted,
}

impl Error {
    /// Builds a transport error as reported by a [`Requester`](crate::Requester).
    ///
    /// The attempt number is filled in by the orchestrator.
    pub fn transport(kind: TransportErrorKind, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            kind,
            attempt: 0,
            source: source.into(),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::Transport,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::Aborted => ErrorCode::Aborted,
        }
    }

    pub fn attempt(&self) -> Option<usize> {
        match self {
            Self::Transport { attempt, .. } | Self::ReadBody { attempt, .. } => Some(*attempt),
            Self::Deserialize { .. } | Self::Aborted => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ReadBody { .. })
    }

    pub(crate) fn with_attempt(self, attempt: usize) -> Self {
        match self {
            Self::Transport { kind, source, .. } => Self::Transport {
                kind,
                attempt,
                source,
            },
            Self::ReadBody { source, .. } => Self::ReadBody { attempt, source },
            other => other,
        }
    }
}
