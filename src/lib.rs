//! `retry-request` wraps one HTTP-style request with retries, exponential
//! backoff and transparent replay of a streamed response.
//!
//! The transport is yours: implement [`Requester`] (or pass a closure) to
//! perform a single attempt. [`RetryRequest`] decides whether to try again,
//! waits out the backoff, and hands the caller exactly one attempt's result.
//!
//! # Quick Start
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{HeaderMap, StatusCode};
//! use retry_request::prelude::{AttemptResponse, RetryRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client: RetryRequest<String> = RetryRequest::builder(|path: &String| {
//!         let path = path.clone();
//!         async move {
//!             Ok(AttemptResponse::from_bytes(
//!                 StatusCode::OK,
//!                 HeaderMap::new(),
//!                 Bytes::from(format!("hello from {path}")),
//!             ))
//!         }
//!     })
//!     .retries(3)
//!     .build();
//!
//!     let response = client.send(&"/v1/items".to_owned()).await?;
//!     println!("status={} attempts={}", response.status(), response.attempts());
//!     Ok(())
//! }
//! ```
//!
//! # Semantics
//!
//! - Only well-formed responses are retried; transport errors surface at once.
//! - Running out of retries is not an error: the last response is returned.
//! - A streaming request never shows bytes from an attempt that was retried.

mod backoff;
mod client;
mod config;
mod error;
mod execute;
mod metrics;
mod observe;
mod replay;
mod requester;
mod response;
mod retry;
mod util;

pub use crate::backoff::{BackoffSource, ExponentialBackoff, FixedBackoff, compute_delay};
pub use crate::client::{RetryRequest, RetryRequestBuilder};
pub use crate::config::{DEFAULT_RETRIES, RetryConfig};
pub use crate::error::{BoxError, Error, ErrorCode, TransportErrorKind};
pub use crate::metrics::RetryMetricsSnapshot;
pub use crate::observe::{Observer, RequestMode};
pub use crate::requester::{AttemptFuture, AttemptResponse, BodyStream, Requester};
pub use crate::response::{
    AbortHandle, HttpResponse, ResponseEvent, ResponseHead, ResponseStream,
};
pub use crate::retry::{AttemptState, RetryClassifier, RetryDecision, StatusRetryClassifier};

pub type Result<T> = std::result::Result<T, Error>;

pub mod prelude {
    pub use crate::{
        AbortHandle, AttemptResponse, AttemptState, Error, ErrorCode, HttpResponse, Requester,
        ResponseEvent, ResponseHead, ResponseStream, Result, RetryClassifier, RetryConfig,
        RetryRequest, TransportErrorKind, compute_delay,
    };
}
