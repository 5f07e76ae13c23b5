use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::Result;
use crate::backoff::BackoffSource;
use crate::config::RetryConfig;
use crate::error::Error;
use crate::execute::Execution;
use crate::metrics::{RetryMetrics, RetryMetricsSnapshot};
use crate::observe::{Observer, RequestMode};
use crate::replay::EventSink;
use crate::requester::Requester;
use crate::response::{AbortHandle, HttpResponse, ResponseStream};
use crate::retry::RetryClassifier;

const STREAM_EVENT_BUFFER: usize = 32;
const DEFAULT_CLIENT_NAME: &str = "retry-request";

/// Runs requests through a [`Requester`] with retries, backoff and stream replay.
///
/// Cheap to clone; clones share the requester, configuration and metrics.
pub struct RetryRequest<O> {
    inner: Arc<ClientInner<O>>,
}

impl<O> Clone for RetryRequest<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O> std::fmt::Debug for RetryRequest<O> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryRequest")
            .field("client_name", &self.inner.client_name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct ClientInner<O> {
    client_name: String,
    requester: Arc<dyn Requester<O>>,
    config: RetryConfig,
    observer: Option<Arc<dyn Observer>>,
    metrics: RetryMetrics,
}

impl<O> ClientInner<O> {
    fn execution<'a>(
        &'a self,
        mode: RequestMode,
        config: &'a RetryConfig,
        options: &'a O,
        cancel: &'a CancellationToken,
        attempts: &'a AtomicUsize,
    ) -> Execution<'a, O> {
        Execution {
            requester: self.requester.as_ref(),
            config,
            observer: self.observer.as_deref(),
            metrics: &self.metrics,
            mode,
            options,
            cancel,
            attempts,
        }
    }
}

pub struct RetryRequestBuilder<O> {
    client_name: String,
    requester: Arc<dyn Requester<O>>,
    config: RetryConfig,
    observer: Option<Arc<dyn Observer>>,
    metrics_enabled: bool,
}

impl<O> RetryRequestBuilder<O> {
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.config = self.config.with_retries(retries);
        self
    }

    pub fn should_retry(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.config = self.config.with_should_retry(classifier);
        self
    }

    pub fn backoff(mut self, backoff: impl BackoffSource + 'static) -> Self {
        self.config = self.config.with_backoff(backoff);
        self
    }

    /// Replaces every retry setting at once.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn build(self) -> RetryRequest<O> {
        let metrics = if self.metrics_enabled {
            RetryMetrics::enabled()
        } else {
            RetryMetrics::disabled()
        };
        RetryRequest {
            inner: Arc::new(ClientInner {
                client_name: self.client_name,
                requester: self.requester,
                config: self.config,
                observer: self.observer,
                metrics,
            }),
        }
    }
}

impl<O> RetryRequest<O>
where
    O: Send + Sync + 'static,
{
    pub fn builder<R>(requester: R) -> RetryRequestBuilder<O>
    where
        R: Requester<O> + 'static,
    {
        RetryRequestBuilder {
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            requester: Arc::new(requester),
            config: RetryConfig::default(),
            observer: None,
            metrics_enabled: false,
        }
    }

    pub fn new<R>(requester: R) -> Self
    where
        R: Requester<O> + 'static,
    {
        Self::builder(requester).build()
    }

    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    pub fn metrics_snapshot(&self) -> RetryMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Buffered request: resolves once a terminal attempt has been fully read.
    ///
    /// A response that still fails the retry predicate when the budget runs
    /// out is returned as `Ok`; only transport errors are `Err`. Dropping the
    /// future stops the active attempt and any pending backoff, and the
    /// request is finalized as aborted.
    pub async fn send(&self, options: &O) -> Result<HttpResponse> {
        self.send_with_config(options, self.inner.config.clone())
            .await
    }

    pub async fn send_with_config(&self, options: &O, config: RetryConfig) -> Result<HttpResponse> {
        self.inner.metrics.record_request_started();
        let span = info_span!(
            "retry_request",
            client = %self.inner.client_name,
            mode = RequestMode::Buffered.as_str(),
            retries = config.retries()
        );
        let cancel = CancellationToken::new();
        let attempts = AtomicUsize::new(0);
        self.inner
            .execution(RequestMode::Buffered, &config, options, &cancel, &attempts)
            .run_buffered()
            .instrument(span)
            .await
    }

    /// Buffered request that reports through `callback`.
    ///
    /// The callback runs exactly once with the terminal result, unless the
    /// returned handle is aborted first, in which case it never runs.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn send_with_callback<F>(&self, options: O, callback: F) -> AbortHandle
    where
        F: FnOnce(Result<HttpResponse>) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = AbortHandle::new(cancel.clone());
        let inner = Arc::clone(&self.inner);
        let config = inner.config.clone();
        inner.metrics.record_request_started();
        let span = info_span!(
            "retry_request",
            client = %inner.client_name,
            mode = RequestMode::Buffered.as_str(),
            retries = config.retries()
        );

        tokio::spawn(
            async move {
                let attempts = AtomicUsize::new(0);
                let result = inner
                    .execution(RequestMode::Buffered, &config, &options, &cancel, &attempts)
                    .run_buffered()
                    .await;
                if cancel.is_cancelled() || matches!(result, Err(Error::Aborted)) {
                    return;
                }
                callback(result);
            }
            .instrument(span),
        );
        handle
    }

    /// Streaming request: returns the output right away and retries behind it.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn stream(&self, options: O) -> ResponseStream {
        self.stream_with_config(options, self.inner.config.clone())
    }

    pub fn stream_with_config(&self, options: O, config: RetryConfig) -> ResponseStream {
        let (events_tx, events_rx) = mpsc::channel(STREAM_EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let stream = ResponseStream::new(events_rx, cancel.clone(), Arc::clone(&attempts));
        let inner = Arc::clone(&self.inner);
        inner.metrics.record_request_started();
        let span = info_span!(
            "retry_request",
            client = %inner.client_name,
            mode = RequestMode::Streaming.as_str(),
            retries = config.retries()
        );

        tokio::spawn(
            async move {
                let sink = EventSink::new(events_tx, cancel.clone());
                inner
                    .execution(RequestMode::Streaming, &config, &options, &cancel, &attempts)
                    .run_streaming(&sink)
                    .await;
            }
            .instrument(span),
        );
        stream
    }
}
