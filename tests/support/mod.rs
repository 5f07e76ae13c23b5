#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use http::{HeaderMap, StatusCode};
use retry_request::{AttemptFuture, AttemptResponse, BoxError, Error, Requester, TransportErrorKind};
use tokio::time::Instant;

#[derive(Clone, Debug)]
pub enum Outcome {
    Respond {
        status: u16,
        chunks: Vec<&'static str>,
    },
    Transport(TransportErrorKind),
    BrokenBody {
        status: u16,
        first_chunk: &'static str,
    },
    StalledBody {
        status: u16,
        first_chunk: &'static str,
    },
    Hang,
}

impl Outcome {
    pub fn respond(status: u16, chunks: &[&'static str]) -> Self {
        Self::Respond {
            status,
            chunks: chunks.to_vec(),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Sets its flag when the attempt holding it is dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Replays a fixed list of attempt outcomes, then answers 200 "fallback".
#[derive(Clone, Default)]
pub struct ScriptedRequester {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    calls: Arc<AtomicUsize>,
    started_at: Arc<Mutex<Vec<Instant>>>,
    attempt_dropped: Arc<AtomicBool>,
}

impl ScriptedRequester {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempt_dropped(&self) -> bool {
        self.attempt_dropped.load(Ordering::SeqCst)
    }

    /// Virtual time between consecutive attempt starts.
    pub fn gaps(&self) -> Vec<Duration> {
        let started_at = lock_unpoisoned(&self.started_at);
        started_at
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).expect("scripted status should be valid")
}

impl<O> Requester<O> for ScriptedRequester {
    fn request(&self, _options: &O) -> AttemptFuture {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.started_at).push(Instant::now());
        let outcome = lock_unpoisoned(&self.script)
            .pop_front()
            .unwrap_or_else(|| Outcome::respond(200, &["fallback"]));
        let dropped = Arc::clone(&self.attempt_dropped);

        Box::pin(async move {
            match outcome {
                Outcome::Respond { status: code, chunks } => {
                    let chunks: Vec<Bytes> = chunks
                        .into_iter()
                        .map(|chunk| Bytes::from_static(chunk.as_bytes()))
                        .collect();
                    Ok(AttemptResponse::from_chunks(
                        status(code),
                        HeaderMap::new(),
                        chunks,
                    ))
                }
                Outcome::Transport(kind) => {
                    Err(Error::transport(kind, "scripted transport failure"))
                }
                Outcome::BrokenBody {
                    status: code,
                    first_chunk,
                } => {
                    let items: Vec<Result<Bytes, BoxError>> = vec![
                        Ok(Bytes::from_static(first_chunk.as_bytes())),
                        Err("connection reset by peer".into()),
                    ];
                    Ok(AttemptResponse::new(
                        status(code),
                        HeaderMap::new(),
                        stream::iter(items),
                    ))
                }
                Outcome::StalledBody {
                    status: code,
                    first_chunk,
                } => {
                    let first: Result<Bytes, BoxError> =
                        Ok(Bytes::from_static(first_chunk.as_bytes()));
                    let stalled = stream::unfold(DropFlag(dropped), |guard| async move {
                        std::future::pending::<()>().await;
                        Some((Ok(Bytes::new()), guard))
                    });
                    let body = stream::iter([first]).chain(stalled);
                    Ok(AttemptResponse::new(status(code), HeaderMap::new(), body))
                }
                Outcome::Hang => {
                    let _guard = DropFlag(dropped);
                    std::future::pending::<Result<AttemptResponse, Error>>().await
                }
            }
        })
    }
}
