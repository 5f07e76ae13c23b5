use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use retry_request::FixedBackoff;
use retry_request::prelude::{AttemptResponse, ResponseEvent, RetryRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let client: RetryRequest<()> = RetryRequest::builder(move |_: &()| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let (status, chunks) = if attempt == 1 {
                (StatusCode::SERVICE_UNAVAILABLE, vec!["try ", "later"])
            } else {
                (StatusCode::OK, vec!["hello ", "from ", "retry-request"])
            };
            Ok(AttemptResponse::from_chunks(
                status,
                HeaderMap::new(),
                chunks
                    .into_iter()
                    .map(|chunk| Bytes::from_static(chunk.as_bytes()))
                    .collect::<Vec<_>>(),
            ))
        }
    })
    .client_name("retry-request-demo-stream")
    .backoff(FixedBackoff(Duration::from_millis(100)))
    .build();

    let mut stream = client.stream(());
    while let Some(event) = stream.next().await {
        match event {
            ResponseEvent::Response(head) => println!("response status={}", head.status()),
            ResponseEvent::Data(chunk) => println!("chunk={}", String::from_utf8_lossy(&chunk)),
            ResponseEvent::Complete => println!("complete after {} attempts", stream.attempts()),
            ResponseEvent::Error(error) => return Err(error.into()),
        }
    }

    Ok(())
}
