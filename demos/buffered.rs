use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use retry_request::FixedBackoff;
use retry_request::prelude::{AttemptResponse, ResponseHead, RetryRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let client: RetryRequest<String> = RetryRequest::builder(move |path: &String| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let path = path.clone();
        async move {
            let status = if attempt < 3 {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::OK
            };
            Ok(AttemptResponse::from_bytes(
                status,
                HeaderMap::new(),
                Bytes::from(format!("{path} answered on attempt {attempt}")),
            ))
        }
    })
    .client_name("retry-request-demo-buffered")
    .retries(3)
    .should_retry(|response: &ResponseHead| response.status() == StatusCode::TOO_MANY_REQUESTS)
    .backoff(FixedBackoff(Duration::from_millis(50)))
    .build();

    let response = client.send(&"/v1/items".to_owned()).await?;
    println!(
        "status={} attempts={} body={}",
        response.status(),
        response.attempts(),
        response.text_lossy()
    );

    let (tx, rx) = tokio::sync::oneshot::channel();
    client.send_with_callback("/v1/other".to_owned(), move |result| {
        let _ = tx.send(result.map(|response| response.text_lossy()));
    });
    println!("callback result: {}", rx.await??);

    Ok(())
}
