//! HTTP embedding client against a scripted local server.

use chorus::vector::{
    EmbeddingFetcher, EmbeddingService, FetchConfig, HttpEmbeddingService, ServiceError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            body: "{}".to_string(),
        }
    }
}

/// Serves `replies` in order, one per connection, and forwards each request
/// body to the returned channel.
async fn serve(replies: Vec<Reply>) -> (String, mpsc::UnboundedReceiver<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (sender, receiver) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);

            let mut content_length = 0;
            let mut authorization = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let header = line.trim_end();
                if header.is_empty() {
                    break;
                }
                let lower = header.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                if lower.starts_with("authorization:") {
                    authorization = header["authorization:".len()..].trim().to_string();
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();
            sender
                .send((authorization, String::from_utf8(body).unwrap()))
                .unwrap();

            let response = format!(
                "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    });

    (format!("http://{address}/v1/embeddings"), receiver)
}

fn client(endpoint: String) -> HttpEmbeddingService {
    HttpEmbeddingService::new(
        endpoint,
        "test-model",
        Some("secret".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn parses_embeddings_in_index_order() {
    let body = r#"{"data": [
        {"index": 1, "embedding": [0.0, 1.0]},
        {"index": 0, "embedding": [1.0, 0.0]}
    ]}"#;
    let (endpoint, mut requests) = serve(vec![Reply::ok(body)]).await;
    let service = client(endpoint);

    let vectors = service
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    assert_eq!(service.model_name(), "test-model");

    let (authorization, request) = requests.recv().await.unwrap();
    assert_eq!(authorization, "Bearer secret");
    let request: serde_json::Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["model"], "test-model");
    assert_eq!(request["input"], serde_json::json!(["first", "second"]));
}

#[tokio::test]
async fn maps_status_codes() {
    let (endpoint, _requests) = serve(vec![
        Reply::status(429),
        Reply::status(500),
        Reply::ok("not json"),
    ])
    .await;
    let service = client(endpoint);
    let input = vec!["text".to_string()];

    assert_eq!(
        service.embed_batch(&input).await,
        Err(ServiceError::RateLimited)
    );
    assert!(matches!(
        service.embed_batch(&input).await,
        Err(ServiceError::Status { status: 500, .. })
    ));
    assert!(matches!(
        service.embed_batch(&input).await,
        Err(ServiceError::Malformed(_))
    ));
}

#[tokio::test]
async fn rejects_indices_that_do_not_cover_the_inputs() {
    let duplicated = r#"{"data": [
        {"index": 0, "embedding": [1.0, 0.0]},
        {"index": 0, "embedding": [0.0, 1.0]}
    ]}"#;
    let out_of_range = r#"{"data": [
        {"index": 0, "embedding": [1.0, 0.0]},
        {"index": 5, "embedding": [0.0, 1.0]}
    ]}"#;
    let mixed = r#"{"data": [
        {"index": 1, "embedding": [1.0, 0.0]},
        {"embedding": [0.0, 1.0]}
    ]}"#;
    let (endpoint, _requests) = serve(vec![
        Reply::ok(duplicated),
        Reply::ok(out_of_range),
        Reply::ok(mixed),
    ])
    .await;
    let service = client(endpoint);
    let input = vec!["first".to_string(), "second".to_string()];

    for _ in 0..3 {
        assert!(matches!(
            service.embed_batch(&input).await,
            Err(ServiceError::Malformed(_))
        ));
    }
}

#[tokio::test]
async fn fetcher_retries_rate_limited_batch_over_http() {
    let (endpoint, mut requests) = serve(vec![
        Reply::status(429),
        Reply::ok(r#"{"data": [{"index": 0, "embedding": [0.5, 0.5]}]}"#),
    ])
    .await;
    let fetcher = EmbeddingFetcher::new(
        Arc::new(client(endpoint)),
        FetchConfig {
            backoff: Duration::from_millis(10),
            ..FetchConfig::default()
        },
    );

    let report = fetcher
        .fetch(&["  hello\tthere ".to_string()], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.embeddings, vec![vec![0.5, 0.5]]);
    assert_eq!(report.stats.rate_limited, 1);

    let (_, first) = requests.recv().await.unwrap();
    let (_, second) = requests.recv().await.unwrap();
    assert_eq!(first, second);
    assert!(first.contains("\"hello there\""));
}
