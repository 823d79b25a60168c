use std::num::NonZeroUsize;
use std::time::Duration;

use futures::StreamExt;
use leak_limit::CancellationToken;
use leak_limit::ChannelId;
use leak_limit::LimiterConfig;
use leak_server::AppState;
use leak_server::ServerError;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

struct TestApp {
    base_url: String,
    ws_url: String,
    state: AppState,
    shutdown: CancellationToken,
    server: JoinHandle<Result<(), ServerError>>,
    client: reqwest::Client,
}

impl TestApp {
    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("request failed")
    }
}

fn limiter(channels: usize, capacity: f64, leak_rate: f64) -> LimiterConfig {
    LimiterConfig {
        channels: NonZeroUsize::new(channels).unwrap(),
        capacity,
        leak_rate,
        ..LimiterConfig::default()
    }
}

async fn spawn_app(config: LimiterConfig) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, &shutdown).unwrap();

    let server = tokio::spawn(leak_server::serve(
        listener,
        state.clone(),
        config.leak_interval,
        shutdown.clone(),
    ));

    TestApp {
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}"),
        state,
        shutdown,
        server,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn admitted_request_reports_its_channel() {
    let app = spawn_app(limiter(4, 500.0, 0.0)).await;

    let response = app.get("/request/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "channel": 0, "status": "Allowed" }));
}

#[tokio::test]
async fn requests_rotate_across_channels() {
    let app = spawn_app(limiter(3, 500.0, 0.0)).await;

    let mut channels = Vec::new();
    for _ in 0..6 {
        let body: Value = app.get("/request/").await.json().await.unwrap();
        channels.push(body["channel"].as_u64().unwrap());
    }
    assert_eq!(channels, [0, 1, 2, 0, 1, 2]);

    let snapshot = app.state.pool.snapshot();
    for id in 0..3 {
        assert_eq!(snapshot.get(ChannelId::new(id)), Some(2.0));
    }
}

#[tokio::test]
async fn saturated_pool_returns_too_many_requests() {
    let app = spawn_app(limiter(2, 1.0, 0.0)).await;

    assert_eq!(app.get("/request/").await.status(), StatusCode::OK);
    assert_eq!(app.get("/request/").await.status(), StatusCode::OK);

    let response = app.get("/request/").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    // Nothing drains, so there is no useful retry hint.
    assert!(response.headers().get(RETRY_AFTER).is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "detail": "Too Many Requests. Please try again later." })
    );
}

#[tokio::test]
async fn draining_pool_hints_when_to_retry() {
    let app = spawn_app(limiter(1, 1.0, 0.5)).await;

    let mut rejected = None;
    for _ in 0..5 {
        let response = app.get("/request/").await;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected = Some(response);
            break;
        }
    }

    let response = rejected.expect("pool never saturated");
    let secs: u64 = response.headers()[RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=4).contains(&secs), "unexpected retry hint {secs}");
}

#[tokio::test]
async fn concurrent_requests_never_exceed_capacity() {
    let app = spawn_app(limiter(4, 5.0, 0.0)).await;

    let requests = (0..40).map(|_| app.get("/request/"));
    let responses = futures::future::join_all(requests).await;

    let admitted = responses
        .iter()
        .filter(|response| response.status() == StatusCode::OK)
        .count();
    assert_eq!(admitted, 20);

    let snapshot = app.state.pool.snapshot();
    assert!(snapshot.iter().all(|(_, level)| level == 5.0));
}

#[tokio::test]
async fn status_requires_websocket_upgrade() {
    let app = spawn_app(LimiterConfig::default()).await;

    let response = app.get("/status/").await;
    assert!(response.status().is_client_error());
    assert_eq!(app.state.feed.subscriber_count(), 0);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = spawn_app(LimiterConfig::default()).await;

    assert_eq!(app.get("/missing/").await.status(), StatusCode::NOT_FOUND);
    // Unknown routes do not consume capacity.
    assert_eq!(app.state.pool.snapshot().iter().map(|(_, l)| l).sum::<f64>(), 0.0);
}

#[tokio::test]
async fn shutdown_stops_the_server() {
    let app = spawn_app(LimiterConfig::default()).await;
    assert_eq!(app.get("/request/").await.status(), StatusCode::OK);

    app.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

async fn wait_for_subscribers(app: &TestApp, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while app.state.feed.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

fn snapshot_frame(message: Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a snapshot frame, got {other:?}"),
    }
}

#[tokio::test]
async fn status_streams_snapshots_over_websocket() {
    let config = LimiterConfig {
        status_interval: Duration::from_millis(50),
        ..limiter(3, 10.0, 0.0)
    };
    let app = spawn_app(config).await;
    assert_eq!(app.get("/request/").await.status(), StatusCode::OK);

    let (mut socket, _) = connect_async(format!("{}/status/", app.ws_url))
        .await
        .unwrap();
    wait_for_subscribers(&app, 1).await;

    for _ in 0..2 {
        let frame = snapshot_frame(socket.next().await.unwrap().unwrap());
        assert_eq!(
            frame,
            json!({ "channel_0": 1.0, "channel_1": 0.0, "channel_2": 0.0 })
        );
    }

    drop(socket);
    wait_for_subscribers(&app, 0).await;
}

#[tokio::test]
async fn status_subscribers_receive_close_on_shutdown() {
    let config = LimiterConfig {
        status_interval: Duration::from_millis(50),
        ..limiter(2, 10.0, 0.0)
    };
    let app = spawn_app(config).await;

    let (mut socket, _) = connect_async(format!("{}/status/", app.ws_url))
        .await
        .unwrap();
    snapshot_frame(socket.next().await.unwrap().unwrap());

    app.shutdown.cancel();

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = socket.next().await {
            if let Message::Close(frame) = message.unwrap() {
                return Some(frame);
            }
        }
        None
    })
    .await
    .expect("no close frame before timeout");
    assert_eq!(closed, Some(None));
    wait_for_subscribers(&app, 0).await;
}
