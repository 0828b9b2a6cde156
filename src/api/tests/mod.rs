use super::*;
use crate::config::EngineConfig;
use crate::links::LinkExtractor;
use crate::test_helpers::{FixedProbe, ScriptedMeter, StaticFetcher};
use crate::types::ProgressEvent;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

/// Engine backed by fakes: every link pings 12ms and measures one 500 B/s sample
fn create_test_engine() -> Arc<TestOrchestrator> {
    Arc::new(TestOrchestrator::with_collaborators(
        EngineConfig::default(),
        LinkExtractor::new(Arc::new(StaticFetcher::default()), 3),
        Arc::new(FixedProbe::always(12)),
        Arc::new(ScriptedMeter::new(vec![500], 500)),
    ))
}

async fn spawn_server(engine: Arc<TestOrchestrator>) -> SocketAddr {
    let app = create_router(engine, Arc::new(Config::default()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Read frames until `eof` or `error`
async fn read_until_terminal<S>(ws: &mut S) -> Vec<ProgressEvent>
where
    S: futures::Stream<Item = tokio_tungstenite::tungstenite::Result<Message>> + Unpin,
{
    let mut events = Vec::new();
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let Message::Text(text) = message else {
            continue;
        };
        let event: ProgressEvent = serde_json::from_str(&text).unwrap();
        let terminal = matches!(event, ProgressEvent::Eof | ProgressEvent::Error { .. });
        events.push(event);
        if terminal {
            return events;
        }
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = create_router(create_test_engine(), Arc::new(Config::default()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_cors_enabled() {
    let mut config = Config::default();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(create_test_engine(), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let mut config = Config::default();
    config.server.api.cors_enabled = false;
    let app = create_router(create_test_engine(), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_plain_get_on_socket_route_is_rejected() {
    let app = create_router(create_test_engine(), Arc::new(Config::default()));

    let response = app
        .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_socket_runs_batch_to_eof() {
    let addr = spawn_server(create_test_engine()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/test", addr))
        .await
        .unwrap();

    ws.send(Message::Text(
        "vmess://abc trojan://pw@example.com:443#Tokyo^Group1^^^^3^30".to_string(),
    ))
    .await
    .unwrap();

    let events = read_until_terminal(&mut ws).await;
    assert_eq!(events.first(), Some(&ProgressEvent::Started));
    assert_eq!(events.last(), Some(&ProgressEvent::Eof));
    assert_eq!(events.iter().filter(|e| e.kind() == "gotserver").count(), 2);
    assert_eq!(events.iter().filter(|e| e.kind() == "endone").count(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::GotServer { group, remarks, .. } if group == "Group1" && remarks == "Tokyo"
    )));
}

#[tokio::test]
async fn test_socket_reports_bad_message() {
    let addr = spawn_server(create_test_engine()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/test", addr))
        .await
        .unwrap();

    ws.send(Message::Text("no links here^G^^^^1^30".to_string()))
        .await
        .unwrap();

    let events = read_until_terminal(&mut ws).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ProgressEvent::Error { reason, .. } if reason == "invaliddata"
    ));
}

#[tokio::test]
async fn test_server_stops_on_engine_shutdown() {
    let engine = create_test_engine();
    let mut config = Config::default();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move { start_api_server(engine, Arc::new(config)).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.shutdown();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
