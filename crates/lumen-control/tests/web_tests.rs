use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use lumen_control::web::{app, AppState};
use lumen_core::{BroadcastBuffer, Director, LightController, Rgb, ShowDefaults, ShowMode};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for oneshot

#[derive(Default)]
struct CountingController {
    turned_on: AtomicUsize,
}

impl LightController for CountingController {
    fn resolve_address(&self, light_id: &str) -> Option<IpAddr> {
        let n: u8 = light_id.strip_prefix("lamp-")?.parse().ok()?;
        Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
    }
    fn turn_on(&self, _addr: IpAddr) -> lumen_core::Result<()> {
        self.turned_on.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn set_color(&self, _addr: IpAddr, _color: Rgb) -> lumen_core::Result<()> {
        Ok(())
    }
    fn set_brightness(&self, _addr: IpAddr, _percent: u8) -> lumen_core::Result<()> {
        Ok(())
    }
}

struct Harness {
    app: Router,
    buffer: Arc<BroadcastBuffer>,
    controller: Arc<CountingController>,
}

fn harness_with(defaults: ShowDefaults) -> Harness {
    let controller = Arc::new(CountingController::default());
    let buffer = Arc::new(BroadcastBuffer::default());
    let state = AppState {
        director: Arc::new(Director::new(controller.clone())),
        buffer: Arc::clone(&buffer),
        govee: None,
        defaults,
    };
    Harness {
        app: app(state),
        buffer,
        controller,
    }
}

fn harness() -> Harness {
    harness_with(ShowDefaults::default())
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let response = h
        .app
        .oneshot(empty_request(Method::GET, "/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_initial_status() {
    let h = harness();
    let (status, body) = send(&h.app, empty_request(Method::GET, "/api/lightshow/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["active"], false);
    assert_eq!(body["data"]["mode"], "off");
    assert_eq!(body["data"]["lights_connected"], 0);
}

#[tokio::test]
async fn test_start_and_stop() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        json_request(
            Method::POST,
            "/api/lightshow/start",
            json!({"mode": "party", "device_ids": ["lamp-1", "lamp-2", "ghost"], "latency_ms": 120}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], true);
    assert_eq!(body["data"]["mode"], "party");
    assert_eq!(body["data"]["lights_connected"], 2);
    assert_eq!(body["data"]["latency_ms"], 120);
    assert_eq!(body["data"]["intensity"], 7);
    assert_eq!(h.controller.turned_on.load(Ordering::SeqCst), 2);

    let (status, body) = send(&h.app, empty_request(Method::POST, "/api/lightshow/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);
    assert_eq!(body["data"]["mode"], "off");
}

#[tokio::test]
async fn test_start_rejects_invalid_mode() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        json_request(
            Method::POST,
            "/api/lightshow/start",
            json!({"mode": "rave", "device_ids": ["lamp-1"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("rave"));
    assert!(body.get("data").is_none());
    assert_eq!(h.controller.turned_on.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_requires_devices() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        json_request(Method::POST, "/api/lightshow/start", json!({"device_ids": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_start_falls_back_to_defaults() {
    let h = harness_with(ShowDefaults {
        mode: ShowMode::Ambient,
        intensity: 3,
        latency_ms: 40,
    });
    let (status, body) = send(
        &h.app,
        json_request(
            Method::POST,
            "/api/lightshow/start",
            json!({"device_ids": ["lamp-4"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "ambient");
    assert_eq!(body["data"]["intensity"], 3);
    assert_eq!(body["data"]["latency_ms"], 40);
}

#[tokio::test]
async fn test_mode_changes() {
    let h = harness();
    send(
        &h.app,
        json_request(
            Method::POST,
            "/api/lightshow/start",
            json!({"mode": "pulse", "device_ids": ["lamp-1"]}),
        ),
    )
    .await;

    let (status, body) = send(
        &h.app,
        json_request(Method::PUT, "/api/lightshow/mode", json!({"mode": " Party "})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "party");

    for rejected in ["off", "disco"] {
        let (status, body) = send(
            &h.app,
            json_request(Method::PUT, "/api/lightshow/mode", json!({"mode": rejected})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "mode {}", rejected);
        assert_eq!(body["success"], false);
    }

    let (_, body) = send(&h.app, empty_request(Method::GET, "/api/lightshow/status")).await;
    assert_eq!(body["data"]["mode"], "party");
}

#[tokio::test]
async fn test_latency_and_intensity_clamp() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        json_request(Method::PUT, "/api/lightshow/latency", json!({"latency_ms": -10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["latency_ms"], 0);

    let (_, body) = send(
        &h.app,
        json_request(Method::PUT, "/api/lightshow/intensity", json!({"intensity": 99})),
    )
    .await;
    assert_eq!(body["data"]["intensity"], 10);

    let (_, body) = send(
        &h.app,
        json_request(Method::PUT, "/api/lightshow/intensity", json!({"intensity": 0})),
    )
    .await;
    assert_eq!(body["data"]["intensity"], 1);
}

#[tokio::test]
async fn test_devices_without_lan_controller() {
    let h = harness();
    let (status, body) = send(&h.app, empty_request(Method::GET, "/api/lightshow/devices")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_stream_probe_does_not_subscribe() {
    let h = harness();
    for path in ["/stream.wav", "/stream"] {
        let response = h
            .app
            .clone()
            .oneshot(empty_request(Method::HEAD, path))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/x-wav");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "none");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
    assert_eq!(h.buffer.subscriber_count(), 0);
}

#[tokio::test]
async fn test_stream_delivers_header_then_audio() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(empty_request(Method::GET, "/stream.wav"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/x-wav");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-store");
    assert_eq!(response.headers()[header::CONNECTION], "close");
    assert_eq!(h.buffer.subscriber_count(), 1);

    let mut body = response.into_body().into_data_stream();
    let wav_header = body.next().await.unwrap().unwrap();
    assert_eq!(wav_header.len(), 44);
    assert_eq!(&wav_header[0..4], b"RIFF");

    h.buffer.put(Arc::from(vec![7u8; 4096]));
    let audio = body.next().await.unwrap().unwrap();
    assert_eq!(audio.len(), 4096);
    assert!(audio.iter().all(|&b| b == 7));

    // Closing the connection releases the subscription
    drop(body);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.buffer.subscriber_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.buffer.subscriber_count(), 0);
}

#[tokio::test]
async fn test_concurrent_listeners_each_get_audio() {
    let h = harness();
    let first = h
        .app
        .clone()
        .oneshot(empty_request(Method::GET, "/stream.wav"))
        .await
        .unwrap();
    let second = h
        .app
        .clone()
        .oneshot(empty_request(Method::GET, "/stream"))
        .await
        .unwrap();
    assert_eq!(h.buffer.subscriber_count(), 2);

    let mut first = first.into_body().into_data_stream();
    let mut second = second.into_body().into_data_stream();
    first.next().await.unwrap().unwrap();
    second.next().await.unwrap().unwrap();

    h.buffer.put(Arc::from(vec![3u8; 4096]));
    assert_eq!(first.next().await.unwrap().unwrap()[0], 3);
    assert_eq!(second.next().await.unwrap().unwrap()[0], 3);
}
