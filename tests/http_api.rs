//! HTTP routes, status codes and JSON bodies.

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::{Body, Client, Method, Request, StatusCode};
use parking_lot::Mutex;
use pool_core::clock::ManualClock;
use pool_core::reading::CompensatedReading;
use pool_core::session::{CompletedTest, SessionHandle, SessionState};
use pool_driver_mock::MockSensorPort;
use pool_sense::config::PoolSenseConfig;
use pool_sense::controller::LeakTestController;
use pool_sense::error::{AppError, AppResult};
use pool_sense::producer::ProducerMode;
use pool_sense::server::handle_request;
use pool_sense::storage::{JsonFileStore, ResultStore};
use pool_sense::PoolSenseService;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const START: f64 = 1_700_000_000.0;

/// Keeps records in memory; optionally fails every save.
#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<CompletedTest>>,
    fail: bool,
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save(&self, record: &CompletedTest) -> AppResult<PathBuf> {
        if self.fail {
            return Err(AppError::Storage {
                path: PathBuf::from("/readonly"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        self.saved.lock().push(record.clone());
        Ok(PathBuf::from("memory"))
    }
}

struct Harness {
    controller: Arc<LeakTestController>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    _mode_tx: watch::Sender<ProducerMode>,
}

fn harness_with(store: MemoryStore) -> Harness {
    harness_with_baseline(store, Duration::from_secs(15 * 60))
}

fn harness_with_baseline(store: MemoryStore, baseline: Duration) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(store);
    let (mode_tx, mode_rx) = watch::channel(ProducerMode::Sensor);
    let controller = Arc::new(LeakTestController::new(
        SessionHandle::default(),
        store.clone(),
        clock.clone(),
        baseline,
        mode_rx,
    ));
    Harness {
        controller,
        clock,
        store,
        _mode_tx: mode_tx,
    }
}

fn harness() -> Harness {
    harness_with(MemoryStore::default())
}

async fn call(harness: &Harness, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = handle_request(harness.controller.clone(), req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body()).await.unwrap();
    (status, body.to_vec())
}

async fn call_json(harness: &Harness, method: Method, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(harness, method, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Feed the borderline scenario: 120 samples one minute apart, 1000 → 998.8 mm at 25 °C.
fn feed_borderline(harness: &Harness) {
    let session = harness.controller.session();
    for i in 0..120 {
        let depth = 1000.0 - 1.2 * i as f64 / 119.0;
        assert!(session.append(CompensatedReading::new(START + i as f64 * 60.0, 1100.0, 25.0, depth)));
    }
    harness.clock.set(START + 120.0 * 60.0);
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let h = harness();
    let (status, body) = call(&h, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _) = call(&h, Method::GET, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Wrong method on a known path.
    let (status, _) = call(&h, Method::GET, "/api/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idle_data_has_no_readings() {
    let h = harness();
    let (status, body) = call_json(&h, Method::GET, "/api/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["mode"], "sensor");
    assert_eq!(body["elapsed"], "0:00");
    assert_eq!(body["total_readings"], 0);
    assert_eq!(body["new_readings"].as_array().unwrap().len(), 0);
    assert!(body["latest"].is_null());
    assert!(body["leak_rate"].is_null());
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn bad_since_is_rejected() {
    let h = harness();
    let (status, body) = call_json(&h, Method::GET, "/api/data?since=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test(start_paused = true)]
async fn start_twice_conflicts() {
    let h = harness();
    let (status, body) = call_json(&h, Method::POST, "/api/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id, h.controller.session().session_id().to_string());

    let (status, body) = call_json(&h, Method::POST, "/api/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("baseline"));
    assert_eq!(h.controller.session().session_id().to_string(), session_id);
}

#[tokio::test]
async fn stop_while_idle_conflicts() {
    let h = harness();
    let (status, body) = call_json(&h, Method::POST, "/api/stop").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
    assert!(h.store.saved.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn baseline_promotes_after_configured_delay() {
    let h = harness();
    call(&h, Method::POST, "/api/start").await;
    assert_eq!(h.controller.session().state(), SessionState::Baseline);

    tokio::time::sleep(Duration::from_secs(14 * 60)).await;
    assert_eq!(h.controller.session().state(), SessionState::Baseline);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.controller.session().state(), SessionState::Testing);
}

#[tokio::test(start_paused = true)]
async fn restart_cancels_superseded_promotion() {
    let h = harness();
    call(&h, Method::POST, "/api/start").await;
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    call(&h, Method::POST, "/api/stop").await;
    call(&h, Method::POST, "/api/start").await;

    // The first timer would have fired here.
    tokio::time::sleep(Duration::from_secs(6 * 60)).await;
    assert_eq!(h.controller.session().state(), SessionState::Baseline);

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert_eq!(h.controller.session().state(), SessionState::Testing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_stop_never_cancels_next_promotion() {
    let h = harness_with_baseline(MemoryStore::default(), Duration::from_millis(5));
    for _ in 0..40 {
        let _ = h.controller.stop_test().await;
        h.controller.start_test().unwrap();

        let stopper = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.stop_test().await })
        };
        let starter = {
            let controller = h.controller.clone();
            tokio::spawn(async move { controller.start_test() })
        };
        let stopped = stopper.await.unwrap();
        let started = starter.await.unwrap();
        assert!(stopped.is_ok());

        if started.is_ok() {
            // The restarted test must still be promoted.
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert_eq!(h.controller.session().state(), SessionState::Testing);
        } else {
            assert_eq!(h.controller.session().state(), SessionState::Complete);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn degraded_stretch_is_excluded_and_reported() {
    let h = harness();
    call(&h, Method::POST, "/api/start").await;
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;

    let session = h.controller.session();
    for i in 0..400 {
        assert!(session.append(CompensatedReading::new(START + i as f64, 1100.0, 25.0, 0.0)));
    }
    for i in 400..460 {
        let simulated = CompensatedReading::new(START + i as f64, 1100.0, 25.0, 999.9).simulated();
        assert!(session.append(simulated));
    }
    h.clock.set(START + 460.0);

    let (status, body) = call_json(&h, Method::POST, "/api/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["source"], "sensor");
    assert_eq!(body["result"]["simulated_samples"], 60);
    assert_eq!(body["result"]["raw_loss_mm"], 0.0);
    assert!(body["result"]["message"].as_str().unwrap().contains("60 simulated readings excluded"));

    let saved = h.store.saved.lock();
    assert_eq!(saved[0].simulated_readings, 60);
    assert_eq!(saved[0].result.as_ref().unwrap().simulated_samples, 60);
}

#[tokio::test(start_paused = true)]
async fn full_borderline_test_over_http() {
    let h = harness();
    call(&h, Method::POST, "/api/start").await;
    tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
    feed_borderline(&h);

    let (status, data) = call_json(&h, Method::GET, &format!("/api/data?since={}", START + 60.0 * 100.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(data["status"], "testing");
    assert_eq!(data["total_readings"], 120);
    assert_eq!(data["new_readings"].as_array().unwrap().len(), 19);
    assert_eq!(data["latest"]["timestamp"], START + 119.0 * 60.0);
    assert_eq!(data["elapsed"], "120:00");
    assert_eq!(data["leak_rate"]["classification"], "BORDERLINE");

    let (status, body) = call_json(&h, Method::POST, "/api/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["classification"], "BORDERLINE");
    assert!(body["result"]["message"].as_str().unwrap().contains("0.33 mm/hr"));

    let saved = h.store.saved.lock();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].readings_count, 120);
    assert_eq!(saved[0].simulated_readings, 0);

    drop(saved);
    let (_, data) = call_json(&h, Method::GET, "/api/data").await;
    assert_eq!(data["status"], "complete");
    assert_eq!(data["elapsed"], "120:00");
    assert_eq!(data["result"]["classification"], "BORDERLINE");
}

#[tokio::test(start_paused = true)]
async fn storage_failure_still_completes_the_test() {
    let h = harness_with(MemoryStore {
        fail: true,
        ..Default::default()
    });
    call(&h, Method::POST, "/api/start").await;
    let (status, body) = call_json(&h, Method::POST, "/api/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"].is_null());
    assert_eq!(h.controller.session().state(), SessionState::Complete);
}

#[tokio::test]
async fn degraded_mode_is_reported() {
    let clock = Arc::new(ManualClock::new(START));
    let (mode_tx, mode_rx) = watch::channel(ProducerMode::Sensor);
    let controller = Arc::new(LeakTestController::new(
        SessionHandle::default(),
        Arc::new(MemoryStore::default()),
        clock,
        Duration::from_secs(60),
        mode_rx,
    ));
    mode_tx.send_replace(ProducerMode::Degraded);

    let req = Request::get("/api/data").body(Body::empty()).unwrap();
    let response = handle_request(controller, req).await.unwrap();
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body()).await.unwrap()).unwrap();
    assert_eq!(body["mode"], "degraded");
}

#[tokio::test]
async fn service_serves_over_tcp_and_writes_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PoolSenseConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.sensor.sample_interval_ms = 50;

    let service = PoolSenseService::start(
        &config,
        Arc::new(MockSensorPort::new()),
        Arc::new(pool_core::clock::SystemClock),
        Arc::new(JsonFileStore::new(dir.path())),
    )
    .await
    .unwrap();
    let base = format!("http://{}", service.local_addr());
    let client = Client::new();

    let health = client.get(format!("{}/health", base).parse().unwrap()).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let start = Request::post(format!("{}/api/start", base))
        .body(Body::empty())
        .unwrap();
    assert_eq!(client.request(start).await.unwrap().status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let data = client.get(format!("{}/api/data", base).parse().unwrap()).await.unwrap();
    assert_eq!(
        data.headers()["content-type"],
        "application/json"
    );
    let data: Value = serde_json::from_slice(&to_bytes(data.into_body()).await.unwrap()).unwrap();
    assert_eq!(data["status"], "baseline");
    assert_eq!(data["mode"], "sensor");
    assert!(data["total_readings"].as_u64().unwrap() >= 1);
    assert_eq!(data["latest"]["depth_mm"], 0.0);

    let stop = Request::post(format!("{}/api/stop", base))
        .body(Body::empty())
        .unwrap();
    assert_eq!(client.request(stop).await.unwrap().status(), StatusCode::OK);

    service.shutdown().await;

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}
