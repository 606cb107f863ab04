//! HTTP query surface.
//!
//! A small hyper server exposing the live session to the dashboard:
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /api/data?since=<ts>` | readings newer than `ts` plus session status |
//! | `POST /api/start` | starts a test, `409` if one is running |
//! | `POST /api/stop` | stops the test and returns its verdict, `409` if none |
//! | `GET /health` | `OK` |
//!
//! Everything else is `404`.

use crate::controller::LeakTestController;
use crate::error::AppResult;
use crate::producer::ProducerMode;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use pool_core::analyzer::LeakVerdict;
use pool_core::reading::CompensatedReading;
use pool_core::session::{SessionSnapshot, SessionState};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Newest readings returned by one `/api/data` poll.
pub const MAX_NEW_READINGS: usize = 300;

/// Body of `GET /api/data`.
#[derive(Debug, Clone, Serialize)]
pub struct DataResponse {
    pub status: SessionState,
    pub mode: ProducerMode,
    /// `M:SS` since the test started.
    pub elapsed: String,
    pub elapsed_seconds: f64,
    pub total_readings: usize,
    pub new_readings: Vec<CompensatedReading>,
    pub latest: Option<CompensatedReading>,
    pub leak_rate: Option<LeakVerdict>,
    pub result: Option<LeakVerdict>,
}

impl DataResponse {
    pub fn from_snapshot(snapshot: SessionSnapshot, mode: ProducerMode) -> Self {
        let mut new_readings = snapshot.samples;
        if new_readings.len() > MAX_NEW_READINGS {
            new_readings.drain(..new_readings.len() - MAX_NEW_READINGS);
        }
        let latest = new_readings.last().copied();

        Self {
            status: snapshot.state,
            mode,
            elapsed: format_elapsed(snapshot.elapsed_seconds),
            elapsed_seconds: snapshot.elapsed_seconds,
            total_readings: snapshot.total_samples,
            new_readings,
            latest,
            leak_rate: snapshot.preview,
            result: snapshot.result,
        }
    }
}

/// `M:SS`, minutes unbounded.
pub fn format_elapsed(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

// =============================================================================
// Server lifecycle
// =============================================================================

/// Running server; stop it with [`ServerHandle::shutdown`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(err) = (&mut self.task).await {
            if !err.is_cancelled() {
                error!(error = %err, "HTTP server task failed");
            }
        }
    }
}

/// Bind `addr` and serve the API in a background task.
///
/// # Errors
/// `AppError::Server` when the address cannot be bound.
pub async fn start(addr: SocketAddr, controller: Arc<LeakTestController>) -> AppResult<ServerHandle> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let make_service = make_service_fn(move |_conn| {
        let controller = controller.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle_request(controller.clone(), req)
            }))
        }
    });

    let builder = Server::try_bind(&addr)?;
    let server = builder.serve(make_service);
    let local_addr = server.local_addr();
    let server = server.with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });

    info!(addr = %local_addr, "HTTP server listening");

    let task = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server error");
        }
        info!("HTTP server stopped");
    });

    Ok(ServerHandle {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

// =============================================================================
// Routing
// =============================================================================

/// Route one request.
pub async fn handle_request(
    controller: Arc<LeakTestController>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);
    debug!(method = %method, path = %path, "HTTP request");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/api/data") => match parse_since(query.as_deref()) {
            Ok(since) => {
                let snapshot = controller.snapshot(since);
                json_response(
                    StatusCode::OK,
                    &DataResponse::from_snapshot(snapshot, controller.mode()),
                )
            }
            Err(message) => json_response(
                StatusCode::BAD_REQUEST,
                &json!({ "ok": false, "error": message }),
            ),
        },
        (&Method::POST, "/api/start") => match controller.start_test() {
            Ok(session_id) => json_response(
                StatusCode::OK,
                &json!({
                    "ok": true,
                    "message": "Test started, baseline phase running",
                    "session_id": session_id,
                }),
            ),
            Err(err) => {
                warn!(error = %err, "Start rejected");
                json_response(
                    error_status(err.is_invalid_transition()),
                    &json!({ "ok": false, "error": err.to_string() }),
                )
            }
        },
        (&Method::POST, "/api/stop") => match controller.stop_test().await {
            Ok(completed) => json_response(
                StatusCode::OK,
                &json!({ "ok": true, "result": completed.result }),
            ),
            Err(err) => {
                warn!(error = %err, "Stop rejected");
                json_response(
                    error_status(err.is_invalid_transition()),
                    &json!({ "ok": false, "error": err.to_string() }),
                )
            }
        },
        (&Method::GET, "/health") => text_response(StatusCode::OK, "OK"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn error_status(invalid_transition: bool) -> StatusCode {
    if invalid_transition {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// `since` from the query string; absent means 0.
fn parse_since(query: Option<&str>) -> Result<f64, String> {
    let value = query
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "since")
        .map(|(_, value)| value);

    match value {
        None | Some("") => Ok(0.0),
        Some(raw) => match raw.parse::<f64>() {
            Ok(since) if since.is_finite() => Ok(since),
            _ => Err(format!("Invalid 'since' value: {}", raw)),
        },
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
