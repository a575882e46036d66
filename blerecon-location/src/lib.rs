//! Location Ingress (spec.md §4.C): a minimal HTTP endpoint that
//! accepts pushed GPS fixes and tracks their freshness.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use blerecon_state::RuntimeState;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    runtime: Arc<RuntimeState>,
    first_fix: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Serialize)]
struct StatusBody {
    status: String,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: &'static str,
}

/// Handle returned by [`spawn`]: the HTTP server task, the freshness
/// ticker task, and the one-shot the Supervisor blocks on until the
/// first fix arrives (spec.md §4.G step 2 — "we don't start scanning
/// until we know where we are").
pub struct LocationIngress {
    pub server: JoinHandle<()>,
    pub ticker: JoinHandle<()>,
    pub first_fix: oneshot::Receiver<()>,
}

/// Starts the Location Ingress on `addr` and a background task that
/// flips `RuntimeState`'s freshness status every second (spec.md
/// §4.C).
pub async fn spawn(addr: SocketAddr, runtime: Arc<RuntimeState>) -> std::io::Result<LocationIngress> {
    let (tx, rx) = oneshot::channel();
    let state = AppState {
        runtime: runtime.clone(),
        first_fix: Arc::new(Mutex::new(Some(tx))),
    };

    let app = Router::new()
        .route("/gps", get(get_gps).post(post_gps))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move {
        tracing::info!(%addr, "location ingress online");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "location ingress server exited");
        }
    });

    let ticker_state = runtime;
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            ticker_state.refresh_location_status();
        }
    });

    Ok(LocationIngress { server, ticker, first_fix: rx })
}

async fn post_gps(State(app): State<AppState>, body: axum::body::Bytes) -> impl IntoResponse {
    let parsed = serde_json::from_slice::<Value>(&body).ok().and_then(|value| {
        let lat = value.get("latitude")?.as_f64()?;
        let lon = value.get("longitude")?.as_f64()?;
        Some((lat, lon))
    });

    match parsed {
        Some((lat, lon)) => {
            app.runtime.record_location(lat, lon);
            if let Some(tx) = app.first_fix.lock().expect("first-fix lock poisoned").take() {
                let _ = tx.send(());
            }
            if app.runtime.scanning_started() {
                tracing::info!("{} Current Coordinates: {lat}, {lon}", "[GPS DATA]".cyan());
            }
            (StatusCode::OK, Json(StatusBody { status: "success".to_string() })).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody { status: "error", message: "Invalid data" }),
        )
            .into_response(),
    }
}

async fn get_gps(State(app): State<AppState>) -> impl IntoResponse {
    let status = match app.runtime.location_status() {
        blerecon_state::LocationStatus::Online => "online",
        blerecon_state::LocationStatus::Offline => "offline",
    };
    Json(StatusBody { status: status.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_then_get_reports_online() {
        let runtime = Arc::new(RuntimeState::new(true, 5));
        let state = AppState {
            runtime: runtime.clone(),
            first_fix: Arc::new(Mutex::new(None)),
        };
        let body = serde_json::to_vec(&serde_json::json!({"latitude": 10.0, "longitude": 20.0})).unwrap();
        let resp = post_gps(State(state.clone()), body.into()).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(runtime.is_location_fresh());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let runtime = Arc::new(RuntimeState::new(true, 5));
        let state = AppState { runtime, first_fix: Arc::new(Mutex::new(None)) };
        let resp = post_gps(State(state), axum::body::Bytes::from_static(b"not json")).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
