// Main entry point for the comic overlay service

use comic_overlay::{
    core::Config,
    orchestration::{Delivery, PipelineBoundaries, PipelineOrchestrator},
    services::{
        CosmicGlyphs, HttpTextRecognizer, LibreTranslateClient, OverlayContent, SharedOverlay,
    },
    utils::{encode_png_async, load_rgba_from_memory_async, Clock, Metrics, MonotonicClock},
};

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<PipelineOrchestrator>,
    overlay: SharedOverlay,
    clock: Arc<MonotonicClock>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new()?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "comic_overlay={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== COMIC OVERLAY TRANSLATOR ===");
    info!(
        "Config: profile={:?} scope={:?} {}->{} mode={:?} persist={}",
        config.detection.profile,
        config.recognition.scope,
        config.translation.source_lang,
        config.translation.target_lang,
        config.presentation.mode,
        config.presentation.persist
    );

    let metrics = Metrics::new();
    let overlay = SharedOverlay::new(&config.presentation);
    let clock = Arc::new(MonotonicClock::new());

    let boundaries = PipelineBoundaries {
        recognizer: Arc::new(HttpTextRecognizer::new(&config.recognition)?),
        translator: Arc::new(LibreTranslateClient::new(&config.translation)?),
        glyphs: Arc::new(CosmicGlyphs::new(&config.rendering)?),
        presenter: Arc::new(overlay.clone()),
        clock: clock.clone(),
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        &config,
        boundaries,
        metrics.clone(),
    )?);

    let state = AppState {
        orchestrator,
        overlay,
        clock,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/frames", post(deliver_frame))
        .route("/overlay", get(current_overlay).delete(dismiss_overlay))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024))
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  POST   /frames       - Deliver a captured frame (multipart/form-data)");
    info!("  GET    /overlay      - Current overlay (PNG or JSON items)");
    info!("  DELETE /overlay      - Dismiss the overlay");
    info!("  POST   /cache/clear  - Forget cached translations and frame history");
    info!("  GET    /health       - Health check");
    info!("  GET    /metrics      - Prometheus metrics");
    info!("  GET    /stats        - Detailed statistics");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Comic overlay translator"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "pipeline": state.orchestrator.state(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "metrics": state.metrics.snapshot(),
        "pipeline": state.orchestrator.stats(),
    }))
}

/// Deliver one frame
///
/// # Request Format:
/// - multipart/form-data
/// - Field "frame": PNG or JPEG bytes
/// - Field "captured_at_ms" (optional): capture timestamp; defaults to now
///
/// # Response:
/// - `{"status": "started"}` or `{"status": "dropped", "reason": ...}`
async fn deliver_frame(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut frame_bytes = None;
    let mut captured_at_ms = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "frame" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;
                frame_bytes = Some(data.to_vec());
            }
            "captured_at_ms" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;
                let value = text.trim().parse::<u64>().map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Invalid captured_at_ms: {}", e),
                    )
                })?;
                captured_at_ms = Some(value);
            }
            _ => {}
        }
    }

    let Some(bytes) = frame_bytes else {
        return Err((StatusCode::BAD_REQUEST, "No frame provided".to_string()));
    };

    let image = load_rgba_from_memory_async(bytes)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid image: {}", e)))?;
    let captured_at_ms = captured_at_ms.unwrap_or_else(|| state.clock.now_ms());

    match state.orchestrator.deliver(image, captured_at_ms) {
        // Detached: the run finishes on its own and presents through the overlay
        Delivery::Started(_) => Ok(Json(serde_json::json!({ "status": "started" }))),
        Delivery::Dropped(reason) => Ok(Json(serde_json::json!({
            "status": "dropped",
            "reason": reason,
        }))),
    }
}

async fn current_overlay(State(state): State<AppState>) -> Response {
    match state.overlay.current() {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(OverlayContent::Items(items)) => Json(items).into_response(),
        Some(OverlayContent::Bitmap(bitmap)) => match encode_png_async(bitmap).await {
            Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
            Err(e) => {
                error!("Failed to encode overlay: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to encode overlay: {}", e),
                )
                    .into_response()
            }
        },
    }
}

async fn dismiss_overlay(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.dismiss_overlay().await;
    StatusCode::NO_CONTENT
}

async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.orchestrator.clear_cache();
    Json(serde_json::json!({ "status": "cleared" }))
}
