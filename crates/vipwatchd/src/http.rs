//! Router assembly and shared handler state.

use crate::{api, channel};
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use vipwatch_core::{DetectionPipeline, Roster};

/// Backend names and tunables reported by `/api/status`.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub matcher: &'static str,
    pub store: &'static str,
    pub similarity_threshold: f32,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DetectionPipeline>,
    pub roster: Arc<Roster>,
    pub info: Arc<ServiceInfo>,
}

pub struct RouterOptions<'a> {
    /// Web UI directory with index.html, management.html and dashboard.html.
    pub static_dir: Option<&'a Path>,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState, options: RouterOptions<'_>) -> Router {
    let mut app = Router::new()
        .route("/ws/live-detection", get(channel::live_detection))
        .route("/api/vips", get(api::list_vips).post(api::create_vip))
        .route("/api/vips/:face_id", delete(api::delete_vip))
        .route("/api/analytics/:date", get(api::analytics))
        .route("/api/status", get(api::status))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .with_state(state);

    if let Some(dir) = options.static_dir {
        tracing::info!(dir = %dir.display(), "serving web UI");
        app = app
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .route_service("/management", ServeFile::new(dir.join("management.html")))
            .route_service("/dashboard", ServeFile::new(dir.join("dashboard.html")))
            .nest_service("/static", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
}
