//! Management API handlers: roster CRUD, daily analytics and status.

use crate::http::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use vipwatch_core::{AnalyticsSummary, NewProfile, Profile, RosterError};

/// Handler error rendered as `{"error": ..., "kind": ...}`.
#[derive(Debug)]
pub enum ApiError {
    Roster(RosterError),
    Form(MultipartError),
}

impl From<RosterError> for ApiError {
    fn from(err: RosterError) -> Self {
        Self::Roster(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Form(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Form(err) => {
                let body = json!({ "error": err.body_text(), "kind": "invalid_form" });
                return (err.status(), Json(body)).into_response();
            }
            Self::Roster(err) => err,
        };

        let (status, kind) = match &err {
            RosterError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            RosterError::NoUsableFace => (StatusCode::BAD_REQUEST, "no_usable_face"),
            RosterError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RosterError::IndexMissing(_) => (StatusCode::FAILED_DEPENDENCY, "index_missing"),
            RosterError::Matcher(_) | RosterError::Store(_) => {
                (StatusCode::BAD_GATEWAY, "backend_unavailable")
            }
            RosterError::NotSaved { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "not_saved"),
            RosterError::RemovalIncomplete { .. } => (StatusCode::BAD_GATEWAY, "removal_incomplete"),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %err, "request failed");
        } else {
            tracing::debug!(status = %status, error = %err, "request rejected");
        }

        let mut body = json!({ "error": err.to_string(), "kind": kind });
        if let RosterError::RemovalIncomplete {
            face_revoked,
            profile_deleted,
        } = err
        {
            body["faceRevoked"] = json!(face_revoked);
            body["profileDeleted"] = json!(profile_deleted);
        }
        (status, Json(body)).into_response()
    }
}

pub async fn list_vips(State(state): State<AppState>) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(state.roster.list().await?))
}

/// Multipart fields: name, category, notes, dob, tags (comma-separated), image.
pub async fn create_vip(
    State(state): State<AppState>,
    mut form: Multipart,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let mut new = NewProfile::default();
    let mut image = Vec::new();

    while let Some(field) = form.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => image = field.bytes().await?.to_vec(),
            "name" => new.name = field.text().await?.trim().to_string(),
            "category" => new.category = field.text().await?.trim().to_string(),
            "notes" => new.notes = non_empty(field.text().await?),
            "dob" => new.date_of_birth = non_empty(field.text().await?),
            "tags" => new.tags = NewProfile::parse_tags(&field.text().await?),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let profile = state.roster.create(new, &image).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    force: bool,
}

pub async fn delete_vip(
    State(state): State<AppState>,
    Path(face_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    state.roster.remove(&face_id, params.force).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analytics(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    Ok(Json(state.roster.analytics(&date).await?))
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "matcher": state.info.matcher,
        "store": state.info.store,
        "similarityThreshold": state.info.similarity_threshold,
    }))
}
