//! HTTP client for a hosted face-collection service.
//!
//! Request and response bodies follow the Rekognition collection API shape
//! (`IndexFaces`, `SearchFacesByImage`, `DeleteFaces`), exposed under
//! `{endpoint}/collections/{collection}/faces/...`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vipwatch_core::{IdentityMatch, IdentityMatcher, MatcherError};

/// Error type the service returns when an image holds no detectable face.
const NO_FACE_ERROR: &str = "InvalidParameterException";

/// Connection settings for [`RemoteMatcher`].
#[derive(Debug, Clone)]
pub struct RemoteMatcherConfig {
    pub endpoint: String,
    pub collection_id: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

pub struct RemoteMatcher {
    client: Client,
    config: RemoteMatcherConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageBytes {
    bytes: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct IndexFacesRequest<'a> {
    image: ImageBytes,
    external_image_id: &'a str,
    max_faces: u32,
    quality_filter: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchFacesRequest {
    image: ImageBytes,
    face_match_threshold: f32,
    max_faces: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteFacesRequest<'a> {
    face_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceRef {
    face_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceRecord {
    face: FaceRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IndexFacesResponse {
    #[serde(default)]
    face_records: Vec<FaceRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceMatch {
    similarity: f32,
    face: FaceRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchFacesResponse {
    #[serde(default)]
    face_matches: Vec<FaceMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteFacesResponse {
    #[serde(default)]
    deleted_faces: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// Outcome of a call that may legitimately find no face.
enum Reply<T> {
    Ok(T),
    NoFace,
}

/// Map a label onto the external-id charset `[A-Za-z0-9_.\-:]`.
pub fn external_image_id(label: &str) -> String {
    let id: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        "_".to_string()
    } else {
        id
    }
}

impl RemoteMatcher {
    pub fn new(config: RemoteMatcherConfig) -> Result<Self, MatcherError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MatcherError::Unavailable(format!("http client: {e}")))?;
        tracing::info!(
            endpoint = %config.endpoint,
            collection = %config.collection_id,
            "face collection client ready"
        );
        Ok(Self { client, config })
    }

    fn url(&self, op: &str) -> String {
        format!(
            "{}/collections/{}/faces/{op}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.collection_id
        )
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        op: &str,
        body: &B,
    ) -> Result<Reply<R>, MatcherError> {
        let mut req = self.client.post(self.url(op)).json(body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                MatcherError::Timeout
            } else {
                MatcherError::Unavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            let parsed = resp
                .json::<R>()
                .await
                .map_err(|e| MatcherError::InvalidResponse(format!("{op}: {e}")))?;
            return Ok(Reply::Ok(parsed));
        }

        let text = resp.text().await.unwrap_or_default();
        let err: ServiceError = serde_json::from_str(&text).unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && err.kind.ends_with(NO_FACE_ERROR) {
            return Ok(Reply::NoFace);
        }
        let message = if err.message.is_empty() { text } else { err.message };
        Err(MatcherError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IdentityMatcher for RemoteMatcher {
    async fn enroll(&self, image: &[u8], label: &str) -> Result<Option<String>, MatcherError> {
        let external_id = external_image_id(label);
        let body = IndexFacesRequest {
            image: ImageBytes {
                bytes: STANDARD.encode(image),
            },
            external_image_id: &external_id,
            max_faces: 1,
            quality_filter: "AUTO",
        };
        match self.post::<_, IndexFacesResponse>("index", &body).await? {
            Reply::Ok(resp) => Ok(resp.face_records.into_iter().next().map(|r| r.face.face_id)),
            Reply::NoFace => Ok(None),
        }
    }

    async fn search(
        &self,
        image: &[u8],
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, MatcherError> {
        let body = SearchFacesRequest {
            image: ImageBytes {
                bytes: STANDARD.encode(image),
            },
            face_match_threshold: threshold,
            max_faces: 1,
        };
        match self.post::<_, SearchFacesResponse>("search", &body).await? {
            Reply::Ok(resp) => Ok(resp
                .face_matches
                .into_iter()
                .filter(|m| m.similarity >= threshold)
                .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
                .map(|m| IdentityMatch {
                    face_id: m.face.face_id,
                    confidence: m.similarity,
                })),
            Reply::NoFace => Ok(None),
        }
    }

    async fn revoke(&self, face_ids: &[String]) -> Result<Vec<String>, MatcherError> {
        if face_ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = DeleteFacesRequest { face_ids };
        match self.post::<_, DeleteFacesResponse>("delete", &body).await? {
            Reply::Ok(resp) => {
                tracing::info!(deleted = ?resp.deleted_faces, "faces deleted from collection");
                Ok(resp
                    .deleted_faces
                    .into_iter()
                    .filter(|id| face_ids.contains(id))
                    .collect())
            }
            Reply::NoFace => Ok(Vec::new()),
        }
    }

    fn backend(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn index(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["MaxFaces"], 1);
        assert_eq!(body["QualityFilter"], "AUTO");
        Json(json!({ "FaceRecords": [{ "Face": { "FaceId": body["ExternalImageId"] } }] }))
    }

    async fn search(Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        if body["Image"]["Bytes"] == STANDARD.encode(b"blank") {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({ "__type": "InvalidParameterException", "message": "no faces" })),
            );
        }
        if body["Image"]["Bytes"] == STANDARD.encode(b"boom") {
            return (
                AxumStatus::INTERNAL_SERVER_ERROR,
                Json(json!({ "__type": "InternalServerError", "message": "down" })),
            );
        }
        (
            AxumStatus::OK,
            Json(json!({ "FaceMatches": [{ "Similarity": 99.2, "Face": { "FaceId": "face-7" } }] })),
        )
    }

    async fn delete(Json(body): Json<Value>) -> Json<Value> {
        let first = body["FaceIds"][0].clone();
        Json(json!({ "DeletedFaces": [first] }))
    }

    async fn matcher() -> RemoteMatcher {
        let app = Router::new()
            .route("/collections/vips/faces/index", post(index))
            .route("/collections/vips/faces/search", post(search))
            .route("/collections/vips/faces/delete", post(delete));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        RemoteMatcher::new(RemoteMatcherConfig {
            endpoint: format!("http://{addr}/"),
            collection_id: "vips".into(),
            api_key: None,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_external_image_id_sanitised() {
        assert_eq!(external_image_id("Nguyễn Văn A"), "Nguy_n_V_n_A");
        assert_eq!(external_image_id("ok-id_1.2:3"), "ok-id_1.2:3");
        assert_eq!(external_image_id(""), "_");
    }

    #[tokio::test]
    async fn test_enroll_uses_external_id() {
        let m = matcher().await;
        let id = m.enroll(b"img", "Jane Doe").await.unwrap();
        assert_eq!(id.as_deref(), Some("Jane_Doe"));
    }

    #[tokio::test]
    async fn test_search_match_and_no_face() {
        let m = matcher().await;
        let hit = m.search(b"img", 98.0).await.unwrap().unwrap();
        assert_eq!(hit.face_id, "face-7");
        assert!((hit.confidence - 99.2).abs() < 1e-4);

        assert!(m.search(b"blank", 98.0).await.unwrap().is_none());
        assert!(m.search(b"img", 99.5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let m = matcher().await;
        match m.search(b"boom", 98.0).await {
            Err(MatcherError::Rejected { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "down");
            }
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_revoke_reports_subset() {
        let m = matcher().await;
        let removed = m
            .revoke(&["face-1".to_string(), "face-2".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["face-1".to_string()]);
        assert!(m.revoke(&[]).await.unwrap().is_empty());
    }
}
