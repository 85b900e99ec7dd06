//! In-process face collection for development and tests.
//!
//! There is no face model here: a payload "contains a face" iff it decodes
//! as an image, and identity is the SHA-256 fingerprint of the encoded
//! bytes. Re-submitting the exact enrollment image is a 100% match.

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Cursor;
use vipwatch_core::{IdentityMatch, IdentityMatcher, MatcherError};

type Fingerprint = [u8; 32];

/// Similarity reported for an exact fingerprint match.
const EXACT_MATCH_SIMILARITY: f32 = 100.0;

struct EnrolledFace {
    fingerprint: Fingerprint,
    label: String,
}

#[derive(Default)]
pub struct MemoryMatcher {
    /// Keyed by identity token; ordered so searches are deterministic.
    faces: RwLock<BTreeMap<String, EnrolledFace>>,
}

impl MemoryMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.faces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.read().is_empty()
    }

    /// Label recorded at enrollment for `face_id`.
    pub fn label(&self, face_id: &str) -> Option<String> {
        self.faces.read().get(face_id).map(|f| f.label.clone())
    }

    /// Fingerprint of a decodable image, or `None` when no face can be present.
    fn fingerprint(image: &[u8]) -> Option<Fingerprint> {
        let decodable = image::ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok())
            .is_some_and(|(w, h)| w > 0 && h > 0);
        decodable.then(|| Sha256::digest(image).into())
    }
}

#[async_trait]
impl IdentityMatcher for MemoryMatcher {
    async fn enroll(&self, image: &[u8], label: &str) -> Result<Option<String>, MatcherError> {
        let Some(fingerprint) = Self::fingerprint(image) else {
            return Ok(None);
        };
        let face_id = uuid::Uuid::new_v4().to_string();
        self.faces.write().insert(
            face_id.clone(),
            EnrolledFace {
                fingerprint,
                label: label.to_string(),
            },
        );
        tracing::debug!(face_id = %face_id, label, "face indexed in memory collection");
        Ok(Some(face_id))
    }

    async fn search(
        &self,
        image: &[u8],
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, MatcherError> {
        let Some(probe) = Self::fingerprint(image) else {
            return Ok(None);
        };
        if EXACT_MATCH_SIMILARITY < threshold {
            return Ok(None);
        }
        let faces = self.faces.read();
        Ok(faces
            .iter()
            .find(|(_, face)| face.fingerprint == probe)
            .map(|(face_id, _)| IdentityMatch {
                face_id: face_id.clone(),
                confidence: EXACT_MATCH_SIMILARITY,
            }))
    }

    async fn revoke(&self, face_ids: &[String]) -> Result<Vec<String>, MatcherError> {
        let mut faces = self.faces.write();
        Ok(face_ids
            .iter()
            .filter(|id| faces.remove(id.as_str()).is_some())
            .cloned()
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
