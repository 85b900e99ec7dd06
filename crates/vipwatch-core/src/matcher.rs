//! Contract for the external face-recognition collection.

use crate::types::IdentityMatch;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("face service unreachable: {0}")]
    Unavailable(String),
    #[error("face service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected face service response: {0}")]
    InvalidResponse(String),
    #[error("face service call timed out")]
    Timeout,
}

/// A named face collection that can enroll, search and revoke identities.
///
/// "No face in the image" is a normal outcome and is reported as `Ok(None)`,
/// never as an error. `Err` is reserved for genuine backend failures.
#[async_trait]
pub trait IdentityMatcher: Send + Sync {
    /// Index at most one face from `image` under `label` and return the new
    /// identity token, or `None` when zero or several usable faces are found.
    async fn enroll(&self, image: &[u8], label: &str) -> Result<Option<String>, MatcherError>;

    /// Best match at or above `threshold` (percent similarity).
    async fn search(
        &self,
        image: &[u8],
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, MatcherError>;

    /// Remove enrolled identities. Returns exactly the tokens that were removed.
    async fn revoke(&self, face_ids: &[String]) -> Result<Vec<String>, MatcherError>;

    /// Short backend name for status reporting.
    fn backend(&self) -> &'static str;
}
