//! Operator-facing roster management: list, enroll, remove, analytics.
//!
//! Enrollment and removal touch both the face collection and the profile
//! store; the ordering rules that keep them consistent live here.

use crate::matcher::{IdentityMatcher, MatcherError};
use crate::pipeline::bounded;
use crate::store::{ProfileStore, StoreError};
use crate::types::{AnalyticsSummary, Profile, DATE_FORMAT, NEVER_VISITED};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no usable face found in the image")]
    NoUsableFace,
    #[error("{0}")]
    NotFound(String),
    #[error("analytics unavailable: index '{0}' is missing on the detection log; create it and retry")]
    IndexMissing(String),
    #[error("face service error: {0}")]
    Matcher(#[from] MatcherError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("profile could not be saved (enrollment rolled back: {rolled_back})")]
    NotSaved {
        rolled_back: bool,
        #[source]
        source: StoreError,
    },
    #[error("removal incomplete (face revoked: {face_revoked}, profile deleted: {profile_deleted})")]
    RemovalIncomplete {
        face_revoked: bool,
        profile_deleted: bool,
    },
}

/// Fields an operator supplies when adding a profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProfile {
    pub name: String,
    pub category: String,
    pub notes: Option<String>,
    /// "MM-DD".
    pub date_of_birth: Option<String>,
    pub tags: Vec<String>,
}

impl NewProfile {
    /// Split a comma-separated tag list, trimming and dropping blanks and repeats.
    pub fn parse_tags(raw: &str) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    fn validate(&self) -> Result<(), RosterError> {
        if self.name.trim().is_empty() {
            return Err(RosterError::InvalidInput("name is required".into()));
        }
        if self.category.trim().is_empty() {
            return Err(RosterError::InvalidInput("category is required".into()));
        }
        if let Some(dob) = &self.date_of_birth {
            // Leap year so that 02-29 is accepted.
            let valid = dob.len() == 5
                && NaiveDate::parse_from_str(&format!("2000-{dob}"), DATE_FORMAT).is_ok();
            if !valid {
                return Err(RosterError::InvalidInput(format!(
                    "date of birth must be MM-DD, got '{dob}'"
                )));
            }
        }
        Ok(())
    }

    fn into_profile(self, face_id: String) -> Profile {
        Profile {
            face_id,
            name: self.name,
            category: self.category,
            notes: self.notes,
            date_of_birth: self.date_of_birth,
            last_visit: NEVER_VISITED.to_string(),
            tags: self.tags,
        }
    }
}

/// Coordinates roster changes across the face collection and the store.
pub struct Roster {
    matcher: Arc<dyn IdentityMatcher>,
    store: Arc<dyn ProfileStore>,
    call_timeout: Duration,
}

impl Roster {
    pub fn new(
        matcher: Arc<dyn IdentityMatcher>,
        store: Arc<dyn ProfileStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            matcher,
            store,
            call_timeout,
        }
    }

    pub async fn list(&self) -> Result<Vec<Profile>, RosterError> {
        Ok(bounded(self.call_timeout, StoreError::Timeout, self.store.list()).await?)
    }

    /// Enroll the face, then persist the profile. A failed store write
    /// revokes the freshly enrolled face.
    pub async fn create(&self, new: NewProfile, image: &[u8]) -> Result<Profile, RosterError> {
        new.validate()?;
        if image.is_empty() {
            return Err(RosterError::InvalidInput("image is required".into()));
        }

        let face_id = bounded(
            self.call_timeout,
            MatcherError::Timeout,
            self.matcher.enroll(image, &new.name),
        )
        .await?
        .ok_or(RosterError::NoUsableFace)?;
        tracing::info!(face_id = %face_id, name = %new.name, "face enrolled");

        let profile = new.into_profile(face_id);
        let saved = bounded(self.call_timeout, StoreError::Timeout, self.store.upsert(&profile)).await;
        if let Err(source) = saved {
            tracing::error!(face_id = %profile.face_id, error = %source, "profile write failed; rolling back enrollment");
            let rolled_back = self.revoke(&profile.face_id).await;
            if !rolled_back {
                tracing::error!(face_id = %profile.face_id, "rollback failed; enrolled face is orphaned");
            }
            return Err(RosterError::NotSaved {
                rolled_back,
                source,
            });
        }

        Ok(profile)
    }

    /// Revoke the face, then delete the profile record.
    ///
    /// The record is only deleted once the face collection confirms removal,
    /// unless `force` is set (for faces already gone from the collection).
    pub async fn remove(&self, face_id: &str, force: bool) -> Result<(), RosterError> {
        let revoked = self.revoke(face_id).await;

        if !revoked && !force {
            let known = bounded(self.call_timeout, StoreError::Timeout, self.store.get(face_id)).await?;
            if known.is_none() {
                return Err(RosterError::NotFound(format!("no profile with face id {face_id}")));
            }
            tracing::warn!(face_id, "face revoke not confirmed; keeping profile record");
            return Err(RosterError::RemovalIncomplete {
                face_revoked: false,
                profile_deleted: false,
            });
        }

        let deleted = bounded(self.call_timeout, StoreError::Timeout, self.store.delete(face_id)).await;
        match deleted {
            Ok(()) => {
                tracing::info!(face_id, revoked, "profile removed");
                Ok(())
            }
            Err(err) => {
                tracing::error!(face_id, error = %err, "profile delete failed after revoke");
                Err(RosterError::RemovalIncomplete {
                    face_revoked: revoked,
                    profile_deleted: false,
                })
            }
        }
    }

    /// Rollup for a "YYYY-MM-DD" date key.
    pub async fn analytics(&self, date: &str) -> Result<AnalyticsSummary, RosterError> {
        let day = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| RosterError::InvalidInput(format!("date must be YYYY-MM-DD, got '{date}'")))?;

        let summary = match bounded(self.call_timeout, StoreError::Timeout, self.store.aggregate(day)).await {
            Ok(summary) => summary,
            Err(StoreError::IndexMissing(index)) => return Err(RosterError::IndexMissing(index)),
            Err(err) => return Err(err.into()),
        };

        if summary.total_visits == 0 {
            return Err(RosterError::NotFound(format!("no detections recorded on {date}")));
        }
        Ok(summary)
    }

    async fn revoke(&self, face_id: &str) -> bool {
        let ids = [face_id.to_string()];
        match bounded(self.call_timeout, MatcherError::Timeout, self.matcher.revoke(&ids)).await {
            Ok(removed) => removed.iter().any(|id| id == face_id),
            Err(err) => {
                tracing::warn!(face_id, error = %err, "face revoke failed");
                false
            }
        }
    }
}
