//! Scripted collaborators shared by the unit tests of this crate.

use crate::analytics;
use crate::frame::Frame;
use crate::matcher::{IdentityMatcher, MatcherError};
use crate::store::{ProfileStore, StoreError};
use crate::types::{AnalyticsSummary, DetectionEvent, IdentityMatch, Profile, NEVER_VISITED};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;

pub fn png_frame() -> Frame {
    Frame::from_bytes(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0])
        .expect("png magic")
}

pub fn sample_profile(face_id: &str, name: &str) -> Profile {
    Profile {
        face_id: face_id.into(),
        name: name.into(),
        category: "gold".into(),
        notes: Some("likes espresso".into()),
        date_of_birth: None,
        last_visit: NEVER_VISITED.into(),
        tags: vec!["regular".into()],
    }
}

pub enum SearchScript {
    NoFace,
    Hit(String, f32),
    Fail,
    Hang,
}

pub struct FakeMatcher {
    search: SearchScript,
    /// Token handed out by `enroll`; `None` means no usable face.
    pub enroll_token: Mutex<Option<String>>,
    pub enrolled: Mutex<Vec<String>>,
    pub revoke_fails: Mutex<bool>,
}

impl FakeMatcher {
    pub fn new(search: SearchScript) -> Self {
        Self {
            search,
            enroll_token: Mutex::new(Some("face-new".into())),
            enrolled: Mutex::new(Vec::new()),
            revoke_fails: Mutex::new(false),
        }
    }
}

#[async_trait]
impl IdentityMatcher for FakeMatcher {
    async fn enroll(&self, _image: &[u8], _label: &str) -> Result<Option<String>, MatcherError> {
        let token = self.enroll_token.lock().clone();
        if let Some(t) = &token {
            self.enrolled.lock().push(t.clone());
        }
        Ok(token)
    }

    async fn search(
        &self,
        _image: &[u8],
        _threshold: f32,
    ) -> Result<Option<IdentityMatch>, MatcherError> {
        match &self.search {
            SearchScript::NoFace => Ok(None),
            SearchScript::Hit(id, confidence) => Ok(Some(IdentityMatch {
                face_id: id.clone(),
                confidence: *confidence,
            })),
            SearchScript::Fail => Err(MatcherError::Unavailable("scripted".into())),
            SearchScript::Hang => {
                std::future::pending::<Result<Option<IdentityMatch>, MatcherError>>().await
            }
        }
    }

    async fn revoke(&self, face_ids: &[String]) -> Result<Vec<String>, MatcherError> {
        if *self.revoke_fails.lock() {
            return Err(MatcherError::Unavailable("scripted".into()));
        }
        let mut enrolled = self.enrolled.lock();
        let removed: Vec<String> = face_ids
            .iter()
            .filter(|id| enrolled.contains(id))
            .cloned()
            .collect();
        enrolled.retain(|id| !removed.contains(id));
        Ok(removed)
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct FakeStore {
    profiles: Mutex<HashMap<String, Profile>>,
    logs: Mutex<Vec<DetectionEvent>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
    fail_logs: Mutex<bool>,
    missing_index: Mutex<bool>,
}

impl FakeStore {
    pub fn insert(&self, profile: Profile) {
        self.profiles.lock().insert(profile.face_id.clone(), profile);
    }

    pub fn profile(&self, face_id: &str) -> Option<Profile> {
        self.profiles.lock().get(face_id).cloned()
    }

    pub fn logs(&self) -> Vec<DetectionEvent> {
        self.logs.lock().clone()
    }

    pub fn push_log(&self, event: DetectionEvent) {
        self.logs.lock().push(event);
    }

    pub fn fail_reads(&self, on: bool) {
        *self.fail_reads.lock() = on;
    }

    pub fn fail_writes(&self, on: bool) {
        *self.fail_writes.lock() = on;
    }

    pub fn fail_logs(&self, on: bool) {
        *self.fail_logs.lock() = on;
    }

    pub fn drop_index(&self) {
        *self.missing_index.lock() = true;
    }

    fn check(flag: &Mutex<bool>) -> Result<(), StoreError> {
        if *flag.lock() {
            Err(StoreError::Backend("scripted".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProfileStore for FakeStore {
    async fn get(&self, face_id: &str) -> Result<Option<Profile>, StoreError> {
        Self::check(&self.fail_reads)?;
        Ok(self.profile(face_id))
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        Self::check(&self.fail_reads)?;
        let mut all: Vec<Profile> = self.profiles.lock().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.insert(profile.clone());
        Ok(())
    }

    async fn delete(&self, face_id: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.profiles.lock().remove(face_id);
        Ok(())
    }

    async fn touch_last_visit(&self, face_id: &str, timestamp: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        if let Some(p) = self.profiles.lock().get_mut(face_id) {
            p.last_visit = timestamp.to_string();
        }
        Ok(())
    }

    async fn append_log(&self, event: &DetectionEvent) -> Result<(), StoreError> {
        Self::check(&self.fail_logs)?;
        self.push_log(event.clone());
        Ok(())
    }

    async fn aggregate(&self, date: NaiveDate) -> Result<AnalyticsSummary, StoreError> {
        if *self.missing_index.lock() {
            return Err(StoreError::IndexMissing("date".into()));
        }
        Self::check(&self.fail_reads)?;
        let key = date.format(crate::types::DATE_FORMAT).to_string();
        let events: Vec<DetectionEvent> = self
            .logs
            .lock()
            .iter()
            .filter(|e| e.detection_date == key)
            .cloned()
            .collect();
        Ok(analytics::summarize(&key, &events))
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}
