//! Shared fixtures for the handler and channel tests.

use crate::http::{AppState, ServiceInfo};
use async_trait::async_trait;
use chrono::NaiveDate;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vipwatch_core::{
    AnalyticsSummary, DetectionEvent, DetectionPipeline, IdentityMatch, IdentityMatcher,
    MatcherError, PipelineSettings, Profile, ProfileStore, Roster, StandardPolicy, StoreError,
};

/// A small PNG whose bytes differ per `seed`.
pub fn png(seed: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb([seed, 128, 255 - seed]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn state_with(matcher: Arc<dyn IdentityMatcher>, store: Arc<dyn ProfileStore>) -> AppState {
    let settings = PipelineSettings {
        similarity_threshold: 98.0,
        call_timeout: Duration::from_secs(2),
    };
    let info = ServiceInfo {
        matcher: matcher.backend(),
        store: store.backend(),
        similarity_threshold: settings.similarity_threshold,
    };
    AppState {
        roster: Arc::new(Roster::new(matcher.clone(), store.clone(), settings.call_timeout)),
        pipeline: Arc::new(DetectionPipeline::new(
            matcher,
            store,
            Arc::new(StandardPolicy::default()),
            settings,
        )),
        info: Arc::new(info),
    }
}

/// Store wrapper whose reads or writes can be switched to fail.
pub struct FlakyStore<S> {
    inner: Arc<S>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<S: ProfileStore> FlakyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    fn read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read refused".into()));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileStore for FlakyStore<S> {
    async fn get(&self, face_id: &str) -> Result<Option<Profile>, StoreError> {
        self.read()?;
        self.inner.get(face_id).await
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        self.read()?;
        self.inner.list().await
    }

    async fn upsert(&self, profile: &Profile) -> Result<(), StoreError> {
        self.write()?;
        self.inner.upsert(profile).await
    }

    async fn delete(&self, face_id: &str) -> Result<(), StoreError> {
        self.write()?;
        self.inner.delete(face_id).await
    }

    async fn touch_last_visit(&self, face_id: &str, timestamp: &str) -> Result<(), StoreError> {
        self.write()?;
        self.inner.touch_last_visit(face_id, timestamp).await
    }

    async fn append_log(&self, event: &DetectionEvent) -> Result<(), StoreError> {
        self.write()?;
        self.inner.append_log(event).await
    }

    async fn aggregate(&self, date: NaiveDate) -> Result<AnalyticsSummary, StoreError> {
        self.read()?;
        self.inner.aggregate(date).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

/// Matcher whose searches take `delay` before answering from `inner`.
pub struct SlowMatcher<M> {
    inner: Arc<M>,
    delay: Duration,
}

impl<M: IdentityMatcher> SlowMatcher<M> {
    pub fn new(inner: Arc<M>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<M: IdentityMatcher> IdentityMatcher for SlowMatcher<M> {
    async fn enroll(&self, image: &[u8], label: &str) -> Result<Option<String>, MatcherError> {
        self.inner.enroll(image, label).await
    }

    async fn search(
        &self,
        image: &[u8],
        threshold: f32,
    ) -> Result<Option<IdentityMatch>, MatcherError> {
        tokio::time::sleep(self.delay).await;
        self.inner.search(image, threshold).await
    }

    async fn revoke(&self, face_ids: &[String]) -> Result<Vec<String>, MatcherError> {
        self.inner.revoke(face_ids).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
