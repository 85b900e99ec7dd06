//! The detection pipeline: search → resolve → classify → touch → log.
//!
//! Every collaborator failure is converted into a degraded value here, so
//! `process` always yields a result and never fails the realtime channel.

use crate::alert::AlertPolicy;
use crate::frame::Frame;
use crate::matcher::{IdentityMatcher, MatcherError};
use crate::store::{ProfileStore, StoreError};
use crate::types::{DetectionEvent, DetectionResult, TIMESTAMP_FORMAT};
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for [`DetectionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum similarity (percent) for a match.
    pub similarity_threshold: f32,
    /// Upper bound on each collaborator call.
    pub call_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 98.0,
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to `on_timeout`.
pub(crate) async fn bounded<T, E>(
    limit: Duration,
    on_timeout: E,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(on_timeout),
    }
}

/// Consumes one frame at a time and produces a classified [`DetectionResult`].
pub struct DetectionPipeline {
    matcher: Arc<dyn IdentityMatcher>,
    store: Arc<dyn ProfileStore>,
    policy: Arc<dyn AlertPolicy>,
    settings: PipelineSettings,
}

impl DetectionPipeline {
    pub fn new(
        matcher: Arc<dyn IdentityMatcher>,
        store: Arc<dyn ProfileStore>,
        policy: Arc<dyn AlertPolicy>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            matcher,
            store,
            policy,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process a frame at the current local time.
    pub async fn process(&self, frame: &Frame) -> DetectionResult {
        self.process_at(frame, Local::now()).await
    }

    /// Process a frame as if observed at `now`.
    ///
    /// Makes exactly one log append attempt; its outcome never affects the
    /// returned result.
    pub async fn process_at(&self, frame: &Frame, now: DateTime<Local>) -> DetectionResult {
        let result = self.resolve(frame, now).await;

        let event = DetectionEvent::record(now, &result);
        let appended = bounded(
            self.settings.call_timeout,
            StoreError::Timeout,
            self.store.append_log(&event),
        )
        .await;
        if let Err(err) = appended {
            tracing::warn!(log_id = %event.log_id, error = %err, "failed to append detection log");
        }

        result
    }

    async fn resolve(&self, frame: &Frame, now: DateTime<Local>) -> DetectionResult {
        let limit = self.settings.call_timeout;

        let searched = bounded(
            limit,
            MatcherError::Timeout,
            self.matcher
                .search(&frame.data, self.settings.similarity_threshold),
        )
        .await;
        let hit = match searched {
            Ok(Some(hit)) => hit,
            Ok(None) => return DetectionResult::stranger(now),
            Err(err) => {
                tracing::warn!(error = %err, "face search failed; treating frame as stranger");
                return DetectionResult::stranger(now);
            }
        };

        let profile = match bounded(limit, StoreError::Timeout, self.store.get(&hit.face_id)).await
        {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                tracing::warn!(face_id = %hit.face_id, "matched face has no profile record");
                return DetectionResult::stranger(now);
            }
            Err(err) => {
                tracing::warn!(face_id = %hit.face_id, error = %err, "profile lookup failed; treating frame as stranger");
                return DetectionResult::stranger(now);
            }
        };

        let alert = self.policy.classify(&profile, now);

        let visit = now.naive_local().format(TIMESTAMP_FORMAT).to_string();
        let touched = bounded(
            limit,
            StoreError::Timeout,
            self.store.touch_last_visit(&profile.face_id, &visit),
        )
        .await;
        if let Err(err) = touched {
            tracing::warn!(face_id = %profile.face_id, error = %err, "failed to update last visit");
        }

        tracing::debug!(
            face_id = %profile.face_id,
            confidence = hit.confidence,
            alert = alert.as_str(),
            "profile recognised"
        );

        DetectionResult::matched(now, hit.confidence, profile, alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::StandardPolicy;
    use crate::testing::{png_frame, sample_profile, FakeMatcher, FakeStore, SearchScript};
    use crate::types::AlertKind;
    use chrono::TimeZone;

    fn pipeline(matcher: Arc<FakeMatcher>, store: Arc<FakeStore>) -> DetectionPipeline {
        DetectionPipeline::new(
            matcher,
            store,
            Arc::new(StandardPolicy::default()),
            PipelineSettings {
                similarity_threshold: 98.0,
                call_timeout: Duration::from_millis(100),
            },
        )
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn test_no_face_is_stranger_and_logged() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::NoFace));
        let store = Arc::new(FakeStore::default());
        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;

        assert!(!result.matched);
        assert_eq!(result.alert, AlertKind::Stranger);
        assert!(result.profile.is_none());
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].is_vip());
        assert_eq!(logs[0].detection_hour, 10);
    }

    #[tokio::test]
    async fn test_match_returns_profile_and_touches_last_visit() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Hit("face-1".into(), 99.4)));
        let store = Arc::new(FakeStore::default());
        store.insert(sample_profile("face-1", "Alice"));

        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;

        assert!(result.matched);
        assert_eq!(result.alert, AlertKind::NormalVip);
        assert!(result.confidence.unwrap() >= 98.0);
        assert_eq!(result.profile.as_ref().unwrap().name, "Alice");
        assert_eq!(result.note.as_deref(), Some("likes espresso"));

        let stored = store.profile("face-1").unwrap();
        assert_eq!(stored.last_visit, "2024-05-01T10:15:00.000000");

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        let identity = logs[0].identity.as_ref().unwrap();
        assert_eq!(identity.face_id, "face-1");
        assert_eq!(identity.name, "Alice");
        assert_eq!(identity.category, "gold");
    }

    #[tokio::test]
    async fn test_orphaned_token_fails_open() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Hit("ghost".into(), 99.9)));
        let store = Arc::new(FakeStore::default());

        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;

        assert!(!result.matched);
        assert_eq!(result.alert, AlertKind::Stranger);
        assert!(result.profile.is_none());
        assert_eq!(store.logs().len(), 1);
        assert!(!store.logs()[0].is_vip());
    }

    #[tokio::test]
    async fn test_search_failure_degrades() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Fail));
        let store = Arc::new(FakeStore::default());
        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;
        assert!(!result.matched);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_search_timeout_degrades() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Hang));
        let store = Arc::new(FakeStore::default());
        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;
        assert!(!result.matched);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_store_read_failure_degrades() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Hit("face-1".into(), 99.0)));
        let store = Arc::new(FakeStore::default());
        store.insert(sample_profile("face-1", "Alice"));
        store.fail_reads(true);

        let result = pipeline(matcher, store).process_at(&png_frame(), now()).await;
        assert!(!result.matched);
        assert_eq!(result.alert, AlertKind::Stranger);
    }

    #[tokio::test]
    async fn test_log_failure_does_not_affect_result() {
        let matcher = Arc::new(FakeMatcher::new(SearchScript::Hit("face-1".into(), 99.0)));
        let store = Arc::new(FakeStore::default());
        store.insert(sample_profile("face-1", "Alice"));
        store.fail_logs(true);

        let result = pipeline(matcher, store.clone()).process_at(&png_frame(), now()).await;
        assert!(result.matched);
        assert!(store.logs().is_empty());
    }
}
