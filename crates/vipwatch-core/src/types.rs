use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `lastVisit` value for a profile that has not been seen since enrollment.
pub const NEVER_VISITED: &str = "2000-01-01";

/// Format used for `lastVisit` and event timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format used for the date key of detection events and analytics.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A VIP profile, keyed by the identity token the matcher assigned at enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub face_id: String,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Birthday as "MM-DD".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    pub last_visit: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Profile {
    /// Parse `last_visit`, returning `None` for the never-visited sentinel
    /// or an unparseable value.
    pub fn previous_visit(&self) -> Option<NaiveDateTime> {
        if self.last_visit == NEVER_VISITED {
            return None;
        }
        NaiveDateTime::parse_from_str(&self.last_visit, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(&self.last_visit, DATE_FORMAT)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

/// Best match returned by an identity search.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMatch {
    pub face_id: String,
    /// Similarity in percent, as reported by the matcher.
    pub confidence: f32,
}

/// Alert classification pushed to the live client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    Stranger,
    NormalVip,
    ReturningVip,
    BirthdayVip,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Stranger => "stranger",
            AlertKind::NormalVip => "normal-vip",
            AlertKind::ReturningVip => "returning-vip",
            AlertKind::BirthdayVip => "birthday-vip",
        }
    }
}

/// Per-frame result sent over the realtime channel. Never persisted.
///
/// Wire names follow the web client (`is_vip`, `vip_details`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Local wall-clock time as "HH:MM:SS".
    pub timestamp: String,
    #[serde(rename = "is_vip")]
    pub matched: bool,
    pub confidence: Option<f32>,
    #[serde(rename = "vip_details")]
    pub profile: Option<Profile>,
    #[serde(rename = "alert_type")]
    pub alert: AlertKind,
    #[serde(rename = "display_note")]
    pub note: Option<String>,
}

impl DetectionResult {
    pub fn stranger(now: DateTime<Local>) -> Self {
        Self {
            timestamp: now.format("%H:%M:%S").to_string(),
            matched: false,
            confidence: None,
            profile: None,
            alert: AlertKind::Stranger,
            note: None,
        }
    }

    pub fn matched(
        now: DateTime<Local>,
        confidence: f32,
        profile: Profile,
        alert: AlertKind,
    ) -> Self {
        let note = profile.notes.clone();
        Self {
            timestamp: now.format("%H:%M:%S").to_string(),
            matched: true,
            confidence: Some(confidence),
            profile: Some(profile),
            alert,
            note,
        }
    }
}

/// Denormalized identity copied into a detection event at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedIdentity {
    pub face_id: String,
    pub name: String,
    pub category: String,
}

/// Append-only detection log record.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub log_id: String,
    pub timestamp: String,
    pub detection_date: String,
    pub detection_hour: u32,
    /// Present iff the frame matched a profile.
    pub identity: Option<MatchedIdentity>,
}

impl DetectionEvent {
    /// Build the log record for a detection result observed at `now`.
    pub fn record(now: DateTime<Local>, result: &DetectionResult) -> Self {
        use chrono::Timelike;

        let identity = result.profile.as_ref().filter(|_| result.matched).map(|p| MatchedIdentity {
            face_id: p.face_id.clone(),
            name: p.name.clone(),
            category: p.category.clone(),
        });

        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            timestamp: now.naive_local().format(TIMESTAMP_FORMAT).to_string(),
            detection_date: now.format(DATE_FORMAT).to_string(),
            detection_hour: now.hour(),
            identity,
        }
    }

    pub fn is_vip(&self) -> bool {
        self.identity.is_some()
    }
}

/// One row of the top-visitors table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProfile {
    pub name: String,
    pub visits: u64,
}

/// Daily analytics rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub summary_date: String,
    pub total_visits: u64,
    pub vip_visit_count: u64,
    pub stranger_visit_count: u64,
    /// Keys "0".."23", always all present.
    pub hourly_distribution: BTreeMap<String, u64>,
    pub top_vips: Vec<TopProfile>,
}
