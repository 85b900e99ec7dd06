//! Alert classification for recognised profiles.

use crate::types::{AlertKind, Profile};
use chrono::{DateTime, Local};

/// Decides how a recognised profile is announced.
pub trait AlertPolicy: Send + Sync {
    fn classify(&self, profile: &Profile, now: DateTime<Local>) -> AlertKind;
}

/// Birthday first, then returning-after-absence, otherwise a plain match.
pub struct StandardPolicy {
    /// Minimum gap since the previous visit for a `returning-vip` alert.
    pub returning_after_days: i64,
}

impl Default for StandardPolicy {
    fn default() -> Self {
        Self {
            returning_after_days: 30,
        }
    }
}

impl AlertPolicy for StandardPolicy {
    fn classify(&self, profile: &Profile, now: DateTime<Local>) -> AlertKind {
        let today = now.format("%m-%d").to_string();
        if profile.date_of_birth.as_deref() == Some(today.as_str()) {
            return AlertKind::BirthdayVip;
        }

        match profile.previous_visit() {
            Some(prev) if (now.naive_local() - prev).num_days() >= self.returning_after_days => {
                AlertKind::ReturningVip
            }
            _ => AlertKind::NormalVip,
        }
    }
}
