//! Daily rollup of detection events.

use crate::types::{AnalyticsSummary, DetectionEvent, TopProfile};
use std::collections::{BTreeMap, HashMap};

/// Number of entries in the top-visitors table.
pub const TOP_PROFILES: usize = 5;

/// Summarize the events of one day.
///
/// `events` must be in the store's iteration order: ties in the top table are
/// broken by which name appeared first.
pub fn summarize(date: &str, events: &[DetectionEvent]) -> AnalyticsSummary {
    let total = events.len() as u64;

    let mut hourly: BTreeMap<String, u64> = (0..24).map(|h| (h.to_string(), 0)).collect();
    // (visits, first seen position)
    let mut visits: HashMap<&str, (u64, usize)> = HashMap::new();
    let mut matched = 0u64;

    for (pos, event) in events.iter().enumerate() {
        if event.detection_hour < 24 {
            *hourly.entry(event.detection_hour.to_string()).or_insert(0) += 1;
        }
        if let Some(identity) = &event.identity {
            matched += 1;
            visits.entry(identity.name.as_str()).or_insert((0, pos)).0 += 1;
        }
    }

    let mut ranked: Vec<(&str, u64, usize)> =
        visits.into_iter().map(|(name, (n, first))| (name, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    AnalyticsSummary {
        summary_date: date.to_string(),
        total_visits: total,
        vip_visit_count: matched,
        stranger_visit_count: total - matched,
        hourly_distribution: hourly,
        top_vips: ranked
            .into_iter()
            .take(TOP_PROFILES)
            .map(|(name, visits, _)| TopProfile {
                name: name.to_string(),
                visits,
            })
            .collect(),
    }
}
