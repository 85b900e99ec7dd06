//! vipwatch-core — VIP detection pipeline and roster management.
//!
//! Face matching and persistence are external collaborators reached through
//! the [`IdentityMatcher`] and [`ProfileStore`] traits; this crate holds the
//! orchestration between them.

pub mod alert;
pub mod analytics;
pub mod frame;
pub mod matcher;
pub mod pipeline;
pub mod roster;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use alert::{AlertPolicy, StandardPolicy};
pub use frame::{Frame, FrameError};
pub use matcher::{IdentityMatcher, MatcherError};
pub use pipeline::{DetectionPipeline, PipelineSettings};
pub use roster::{NewProfile, Roster, RosterError};
pub use store::{ProfileStore, StoreError};
pub use types::{
    AlertKind, AnalyticsSummary, DetectionEvent, DetectionResult, IdentityMatch, MatchedIdentity,
    Profile, TopProfile,
};
