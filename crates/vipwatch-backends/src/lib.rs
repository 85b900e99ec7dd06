//! vipwatch-backends — Concrete collaborators for the detection pipeline.
//!
//! Provides an HTTP face-collection client, an in-process fingerprint
//! matcher for development, and a SQLite profile store with a date-indexed
//! detection log.

pub mod memory_matcher;
pub mod remote_matcher;
pub mod sqlite_store;

pub use memory_matcher::MemoryMatcher;
pub use remote_matcher::{RemoteMatcher, RemoteMatcherConfig};
pub use sqlite_store::{SchemaOptions, SqliteStore};
