//! Dual-store synchronization.
//!
//! Orchestrates the local-first dual-write path and the bidirectional
//! full sync between the local store and the per-user cloud store.

mod engine;
mod merge;

pub use engine::{FullSyncReport, SyncEngine, SyncError, SyncOutcome};
pub use merge::{merge_by_timestamp, merge_collections, merge_last_processed_wins};
