//! Progress telemetry reconciliation.
//!
//! Normalizes progress events arriving from heterogeneous download engines
//! into a single monotonic, UI-safe sequence per download id.

mod reconciler;

pub use reconciler::{stabilize_progress_event, ProgressReconciler};
