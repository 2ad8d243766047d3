//! Authenticated-session state.
//!
//! Owns the readiness flags that gate all remote activity. Constructed by
//! the application root at login and dropped at logout; nothing in here is
//! a process-wide global.

use std::sync::atomic::{AtomicBool, Ordering};

/// Per-session readiness and once-only flags.
///
/// Remote operations are attempted only once both `auth_resolved` and
/// `credential_probed` are set; until then the engine behaves as
/// local-only.
pub struct SessionContext {
    user_id: String,
    auth_resolved: AtomicBool,
    credential_probed: AtomicBool,
    auto_synced: AtomicBool,
}

impl SessionContext {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            auth_resolved: AtomicBool::new(false),
            credential_probed: AtomicBool::new(false),
            auto_synced: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Record that the user identity has been resolved.
    pub fn mark_auth_resolved(&self) {
        self.auth_resolved.store(true, Ordering::SeqCst);
    }

    /// Record that a remote-access credential probe has been attempted.
    pub fn mark_credential_probed(&self) {
        self.credential_probed.store(true, Ordering::SeqCst);
    }

    /// True once both identity and credential probe are in.
    pub fn is_ready(&self) -> bool {
        self.auth_resolved.load(Ordering::SeqCst) && self.credential_probed.load(Ordering::SeqCst)
    }

    /// Claim the once-per-session boot auto-sync.
    ///
    /// Returns true for exactly one caller per session.
    pub fn try_claim_auto_sync(&self) -> bool {
        self.auto_synced
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
