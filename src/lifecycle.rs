//! Lifecycle module turning host foreground/background signals into events.
//!
//! Only an Active -> Inactive transition produces an event. Duplicate signals
//! and a resign that arrives before any activation are ignored, since hosts
//! can deliver both during startup.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::event::{DeviceEventKind, EventKind, EventRecord};

/// Foreground state of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Active { activated_at: DateTime<Utc> },
}

/// State machine converting activate/resign signals into session events.
pub struct LifecycleTracker {
    state: Mutex<LifecycleState>,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Inactive),
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a "became active" signal.
    pub fn on_activate(&self) {
        self.on_activate_at(Utc::now());
    }

    /// Handle a "became active" signal observed at `now`.
    pub fn on_activate_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            LifecycleState::Inactive => {
                *state = LifecycleState::Active { activated_at: now };
                debug!(activated_at = %now, "Lifecycle: became active");
            }
            LifecycleState::Active { .. } => {
                debug!("Lifecycle: duplicate activate ignored");
            }
        }
    }

    /// Handle a "will resign active" signal.
    ///
    /// Returns the session event when this ends an active period.
    pub fn on_resign_active(&self) -> Option<EventRecord> {
        self.on_resign_active_at(Utc::now())
    }

    /// Handle a "will resign active" signal observed at `now`.
    pub fn on_resign_active_at(&self, now: DateTime<Utc>) -> Option<EventRecord> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let LifecycleState::Active { activated_at } = *state else {
            debug!("Lifecycle: resign while inactive ignored");
            return None;
        };
        *state = LifecycleState::Inactive;

        // Wall clock can step backwards between the two signals.
        let duration_ms = (now - activated_at).num_milliseconds().max(0);
        let metadata = json!({
            "duration_ms": duration_ms,
            "activated_at": activated_at.timestamp_millis(),
            "resigned_at": now.timestamp_millis(),
        });

        match EventRecord::with_timestamp(
            EventKind::Device(DeviceEventKind::Lifecycle),
            &metadata,
            now,
        ) {
            Ok(record) => {
                debug!(duration_ms = duration_ms, "Lifecycle: session ended");
                Some(record)
            }
            Err(e) => {
                warn!(error = %e, "Lifecycle: failed to build session event");
                None
            }
        }
    }
}
