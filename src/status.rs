//! Status Manager (§4.7) — filters and forwards model-emitted public status
//! updates. A thin pass-through over the Event Manager; grounded on the
//! teacher's `AgentOutput::Action` status-line emission in `states/*.rs`,
//! generalized into its own capability since the spec treats it as a
//! distinct component (with its own `emit_public_status` gate).

use crate::events::{Event, SharedEventManager};

pub struct StatusManager {
    events: SharedEventManager,
    emit_public_status: bool,
}

impl StatusManager {
    pub fn new(events: SharedEventManager, emit_public_status: bool) -> Self {
        Self {
            events,
            emit_public_status,
        }
    }

    /// Forwards a `StatusUpdate` event iff `emit_public_status` is true.
    /// Nulls, empty strings, and out-of-range percentages pass through
    /// unchanged — no clamping or validation (§4.7).
    pub fn emit_status(
        &self,
        agent_id: &str,
        title: impl Into<String>,
        details: Option<String>,
        next_step_hint: Option<String>,
        progress_pct: Option<i64>,
    ) {
        if !self.emit_public_status {
            return;
        }
        self.events.emit(Event::StatusUpdate {
            agent_id: agent_id.to_string(),
            title: title.into(),
            details,
            next_step_hint,
            progress_pct,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventManager;
    use std::sync::Arc;

    #[test]
    fn disabled_status_emits_nothing() {
        let recorder = Arc::new(RecordingEventManager::new());
        let status = StatusManager::new(recorder.clone(), false);
        status.emit_status("a1", "hello", None, None, None);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn enabled_status_forwards_verbatim() {
        let recorder = Arc::new(RecordingEventManager::new());
        let status = StatusManager::new(recorder.clone(), true);
        status.emit_status("a1", "hello", Some("".to_string()), None, Some(150));
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::StatusUpdate { details, progress_pct, .. } => {
                assert_eq!(details.as_deref(), Some(""));
                assert_eq!(*progress_pct, Some(150));
            }
            _ => panic!("expected StatusUpdate"),
        }
    }
}
