//! Loop Detector (§4.5) — flags an agent that keeps retrying the same failed
//! tool call. Grounded on the teacher's `blacklisted_tools` mechanism in
//! `memory.rs` (a tool can be permanently excluded after repeated failure),
//! generalized to a sliding window over `turn_id` rather than a permanent
//! blacklist, since the spec scopes detection to "the last N turns" (§4.5)
//! rather than for the agent's whole lifetime.

use crate::state::AgentState;

/// A failed tool call is considered "repeated" once it has failed at least
/// this many times within the inspected window.
const REPEAT_THRESHOLD: usize = 3;

pub struct LoopDetector {
    window: usize,
}

impl LoopDetector {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// True if, among the last `window` turns, the given `turn_id` appears
    /// as a failed tool result at least `REPEAT_THRESHOLD` times (§4.5).
    pub fn detect_repeated_failures(&self, state: &AgentState, turn_id: &str) -> bool {
        let recent = tail(&state.turns, self.window);
        let failures = recent
            .iter()
            .filter(|turn| {
                turn.turn_id == turn_id
                    && turn
                        .tool_result
                        .as_ref()
                        .map(|r| !r.success)
                        .unwrap_or(false)
            })
            .count();
        failures >= REPEAT_THRESHOLD
    }
}

fn tail<T>(items: &[T], window: usize) -> &[T] {
    let start = items.len().saturating_sub(window);
    &items[start..]
}
