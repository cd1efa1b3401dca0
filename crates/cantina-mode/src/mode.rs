//! Mode definitions and transition resolution.
//!
//! Pure domain logic - no I/O, no bus dependency.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Operating mode of the assistant (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[default]
    Startup,
    Idle,
    Ambient,
    Interactive,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Startup => "STARTUP",
            Mode::Idle => "IDLE",
            Mode::Ambient => "AMBIENT",
            Mode::Interactive => "INTERACTIVE",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Outcome of resolving a requested transition from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Transition directly to the requested mode.
    Direct(Mode),
    /// Not a legal transition from `from`.
    Illegal,
    /// AMBIENT <-> INTERACTIVE is serviced as two hops: land on IDLE
    /// first, then the caller re-requests the final target so every
    /// IDLE-gated service observes the intermediate state (spec §4.5
    /// tie-break).
    ViaIdle { idle: Mode, then: Mode },
}

/// Decide how to service a request to move from `from` to `requested`.
pub fn resolve_transition(from: Mode, requested: Mode) -> Resolution {
    use Mode::*;

    if from == requested {
        return Resolution::Direct(requested);
    }

    match (from, requested) {
        (Startup, Idle) => Resolution::Direct(Idle),
        (Idle, Ambient) | (Idle, Interactive) => Resolution::Direct(requested),
        (Ambient, Idle) | (Interactive, Idle) => Resolution::Direct(Idle),
        (Ambient, Interactive) => Resolution::ViaIdle { idle: Idle, then: Interactive },
        (Interactive, Ambient) => Resolution::ViaIdle { idle: Idle, then: Ambient },
        (_, Idle) => Resolution::Direct(Idle), // "any state -> IDLE" on reset
        _ => Resolution::Illegal,
    }
}

const HISTORY_CAPACITY: usize = 16;

/// Bounded `(mode, entered_at)` history kept purely for diagnostics
/// (spec §3).
#[derive(Debug, Default)]
pub struct ModeHistory {
    entries: VecDeque<(Mode, f64)>,
}

impl ModeHistory {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(HISTORY_CAPACITY) }
    }

    pub fn push(&mut self, mode: Mode, entered_at: f64) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((mode, entered_at));
    }

    pub fn entries(&self) -> impl Iterator<Item = &(Mode, f64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_only_advances_to_idle() {
        assert_eq!(resolve_transition(Mode::Startup, Mode::Idle), Resolution::Direct(Mode::Idle));
        assert_eq!(resolve_transition(Mode::Startup, Mode::Ambient), Resolution::Illegal);
    }

    #[test]
    fn idle_reaches_ambient_and_interactive_directly() {
        assert_eq!(resolve_transition(Mode::Idle, Mode::Ambient), Resolution::Direct(Mode::Ambient));
        assert_eq!(resolve_transition(Mode::Idle, Mode::Interactive), Resolution::Direct(Mode::Interactive));
    }

    #[test]
    fn ambient_to_interactive_is_serviced_via_idle() {
        assert_eq!(
            resolve_transition(Mode::Ambient, Mode::Interactive),
            Resolution::ViaIdle { idle: Mode::Idle, then: Mode::Interactive }
        );
        assert_eq!(
            resolve_transition(Mode::Interactive, Mode::Ambient),
            Resolution::ViaIdle { idle: Mode::Idle, then: Mode::Ambient }
        );
    }

    #[test]
    fn any_state_can_reset_to_idle() {
        assert_eq!(resolve_transition(Mode::Ambient, Mode::Idle), Resolution::Direct(Mode::Idle));
        assert_eq!(resolve_transition(Mode::Interactive, Mode::Idle), Resolution::Direct(Mode::Idle));
    }

    #[test]
    fn history_drops_oldest_past_capacity() {
        let mut history = ModeHistory::new();
        for i in 0..20 {
            history.push(Mode::Idle, i as f64);
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.entries().next().unwrap().1, 4.0);
    }
}
