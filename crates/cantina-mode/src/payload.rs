use cantina_bus::Validate;
use serde::{Deserialize, Serialize};

use crate::mode::Mode;

/// Body of `/system/mode/set_mode_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetModeRequest {
    pub mode: Mode,
    /// Set when a tie-break hop (AMBIENT<->INTERACTIVE) re-requests its
    /// final target after landing on IDLE; absent for user-originated
    /// requests.
    pub reason: Option<String>,
}

impl Validate for SetModeRequest {}

/// Body of `/system/mode/transition_started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeTransitionStarted {
    pub from: Mode,
    pub to: Mode,
}

impl Validate for ModeTransitionStarted {}

/// Body of `/system/mode/changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChanged {
    pub from: Mode,
    pub to: Mode,
}

impl Validate for ModeChanged {}

/// Body of `/system/mode/transition_failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeTransitionFailed {
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
}

impl Validate for ModeTransitionFailed {}
