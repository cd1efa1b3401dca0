//! Command registration: basic/compound command maps and the shortcut
//! expansion table (spec §4.4).

use std::collections::HashMap;

use cantina_bus::topics;
use cantina_mode::Mode;

use crate::error::DispatchError;

/// How the dispatcher turns a matched command + its args into a bus
/// publish. Most commands are `Default` (a generic [`cantina_bus::CommandRecord`]);
/// a handful need the special-cased shaping spec §4.4 calls out.
#[derive(Clone, Copy)]
pub enum Shape {
    /// `{command, subcommand, args, raw_input, source, command_id, sid}`
    /// on the declared target topic.
    Default,
    /// `play music <N>`: extract `N` as `track_index`.
    PlayTrackIndex,
    /// `stop music` / `list music`: fixed music action, no index.
    MusicAction(cantina_bus::MusicAction),
    /// `dj start|stop|next`.
    DjControl { dj_mode_active: bool, skip: bool },
    /// `engage` / `ambient` / `disengage`: request a mode transition.
    ModeRequest(Mode),
    /// `reset`: publish the shutdown-requested signal.
    Shutdown,
    /// `help` / `status` / `debug level ...`: answered locally by the
    /// dispatcher rather than routed to another service.
    Local,
}

#[derive(Clone)]
pub struct Registration {
    pub service: &'static str,
    pub target_topic: &'static str,
    pub shape: Shape,
}

/// Fixed alias table (spec §4.4). Expansion happens before matching;
/// an alias may expand to a multi-word phrase.
pub const SHORTCUTS: &[(&str, &str)] = &[
    ("h", "help"),
    ("e", "engage"),
    ("s", "stop music"),
    ("st", "status"),
];

pub fn expand_shortcut(first_token: &str) -> Option<&'static str> {
    SHORTCUTS
        .iter()
        .find(|(alias, _)| *alias == first_token)
        .map(|(_, expansion)| *expansion)
}

/// Basic (single-word) and compound (two-word) command registrations,
/// built once at startup.
pub struct CommandRegistry {
    basic: HashMap<String, Registration>,
    compound: HashMap<(String, String), Registration>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { basic: HashMap::new(), compound: HashMap::new() }
    }

    /// Register a command. `command_name` is matched case-insensitively
    /// by its word count: one word goes in the basic map, two in the
    /// compound map. A duplicate registration is a startup-fatal
    /// conflict (spec §4.4, §7 `RegistrationError`).
    pub fn register(
        &mut self,
        command_name: &str,
        service: &'static str,
        target_topic: &'static str,
        shape: Shape,
    ) -> Result<(), DispatchError> {
        let words: Vec<&str> = command_name.split_whitespace().collect();
        let registration = Registration { service, target_topic, shape };

        match words.as_slice() {
            [single] => {
                let key = single.to_lowercase();
                if self.basic.contains_key(&key) {
                    return Err(DispatchError::RegistrationConflict(command_name.to_string()));
                }
                self.basic.insert(key, registration);
            }
            [first, second] => {
                let key = (first.to_lowercase(), second.to_lowercase());
                if self.compound.contains_key(&key) {
                    return Err(DispatchError::RegistrationConflict(command_name.to_string()));
                }
                self.compound.insert(key, registration);
            }
            _ => return Err(DispatchError::RegistrationConflict(command_name.to_string())),
        }
        Ok(())
    }

    /// Longest-prefix lookup: try the two-word compound match first,
    /// falling back to the first token alone.
    pub fn resolve<'a>(&self, tokens: &'a [String]) -> Option<(&Registration, &'a [String])> {
        if tokens.len() >= 2 {
            let key = (tokens[0].to_lowercase(), tokens[1].to_lowercase());
            if let Some(registration) = self.compound.get(&key) {
                return Some((registration, &tokens[2..]));
            }
        }
        let key = tokens[0].to_lowercase();
        self.basic.get(&key).map(|registration| (registration, &tokens[1..]))
    }

    /// All registered command names (basic and compound), for
    /// unknown-command suggestions and `help`.
    pub fn known_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.basic.keys().cloned().collect();
        names.extend(self.compound.keys().map(|(a, b)| format!("{a} {b}")));
        names.sort();
        names
    }

    /// Build the registry with the canonical command set the core must
    /// register (spec §6).
    pub fn with_core_commands() -> Self {
        let mut registry = Self::new();
        registry
            .register("help", "command_dispatcher", topics::CLI_RESPONSE, Shape::Local)
            .expect("core command registration must not conflict");
        registry
            .register("status", "command_dispatcher", topics::CLI_RESPONSE, Shape::Local)
            .expect("core command registration must not conflict");
        registry
            .register("reset", "command_dispatcher", topics::SYSTEM_SHUTDOWN_REQUESTED, Shape::Shutdown)
            .expect("core command registration must not conflict");
        registry
            .register(
                "engage",
                "command_dispatcher",
                topics::SYSTEM_SET_MODE_REQUEST,
                Shape::ModeRequest(Mode::Interactive),
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "ambient",
                "command_dispatcher",
                topics::SYSTEM_SET_MODE_REQUEST,
                Shape::ModeRequest(Mode::Ambient),
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "disengage",
                "command_dispatcher",
                topics::SYSTEM_SET_MODE_REQUEST,
                Shape::ModeRequest(Mode::Idle),
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "list music",
                "command_dispatcher",
                topics::MUSIC_COMMAND,
                Shape::MusicAction(cantina_bus::MusicAction::List),
            )
            .expect("core command registration must not conflict");
        registry
            .register("play music", "command_dispatcher", topics::MUSIC_COMMAND, Shape::PlayTrackIndex)
            .expect("core command registration must not conflict");
        registry
            .register(
                "stop music",
                "command_dispatcher",
                topics::MUSIC_COMMAND,
                Shape::MusicAction(cantina_bus::MusicAction::Stop),
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "dj start",
                "command_dispatcher",
                topics::DJ_COMMAND,
                Shape::DjControl { dj_mode_active: true, skip: false },
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "dj stop",
                "command_dispatcher",
                topics::DJ_COMMAND,
                Shape::DjControl { dj_mode_active: false, skip: false },
            )
            .expect("core command registration must not conflict");
        registry
            .register(
                "dj next",
                "command_dispatcher",
                topics::DJ_COMMAND,
                Shape::DjControl { dj_mode_active: true, skip: true },
            )
            .expect("core command registration must not conflict");
        registry
            .register("debug level", "command_dispatcher", topics::CLI_RESPONSE, Shape::Local)
            .expect("core command registration must not conflict");
        registry
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_core_commands()
    }
}
