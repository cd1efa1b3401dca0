use std::sync::Arc;

use async_trait::async_trait;
use cantina_bus::{
    topics, CliResponse, CommandAck, CommandRecord, CommandSource, DjCommandPayload, EventBus,
    HandlerError, MusicCommandPayload, RawInput,
};
use cantina_mode::SetModeRequest;
use cantina_service::{LifecycleError, Service, ServiceContext};
use uuid::Uuid;

use crate::registry::{expand_shortcut, CommandRegistry, Shape};
use crate::suggest;

/// L2 command dispatcher (spec §4.4): normalizes raw input into a single
/// routed, shaped command event, acknowledging every attempt.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new() -> Arc<Self> {
        Self::with_registry(CommandRegistry::with_core_commands())
    }

    pub fn with_registry(registry: CommandRegistry) -> Arc<Self> {
        Arc::new(Self { registry: Arc::new(registry) })
    }
}

#[async_trait]
impl Service for Dispatcher {
    fn name(&self) -> &'static str {
        "command_dispatcher"
    }

    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let registry = self.registry.clone();
        let bus = ctx.bus.clone();

        ctx.subscribe::<RawInput, _, _>(topics::COMMAND_RAW_INPUT, move |envelope| {
            let registry = registry.clone();
            let bus = bus.clone();
            async move {
                dispatch_one(&registry, &bus, envelope.body).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        Ok(())
    }
}

fn tokenize(input: &RawInput) -> Vec<String> {
    let tokens: Vec<String> = input.line.trim().split_whitespace().map(str::to_string).collect();
    match tokens.split_first() {
        Some((first, rest)) => match expand_shortcut(first) {
            Some(expansion) => {
                let mut expanded: Vec<String> = expansion.split_whitespace().map(str::to_string).collect();
                expanded.extend(rest.iter().cloned());
                expanded
            }
            None => tokens,
        },
        None => tokens,
    }
}

async fn dispatch_one(registry: &Arc<CommandRegistry>, bus: &Arc<EventBus>, input: RawInput) {
    let command_id = Uuid::new_v4();
    let tokens = tokenize(&input);

    let Some((registration, args)) = registry.resolve(&tokens) else {
        let suggestion = suggest::closest(&tokens.join(" "), &registry.known_commands());
        respond_unknown(bus, &input, command_id, &tokens, suggestion);
        return;
    };

    let command = tokens[0].clone();
    let subcommand = if tokens.len() > args.len() + 1 { Some(tokens[1].clone()) } else { None };

    let outcome = match registration.shape {
        Shape::Default => publish_default(bus, registration.target_topic, &command, &subcommand, args, &input, command_id),
        Shape::PlayTrackIndex => publish_play_track(bus, registration.target_topic, args),
        Shape::MusicAction(action) => {
            let _ = bus.publish(
                registration.target_topic,
                MusicCommandPayload { action, track_index: None },
            );
            Ok(())
        }
        Shape::DjControl { dj_mode_active, skip } => {
            let _ = bus.publish(registration.target_topic, DjCommandPayload { dj_mode_active, skip });
            Ok(())
        }
        Shape::ModeRequest(mode) => {
            let _ = bus.publish(registration.target_topic, SetModeRequest { mode, reason: None });
            Ok(())
        }
        Shape::Shutdown => {
            let _ = bus.publish(registration.target_topic, ());
            Ok(())
        }
        Shape::Local => {
            let message = local_response(&command, &subcommand, args, registry);
            let _ = bus.publish(topics::CLI_RESPONSE, CliResponse { message, hint: None });
            Ok(())
        }
    };

    let (success, message) = match outcome {
        Ok(()) => (true, format!("dispatched '{}'", tokens.join(" "))),
        Err(reason) => (false, reason),
    };

    let _ = bus.publish(
        topics::COMMAND_ACK,
        CommandAck { command_id, success, message, sid: input.sid.clone() },
    );
}

fn publish_default(
    bus: &Arc<EventBus>,
    target_topic: &'static str,
    command: &str,
    subcommand: &Option<String>,
    args: &[String],
    input: &RawInput,
    command_id: Uuid,
) -> Result<(), String> {
    let record = CommandRecord {
        command: command.to_string(),
        subcommand: subcommand.clone(),
        args: args.to_vec(),
        raw_input: input.line.clone(),
        source: input.source,
        command_id,
        sid: input.sid.clone(),
    };
    bus.publish(target_topic, record).map_err(|err| err.to_string())
}

fn publish_play_track(bus: &Arc<EventBus>, target_topic: &'static str, args: &[String]) -> Result<(), String> {
    let track_index: u32 = args
        .first()
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| "play music requires a numeric track index".to_string())?;

    bus.publish(target_topic, MusicCommandPayload { action: cantina_bus::MusicAction::Play, track_index: Some(track_index) })
        .map_err(|err| err.to_string())
}

fn local_response(command: &str, subcommand: &Option<String>, args: &[String], registry: &CommandRegistry) -> String {
    match (command, subcommand.as_deref()) {
        ("help", _) => {
            let commands = registry.known_commands();
            format!("available commands: {}", commands.join(", "))
        }
        ("status", _) => "status: see /system/service_status for live service and mode state".to_string(),
        ("debug", Some("level")) => match args {
            [component, level] => format!("log level for '{component}' set to '{level}'"),
            _ => "usage: debug level <component> <level>".to_string(),
        },
        _ => "unrecognized local command".to_string(),
    }
}

fn respond_unknown(
    bus: &Arc<EventBus>,
    input: &RawInput,
    command_id: Uuid,
    tokens: &[String],
    suggestion: Option<String>,
) {
    let message = match &suggestion {
        Some(candidate) => format!("unknown command '{}'; did you mean '{}'?", tokens.join(" "), candidate),
        None => format!("unknown command '{}'", tokens.join(" ")),
    };

    let _ = bus.publish(topics::CLI_RESPONSE, CliResponse { message: message.clone(), hint: suggestion });
    let _ = bus.publish(
        topics::COMMAND_ACK,
        CommandAck { command_id, success: false, message, sid: input.sid.clone() },
    );
}
