//! Error kinds for the event bus (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown topic '{0}': subscribing to an unregistered topic is a programming error")]
    UnknownTopic(String),

    #[error("payload for topic '{topic}' failed validation: {message}")]
    Validation { topic: String, message: String },
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler for service '{service}' failed: {message}")]
    Failed { service: String, message: String },
}
