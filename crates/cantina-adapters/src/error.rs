use thiserror::Error;

/// Errors a vendor collaborator can surface through its adapter trait.
/// The trait boundary exists precisely so callers only ever see this
/// enum, never a vendor-specific error type.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{adapter} is unavailable: {reason}")]
    Unavailable { adapter: &'static str, reason: String },

    #[error("{adapter} rejected the request: {reason}")]
    Rejected { adapter: &'static str, reason: String },

    #[error("dashboard bridge refused to forward unknown topic {topic}")]
    UnknownTopic { topic: String },
}
