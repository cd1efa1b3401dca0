//! Topic-addressed async event bus and payload/topic registry (spec §4.1,
//! §4.2). This is the L0 layer every other `cantina-*` crate depends on.

mod bus;
mod error;
mod payload;
mod registry;
pub mod topics;

pub use bus::{EventBus, RawEnvelope, SubscriptionHandle, DEFAULT_QUEUE_CAPACITY};
pub use error::{BusError, HandlerError};
pub use payload::{
    AudioDuckRequestedPayload, CliResponse, CommandAck, CommandRecord, CommandSource,
    CrossfadeCompletePayload, DjCommandPayload, Envelope, MusicAction, MusicCommandPayload,
    MusicCrossfadeRequestPayload, PlayCachedSpeechRequestPayload, RawInput, ServiceStatus,
    ServiceStatusPayload, SpeechPlaybackCompletedPayload, StatusKind, Validate,
};
pub use registry::{Registry, TopicInfo};
