mod coordinator;
mod payload;
mod selection;
mod state;

pub use coordinator::DjCoordinator;
pub use payload::{
    CacheReadyPayload, CommentaryRequestPayload, CommentaryResponsePayload, CommentarySkippedPayload,
    SynthesizeRequestPayload, TrackEndingSoonPayload,
};
pub use selection::{select_track, RecentHistory};
pub use state::{Phase, COORDINATION_KEY};
