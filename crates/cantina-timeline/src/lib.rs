mod executor;
mod payload;
mod plan;

pub use executor::TimelineExecutor;
pub use payload::{PlanCancelled, PlanCompleted, PlanFailed};
pub use plan::{Layer, Plan, Step, DEFAULT_DUCK_LEVEL, DEFAULT_SPEECH_TIMEOUT_MS};
