mod context;
mod error;
mod service;

pub use context::{ServiceContext, DEFAULT_STOP_GRACE};
pub use error::LifecycleError;
pub use service::{start_service, Service, ServiceHandle};
