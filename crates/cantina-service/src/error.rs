use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("service '{service}' failed to start: {message}")]
    StartFailed { service: String, message: String },

    #[error("service '{service}' failed to stop cleanly: {message}")]
    StopFailed { service: String, message: String },

    #[error(transparent)]
    Bus(#[from] cantina_bus::BusError),
}
