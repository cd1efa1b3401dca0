use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("command '{0}' is already registered")]
    RegistrationConflict(String),

    #[error("shortcut '{0}' is already registered")]
    ShortcutConflict(String),

    #[error(transparent)]
    Bus(#[from] cantina_bus::BusError),
}
