mod dispatcher;
mod error;
mod registry;
mod suggest;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use registry::{CommandRegistry, Registration, Shape, SHORTCUTS};
