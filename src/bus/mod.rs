//! In-process event bus: writes emitted events to the outbox and applies them
//! to registered snapshot stores inside the caller's transaction.

mod command;
mod local;

pub use command::{CommandHandler, Emission, EventKind, Precondition};
pub use local::LocalEventBus;
