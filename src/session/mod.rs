pub mod controller;
pub mod events;
pub mod status;

pub use controller::{SessionController, SessionDeps};
pub use events::{LoggingEvents, SessionEvents};
pub use status::{SessionPhase, SessionState, SessionStatusHandle};
