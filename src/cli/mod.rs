pub mod args;
pub mod sessions;

pub use args::{Cli, CliCommand, SessionsCliArgs};
pub use sessions::handle_sessions_command;
