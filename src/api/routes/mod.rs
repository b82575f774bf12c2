//! API route modules.

pub mod journal;
pub mod session;
