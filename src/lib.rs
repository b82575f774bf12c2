//! Scrutineer: live integrity monitoring for voting sessions.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod detect;
pub mod evidence;
pub mod global;
pub mod media;
pub mod policy;
pub mod security;
pub mod session;
