//! shellpool library
//!
//! A pool of named, persistent remote shells. Each session keeps one shell
//! process alive across commands so working directory and environment
//! carry over from one `run` to the next.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod security_log;
pub mod ssh;
pub mod validation;
