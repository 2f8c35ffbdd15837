//! Operator CLI for toolgate credentials.
//!
//! This crate provides the `toolgate` command: credential status, forced
//! refresh, settings inspection, and the two halves of interactive consent.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
