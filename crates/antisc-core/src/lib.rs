//! Core moderation logic for the anti-Simplified-Chinese group bot.
//!
//! This crate is framework-agnostic. Telegram and the script converter live
//! behind ports (traits) implemented in adapter crates.

pub mod chat_state;
pub mod coalesce;
pub mod commands;
pub mod config;
pub mod deletion;
pub mod detector;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod ports;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
