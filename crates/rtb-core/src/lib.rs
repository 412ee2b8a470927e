//! Core domain + application logic for the race tracker bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / iRacing live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod poller;
pub mod ports;
pub mod registry;

pub use errors::{Error, Result};
