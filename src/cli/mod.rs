//! CLI module for the sam2-prompt library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;
mod overlay;
mod progress;

pub use main_impl::{main, Cli, CliLogFormat};
