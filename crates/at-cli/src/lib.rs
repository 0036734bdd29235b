//! Activity tracker CLI library.
//!
//! This crate provides the CLI interface, configuration loading, and the
//! platform window probe for the activity tracker.

mod cli;
pub mod commands;
mod config;
pub mod probe;

pub use cli::{Cli, Commands};
pub use config::{Config, default_config_file};
