//! CLI subcommand implementations.

pub mod config;
pub mod init;
pub mod report;
pub mod status;
pub mod summary;
pub mod track;
