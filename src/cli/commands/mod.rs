//! Command implementations for the stemzip CLI
//!
//! Each subcommand lives in its own module.

pub mod archive;
pub mod config;
pub mod version;
