//! # stemzip - stem-based parallel archiving
//!
//! Groups the files of a directory by *stem* (a shared filename prefix such
//! as `sales` in `sales_2024.csv` and `sales-q1.xlsx`) and writes one zip
//! archive per stem. Stems are archived on a bounded pool of worker threads;
//! one failing stem never affects the others.
//!
//! ## Quick Start
//!
//! ```bash
//! # Archive two stems from ./exports into ./archives
//! stemzip archive sales inventory -i exports -e csv,xlsx
//!
//! # See which policy the current configuration resolves to
//! stemzip config show --stems 8
//! ```
//!
//! Library callers go through [`engine::Engine`].

pub mod archive;
pub mod cli;
pub mod config;
pub mod engine;
pub mod parallel;
pub mod stems;

pub use cli::{Cli, Output};
pub use config::ArchiverConfig;
pub use engine::{Engine, RunResult};

/// Result type alias for stemzip operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
