//! Configuration management for stemzip
//!
//! Loading is handled by [`ArchiverConfig`] (figment layering over an embedded
//! `default-config.toml`). The `parallel_processing` block is read raw and
//! normalized by [`ConfigValidator`] into a [`ProcessingPolicy`].

pub mod core;
pub mod policy;

pub use self::core::{ArchiveSettings, ArchiverConfig};
pub use self::policy::{ConfigValidator, ProcessingPolicy, RawParallelConfig, WorkerLimit};
