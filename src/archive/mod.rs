//! Archive building: the per-stem unit of work
//!
//! [`ArchiveBuilder`] turns one [`FileGroup`](crate::stems::FileGroup) into one
//! [`ArchiveOutcome`]. Compression itself sits behind the [`Compressor`]
//! trait; [`ZipCompressor`] is the default implementation.

pub mod builder;
pub mod compress;
pub mod outcome;

pub use builder::{ARCHIVE_EXTENSION, ArchiveBuilder};
pub use compress::{Compressor, Deadline, ZipCompressor};
pub use outcome::{ArchiveError, ArchiveOutcome, ErrorKind, ErrorRecord, OutcomeRecord};
