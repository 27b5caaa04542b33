//! Producers that settle a [`Deferred`](crate::Deferred) from another thread.
//!
//! Timer and file-read producers share one completion contract: they hand
//! back a pending deferred right away and settle it later, so callers
//! observe both the same way.

pub mod fs;
mod timer;

pub use fs::{read_file, read_to_string, FileReader, ReadError, ThreadFileReader};
pub use timer::{reject_after, resolve_after};
