//! Core types shared across the Shelf crates.

pub mod config;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod validate;

pub use error::{Error, Result};
pub use lifecycle::{EntityKind, LifecycleState};

/// Soft-deleted entities are retained this long before the sweeper may purge them.
pub const RETENTION_DAYS: i64 = 30;

/// Maximum accepted source file upload (books and comics).
pub const MAX_SOURCE_BYTES: u64 = 200 * 1024 * 1024;

/// Maximum accepted comic page image upload.
pub const MAX_PAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Maximum accepted cover image upload.
pub const MAX_COVER_BYTES: u64 = 5 * 1024 * 1024;

/// Maximum accepted site font upload.
pub const MAX_FONT_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum chapter content length in characters.
pub const MAX_CHAPTER_CHARS: usize = 500_000;

/// Upper bound for the administrator-set storage ceiling (10 TiB).
/// Guards against fat-fingered limits that would never trip.
pub const MAX_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024 * 1024;
