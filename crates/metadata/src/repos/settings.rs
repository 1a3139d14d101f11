//! Site settings repository.
//!
//! A small key/value table for site-wide knobs: the storage ceiling
//! (`storage_limit_bytes`) and the installed font list (`custom_fonts`).

use crate::error::MetadataResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Setting key for the storage byte ceiling.
pub const STORAGE_LIMIT_BYTES: &str = "storage_limit_bytes";

/// Setting key for the installed site fonts, a JSON array of file names.
pub const CUSTOM_FONTS: &str = "custom_fonts";

/// Repository for site settings.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Get a setting value.
    async fn get_setting(&self, key: &str) -> MetadataResult<Option<String>>;

    /// Create or replace a setting.
    async fn set_setting(&self, key: &str, value: &str, now: OffsetDateTime)
        -> MetadataResult<()>;

    /// Delete a setting. Returns false if it did not exist.
    async fn delete_setting(&self, key: &str) -> MetadataResult<bool>;
}
