//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Maximum size for cursors (2 KB).
pub const MAX_CURSOR_SIZE: usize = 2048;

/// An opaque cursor for resuming listing operations.
///
/// Backend-specific; callers pass it back verbatim. Base64-encoded on the
/// wire. Size-capped so a hostile cursor cannot balloon memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    pub fn new(data: Vec<u8>) -> StorageResult<Self> {
        if data.len() > MAX_CURSOR_SIZE {
            return Err(StorageError::InvalidCursor(format!(
                "cursor too large: {} bytes (max: {MAX_CURSOR_SIZE})",
                data.len()
            )));
        }
        Ok(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose, Engine as _};
        general_purpose::STANDARD.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> StorageResult<Self> {
        // Bound the input before decoding; base64 inflates by ~4/3.
        const MAX_BASE64_INPUT: usize = MAX_CURSOR_SIZE * 2;
        if s.len() > MAX_BASE64_INPUT {
            return Err(StorageError::InvalidCursor(format!(
                "cursor base64 too large: {} bytes (max: {MAX_BASE64_INPUT})",
                s.len()
            )));
        }

        use base64::{engine::general_purpose, Engine as _};
        let data = general_purpose::STANDARD
            .decode(s)
            .map_err(|e| StorageError::InvalidCursor(format!("invalid cursor base64: {e}")))?;
        Self::new(data)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cursor").field(&"<opaque>").finish()
    }
}

/// A stored object as seen by a listing.
#[derive(Clone, Debug)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<time::OffsetDateTime>,
}

/// A single page of listing results.
#[derive(Clone, Debug)]
pub struct ListedPage {
    pub objects: Vec<ObjectEntry>,
    /// Cursor for the next page; None means this was the last page.
    pub next_cursor: Option<Cursor>,
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: Option<time::OffsetDateTime>,
    pub content_type: Option<String>,
}

/// Blob store abstraction.
///
/// Keys are slash-separated relative paths; see `shelf_core::keys` for the
/// naming scheme. All writes are atomic at the single-object level; the store
/// offers no cross-object transactions, which is why metadata rows are always
/// the source of truth for which keys are live.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically, overwriting any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Returns NotFound if the key does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List one page of objects under a prefix.
    ///
    /// `limit` is clamped to [1, MAX_PAGE_SIZE]. Pass the returned cursor back
    /// to fetch the next page; a None cursor in the result means the listing
    /// is complete. Pages are ordered by key.
    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> StorageResult<ListedPage>;

    /// Static identifier for the backend type ("filesystem", "s3").
    /// Used in logs and the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Verify backend connectivity. Called at startup before the server
    /// accepts requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Delete an object, treating NotFound as success.
///
/// Purge and replace flows delete blobs whose rows are already gone; a
/// missing blob there means a previous attempt got further than its caller
/// observed, which is exactly the state we want.
pub async fn delete_if_exists(store: &dyn ObjectStore, key: &str) -> StorageResult<bool> {
    match store.delete(key).await {
        Ok(()) => Ok(true),
        Err(StorageError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
