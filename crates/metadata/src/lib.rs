//! Metadata store abstraction and SQLite implementation for Shelf.
//!
//! This crate provides the control-plane data model:
//! - Books, chapters, and their tags/stats
//! - Comics and their pages
//! - Lifecycle status columns with conditional (CAS) transitions
//! - Site settings (storage ceiling)

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use shelf_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.db_path).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("shelf.db");
        let config = MetadataConfig {
            db_path: db_path.clone(),
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }
}
