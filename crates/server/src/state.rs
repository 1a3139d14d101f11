//! Shared application state.

use crate::guard::OwnershipGuard;
use crate::quota::QuotaAccountant;
use shelf_core::config::AppConfig;
use shelf_metadata::MetadataStore;
use shelf_storage::ObjectStore;
use std::sync::Arc;

/// State handed to every handler. Cheap to clone; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub guard: Arc<dyn OwnershipGuard>,
    pub quota: Arc<QuotaAccountant>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        guard: Arc<dyn OwnershipGuard>,
    ) -> Self {
        let quota = Arc::new(QuotaAccountant::new(
            Arc::clone(&storage),
            Arc::clone(&metadata),
            &config.quota,
        ));
        Self {
            config: Arc::new(config),
            storage,
            metadata,
            guard,
            quota,
        }
    }
}
