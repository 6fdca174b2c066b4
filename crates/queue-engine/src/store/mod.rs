//! Store module for the matching queue
//!
//! Provides the `QueueStore` trait and its backends, plus a factory that
//! builds a store from configuration.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use memory::MemoryQueueStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresQueueStore;
pub use traits::QueueStore;

use std::sync::Arc;
use tracing::info;

use common::{Clock, IdGenerator};

use crate::error::{QueueError, QueueResult};

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-memory store (fast, non-persistent)
    Memory,
    /// PostgreSQL store (persistent)
    Postgres,
}

impl StoreBackend {
    /// Parse backend name from configuration
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Some(StoreBackend::Memory),
            "postgres" | "postgresql" => Some(StoreBackend::Postgres),
            _ => None,
        }
    }
}

/// Create a store from configuration
pub async fn create_store(
    store_config: &config::StoreConfig,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
) -> QueueResult<Arc<dyn QueueStore>> {
    let backend = StoreBackend::parse(&store_config.backend).ok_or_else(|| {
        QueueError::Storage(format!("unknown store backend '{}'", store_config.backend))
    })?;

    match backend {
        StoreBackend::Memory => {
            info!("Creating in-memory queue store");
            Ok(Arc::new(MemoryQueueStore::with_collaborators(
                clock, id_gen,
            )))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let pg = store_config.postgres.as_ref().ok_or_else(|| {
                QueueError::Storage("postgres config required for postgres backend".to_string())
            })?;
            info!("Creating PostgreSQL queue store");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .connect(&pg.url)
                .await
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            let store = PostgresQueueStore::with_collaborators(pool, clock, id_gen);
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => Err(QueueError::Storage(
            "postgres backend requires the 'postgres' feature".to_string(),
        )),
    }
}
