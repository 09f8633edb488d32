pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::StagingError;

// Export logic types
pub use logic::{
    ChangesetValidator, FieldError, FieldErrorType, Proposal, StagingCoordinator,
    ValidationErrors,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store, UnitOfWork};

use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};

/// Build the store selected by the configuration, migrating Postgres first
pub async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match config.store.backend {
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config.database_url();
            let postgres_store =
                PostgresStore::new(&database_url, config.max_connections()).await?;

            log::info!("Running database migrations...");
            postgres_store.migrate().await?;
            Ok(Arc::new(postgres_store))
        }
    }
}

/// Serve the HTTP API until the listener fails
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    let store = connect_store(&config).await?;

    if config.store.seed {
        log::info!("Loading seed data...");
        seed::load_seed_data(store.as_ref()).await?;
    }

    let state = api::AppState::new(store, config.pagination.clone());
    let app = routes::create_router::<dyn Store>().with_state(state);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Stage-DB server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
