pub mod init;
pub mod run;
pub mod status;

// Re-export command functions for convenience
pub use init::{init, InitParams};
pub use run::{run, RunParams};
pub use status::{progress, usage};

use std::sync::Arc;

use anyhow::{Context, Result};

use autopost::config::{Config, StorageBackend};
use autopost::storage::{
    AdminApiClient, Collaborators, JsonlPublishLog, PublishLog, SqliteStore, TeePublishLog,
};
use autopost::utils::{Clock, OffsetClock};

/// Calendar-day clock of the deployment
pub fn clock(config: &Config) -> Arc<dyn Clock> {
    Arc::new(OffsetClock::new(config.runner.utc_offset_hours))
}

/// Collaborators of the configured backend
///
/// The API backend also appends every published post to the local JSONL log.
pub fn open_collaborators(config: &Config, clock: Arc<dyn Clock>) -> Result<Collaborators> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let store = Arc::new(
                SqliteStore::new(&config.storage.sqlite_path, clock)
                    .context("Failed to open SQLite store")?,
            );
            Ok(Collaborators::from_backend(store.clone(), store))
        }
        StorageBackend::Api => {
            let client = Arc::new(
                AdminApiClient::new(&config.api, clock).context("Failed to create API client")?,
            );
            let remote: Arc<dyn PublishLog> = client.clone();
            let local: Arc<dyn PublishLog> =
                Arc::new(JsonlPublishLog::new(&config.storage.audit_log_path));
            let log = Arc::new(TeePublishLog::new(vec![local, remote]));
            Ok(Collaborators::from_backend(client, log))
        }
    }
}
