pub mod config;
pub mod engine;
pub mod remote;
pub mod rest;

use std::sync::Arc;

use config::Config;
use engine::InProcessBackend;
use remote::RemoteBackend;

/// Shared application state passed to every request handler.
pub struct AppContext {
    pub config: Arc<Config>,
    /// In-process DOM evaluation backend.
    pub engine: InProcessBackend,
    /// Remote sandbox evaluation backend.
    pub remote: RemoteBackend,
    pub started_at: std::time::Instant,
    /// Random per-process id, reported by the health endpoint.
    pub instance_id: String,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            engine: InProcessBackend::new(config.engine.clone()),
            remote: RemoteBackend::new(config.sandbox.clone()),
            started_at: std::time::Instant::now(),
            instance_id: uuid::Uuid::new_v4().to_string(),
            config,
        }
    }
}
