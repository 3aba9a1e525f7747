//! The shared state of one `MockNet` instance

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::network::{HttpClient, MockServer};
use crate::recording::RecordingEngine;
use crate::registry::StubRegistry;
use crate::storage::{FileStore, StubStore};

/// Registry, store, recorder and stub listener, wired together
///
/// Built once at startup and passed explicitly to the control API.
pub struct MockNet {
    config: Arc<Config>,
    registry: Arc<StubRegistry>,
    store: Arc<dyn StubStore>,
    recorder: Arc<RecordingEngine>,
    server: MockServer,
}

impl MockNet {
    /// Build an instance persisting to `config.storage_dir`
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FileStore::new(config.storage_dir.clone()));
        Self::with_store(config, store)
    }

    /// Build an instance on top of an existing store
    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn StubStore>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(StubRegistry::new());
        let recorder = Arc::new(RecordingEngine::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            HttpClient::new(config.limits.max_response_size),
        ));
        let server = MockServer::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&recorder),
        );

        Self {
            config,
            registry,
            store,
            recorder,
            server,
        }
    }

    /// Configuration the instance was built with
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The stub registry
    #[must_use]
    pub fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }

    /// The document store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StubStore> {
        &self.store
    }

    /// The recording engine
    #[must_use]
    pub fn recorder(&self) -> &Arc<RecordingEngine> {
        &self.recorder
    }

    /// The stub listener
    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Stop recording and the stub listener
    pub async fn shutdown(&self) {
        let outcome = self.recorder.stop().await;
        if outcome.transition.changed() {
            info!(captured = outcome.captured, "Recording stopped on shutdown");
        }
        self.server.stop().await;
    }
}
