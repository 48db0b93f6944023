//! Sync Builder API
//!
//! Builder-style assembly of a sync node (session, typed channel, store) for
//! consumers such as the simulator and tests.

use std::sync::Arc;

use tracing::info;
use weightsync_core::{
    LocalStore, SessionPlatform, SyncConfig, SyncResult, TransferError, TransferObject,
    TransferRegistry,
};

use crate::channel::{default_registry, Delivery, ObjectTransferChannel};
use crate::coordinator::{CoordinatorHandle, SyncCoordinator};
use crate::session::ConnectivitySession;

// ----------------------------------------------------------------------------
// Sync Builder
// ----------------------------------------------------------------------------

/// Builder for one side of a phone/watch pair
pub struct SyncBuilder {
    session: ConnectivitySession,
    config: SyncConfig,
    store: Option<LocalStore>,
    registry: Option<TransferRegistry>,
}

impl SyncBuilder {
    pub fn new(platform: Arc<dyn SessionPlatform>) -> Self {
        Self::with_session(ConnectivitySession::new(platform))
    }

    /// Builder over an existing session (e.g. `ConnectivitySession::unsupported()`)
    pub fn with_session(session: ConnectivitySession) -> Self {
        Self {
            session,
            config: SyncConfig::default(),
            store: None,
            registry: None,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of building one from `config.store`
    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_registry(mut self, registry: TransferRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> SyncResult<SyncNode> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => LocalStore::from_config(&self.config.store)?,
        };
        let registry = self.registry.unwrap_or_else(default_registry);
        let routes: Vec<&'static str> = registry.routing_keys().collect();
        let channel = ObjectTransferChannel::with_registry(self.session, registry)
            .with_config(self.config.channel.clone());

        info!(key = store.key(), ?routes, "sync node built");
        Ok(SyncNode {
            channel,
            store: Arc::new(store),
            config: self.config,
        })
    }
}

// ----------------------------------------------------------------------------
// Sync Node
// ----------------------------------------------------------------------------

/// Assembled session, channel and store for one device
#[derive(Debug, Clone)]
pub struct SyncNode {
    channel: ObjectTransferChannel,
    store: Arc<LocalStore>,
    config: SyncConfig,
}

impl SyncNode {
    pub fn channel(&self) -> &ObjectTransferChannel {
        &self.channel
    }

    pub fn session(&self) -> &ConnectivitySession {
        self.channel.session()
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Send an object, falling back to a context update when configured to
    pub async fn publish<T: TransferObject>(&self, object: &T) -> Result<Delivery, TransferError> {
        if self.config.session.context_fallback {
            self.channel.send_or_update_context(object).await
        } else {
            self.channel.send(object).await.map(|()| Delivery::Message)
        }
    }

    /// Coordinator over this node's channel and store
    pub fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(self.channel.clone(), Arc::clone(&self.store))
            .with_config(self.config.session.clone())
    }

    /// Spawn this node's coordinator
    pub fn start(&self) -> CoordinatorHandle {
        self.coordinator().spawn()
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Node with the testing configuration and an in-memory store
pub fn create_test_node(platform: Arc<dyn SessionPlatform>) -> SyncResult<SyncNode> {
    SyncBuilder::new(platform)
        .with_config(SyncConfig::testing())
        .build()
}
