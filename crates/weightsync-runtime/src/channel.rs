//! Object Transfer Channel
//!
//! Typed publish/subscribe over the session's generic message channel. Each
//! transfer type travels under its routing key; receivers pick out their own
//! key and ignore everything else, so several types can share one link.

use std::sync::Arc;

use futures::future;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, trace, warn};
use weightsync_core::{
    ChannelConfig, Payload, PlatformError, PlatformEvent, RouteStatus, TransferError,
    TransferObject, TransferRegistry, UnknownKeyPolicy, WeightRecord,
};

use crate::session::ConnectivitySession;

/// Which path an outbound object took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Interactive message, acknowledged by the peer
    Message,
    /// Latest-value application context, no acknowledgment
    ApplicationContext,
}

/// Typed send/receive over a connectivity session
#[derive(Clone, Debug)]
pub struct ObjectTransferChannel {
    session: ConnectivitySession,
    registry: Arc<TransferRegistry>,
    config: ChannelConfig,
}

impl ObjectTransferChannel {
    /// Channel with the default registry (weight records only)
    pub fn new(session: ConnectivitySession) -> Self {
        Self::with_registry(session, default_registry())
    }

    pub fn with_registry(session: ConnectivitySession, registry: TransferRegistry) -> Self {
        Self {
            session,
            registry: Arc::new(registry),
            config: ChannelConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn session(&self) -> &ConnectivitySession {
        &self.session
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Send an object as an interactive message
    ///
    /// Requires a reachable peer and fails fast otherwise: nothing is queued
    /// and nothing is retried.
    pub async fn send<T: TransferObject>(&self, object: &T) -> Result<(), TransferError> {
        let handle = self.session.current_reachable_handle()?;
        let payload = object.to_payload()?;

        let timeout = self.config.reply_timeout();
        let reply = tokio::time::timeout(timeout, handle.send_message(payload))
            .await
            .map_err(|_| PlatformError::Timeout {
                duration_ms: self.config.reply_timeout_ms,
            })??;

        if reply.is_acknowledgment() {
            debug!(key = T::ROUTING_KEY, "object delivered");
        } else {
            debug!(key = T::ROUTING_KEY, %reply, "object delivered, unexpected reply");
        }
        Ok(())
    }

    /// Publish an object as the latest application context
    ///
    /// Needs only a valid (paired) session; a newer update replaces an older
    /// one the peer has not yet seen.
    pub fn update_context<T: TransferObject>(&self, object: &T) -> Result<(), TransferError> {
        let handle = self.session.current_session_handle()?;
        handle.update_application_context(object.to_payload()?)?;
        debug!(key = T::ROUTING_KEY, "application context updated");
        Ok(())
    }

    /// Send interactively, falling back to a context update when the link
    /// refuses the message
    pub async fn send_or_update_context<T: TransferObject>(
        &self,
        object: &T,
    ) -> Result<Delivery, TransferError> {
        match self.send(object).await {
            Ok(()) => Ok(Delivery::Message),
            Err(err) if err.is_link_failure() => {
                info!(key = T::ROUTING_KEY, error = %err, "interactive send failed, falling back to application context");
                self.update_context(object)?;
                Ok(Delivery::ApplicationContext)
            }
            Err(err) => Err(err),
        }
    }

    /// Every inbound object of type `T`, from interactive messages and context
    /// deliveries alike
    ///
    /// Each interactive message is acknowledged whether or not it decodes.
    /// Messages without `T`'s key, or whose bytes do not decode, are dropped.
    pub fn receive_stream<T: TransferObject>(&self) -> BoxStream<'static, T> {
        let channel = self.clone();
        self.session
            .inbound_events()
            .filter_map(move |event| future::ready(channel.accept::<T>(event)))
            .boxed()
    }

    /// Take one platform event as an inbound object of type `T`
    ///
    /// Interactive messages are acknowledged before decoding. Activation
    /// changes carry no object and yield `None`.
    pub fn accept<T: TransferObject>(&self, event: PlatformEvent) -> Option<T> {
        let payload = match event {
            PlatformEvent::Message(message) => {
                message.reply.reply(Payload::acknowledgment());
                message.payload
            }
            PlatformEvent::ApplicationContext(payload) => payload,
            PlatformEvent::ActivationChanged(_) => return None,
        };
        decode_routed::<T>(&payload, &self.registry, self.config.unknown_key_policy)
    }
}

/// Registry holding every transfer type this crate sends
pub fn default_registry() -> TransferRegistry {
    let mut registry = TransferRegistry::new();
    // A fresh registry cannot collide
    if let Err(err) = registry.register::<WeightRecord>() {
        warn!(error = %err, "failed to register weight records");
    }
    registry
}

fn decode_routed<T: TransferObject>(
    payload: &Payload,
    registry: &TransferRegistry,
    policy: UnknownKeyPolicy,
) -> Option<T> {
    match T::from_payload(payload) {
        Some(Ok(object)) => return Some(object),
        Some(Err(err)) => debug!(key = T::ROUTING_KEY, error = %err, "dropping undecodable payload"),
        None => {}
    }

    for (key, status) in registry.inspect(payload) {
        match status {
            RouteStatus::Unknown => match policy {
                UnknownKeyPolicy::Ignore => trace!(key, "dropping payload with unrouted key"),
                UnknownKeyPolicy::Warn => warn!(key, "dropping payload with unrouted key"),
            },
            RouteStatus::Malformed if key != T::ROUTING_KEY => {
                debug!(key, "payload carries a malformed entry for another type")
            }
            RouteStatus::Malformed | RouteStatus::Decodable => {}
        }
    }
    None
}
